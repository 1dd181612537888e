use nutype::nutype;

pub const MAX_KEY_LENGTH: usize = 64;

/// Alphabet used for generated keys. Easily confused glyphs such as 0, O, I, G and V are left out.
pub const GENERATION_ALPHABET: &[u8] = b"ABCDEFHJKLMNPQRSTWXY123456789";

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// An access key: 1..=64 characters of `[A-Za-z0-9_-]`.
///
/// Validated on construction, so every `Key` is also a safe single path component.
#[nutype(
    validate(
        not_empty,
        len_char_max = MAX_KEY_LENGTH,
        predicate = |s| s.bytes().all(is_key_byte)
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        TryFrom,
        Into,
        Hash,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct Key(String);
