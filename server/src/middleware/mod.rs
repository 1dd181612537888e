mod operator;

pub(crate) use operator::safe_return_path;
pub use operator::{identify_operator, require_operator};
