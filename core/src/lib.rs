pub mod core;
pub mod error;
pub mod types;

pub use crate::core::TrackerCore;
pub use error::{Error, ErrorKind, Result, ValidationError};
