//! # stridopt-shared
//!
//! Types shared by every Stridopt crate: the document models mirrored from
//! the backend, id newtypes, wire enums, deterministic profile colors and
//! local input validation. Nothing in here performs I/O.

pub mod color;
pub mod constants;
pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::{SharedError, ValidationError};
pub use models::*;
pub use types::*;
