//! Infrastructure error conversions.

pub mod conversions;

pub use conversions::{http_to_remote, InfraError};
