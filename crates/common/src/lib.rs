//! Common types, protocol definitions, and errors shared across `file-cipher-svc` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
