//! Tracing setup: structured JSON logs, plus optional OTLP span export.
//!
//! # Telemetry invariants
//!
//! - **No key material or file contents** may appear in any span attribute or
//!   log field. The key is identified only by its fingerprint.
//! - Log level is configurable via `RUST_LOG`, falling back to `LOG_LEVEL`
//!   (default: `info`).

pub mod init;

pub use init::{init_telemetry, shutdown};
