//! Structured logging setup: a human-readable console formatter (default)
//! and a JSON formatter, selected via `GATEWIRE_LOG_FORMAT`.

pub mod logger;
pub mod structured;

pub use structured::init_from_env;
