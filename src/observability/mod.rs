//! Observability
//!
//! Structured JSON logging of store lifecycle, scan anomalies and cache
//! activity. Logging never changes store behaviour and never fails an
//! operation.
//!
//! ```ignore
//! use tagstore::observability::{log_event_with_fields, Event, Logger, Severity};
//!
//! Logger::set_min_severity(Severity::Warn);
//! log_event_with_fields(Event::ScanTruncated, &[("byte_offset", "42")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log an event at its own severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log an event at its own severity, with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::StoreCleared);
        log_event_with_fields(Event::ConfigLoaded, &[("path", "/tmp/tagstore.json")]);
    }
}
