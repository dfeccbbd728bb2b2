//! Session parameter tracking.
use std::collections::HashMap;

use time::UtcOffset;
use tracing::trace;

use crate::error::ConfigError;
use crate::postgres::TransactionStatus;

/// Server reported session state.
///
/// A handful of parameters influence decoding: `DateStyle` decides whether
/// textual dates are worth parsing, `TimeZone` localises binary
/// `timestamptz` values and `IntervalStyle` gates textual interval parsing.
/// Everything else is kept verbatim for the caller.
#[derive(Debug, Default)]
pub struct Session {
    parameters: HashMap<String, String>,
    iso_dates: bool,
    postgres_intervals: bool,
    timezone: Option<UtcOffset>,
    transaction_status: TransactionStatus,
    backend_key: Option<(u32, u32)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `ParameterStatus` report.
    ///
    /// Fails when the server reports an encoding other than UTF-8, which
    /// this engine can not operate under.
    pub(crate) fn update(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        trace!(name, value, "parameter status");
        match name {
            "client_encoding" => {
                if value != "UTF8" {
                    return Err(ConfigError::new(format!(
                        "the engine only works with UTF8 client encoding, server reports {value:?}",
                    )));
                }
            }
            "DateStyle" => self.iso_dates = value.starts_with("ISO,"),
            "IntervalStyle" => self.postgres_intervals = value == "postgres",
            "TimeZone" => self.timezone = resolve_offset(value),
            _ => {}
        }
        self.parameters.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    pub(crate) fn set_transaction_status(&mut self, status: TransactionStatus) {
        self.transaction_status = status;
    }

    pub(crate) fn set_backend_key(&mut self, process_id: u32, secret_key: u32) {
        self.backend_key = Some((process_id, secret_key));
    }

    /// All parameters reported by the server, latest value per name.
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Whether `DateStyle` selects ISO output.
    ///
    /// When it does not, textual date and time values are returned as raw
    /// text rather than parsed.
    pub fn iso_dates(&self) -> bool {
        self.iso_dates
    }

    /// Whether `IntervalStyle` is `postgres`, the only textual interval
    /// format the decoder understands.
    pub fn postgres_intervals(&self) -> bool {
        self.postgres_intervals
    }

    /// The session time zone as a fixed offset, when it resolves to one.
    pub fn timezone(&self) -> Option<UtcOffset> {
        self.timezone
    }

    /// Transaction status from the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Cancellation key captured at startup: (process id, secret key).
    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.backend_key
    }
}

/// Resolve a `TimeZone` value to a fixed UTC offset.
///
/// Only literal offset spellings and the UTC aliases resolve; named zones
/// would need a tz database, and without one binary `timestamptz` values
/// stay in UTC.
fn resolve_offset(value: &str) -> Option<UtcOffset> {
    match value {
        "UTC" | "GMT" | "Etc/UTC" | "Etc/GMT" | "Z" | "Zulu" | "UCT" | "Universal" => {
            return Some(UtcOffset::UTC);
        }
        _ => {}
    }

    let rest = value.strip_prefix(['+', '-'])?;
    let negative = value.starts_with('-');

    let mut parts = rest.splitn(3, ':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let seconds: i32 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };

    let mut total = hours * 3600 + minutes * 60 + seconds;
    if negative {
        total = -total;
    }
    UtcOffset::from_whole_seconds(total).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datestyle_toggles_iso_dates() {
        let mut session = Session::new();
        session.update("DateStyle", "ISO, MDY").unwrap();
        assert!(session.iso_dates());
        session.update("DateStyle", "German, DMY").unwrap();
        assert!(!session.iso_dates());
    }

    #[test]
    fn non_utf8_encoding_is_fatal() {
        let mut session = Session::new();
        assert!(session.update("client_encoding", "LATIN1").is_err());
        assert!(session.update("client_encoding", "UTF8").is_ok());
    }

    #[test]
    fn timezone_offsets_resolve() {
        assert_eq!(resolve_offset("UTC"), Some(UtcOffset::UTC));
        assert_eq!(
            resolve_offset("+02:00"),
            Some(UtcOffset::from_whole_seconds(7200).unwrap()),
        );
        assert_eq!(
            resolve_offset("-05:30"),
            Some(UtcOffset::from_whole_seconds(-19800).unwrap()),
        );
        assert_eq!(resolve_offset("Europe/Amsterdam"), None);
    }
}
