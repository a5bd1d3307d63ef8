//! Foundational low-level utilities shared across Pulse crates.
//!
//! Provides time parsing/expiry helpers, char-safe text truncation, and
//! lenient JSON/JSONL file readers used by transcript parsing, gateway
//! correlation, and cache expiry calculations.

pub mod json_io;
pub mod text;
pub mod time_utils;

pub use json_io::{read_json_opt, read_jsonl_values};
pub use text::{fmt_size, truncate_chars};
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix_ms, parse_timestamp};

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parse_timestamp_accepts_rfc3339_and_rejects_garbage() {
        let ts = parse_timestamp("2026-02-11T08:30:00.120Z").expect("timestamp");
        assert_eq!(ts.timestamp_millis() % 1_000, 120);
        assert!(parse_timestamp("not a timestamp").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn expiry_respects_ttl_window() {
        assert!(!is_expired_unix_ms(1_000, 10_000, 10_999));
        assert!(is_expired_unix_ms(1_000, 10_000, 11_000));
        assert!(is_expired_unix_ms(1_000, 10_000, 20_000));
    }

    #[test]
    fn jsonl_reader_skips_malformed_lines_and_missing_files() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("entries.jsonl");
        {
            let mut file = std::fs::File::create(&path).expect("create");
            writeln!(file, "{{\"a\":1}}").expect("write");
            writeln!(file, "not json").expect("write");
            writeln!(file).expect("write");
            writeln!(file, "{{\"a\":2}}").expect("write");
        }
        let values = read_jsonl_values(&path).expect("read");
        assert_eq!(values.len(), 2);

        let absent = read_jsonl_values(&tempdir.path().join("absent.jsonl")).expect("read");
        assert!(absent.is_empty());
    }
}
