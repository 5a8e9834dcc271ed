//! Parsing of rclone's `--progress --stats 1s` output.
//!
//! With those flags the tool redraws lines like
//!
//! ```text
//! Transferred:   512.000 MiB / 1.000 GiB, 50%, 42.5 MiB/s, ETA 12s
//! ```
//!
//! interleaved with carriage returns and escape sequences. The parser
//! scans each chunk for the last percentage and speed token it contains;
//! chunks without either are no-ops.

use regex::Regex;

/// Extracts `(percent, speed)` pairs from streamed CLI output.
pub struct ProgressParser {
    percent_re: Regex,
    speed_re: Regex,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            percent_re: Regex::new(r"(\d{1,3})%").unwrap(),
            speed_re: Regex::new(r"(\d+(?:\.\d+)?\s*(?:[KMGTP]i?)?B(?:yte)?s?)/s").unwrap(),
        }
    }

    /// Parses one output chunk.
    ///
    /// Returns the last percentage in the chunk (clamped to 100) and the
    /// last speed token, when present. `None` when the chunk carries no
    /// percentage at all.
    pub fn parse_chunk(&self, chunk: &str) -> Option<(u8, Option<String>)> {
        let percent = self
            .percent_re
            .captures_iter(chunk)
            .last()
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .map(|p| p.min(100) as u8)?;

        let speed = self
            .speed_re
            .captures_iter(chunk)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());

        Some((percent, speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stats_line() {
        let parser = ProgressParser::new();
        let chunk = "Transferred:   512.000 MiB / 1.000 GiB, 50%, 42.5 MiB/s, ETA 12s";
        let (percent, speed) = parser.parse_chunk(chunk).unwrap();
        assert_eq!(percent, 50);
        assert_eq!(speed.as_deref(), Some("42.5 MiB"));
    }

    #[test]
    fn takes_last_percent_in_chunk() {
        let parser = ProgressParser::new();
        let chunk = "Transferred: 10%, 1.0 MiB/s\rTransferred: 25%, 2.0 MiB/s";
        let (percent, speed) = parser.parse_chunk(chunk).unwrap();
        assert_eq!(percent, 25);
        assert_eq!(speed.as_deref(), Some("2.0 MiB"));
    }

    #[test]
    fn chunk_without_percent_is_noop() {
        let parser = ProgressParser::new();
        assert!(parser.parse_chunk("Checking access...").is_none());
        assert!(parser.parse_chunk("").is_none());
    }

    #[test]
    fn percent_without_speed() {
        let parser = ProgressParser::new();
        let (percent, speed) = parser.parse_chunk(" 73% done").unwrap();
        assert_eq!(percent, 73);
        assert!(speed.is_none());
    }

    #[test]
    fn overlong_percent_clamps() {
        let parser = ProgressParser::new();
        let (percent, _) = parser.parse_chunk("999%").unwrap();
        assert_eq!(percent, 100);
    }

    #[test]
    fn plain_bytes_speed() {
        let parser = ProgressParser::new();
        let (_, speed) = parser.parse_chunk("12%, 903 B/s").unwrap();
        assert_eq!(speed.as_deref(), Some("903 B"));
    }
}
