//! Archive naming shared by the packaging and dispatch sides.
//!
//! Every archive of a job shares one base name fixed when the job starts:
//! `transfer_<epoch_ms>`. A job that fits in a single part produces
//! `<base>.zip`; a split job produces `<base>.part001.zip`,
//! `<base>.part002.zip`, … so destinations can extract the whole set with
//! one glob.

use serde::{Deserialize, Serialize};

/// The per-job archive base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveName {
    base: String,
}

impl ArchiveName {
    /// Fixes the base name from a millisecond timestamp.
    pub fn at_epoch_ms(epoch_ms: i64) -> Self {
        Self {
            base: format!("transfer_{epoch_ms}"),
        }
    }

    /// Fixes the base name from the current wall clock.
    pub fn now() -> Self {
        Self::at_epoch_ms(chrono::Utc::now().timestamp_millis())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Filename for the single-archive path.
    pub fn single(&self) -> String {
        format!("{}.zip", self.base)
    }

    /// Filename for split part `index` (1-based, zero-padded to 3 digits).
    pub fn part(&self, index: u32) -> String {
        format!("{}.part{:03}.zip", self.base, index)
    }

    /// Filename for part `index` under either path.
    pub fn filename(&self, index: u32, needs_split: bool) -> String {
        if needs_split {
            self.part(index)
        } else {
            self.single()
        }
    }

    /// Shell glob matching every split part of this job.
    pub fn part_glob(&self) -> String {
        format!("{}.part*.zip", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_name() {
        let name = ArchiveName::at_epoch_ms(1717171717171);
        assert_eq!(name.single(), "transfer_1717171717171.zip");
    }

    #[test]
    fn part_names_are_zero_padded() {
        let name = ArchiveName::at_epoch_ms(99);
        assert_eq!(name.part(1), "transfer_99.part001.zip");
        assert_eq!(name.part(12), "transfer_99.part012.zip");
        assert_eq!(name.part(123), "transfer_99.part123.zip");
    }

    #[test]
    fn filename_follows_split_flag() {
        let name = ArchiveName::at_epoch_ms(7);
        assert_eq!(name.filename(1, false), "transfer_7.zip");
        assert_eq!(name.filename(1, true), "transfer_7.part001.zip");
    }

    #[test]
    fn glob_covers_parts() {
        let name = ArchiveName::at_epoch_ms(7);
        assert_eq!(name.part_glob(), "transfer_7.part*.zip");
    }

    #[test]
    fn now_uses_millis() {
        let name = ArchiveName::now();
        let digits = name.base().trim_start_matches("transfer_");
        assert!(digits.len() >= 13, "expected epoch millis, got {digits}");
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }
}
