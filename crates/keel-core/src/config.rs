//! Library configuration.

use std::time::Duration;

/// Default number of events between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 50;

/// Default time a save waits for its snapshot write before moving on.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default capacity of a store's live subscription channel.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1024;

/// Tuning for [`AggregateRepository`](crate::repository::AggregateRepository).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Number of events between snapshots. `0` disables snapshotting.
    pub snapshot_interval: u64,
    /// How long `save` waits for a snapshot write. A slower write keeps
    /// running in the background and the save returns.
    pub snapshot_timeout: Duration,
}

impl RepositoryConfig {
    /// Configuration with snapshotting turned off.
    #[must_use]
    pub const fn without_snapshots() -> Self {
        Self {
            snapshot_interval: 0,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
        }
    }

    /// Returns `true` when a save moving the stream from `old_version` to
    /// `new_version` crosses a snapshot boundary.
    ///
    /// Boundaries are counted in events, so with an interval of 10 the
    /// snapshot is taken once the 10th, 20th, ... event has been stored
    /// (versions 9, 19, ...), however many events a single save appends.
    #[must_use]
    pub fn crosses_snapshot_boundary(&self, old_version: i64, new_version: i64) -> bool {
        if self.snapshot_interval == 0 || new_version <= old_version {
            return false;
        }
        let interval = i64::try_from(self.snapshot_interval).unwrap_or(i64::MAX);
        (old_version + 1) / interval != (new_version + 1) / interval
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_crossed_when_event_count_reaches_interval() {
        let config = RepositoryConfig {
            snapshot_interval: 10,
            ..RepositoryConfig::default()
        };
        assert!(config.crosses_snapshot_boundary(8, 9));
        assert!(!config.crosses_snapshot_boundary(9, 10));
        assert!(config.crosses_snapshot_boundary(17, 21));
    }

    #[test]
    fn test_first_save_of_new_stream_counts_from_no_version() {
        let config = RepositoryConfig {
            snapshot_interval: 1,
            ..RepositoryConfig::default()
        };
        assert!(config.crosses_snapshot_boundary(-1, 0));
    }

    #[test]
    fn test_zero_interval_disables_snapshots() {
        let config = RepositoryConfig::without_snapshots();
        assert!(!config.crosses_snapshot_boundary(-1, 1_000));
    }
}
