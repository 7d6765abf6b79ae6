//! Partitioner configuration.

use std::fmt;

use berth_hash::{Fnv1a64, Hasher64};
use tracing::warn;

/// Default partition count. Prime, so partition hashes spread well even
/// with weak key distributions.
pub const DEFAULT_PARTITION_COUNT: usize = 271;

/// Default number of replica owners per partition.
pub const DEFAULT_REPLICATION_FACTOR: usize = 1;

/// Default load factor.
pub const DEFAULT_LOAD_FACTOR: f64 = 1.25;

/// Default virtual nodes per member.
pub const DEFAULT_VNODES_PER_MEMBER: usize = 20;

/// Configuration for a [`Partitioner`](crate::Partitioner).
///
/// Invalid values do not fail construction: each field falls back to its
/// documented default (with a warning), so a partitioner is always usable.
pub struct Config {
    /// Number of partitions. Fixed for the lifetime of the ring; primes
    /// are recommended.
    pub partition_count: usize,
    /// Owners per partition (primary plus replicas).
    pub replication_factor: usize,
    /// Capacity multiplier: each member may own at most
    /// `ceil(partition_count / members * load_factor)` partition slots per
    /// replica position. Must be at least 1.0.
    pub load_factor: f64,
    /// Virtual nodes placed on the ring per member.
    pub vnodes_per_member: usize,
    /// Hash function for virtual nodes, partitions and keys.
    pub hasher: Box<dyn Hasher64 + Send + Sync>,
}

impl Config {
    /// Replace invalid fields with their documented defaults.
    pub(crate) fn sanitized(mut self) -> Self {
        if self.partition_count == 0 {
            warn!(
                default = DEFAULT_PARTITION_COUNT,
                "partition_count of 0 replaced with default"
            );
            self.partition_count = DEFAULT_PARTITION_COUNT;
        }
        if self.replication_factor == 0 {
            warn!(
                default = DEFAULT_REPLICATION_FACTOR,
                "replication_factor of 0 replaced with default"
            );
            self.replication_factor = DEFAULT_REPLICATION_FACTOR;
        }
        if !(self.load_factor >= 1.0) {
            warn!(
                load_factor = self.load_factor,
                default = DEFAULT_LOAD_FACTOR,
                "load_factor below 1.0 replaced with default"
            );
            self.load_factor = DEFAULT_LOAD_FACTOR;
        }
        if self.vnodes_per_member == 0 {
            warn!(
                default = DEFAULT_VNODES_PER_MEMBER,
                "vnodes_per_member of 0 replaced with default"
            );
            self.vnodes_per_member = DEFAULT_VNODES_PER_MEMBER;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            load_factor: DEFAULT_LOAD_FACTOR,
            vnodes_per_member: DEFAULT_VNODES_PER_MEMBER,
            hasher: Box::new(Fnv1a64),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("partition_count", &self.partition_count)
            .field("replication_factor", &self.replication_factor)
            .field("load_factor", &self.load_factor)
            .field("vnodes_per_member", &self.vnodes_per_member)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.partition_count, 271);
        assert_eq!(config.replication_factor, 1);
        assert_eq!(config.load_factor, 1.25);
        assert_eq!(config.vnodes_per_member, 20);
    }

    #[test]
    fn test_sanitized_replaces_invalid_fields() {
        let config = Config {
            partition_count: 0,
            replication_factor: 0,
            load_factor: 0.5,
            vnodes_per_member: 0,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(config.partition_count, DEFAULT_PARTITION_COUNT);
        assert_eq!(config.replication_factor, DEFAULT_REPLICATION_FACTOR);
        assert_eq!(config.load_factor, DEFAULT_LOAD_FACTOR);
        assert_eq!(config.vnodes_per_member, DEFAULT_VNODES_PER_MEMBER);
    }

    #[test]
    fn test_sanitized_replaces_nan_load() {
        let config = Config {
            load_factor: f64::NAN,
            ..Config::default()
        }
        .sanitized();
        assert_eq!(config.load_factor, DEFAULT_LOAD_FACTOR);
    }

    #[test]
    fn test_sanitized_keeps_valid_fields() {
        let config = Config {
            partition_count: 71,
            replication_factor: 3,
            load_factor: 1.5,
            vnodes_per_member: 40,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(config.partition_count, 71);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.load_factor, 1.5);
        assert_eq!(config.vnodes_per_member, 40);
    }
}
