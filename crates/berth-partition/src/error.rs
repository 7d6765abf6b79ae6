//! Error types for the partitioned ring.

/// Errors that can occur during partitioned-ring lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// The ring has no members, so keys and partitions have no owner.
    #[error("empty ring: no members have been added")]
    EmptyRing,

    /// A partition id at or beyond the configured partition count.
    #[error("partition {id} out of range (partition count {partition_count})")]
    InvalidPartition {
        /// The offending partition id.
        id: usize,
        /// The configured partition count.
        partition_count: usize,
    },
}
