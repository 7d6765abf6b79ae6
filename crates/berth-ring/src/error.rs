//! Error types for the weighted ring.

/// Errors that can occur during ring lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The ring has no virtual nodes, so there is nothing to map a key to.
    #[error("empty ring: no members to map the key to")]
    EmptyRing,
}
