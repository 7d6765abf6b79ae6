//! Weighted virtual-node consistent hash ring.
//!
//! This crate maps arbitrary keys to a dynamic set of weighted members with
//! minimum relocation when membership changes. Each member is expanded into
//! a weight-proportional number of virtual nodes on a 32-bit hash ring;
//! keys are served by the first virtual node clockwise from their hash.
//!
//! The sorted [`index::RingIndex`] underneath is shared with the
//! bounded-load partitioner crate, which runs the same walk on a 64-bit
//! position space.

pub mod index;

mod error;
mod ring;

pub use error::RingError;
pub use ring::{WeightedRing, DEFAULT_REPLICAS};
