//! Bounded-load partitioned consistent hash ring.
//!
//! This crate assigns a fixed set of partitions to a dynamic membership.
//! Keys map to partitions by `hash(key) mod partition_count`; partitions
//! map to members through a virtual-node ring, with a per-member capacity
//! cap (`ceil(partitions / members * load_factor)`) enforced at assignment
//! time. Membership changes relocate only the minimum set of partitions
//! the ring geometry and the cap require.
//!
//! The hash function is injected through [`berth_hash::Hasher64`]; member
//! identity is abstracted behind the [`Member`] trait.

mod config;
mod error;
mod member;
mod partitioner;

pub use config::{
    Config, DEFAULT_LOAD_FACTOR, DEFAULT_PARTITION_COUNT, DEFAULT_REPLICATION_FACTOR,
    DEFAULT_VNODES_PER_MEMBER,
};
pub use error::PartitionError;
pub use member::{Member, MemberInfo};
pub use partitioner::Partitioner;
