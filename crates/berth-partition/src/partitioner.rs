//! Bounded-load partition assignment over a virtual-node ring.
//!
//! A fixed number of partitions are placed on a 64-bit hash ring of virtual
//! nodes. Each partition is owned by the member whose virtual node is first
//! clockwise from the partition's hash, subject to a per-member capacity
//! cap; replica owners continue clockwise under per-position caps. The
//! whole assignment is recomputed synchronously inside every membership
//! mutation, so readers never observe a partially distributed table.

use std::collections::HashMap;
use std::sync::RwLock;

use berth_hash::Hasher64;
use berth_ring::index::RingIndex;
use tracing::debug;

use crate::config::Config;
use crate::error::PartitionError;
use crate::member::Member;

/// A bounded-load partitioned consistent hash ring.
///
/// Reads take the shared side of one internal RwLock; mutations take the
/// exclusive side and redistribute partitions before releasing it. The
/// assignment is a pure function of the membership, the configuration and
/// the hash function, so two instances fed the same members agree on every
/// partition owner.
pub struct Partitioner<M> {
    hasher: Box<dyn Hasher64 + Send + Sync>,
    partition_count: usize,
    replication_factor: usize,
    load_factor: f64,
    vnodes_per_member: usize,
    state: RwLock<TableState<M>>,
}

struct TableState<M> {
    members: HashMap<String, M>,
    index: RingIndex<u64>,
    /// Owner names per partition, primary first; `min(R, members)` entries
    /// each, or empty lists when the ring has no members.
    partitions: Vec<Vec<String>>,
    /// Slot counts per replica position, keyed by member name.
    loads: Vec<HashMap<String, usize>>,
}

impl<M: Member + Clone> Partitioner<M> {
    /// Create a partitioner from an initial member set.
    ///
    /// Invalid configuration fields fall back to their defaults (see
    /// [`Config`]); duplicate member names keep the first occurrence.
    pub fn new(members: impl IntoIterator<Item = M>, config: Config) -> Self {
        let config = config.sanitized();
        let partitioner = Self {
            hasher: config.hasher,
            partition_count: config.partition_count,
            replication_factor: config.replication_factor,
            load_factor: config.load_factor,
            vnodes_per_member: config.vnodes_per_member,
            state: RwLock::new(TableState {
                members: HashMap::new(),
                index: RingIndex::new(),
                partitions: vec![Vec::new(); config.partition_count],
                loads: Vec::new(),
            }),
        };

        {
            let mut state = partitioner
                .state
                .write()
                .expect("partitioner lock poisoned");
            for member in members {
                partitioner.place_member(&mut state, member);
            }
            partitioner.distribute(&mut state);
        }
        partitioner
    }

    /// The configured partition count.
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// The configured replication factor.
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Add a member and redistribute. Adding an existing name is a silent
    /// no-op.
    pub fn add(&self, member: M) {
        let mut state = self.state.write().expect("partitioner lock poisoned");
        if state.members.contains_key(member.name()) {
            return;
        }
        let name = member.name().to_string();
        self.place_member(&mut state, member);
        self.distribute(&mut state);
        debug!(member = %name, "added member to partitioned ring");
    }

    /// Remove a member and redistribute. Removing an unknown name is a
    /// silent no-op.
    pub fn remove(&self, name: &str) {
        let mut state = self.state.write().expect("partitioner lock poisoned");
        if state.members.remove(name).is_none() {
            return;
        }
        for i in 0..self.vnodes_per_member {
            let position = self.hasher.sum64(vnode_key(name, i).as_bytes());
            state.index.remove(position, name);
        }
        state.index.maybe_compact(self.vnodes_per_member);
        self.distribute(&mut state);
        debug!(member = %name, "removed member from partitioned ring");
    }

    /// The primary owner of the partition the key hashes into.
    pub fn locate_key(&self, key: impl AsRef<[u8]>) -> Result<M, PartitionError> {
        let state = self.state.read().expect("partitioner lock poisoned");
        if state.members.is_empty() {
            return Err(PartitionError::EmptyRing);
        }
        let id = self.partition_for(key.as_ref());
        Ok(Self::owner_of(&state, id))
    }

    /// All owners of the partition the key hashes into, primary first.
    pub fn locate_replicas(&self, key: impl AsRef<[u8]>) -> Result<Vec<M>, PartitionError> {
        let state = self.state.read().expect("partitioner lock poisoned");
        if state.members.is_empty() {
            return Err(PartitionError::EmptyRing);
        }
        let id = self.partition_for(key.as_ref());
        Ok(Self::owners_of(&state, id))
    }

    /// The primary owner of a partition.
    pub fn partition_owner(&self, id: usize) -> Result<M, PartitionError> {
        let state = self.state.read().expect("partitioner lock poisoned");
        self.check_partition(id)?;
        if state.members.is_empty() {
            return Err(PartitionError::EmptyRing);
        }
        Ok(Self::owner_of(&state, id))
    }

    /// All owners of a partition, primary first.
    pub fn partition_replicas(&self, id: usize) -> Result<Vec<M>, PartitionError> {
        let state = self.state.read().expect("partitioner lock poisoned");
        self.check_partition(id)?;
        if state.members.is_empty() {
            return Err(PartitionError::EmptyRing);
        }
        Ok(Self::owners_of(&state, id))
    }

    /// The `n` members closest to the key's partition on the raw ring.
    ///
    /// This is a lookup, not an allocation: the walk starts at the
    /// partition's hash position and ignores the load cap, so the first
    /// entry can differ from [`locate_key`](Self::locate_key) when the cap
    /// displaced the partition's primary. Returns `min(n, members)`
    /// distinct members; an empty ring yields an empty vector.
    pub fn closest_n(&self, key: impl AsRef<[u8]>, n: usize) -> Vec<M> {
        let state = self.state.read().expect("partitioner lock poisoned");
        let target = n.min(state.members.len());
        if target == 0 {
            return Vec::new();
        }
        let id = self.partition_for(key.as_ref());
        let position = self.hasher.sum64(&(id as u64).to_le_bytes());
        let Some(start) = state.index.bisect_wrapped(position) else {
            return Vec::new();
        };

        let mut names: Vec<&str> = Vec::with_capacity(target);
        for owner in state.index.walk_from(start) {
            if !names.contains(&owner.name.as_str()) {
                names.push(&owner.name);
                if names.len() == target {
                    break;
                }
            }
        }
        names
            .into_iter()
            .map(|name| state.members[name].clone())
            .collect()
    }

    /// The partition a key hashes into: `hash(key) mod partition_count`.
    pub fn partition_id(&self, key: impl AsRef<[u8]>) -> usize {
        self.partition_for(key.as_ref())
    }

    /// The per-member capacity cap, `ceil(partitions / members * load)`.
    ///
    /// Returns `0.0` on an empty ring.
    pub fn average_load(&self) -> f64 {
        let state = self.state.read().expect("partitioner lock poisoned");
        if state.members.is_empty() {
            return 0.0;
        }
        self.capacity(state.members.len()) as f64
    }

    /// Partition slots held by each member, aggregated across replica
    /// positions. The counts sum to `partition_count * min(R, members)`.
    pub fn load_distribution(&self) -> HashMap<String, usize> {
        let state = self.state.read().expect("partitioner lock poisoned");
        let mut totals: HashMap<String, usize> = HashMap::new();
        for position_loads in &state.loads {
            for (name, count) in position_loads {
                *totals.entry(name.clone()).or_insert(0) += count;
            }
        }
        totals
    }

    /// All members, in no particular order.
    pub fn members(&self) -> Vec<M> {
        let state = self.state.read().expect("partitioner lock poisoned");
        state.members.values().cloned().collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .expect("partitioner lock poisoned")
            .members
            .len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a member's virtual nodes without redistributing.
    fn place_member(&self, state: &mut TableState<M>, member: M) {
        let name = member.name().to_string();
        if state.members.contains_key(&name) {
            return;
        }
        for i in 0..self.vnodes_per_member {
            let position = self.hasher.sum64(vnode_key(&name, i).as_bytes());
            // Priority 0 for everyone: collision slots order lexicographically.
            state.index.insert(position, &name, 0);
        }
        state.members.insert(name, member);
    }

    /// Recompute the whole partition table and load counters.
    fn distribute(&self, state: &mut TableState<M>) {
        let member_count = state.members.len();
        let TableState {
            index, partitions, loads, ..
        } = state;

        // A memberless (and thus vnode-less) ring has nothing to assign;
        // leave the table fully cleared rather than partially stale.
        if member_count == 0 || index.is_empty() {
            partitions.iter_mut().for_each(Vec::clear);
            loads.clear();
            return;
        }

        let cap = self.capacity(member_count);
        let target = self.replication_factor.min(member_count);
        *loads = vec![HashMap::new(); target];

        for (id, owners) in partitions.iter_mut().enumerate() {
            owners.clear();
            let position = self.hasher.sum64(&(id as u64).to_le_bytes());
            // The index is non-empty, so the bisect always lands somewhere.
            let start = index.bisect_wrapped(position).unwrap_or(0);

            // First pass honors the cap at each replica position.
            for candidate in index.walk_from(start) {
                if owners.len() == target {
                    break;
                }
                if owners.iter().any(|o| *o == candidate.name) {
                    continue;
                }
                let load = loads[owners.len()]
                    .get(&candidate.name)
                    .copied()
                    .unwrap_or(0);
                if load + 1 <= cap {
                    *loads[owners.len()]
                        .entry(candidate.name.clone())
                        .or_insert(0) += 1;
                    owners.push(candidate.name.clone());
                }
            }

            // Capacity can run dry at deep replica positions (never for the
            // primary: cap * members >= partitions). Coverage outranks the
            // cap, so fill the remainder unconditionally.
            if owners.len() < target {
                for candidate in index.walk_from(start) {
                    if owners.len() == target {
                        break;
                    }
                    if owners.iter().any(|o| *o == candidate.name) {
                        continue;
                    }
                    *loads[owners.len()]
                        .entry(candidate.name.clone())
                        .or_insert(0) += 1;
                    owners.push(candidate.name.clone());
                }
            }
        }
        debug!(
            members = member_count,
            partitions = self.partition_count,
            replicas = target,
            cap,
            "redistributed partitions"
        );
    }

    fn capacity(&self, member_count: usize) -> usize {
        let average = self.partition_count as f64 / member_count as f64;
        (average * self.load_factor).ceil() as usize
    }

    fn partition_for(&self, key: &[u8]) -> usize {
        (self.hasher.sum64(key) % self.partition_count as u64) as usize
    }

    fn check_partition(&self, id: usize) -> Result<(), PartitionError> {
        if id < self.partition_count {
            Ok(())
        } else {
            Err(PartitionError::InvalidPartition {
                id,
                partition_count: self.partition_count,
            })
        }
    }

    fn owner_of(state: &TableState<M>, id: usize) -> M {
        let name = &state.partitions[id][0];
        state.members[name.as_str()].clone()
    }

    fn owners_of(state: &TableState<M>, id: usize) -> Vec<M> {
        state.partitions[id]
            .iter()
            .map(|name| state.members[name.as_str()].clone())
            .collect()
    }
}

/// Ring-layout encoding of a member's `i`-th virtual node.
fn vnode_key(name: &str, i: usize) -> String {
    format!("{name}{i}")
}
