//! Weighted virtual-node consistent hash ring.
//!
//! Each member is expanded into a weight-proportional number of virtual
//! nodes on a 32-bit ring; keys map to the first virtual node clockwise
//! from their hash. Weight changes add or remove only the delta virtual
//! nodes, so relocation is strictly bounded to the changed fraction.
//!
//! The ring is built for many readers and few writers: every public
//! operation takes `&self` and synchronizes on one internal RwLock.

use std::collections::HashMap;
use std::sync::RwLock;

use berth_hash::{Crc32Ieee, Hasher32};
use tracing::debug;

use crate::error::RingError;
use crate::index::RingIndex;

/// Virtual nodes per unit weight when none is specified.
pub const DEFAULT_REPLICAS: usize = 20;

/// A consistent hash ring whose members carry integer weights.
///
/// A member with weight `w` occupies `replicas * w` positions on the ring.
/// Virtual node `i` of member `name` is placed at
/// `hash(decimal(i) ++ name)`; this encoding determines ring layout and is
/// part of the ring's compatibility contract.
pub struct WeightedRing {
    hasher: Box<dyn Hasher32 + Send + Sync>,
    replicas: usize,
    state: RwLock<RingState>,
}

struct RingState {
    index: RingIndex<u32>,
    members: HashMap<String, u32>,
}

impl WeightedRing {
    /// Create a ring with the given virtual-node base and CRC32-IEEE
    /// hashing.
    ///
    /// A `replicas` of 0 substitutes [`DEFAULT_REPLICAS`].
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Box::new(Crc32Ieee))
    }

    /// Create a ring with a caller-supplied hash function.
    pub fn with_hasher(replicas: usize, hasher: Box<dyn Hasher32 + Send + Sync>) -> Self {
        let replicas = if replicas == 0 {
            DEFAULT_REPLICAS
        } else {
            replicas
        };
        Self {
            hasher,
            replicas,
            state: RwLock::new(RingState {
                index: RingIndex::new(),
                members: HashMap::new(),
            }),
        }
    }

    /// Virtual nodes per unit weight.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Add a member with the given weight. A member that is already present
    /// is left untouched.
    ///
    /// A weight of 0 yields a dormant member: it counts toward membership
    /// but owns no ring positions until its weight grows.
    pub fn add(&self, name: impl Into<String>, weight: u32) {
        let name = name.into();
        let mut state = self.state.write().expect("ring lock poisoned");
        if state.members.contains_key(&name) {
            return;
        }
        self.add_locked(&mut state, name, weight);
    }

    /// Remove a member and all of its virtual nodes. Unknown names are
    /// ignored.
    pub fn remove(&self, name: &str) {
        let mut state = self.state.write().expect("ring lock poisoned");
        self.remove_locked(&mut state, name);
    }

    /// Change a member's weight, adding or removing only the delta virtual
    /// nodes. Unknown names and unchanged weights are ignored.
    pub fn update_weight(&self, name: &str, weight: u32) {
        let mut state = self.state.write().expect("ring lock poisoned");
        self.update_weight_locked(&mut state, name, weight);
    }

    /// Replace the entire membership in one atomic step.
    ///
    /// Members absent from `members` are removed, members with a changed
    /// weight are updated, and new members are added. The observable result
    /// equals the composition of the individual operations.
    pub fn set(&self, members: &HashMap<String, u32>) {
        let mut state = self.state.write().expect("ring lock poisoned");

        let stale: Vec<String> = state
            .members
            .keys()
            .filter(|name| !members.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            self.remove_locked(&mut state, &name);
        }

        for (name, weight) in members {
            if state.members.contains_key(name) {
                self.update_weight_locked(&mut state, name, *weight);
            } else {
                self.add_locked(&mut state, name.clone(), *weight);
            }
        }
    }

    /// The member owning the first virtual node clockwise from the key's
    /// hash.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<String, RingError> {
        let state = self.state.read().expect("ring lock poisoned");
        let hash = self.hasher.sum32(key.as_ref());
        let i = state
            .index
            .bisect_wrapped(hash)
            .ok_or(RingError::EmptyRing)?;
        Ok(state.index.slot(i).preferred().to_string())
    }

    /// The two closest distinct members to the key.
    ///
    /// The second member is `None` when the ring has a single member.
    pub fn get_two(&self, key: impl AsRef<[u8]>) -> Result<(String, Option<String>), RingError> {
        let mut found = self.get_n(key, 2);
        if found.is_empty() {
            return Err(RingError::EmptyRing);
        }
        let first = found.remove(0);
        Ok((first, found.pop()))
    }

    /// The `n` closest distinct members to the key, clockwise.
    ///
    /// Returns fewer than `n` members when the ring has fewer distinct
    /// owners, and an empty vector on an empty ring.
    pub fn get_n(&self, key: impl AsRef<[u8]>, n: usize) -> Vec<String> {
        let state = self.state.read().expect("ring lock poisoned");
        let target = n.min(state.members.len());
        if target == 0 {
            return Vec::new();
        }
        let hash = self.hasher.sum32(key.as_ref());
        let Some(start) = state.index.bisect_wrapped(hash) else {
            // Members exist but all are dormant.
            return Vec::new();
        };

        let mut found = Vec::with_capacity(target);
        for owner in state.index.walk_from(start) {
            if !found.iter().any(|name| name == &owner.name) {
                found.push(owner.name.clone());
                if found.len() == target {
                    break;
                }
            }
        }
        found
    }

    /// Every member on the ring, ordered by distance from the key.
    ///
    /// The first element matches [`get`](Self::get); each subsequent element
    /// is the member `get` would have returned had those before it left the
    /// ring.
    pub fn ordered(&self, key: impl AsRef<[u8]>) -> Vec<String> {
        self.get_n(key, usize::MAX)
    }

    /// Alias for [`ordered`](Self::ordered).
    pub fn get_all(&self, key: impl AsRef<[u8]>) -> Vec<String> {
        self.ordered(key)
    }

    /// Names of all members, including dormant ones.
    pub fn members(&self) -> Vec<String> {
        let state = self.state.read().expect("ring lock poisoned");
        state.members.keys().cloned().collect()
    }

    /// The weight of a member, if present.
    pub fn weight_of(&self, name: &str) -> Option<u32> {
        let state = self.state.read().expect("ring lock poisoned");
        state.members.get(name).copied()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.state.read().expect("ring lock poisoned").members.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of occupied ring positions.
    pub fn vnode_count(&self) -> usize {
        self.state.read().expect("ring lock poisoned").index.len()
    }

    fn add_locked(&self, state: &mut RingState, name: String, weight: u32) {
        let count = self.vnodes_for(weight);
        for i in 0..count {
            let hash = self.hasher.sum32(vnode_key(&name, i).as_bytes());
            state.index.insert(hash, &name, count as u64);
        }
        debug!(member = %name, weight, vnodes = count, "added member to ring");
        state.members.insert(name, weight);
    }

    fn remove_locked(&self, state: &mut RingState, name: &str) {
        let Some(weight) = state.members.remove(name) else {
            return;
        };
        let count = self.vnodes_for(weight);
        for i in 0..count {
            let hash = self.hasher.sum32(vnode_key(name, i).as_bytes());
            state.index.remove(hash, name);
        }
        state.index.maybe_compact(self.replicas);
        debug!(member = %name, vnodes = count, "removed member from ring");
    }

    fn update_weight_locked(&self, state: &mut RingState, name: &str, weight: u32) {
        let Some(old_weight) = state.members.get(name).copied() else {
            return;
        };
        if old_weight == weight {
            return;
        }

        let old_count = self.vnodes_for(old_weight);
        let new_count = self.vnodes_for(weight);
        if new_count > old_count {
            for i in old_count..new_count {
                let hash = self.hasher.sum32(vnode_key(name, i).as_bytes());
                state.index.insert(hash, name, new_count as u64);
            }
        } else {
            for i in new_count..old_count {
                let hash = self.hasher.sum32(vnode_key(name, i).as_bytes());
                state.index.remove(hash, name);
            }
            state.index.maybe_compact(self.replicas);
        }
        // Surviving virtual nodes keep their slot preference in line with
        // the new weight.
        state.index.set_priority(name, new_count as u64);
        state.members.insert(name.to_string(), weight);
        debug!(member = %name, old_weight, weight, "updated member weight");
    }

    fn vnodes_for(&self, weight: u32) -> usize {
        self.replicas * weight as usize
    }
}

/// Ring-layout encoding of a member's `i`-th virtual node.
fn vnode_key(name: &str, i: usize) -> String {
    format!("{i}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(members: &[(&str, u32)]) -> WeightedRing {
        let ring = WeightedRing::new(20);
        for (name, weight) in members {
            ring.add(*name, *weight);
        }
        ring
    }

    #[test]
    fn test_empty_ring_get_fails() {
        let ring = WeightedRing::new(20);
        assert_eq!(ring.get("any"), Err(RingError::EmptyRing));
        assert_eq!(ring.get_two("any"), Err(RingError::EmptyRing));
        assert!(ring.get_n("any", 3).is_empty());
    }

    #[test]
    fn test_zero_replicas_substitutes_default() {
        let ring = WeightedRing::new(0);
        assert_eq!(ring.replicas(), DEFAULT_REPLICAS);
    }

    #[test]
    fn test_single_member_owns_everything() {
        let ring = ring_with(&[("solo", 1)]);
        for key in ["a", "b", "c", "anything at all"] {
            assert_eq!(ring.get(key).unwrap(), "solo");
        }
        assert_eq!(ring.get_two("k").unwrap(), ("solo".to_string(), None));
    }

    #[test]
    fn test_vnode_count_scales_with_weight() {
        let ring = ring_with(&[("a", 1), ("b", 3)]);
        assert_eq!(ring.vnode_count(), 20 + 60);
    }

    #[test]
    fn test_heavy_member_attracts_key() {
        let ring = ring_with(&[("Host1", 1), ("Host2", 100), ("Host3", 1)]);
        assert_eq!(ring.get("uri12").unwrap(), "Host2");
    }

    #[test]
    fn test_weight_update_moves_key_to_grown_member() {
        let ring = ring_with(&[("Host1", 1), ("Host2", 100), ("Host3", 1)]);
        ring.update_weight("Host1", 1000);
        assert_eq!(ring.get("uri12").unwrap(), "Host1");
    }

    #[test]
    fn test_weight_growth_only_migrates_toward_grown_member() {
        let ring = ring_with(&[("a", 1), ("b", 1), ("c", 1)]);

        let keys: Vec<String> = (0..500).map(|i| format!("key-{i}")).collect();
        let before: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap()).collect();

        ring.update_weight("b", 4);

        for (key, old_owner) in keys.iter().zip(&before) {
            let new_owner = ring.get(key).unwrap();
            if new_owner != *old_owner {
                assert_eq!(
                    new_owner, "b",
                    "key {key} moved to {new_owner}, not the grown member"
                );
            }
        }
    }

    #[test]
    fn test_weight_shrink_keeps_prefix_vnodes() {
        let ring = ring_with(&[("a", 2), ("b", 2)]);
        ring.update_weight("a", 1);
        assert_eq!(ring.vnode_count(), 20 + 40);
        assert_eq!(ring.weight_of("a"), Some(1));
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let ring = ring_with(&[("a", 1)]);
        ring.add("a", 50);
        assert_eq!(ring.weight_of("a"), Some(1));
        assert_eq!(ring.vnode_count(), 20);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let ring = ring_with(&[("a", 1)]);
        ring.remove("ghost");
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_update_weight_unknown_is_noop() {
        let ring = ring_with(&[("a", 1)]);
        ring.update_weight("ghost", 2);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.vnode_count(), 20);
    }

    #[test]
    fn test_dormant_member_owns_no_keys() {
        let ring = ring_with(&[("big", 1)]);
        // Zero weight: member joins but places no vnodes.
        ring.add("tiny", 0);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.vnode_count(), 20);
        assert_eq!(ring.get("k").unwrap(), "big");
        // get_n can only return members that are actually on the ring.
        assert_eq!(ring.get_n("k", 2), vec!["big".to_string()]);
    }

    #[test]
    fn test_get_n_distinct_and_bounded() {
        let ring = ring_with(&[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
        for key in ["one", "two", "three"] {
            let found = ring.get_n(key, 3);
            assert_eq!(found.len(), 3);
            let mut unique = found.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 3, "duplicates for key {key}");
        }
        // n larger than membership returns everyone.
        assert_eq!(ring.get_n("one", 99).len(), 4);
    }

    #[test]
    fn test_ordered_starts_with_get() {
        let ring = ring_with(&[("a", 1), ("b", 1), ("c", 1)]);
        for key in ["x", "y", "z"] {
            let ordered = ring.ordered(key);
            assert_eq!(ordered.len(), 3);
            assert_eq!(ordered[0], ring.get(key).unwrap());
        }
    }

    #[test]
    fn test_ordered_is_removal_order() {
        let ring = ring_with(&[("a", 1), ("b", 1), ("c", 1)]);
        let ordered = ring.ordered("probe");

        // Removing the closest member promotes the next in `ordered`.
        ring.remove(&ordered[0]);
        assert_eq!(ring.get("probe").unwrap(), ordered[1]);
        ring.remove(&ordered[1]);
        assert_eq!(ring.get("probe").unwrap(), ordered[2]);
    }

    #[test]
    fn test_set_applies_delta() {
        let ring = ring_with(&[("a", 1), ("b", 2), ("c", 1)]);

        let next: HashMap<String, u32> = [("b".to_string(), 3), ("d".to_string(), 1)]
            .into_iter()
            .collect();
        ring.set(&next);

        let mut members = ring.members();
        members.sort();
        assert_eq!(members, vec!["b".to_string(), "d".to_string()]);
        assert_eq!(ring.weight_of("b"), Some(3));
        assert_eq!(ring.vnode_count(), 60 + 20);
    }

    #[test]
    fn test_set_is_idempotent() {
        let ring = ring_with(&[("a", 1), ("b", 2)]);
        let members: HashMap<String, u32> = [("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();

        ring.set(&members);
        let owner_before: Vec<String> = (0..50)
            .map(|i| ring.get(format!("k{i}")).unwrap())
            .collect();

        ring.set(&members);
        let owner_after: Vec<String> = (0..50)
            .map(|i| ring.get(format!("k{i}")).unwrap())
            .collect();

        assert_eq!(owner_before, owner_after);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_set_empty_clears_ring() {
        let ring = ring_with(&[("a", 1), ("b", 1)]);
        ring.set(&HashMap::new());
        assert!(ring.is_empty());
        assert_eq!(ring.vnode_count(), 0);
        assert_eq!(ring.get("k"), Err(RingError::EmptyRing));
    }

    #[test]
    fn test_remove_then_readd_restores_mapping() {
        let ring = ring_with(&[("a", 1), ("b", 1), ("c", 1)]);
        let before: Vec<String> = (0..100)
            .map(|i| ring.get(format!("k{i}")).unwrap())
            .collect();

        ring.remove("b");
        ring.add("b", 1);

        let after: Vec<String> = (0..100)
            .map(|i| ring.get(format!("k{i}")).unwrap())
            .collect();
        assert_eq!(before, after, "remove + re-add must restore the layout");
    }

    #[test]
    fn test_fnv_hasher_changes_layout_not_behavior() {
        use berth_hash::Fnv1a32;

        let ring = WeightedRing::with_hasher(20, Box::new(Fnv1a32));
        ring.add("a", 1);
        ring.add("b", 1);

        let owner = ring.get("stable-key").unwrap();
        assert_eq!(ring.get("stable-key").unwrap(), owner);
        assert_eq!(ring.get_n("stable-key", 2).len(), 2);
    }
}
