//! Sorted ring index: the single source of truth for virtual-node placement.
//!
//! The index keeps every virtual-node position in a strictly ascending
//! vector of slots and answers "first slot at or after position `p`" by
//! binary search. Both ring models sit on top of it: the weighted ring on a
//! 32-bit position space, the partitioner on a 64-bit one.
//!
//! Distinct members whose virtual nodes collide on the same position share
//! a slot. Slot owners are kept ordered by `(priority desc, name asc)`, so
//! the first owner is the slot's preferred owner and ties between
//! equal-priority members break lexicographically.

use std::fmt;

/// An unsigned position on the hash ring.
pub trait Position: Copy + Ord + fmt::Debug {}

impl Position for u32 {}
impl Position for u64 {}

/// A member's claim on a ring slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOwner {
    /// Member name.
    pub name: String,
    /// Slot preference: higher wins, ties break by name ascending.
    pub priority: u64,
}

/// A single position on the ring and the members that hash to it.
#[derive(Debug, Clone)]
pub struct Slot<P> {
    /// Ring position of this slot.
    pub position: P,
    /// Owners in preference order; never empty.
    pub owners: Vec<SlotOwner>,
}

impl<P> Slot<P> {
    /// The slot's preferred owner.
    pub fn preferred(&self) -> &str {
        &self.owners[0].name
    }
}

/// Sorted sequence of ring slots with binary-search lookup.
#[derive(Debug, Clone, Default)]
pub struct RingIndex<P> {
    slots: Vec<Slot<P>>,
}

impl<P: Position> RingIndex<P> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Number of occupied positions (not owner entries).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the index holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot at sorted index `i`.
    pub fn slot(&self, i: usize) -> &Slot<P> {
        &self.slots[i]
    }

    /// Insert an owner at `position`.
    ///
    /// If the position is already occupied the owner joins the slot in
    /// preference order; a previous entry with the same name is replaced.
    pub fn insert(&mut self, position: P, name: &str, priority: u64) {
        let owner = SlotOwner {
            name: name.to_string(),
            priority,
        };
        match self.slots.binary_search_by(|s| s.position.cmp(&position)) {
            Ok(i) => {
                let owners = &mut self.slots[i].owners;
                owners.retain(|o| o.name != owner.name);
                let at = owners
                    .iter()
                    .position(|o| ranks_before(&owner, o))
                    .unwrap_or(owners.len());
                owners.insert(at, owner);
            }
            Err(i) => self.slots.insert(
                i,
                Slot {
                    position,
                    owners: vec![owner],
                },
            ),
        }
    }

    /// Remove the named owner from `position`.
    ///
    /// The slot itself is dropped once its owner list empties. Unknown
    /// positions and names are ignored.
    pub fn remove(&mut self, position: P, name: &str) {
        if let Ok(i) = self.slots.binary_search_by(|s| s.position.cmp(&position)) {
            let slot = &mut self.slots[i];
            slot.owners.retain(|o| o.name != name);
            if slot.owners.is_empty() {
                self.slots.remove(i);
            }
        }
    }

    /// Index of the first slot with `slot.position >= position`, or `None`
    /// when every slot is below `position`.
    pub fn bisect(&self, position: P) -> Option<usize> {
        let i = self.slots.partition_point(|s| s.position < position);
        (i < self.slots.len()).then_some(i)
    }

    /// Like [`bisect`](Self::bisect), but wraps past the highest position
    /// back to slot 0. Returns `None` only when the index is empty.
    pub fn bisect_wrapped(&self, position: P) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        Some(self.bisect(position).unwrap_or(0))
    }

    /// Visit every owner entry clockwise, starting at slot `start` and
    /// wrapping around. Each slot's owners appear in preference order; the
    /// walk covers exactly one lap.
    pub fn walk_from(&self, start: usize) -> impl Iterator<Item = &SlotOwner> {
        let (before, after) = self.slots.split_at(start.min(self.slots.len()));
        after
            .iter()
            .chain(before.iter())
            .flat_map(|slot| slot.owners.iter())
    }

    /// Re-rank every slot entry belonging to `name` with a new priority.
    ///
    /// Only slot-internal ordering changes; positions stay put.
    pub fn set_priority(&mut self, name: &str, priority: u64) {
        for slot in &mut self.slots {
            if let Some(i) = slot.owners.iter().position(|o| o.name == name) {
                let mut owner = slot.owners.remove(i);
                owner.priority = priority;
                let at = slot
                    .owners
                    .iter()
                    .position(|o| ranks_before(&owner, o))
                    .unwrap_or(slot.owners.len());
                slot.owners.insert(at, owner);
            }
        }
    }

    /// Reclaim slack after bulk removals.
    ///
    /// The slot vector is reallocated once its reserved capacity exceeds
    /// four times the per-member replica count times the live slot count,
    /// so a ring that shrank dramatically does not pin its peak footprint.
    pub fn maybe_compact(&mut self, replicas: usize) {
        let threshold = replicas.max(1) * 4;
        if self.slots.capacity() / threshold > self.slots.len() {
            self.slots.shrink_to_fit();
        }
    }
}

/// True if `a` should appear before `b` in a slot's owner list.
fn ranks_before(a: &SlotOwner, b: &SlotOwner) -> bool {
    if a.priority == b.priority {
        a.name < b.name
    } else {
        a.priority > b.priority
    }
}
