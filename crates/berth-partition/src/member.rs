//! The member contract for partitioned rings.

use serde::{Deserialize, Serialize};

/// A participant in the partitioned ring.
///
/// Identity equality is by [`name`](Member::name); the name must be stable
/// and unique across the membership. [`weight`](Member::weight) is advisory
/// capacity information carried along with the member — it does not scale
/// the member's presence on the ring.
pub trait Member {
    /// Stable unique name.
    fn name(&self) -> &str;

    /// Advisory capacity weight. Defaults to 1.
    fn weight(&self) -> u32 {
        1
    }
}

impl Member for String {
    fn name(&self) -> &str {
        self
    }
}

impl Member for &str {
    fn name(&self) -> &str {
        self
    }
}

/// A plain name-and-weight member for callers without their own node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Stable unique name.
    pub name: String,
    /// Advisory capacity weight.
    pub weight: u32,
}

impl MemberInfo {
    /// A member with the default weight of 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1,
        }
    }

    /// A member with an explicit weight.
    pub fn with_weight(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

impl Member for MemberInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}
