// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier types.
//!
//! Error-store entries use generational `slotmap` keys so a stale handle to a
//! removed error is detected instead of aliasing a newer one. Graph elements
//! use dense indices assigned in construction order, which doubles as the
//! deterministic tie-breaker for nearest-element queries.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Key for an entry of the error store.
    pub struct ErrorKey;
}

/// Object id of a feature within its feature class.
pub type ObjectId = i64;

/// Identifier of a topology rule, unique within a rule catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u32);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

macro_rules! element_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

element_id!(
    /// Index of a node in a [`TopologyGraph`](crate::graph::TopologyGraph).
    NodeId
);
element_id!(
    /// Index of an edge in a [`TopologyGraph`](crate::graph::TopologyGraph).
    EdgeId
);
element_id!(
    /// Index of a face in a [`TopologyGraph`](crate::graph::TopologyGraph).
    FaceId
);

/// Discriminant for graph element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Node = 0,
    Edge = 1,
    Face = 2,
}

impl ElementKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "Node",
            ElementKind::Edge => "Edge",
            ElementKind::Face => "Face",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
