//! Memory nodes
//!
//! A node is either a *value* node (an SSA value, a synthetic node for a
//! resolved constant GEP, or a sentinel) or an *object* node (one flattened
//! field of one allocation). Nodes live in an append-only arena and are
//! addressed by [`NodeId`].

use serde::{Deserialize, Serialize};

use crate::features::ir::ValueId;

/// Arena index of a node
pub type NodeId = u32;

/// Universal pointer value: may point anywhere
pub const UNIVERSAL_PTR: NodeId = 0;
/// Universal object: the target of the universal pointer
pub const UNIVERSAL_OBJ: NodeId = 1;
/// Null pointer value
pub const NULL_PTR: NodeId = 2;
/// Object pointed to by null
pub const NULL_OBJ: NodeId = 3;
/// Object standing for every constant integer
pub const CONSTANT_INT: NodeId = 4;

/// Number of reserved sentinel ids
pub const FIRST_USER_NODE: NodeId = 5;

#[inline]
pub const fn is_sentinel(id: NodeId) -> bool {
    id < FIRST_USER_NODE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Value,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub kind: NodeKind,
    /// Representative in the union-find forest (self when unmerged)
    pub merge_target: NodeId,
    /// IR value this node was created for
    pub value: Option<ValueId>,
    /// Flattened field offset within the allocation (objects only)
    pub offset: u32,
    pub is_union: bool,
    pub is_heap: bool,
}

impl MemoryNode {
    pub fn value(id: NodeId, value: Option<ValueId>) -> Self {
        Self {
            kind: NodeKind::Value,
            merge_target: id,
            value,
            offset: 0,
            is_union: false,
            is_heap: false,
        }
    }

    pub fn object(id: NodeId, value: Option<ValueId>, offset: u32, is_union: bool, is_heap: bool) -> Self {
        Self {
            kind: NodeKind::Object,
            merge_target: id,
            value,
            offset,
            is_union,
            is_heap,
        }
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        self.kind == NodeKind::Object
    }
}
