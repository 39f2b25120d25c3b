//! Ports (Interfaces) for the Memory Model
//!
//! - [`AllocatorLookup`]: which call targets allocate heap memory
//! - [`MemoryModelQuery`]: what a constraint solver asks of a populated model
//!
//! Solvers depend on the query trait, not on [`MemoryModel`] itself.
//!
//! [`MemoryModel`]: crate::features::points_to::application::memory_model::MemoryModel

use crate::errors::ModelResult;
use crate::features::ir::ValueId;
use crate::features::points_to::domain::allocator::AllocatorSpec;
use crate::features::points_to::domain::node::NodeId;

// ============================================================================
// Allocator Lookup
// ============================================================================

/// Name-keyed allocator registry
pub trait AllocatorLookup {
    fn allocator(&self, name: &str) -> Option<&AllocatorSpec>;

    fn is_allocator(&self, name: &str) -> bool {
        self.allocator(name).is_some()
    }
}

// ============================================================================
// Model Query
// ============================================================================

/// Lookup surface of a populated memory model
///
/// # Example (Generic - Zero-cost)
/// ```ignore
/// fn may_point_to_field<M: MemoryModelQuery>(model: &mut M, p: ValueId, obj: ValueId) -> bool {
///     let (Ok(Some(_)), Ok(Some(_))) = (model.value_node_for(p), model.object_node_for(obj)) else {
///         return false;
///     };
///     true
/// }
/// ```
pub trait MemoryModelQuery {
    /// Value node of `v`; constants always resolve
    fn value_node_for(&mut self, v: ValueId) -> ModelResult<Option<NodeId>>;

    /// Object node (field 0, or the addressed field for constant GEPs) of `v`
    fn object_node_for(&self, v: ValueId) -> ModelResult<Option<NodeId>>;

    fn return_node_for(&self, func: ValueId) -> Option<NodeId>;

    fn vararg_node_for(&self, func: ValueId) -> Option<NodeId>;

    /// Merge `b` into `a`
    fn merge_node(&mut self, a: NodeId, b: NodeId) -> ModelResult<()>;

    /// Current representative of `n`
    fn merge_target(&mut self, n: NodeId) -> ModelResult<NodeId>;
}
