//! Domain models for the memory model
//!
//! Plain data, independent of how the model is populated:
//! - MemoryNode: one value or one flattened object field
//! - FieldRecord: flattened layout of one struct scope name
//! - AllocatorSpec / HeapAllocation: heap allocation functions and sites
//! - PointsToGraph: representative node → object set

pub mod allocator;
pub mod field_record;
pub mod node;
pub mod points_to_graph;

pub use allocator::{AllocatorSpec, AllocatorTable, HeapAllocation};
pub use field_record::{ContainerEdge, FieldRecord};
pub use node::{MemoryNode, NodeId, NodeKind};
pub use points_to_graph::{GraphStats, PointsToGraph};
