//! Infrastructure layer for the memory model
//!
//! - **StructAnalyzer**: Pearce-style struct flattening with container edges
//! - **OffsetResolver**: byte offset → flattened field index
//! - **NodeFactory**: contiguous node arena with union-find merging
//! - **PointsToSet**: 128-bit block sparse bitmap

pub mod node_factory;
pub mod offset_resolver;
pub mod sparse_bitmap;
pub mod struct_analyzer;

pub use node_factory::NodeFactory;
pub use offset_resolver::{OffsetResolver, ResolvedField};
pub use sparse_bitmap::PointsToSet;
pub use struct_analyzer::{is_anonymous, scope_name, StructAnalyzer};
