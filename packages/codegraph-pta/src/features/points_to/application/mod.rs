//! Application layer for the memory model
//!
//! - **ModelPopulator**: one pass creating every value, object and heap node
//! - **MemoryModel**: layouts + arena + empty points-to graph, handed to the
//!   solver through [`MemoryModelQuery`](crate::features::points_to::ports::MemoryModelQuery)

pub mod memory_model;
pub mod populator;

pub use memory_model::{MemoryModel, ModelStats};
pub use populator::{ModelPopulator, PopulationReport, PopulationStats};
