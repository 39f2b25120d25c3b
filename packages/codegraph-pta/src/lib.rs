/*
 * Codegraph PTA - Field-Sensitive Memory Model
 *
 * Feature-First Hexagonal Architecture:
 * - config/   : YAML-loadable model configuration
 * - errors    : Layered error types (IR → layout → model)
 * - features/ : ir (input contract) → points_to (layouts, arena, populator)
 *
 * The model is built once, single-threaded, and handed read-mostly to an
 * inclusion-based solver.
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Node constructors carry every flag
#![allow(clippy::type_complexity)] // Nested maps in layout records
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional
#![allow(clippy::upper_case_acronyms)] // GEP naming

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Model configuration (allocators, union prefix)
pub mod config;

/// Error types
pub mod errors;

/// Feature modules
pub mod features;

pub use config::{ConfigError, MemoryModelConfig};
pub use errors::{IrError, LayoutError, ModelError, PtaError, Result};
pub use features::ir::{IrBuilder, IrContext};
pub use features::points_to::{
    MemoryModel, MemoryModelQuery, NodeFactory, OffsetResolver, PointsToSet, StructAnalyzer,
};
