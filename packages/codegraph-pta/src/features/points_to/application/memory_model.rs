//! Populated memory model
//!
//! Owns the struct layouts, the node arena and an empty points-to graph, and
//! is what a constraint solver receives.
//!
//! # Usage
//! ```text
//! use codegraph_pta::{MemoryModel, MemoryModelConfig, MemoryModelQuery};
//!
//! let mut model = MemoryModel::build(&ctx, &MemoryModelConfig::default())?;
//! let p = model.value_node_for(ptr)?.expect("modeled");
//! let field = model.object_node_for(global_field_gep)?;
//! ```

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::MemoryModelConfig;
use crate::errors::{ModelResult, Result};
use crate::features::ir::{IrContext, ValueId};
use crate::features::points_to::application::populator::{ModelPopulator, PopulationStats};
use crate::features::points_to::domain::allocator::HeapAllocation;
use crate::features::points_to::domain::node::NodeId;
use crate::features::points_to::domain::points_to_graph::PointsToGraph;
use crate::features::points_to::infrastructure::node_factory::NodeFactory;
use crate::features::points_to::infrastructure::offset_resolver::OffsetResolver;
use crate::features::points_to::infrastructure::sparse_bitmap::PointsToSet;
use crate::features::points_to::infrastructure::struct_analyzer::StructAnalyzer;
use crate::features::points_to::ports::MemoryModelQuery;

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub population: PopulationStats,
    pub struct_records: usize,
    pub max_struct_size: u32,
    pub duration_ms: f64,
}

#[derive(Serialize)]
pub struct MemoryModel<'ctx> {
    #[serde(skip)]
    ctx: &'ctx IrContext,
    #[serde(skip)]
    layouts: StructAnalyzer<'ctx>,
    nodes: NodeFactory,
    heap_allocations: Vec<HeapAllocation>,
    points_to: PointsToGraph,
    stats: ModelStats,
}

impl<'ctx> MemoryModel<'ctx> {
    /// Lay out every struct, then populate the arena in one pass
    pub fn build(ctx: &'ctx IrContext, config: &MemoryModelConfig) -> Result<Self> {
        let start = Instant::now();
        config.validate()?;

        let mut layouts = StructAnalyzer::with_union_prefix(ctx, config.union_name_prefix.clone());
        layouts.run()?;

        let mut nodes = NodeFactory::new();
        let allocators = config.allocator_table();
        let report = ModelPopulator::new(&mut layouts, &mut nodes, &allocators)
            .model_function_objects(config.model_function_objects)
            .populate()?;

        let stats = ModelStats {
            population: report.stats,
            struct_records: layouts.len(),
            max_struct_size: layouts.max_struct_size(),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            "MemoryModel: {} nodes, {} struct scopes, built in {:.2}ms",
            nodes.num_nodes(),
            stats.struct_records,
            stats.duration_ms
        );

        Ok(Self {
            ctx,
            layouts,
            nodes,
            heap_allocations: report.heap_allocations,
            points_to: PointsToGraph::new(),
            stats,
        })
    }

    pub fn ctx(&self) -> &'ctx IrContext {
        self.ctx
    }

    pub fn layouts(&self) -> &StructAnalyzer<'ctx> {
        &self.layouts
    }

    pub fn nodes(&self) -> &NodeFactory {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeFactory {
        &mut self.nodes
    }

    /// Offset resolver over this model's layouts
    pub fn resolver(&self) -> OffsetResolver<'_, 'ctx> {
        OffsetResolver::new(&self.layouts)
    }

    pub fn heap_allocations(&self) -> &[HeapAllocation] {
        &self.heap_allocations
    }

    pub fn heap_allocation_at(&self, site: ValueId) -> Option<&HeapAllocation> {
        self.heap_allocations.iter().find(|h| h.site == site)
    }

    pub fn points_to(&self) -> &PointsToGraph {
        &self.points_to
    }

    pub fn points_to_mut(&mut self) -> &mut PointsToGraph {
        &mut self.points_to
    }

    /// Points-to set of `n`'s representative
    pub fn points_to_set(&self, n: NodeId) -> ModelResult<Option<&PointsToSet>> {
        let rep = self.nodes.merge_target_readonly(n)?;
        Ok(self.points_to.get(rep))
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }
}

impl MemoryModelQuery for MemoryModel<'_> {
    fn value_node_for(&mut self, v: ValueId) -> ModelResult<Option<NodeId>> {
        let resolver = OffsetResolver::new(&self.layouts);
        self.nodes.value_node_for(&resolver, v)
    }

    fn object_node_for(&self, v: ValueId) -> ModelResult<Option<NodeId>> {
        self.nodes.object_node_for(&self.resolver(), v)
    }

    fn return_node_for(&self, func: ValueId) -> Option<NodeId> {
        self.nodes.return_node_for(func)
    }

    fn vararg_node_for(&self, func: ValueId) -> Option<NodeId> {
        self.nodes.vararg_node_for(func)
    }

    fn merge_node(&mut self, a: NodeId, b: NodeId) -> ModelResult<()> {
        self.nodes.merge_node(a, b)
    }

    fn merge_target(&mut self, n: NodeId) -> ModelResult<NodeId> {
        self.nodes.merge_target(n)
    }
}
