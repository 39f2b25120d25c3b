//! Model population
//!
//! One pass over every module, run after every struct layout is known:
//! 1. globals: a value node plus object nodes for the pointee
//! 2. functions: return, vararg, argument and function value nodes
//! 3. bodies: a value node per instruction, object nodes for `alloca`, heap
//!    object nodes for allocator calls
//!
//! Object nodes for one allocation are created back to back so that field
//! `i` of an allocation starting at `b` is node `b + i`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{IrError, ModelError, ModelResult};
use crate::features::ir::{CastKind, InstOp, IrContext, Type, TypeId, ValueId, ValueKind};
use crate::features::points_to::domain::allocator::{AllocatorSpec, HeapAllocation};
use crate::features::points_to::domain::node::{NodeId, NULL_OBJ, UNIVERSAL_OBJ};
use crate::features::points_to::infrastructure::node_factory::NodeFactory;
use crate::features::points_to::infrastructure::struct_analyzer::StructAnalyzer;
use crate::features::points_to::ports::AllocatorLookup;

/// Population statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationStats {
    pub modules: usize,
    pub value_nodes: usize,
    pub object_nodes: usize,
    pub heap_nodes: usize,
    pub heap_allocations: usize,
    /// Heap allocations whose element type could not be determined
    pub unknown_heap_types: usize,
    pub return_nodes: usize,
    pub vararg_nodes: usize,
    pub function_objects: usize,
    /// Objects mapped onto the universal or null object instead of new nodes
    pub sentinel_aliases: usize,
    pub skipped_declarations: usize,
    pub skipped_allocator_bodies: usize,
}

/// Output of a population run besides the arena itself
#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationReport {
    pub stats: PopulationStats,
    pub heap_allocations: Vec<HeapAllocation>,
}

/// Shape of the objects behind one pointer
struct ObjectShape {
    fields: u32,
    union_flags: Vec<bool>,
    is_union: bool,
}

impl ObjectShape {
    fn scalar() -> Self {
        Self {
            fields: 1,
            union_flags: Vec::new(),
            is_union: false,
        }
    }

    fn union_flag(&self, field: u32) -> bool {
        if field == 0 && self.is_union {
            return true;
        }
        self.union_flags
            .get(field as usize)
            .copied()
            .unwrap_or(false)
    }
}

enum ObjectPlan {
    Nodes(ObjectShape),
    Alias(NodeId),
}

pub struct ModelPopulator<'m, 'ctx> {
    ctx: &'ctx IrContext,
    layouts: &'m mut StructAnalyzer<'ctx>,
    nodes: &'m mut NodeFactory,
    allocators: &'m dyn AllocatorLookup,
    model_function_objects: bool,
    report: PopulationReport,
}

impl<'m, 'ctx> ModelPopulator<'m, 'ctx> {
    pub fn new(
        layouts: &'m mut StructAnalyzer<'ctx>,
        nodes: &'m mut NodeFactory,
        allocators: &'m dyn AllocatorLookup,
    ) -> Self {
        Self {
            ctx: layouts.ctx(),
            layouts,
            nodes,
            allocators,
            model_function_objects: true,
            report: PopulationReport::default(),
        }
    }

    /// Builder: give address-taken functions an object node
    pub fn model_function_objects(mut self, v: bool) -> Self {
        self.model_function_objects = v;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Driver
    // ═══════════════════════════════════════════════════════════════════════

    pub fn populate(mut self) -> ModelResult<PopulationReport> {
        let ctx = self.ctx;
        for module in 0..ctx.modules().len() {
            self.populate_module(module)?;
        }

        let stats = &self.report.stats;
        info!(
            "ModelPopulator: {} modules, {} nodes ({} value, {} object, {} heap in {} allocations)",
            stats.modules,
            self.nodes.num_nodes(),
            stats.value_nodes,
            stats.object_nodes,
            stats.heap_nodes,
            stats.heap_allocations
        );
        if stats.unknown_heap_types > 0 {
            info!(
                "ModelPopulator: {} heap allocations of unknown type expanded to {} fields",
                stats.unknown_heap_types,
                self.layouts.max_struct_size().max(1)
            );
        }
        Ok(self.report)
    }

    fn populate_module(&mut self, index: usize) -> ModelResult<()> {
        let ctx = self.ctx;
        let module = ctx.module(index)?;
        debug!(
            "ModelPopulator: module {} ({} globals, {} functions)",
            module.name,
            module.globals.len(),
            module.functions.len()
        );

        for &global in &module.globals {
            self.create_global_nodes(global)?;
        }
        for &func in &module.functions {
            self.create_function_nodes(func)?;
        }
        for &func in &module.functions {
            self.create_body_nodes(func)?;
        }

        self.report.stats.modules += 1;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Globals and Functions
    // ═══════════════════════════════════════════════════════════════════════

    fn create_global_nodes(&mut self, global: ValueId) -> ModelResult<()> {
        let ctx = self.ctx;
        let value = ctx.value(global)?;
        if value.is_declaration() {
            self.report.stats.skipped_declarations += 1;
            return Ok(());
        }
        self.create_value_node(global)?;
        self.create_pointer_objects(global, value.ty)
    }

    fn create_function_nodes(&mut self, func: ValueId) -> ModelResult<()> {
        let ctx = self.ctx;
        let value = ctx.value(func)?;
        let Some(function) = value.as_function() else {
            return Err(IrError::NotAFunction(func).into());
        };
        if value.is_declaration() || value.is_intrinsic() {
            self.report.stats.skipped_declarations += 1;
            return Ok(());
        }

        let Type::Function(fn_type) = ctx.ty(function.fn_type)? else {
            return Err(IrError::TypeMismatch {
                expected: "function type",
                found: function.fn_type,
            }
            .into());
        };
        if !ctx.types.is_void(fn_type.ret) {
            self.nodes.create_return_node(func)?;
            self.report.stats.return_nodes += 1;
        }
        if fn_type.vararg {
            self.nodes.create_vararg_node(func)?;
            self.report.stats.vararg_nodes += 1;
        }
        for &arg in &function.args {
            self.create_value_node(arg)?;
        }

        self.create_value_node(func)?;
        if self.model_function_objects && ctx.values.has_address_taken(func)? {
            self.nodes.create_object_node(Some(func), false, false);
            self.report.stats.function_objects += 1;
        }
        Ok(())
    }

    fn create_body_nodes(&mut self, func: ValueId) -> ModelResult<()> {
        let ctx = self.ctx;
        let value = ctx.value(func)?;
        let Some(function) = value.as_function() else {
            return Ok(());
        };
        if value.is_declaration() || value.is_intrinsic() {
            return Ok(());
        }
        if let Some(name) = value.name.as_deref() {
            if self.allocators.is_allocator(name) {
                debug!("ModelPopulator: not modeling allocator body {}", name);
                self.report.stats.skipped_allocator_bodies += 1;
                return Ok(());
            }
        }

        for &inst in &function.body {
            self.create_value_node(inst)?;
        }

        for &inst in &function.body {
            match ctx.value(inst)?.as_instruction() {
                Some(InstOp::Alloca { .. }) => {
                    self.create_pointer_objects(inst, ctx.value(inst)?.ty)?;
                }
                Some(InstOp::Call { .. }) => {
                    let Some(callee) = ctx.values.called_function(inst)? else {
                        continue;
                    };
                    let Some(name) = ctx.value(callee)?.name.as_deref() else {
                        continue;
                    };
                    if let Some(spec) = self.allocators.allocator(name) {
                        let spec = spec.clone();
                        self.create_heap_objects(inst, &spec)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn create_value_node(&mut self, v: ValueId) -> ModelResult<NodeId> {
        let id = self.nodes.create_value_node(Some(v))?;
        self.report.stats.value_nodes += 1;
        Ok(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object Expansion
    // ═══════════════════════════════════════════════════════════════════════

    /// Object nodes for what the pointer value `v` of type `ty` points to
    fn create_pointer_objects(&mut self, v: ValueId, ty: TypeId) -> ModelResult<()> {
        let types = &self.ctx.types;
        let Some(pointee) = types.pointee(ty) else {
            return Ok(());
        };
        let element = types.strip_arrays(pointee);
        match self.plan_for(element)? {
            ObjectPlan::Alias(sentinel) => {
                self.nodes.update_node_for_object(v, sentinel)?;
                self.report.stats.sentinel_aliases += 1;
                Ok(())
            }
            ObjectPlan::Nodes(shape) => {
                self.allocate(v, &shape, false)?;
                Ok(())
            }
        }
    }

    fn plan_for(&mut self, element: TypeId) -> ModelResult<ObjectPlan> {
        if !self.ctx.types.is_struct(element) {
            return Ok(ObjectPlan::Nodes(ObjectShape::scalar()));
        }
        if self.layouts.is_union(element) {
            return Ok(ObjectPlan::Nodes(ObjectShape {
                fields: 1,
                union_flags: Vec::new(),
                is_union: true,
            }));
        }
        let record = self.layouts.layout_of(element)?;
        if record.is_opaque() {
            debug!("ModelPopulator: {} is opaque, using the universal object", record.name());
            return Ok(ObjectPlan::Alias(UNIVERSAL_OBJ));
        }
        if record.is_empty() {
            return Ok(ObjectPlan::Alias(NULL_OBJ));
        }
        Ok(ObjectPlan::Nodes(ObjectShape {
            fields: record.num_fields(),
            union_flags: record.union_flags().to_vec(),
            is_union: false,
        }))
    }

    /// Create the nodes of one allocation; an origin that already has
    /// objects keeps them
    fn allocate(&mut self, origin: ValueId, shape: &ObjectShape, is_heap: bool) -> ModelResult<NodeId> {
        if let Some(existing) = self.nodes.mapped_object_node(origin) {
            return Ok(existing);
        }
        let base = self
            .nodes
            .create_object_node(Some(origin), shape.union_flag(0), is_heap);
        for field in 1..shape.fields {
            self.nodes
                .create_field_object_node(base, field, shape.union_flag(field), is_heap)?;
        }
        let stats = &mut self.report.stats;
        stats.object_nodes += shape.fields as usize;
        if is_heap {
            stats.heap_nodes += shape.fields as usize;
        }
        Ok(base)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Heap Objects
    // ═══════════════════════════════════════════════════════════════════════

    fn create_heap_objects(&mut self, call: ValueId, spec: &AllocatorSpec) -> ModelResult<()> {
        let ctx = self.ctx;
        let types = &ctx.types;
        let site = ctx.value(call)?;
        let mut element = types
            .pointee(site.ty)
            .ok_or(ModelError::NonPointerAllocation(call))?;

        // i8* results are refined by the first pointer cast of the result
        if types.is_integer(element, 8) {
            for &user in site.users() {
                let user_value = ctx.value(user)?;
                if let Some(InstOp::Cast { kind, .. }) = user_value.as_instruction() {
                    if *kind == CastKind::PtrToInt {
                        continue;
                    }
                    if let Some(pointee) = types.pointee(user_value.ty) {
                        element = pointee;
                        break;
                    }
                }
            }
        }
        let element = types.strip_arrays(element);

        let known = if types.is_struct(element) {
            match self.plan_for(element)? {
                ObjectPlan::Nodes(shape) => Some(shape),
                ObjectPlan::Alias(_) => None,
            }
        } else {
            None
        };
        let unknown_type = known.is_none();
        let shape = known.unwrap_or_else(|| ObjectShape {
            fields: self.layouts.max_struct_size().max(1),
            union_flags: Vec::new(),
            is_union: false,
        });
        if unknown_type {
            warn!(
                "ModelPopulator: element type of {} allocation {} unknown, expanding to {} fields",
                spec.name, call, shape.fields
            );
        }

        let requested_bytes = match (spec.size_arg, &site.kind) {
            (
                Some(position),
                ValueKind::Instruction {
                    op: InstOp::Call { args, .. },
                    ..
                },
            ) => args
                .get(position as usize)
                .and_then(|&arg| ctx.values.const_int(arg))
                .and_then(|size| u64::try_from(size).ok()),
            _ => None,
        };

        let object = self.allocate(call, &shape, true)?;
        debug!(
            "ModelPopulator: heap object {} for {} at {} ({} fields)",
            object, spec.name, call, shape.fields
        );

        let stats = &mut self.report.stats;
        stats.heap_allocations += 1;
        if unknown_type {
            stats.unknown_heap_types += 1;
        }
        self.report.heap_allocations.push(HeapAllocation {
            site: call,
            allocator: spec.name.clone(),
            object,
            element_type: (!unknown_type).then_some(element),
            requested_bytes,
            field_count: shape.fields,
            unknown_type,
        });
        Ok(())
    }
}
