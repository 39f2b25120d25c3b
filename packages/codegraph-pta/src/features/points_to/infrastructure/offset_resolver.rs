//! Constant pointer arithmetic → flattened field index
//!
//! A constant `getelementptr` is first reduced to a byte offset from its
//! underlying object, then the offset is walked down the object's flattened
//! layout. Approximations:
//! - non-constant GEP indices count as index 0
//! - offsets into arrays of structs wrap modulo the struct size
//! - a union consumes the whole remaining offset (all members alias field 0)
//! - an offset landing inside a scalar field resolves to the first field of
//!   the innermost aggregate, flagged as inexact

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{IrError, ModelResult};
use crate::features::ir::{ConstExpr, Constant, GepOperands, InstOp, IrContext, Type, TypeId, ValueId, ValueKind};
use crate::features::points_to::infrastructure::struct_analyzer::StructAnalyzer;

/// Result of mapping a byte offset to a flattened field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedField {
    pub index: u32,
    /// `false` when the offset did not land on a field boundary and the
    /// whole aggregate is used instead
    pub exact: bool,
}

impl ResolvedField {
    pub const fn exact(index: u32) -> Self {
        Self { index, exact: true }
    }

    pub const fn inexact(index: u32) -> Self {
        Self { index, exact: false }
    }
}

pub struct OffsetResolver<'a, 'ctx> {
    ctx: &'ctx IrContext,
    layouts: &'a StructAnalyzer<'ctx>,
}

impl<'a, 'ctx> OffsetResolver<'a, 'ctx> {
    pub fn new(layouts: &'a StructAnalyzer<'ctx>) -> Self {
        Self {
            ctx: layouts.ctx(),
            layouts,
        }
    }

    pub fn ctx(&self) -> &'ctx IrContext {
        self.ctx
    }

    fn gep_operands(&self, gep: ValueId) -> ModelResult<&'ctx GepOperands> {
        let value = self.ctx.value(gep)?;
        match &value.kind {
            ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr(ops)))
            | ValueKind::Instruction {
                op: InstOp::GetElementPtr(ops),
                ..
            } => Ok(ops),
            _ => Err(IrError::TypeMismatch {
                expected: "getelementptr",
                found: value.ty,
            }
            .into()),
        }
    }

    /// Byte offset of a GEP from its base, including the offsets of constant
    /// GEPs it is (transitively) based on
    pub fn byte_offset_of(&self, gep: ValueId) -> ModelResult<i64> {
        let ops = self.gep_operands(gep)?;
        let mut offset = 0i64;

        let base = self.ctx.values.strip_pointer_casts(ops.base)?;
        if matches!(
            self.ctx.value(base)?.as_const_expr(),
            Some(ConstExpr::GetElementPtr(_))
        ) {
            offset = self.byte_offset_of(base)?;
        }

        let indices: Vec<i64> = ops
            .indices
            .iter()
            .map(|&i| self.ctx.values.const_int(i).unwrap_or(0))
            .collect();
        let local = self
            .ctx
            .data_layout
            .indexed_offset_in_type(&self.ctx.types, ops.source_element, &indices)?;
        // GEP arithmetic wraps like the pointer it models
        Ok(offset.wrapping_add(local))
    }

    /// Strip every GEP and pointer-preserving cast
    pub fn underlying_object(&self, mut value: ValueId) -> ModelResult<ValueId> {
        loop {
            let stripped = self.ctx.values.strip_pointer_casts(value)?;
            let next = match &self.ctx.value(stripped)?.kind {
                ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr(ops)))
                | ValueKind::Instruction {
                    op: InstOp::GetElementPtr(ops),
                    ..
                } => Some(ops.base),
                _ => None,
            };
            match next {
                Some(base) => value = base,
                None => return Ok(stripped),
            }
        }
    }

    /// Field reached by moving `byte_offset` bytes into the object `ptr`
    /// points to
    pub fn field_index_of(&self, ptr: ValueId, byte_offset: i64) -> ModelResult<ResolvedField> {
        let ty = self.ctx.value(ptr)?.ty;
        let pointee = self.ctx.types.pointee(ty).ok_or(IrError::TypeMismatch {
            expected: "pointer",
            found: ty,
        })?;
        self.field_index_in_type(pointee, byte_offset)
    }

    /// Field reached by moving `byte_offset` bytes into an object of type
    /// `pointee`
    pub fn field_index_in_type(&self, pointee: TypeId, byte_offset: i64) -> ModelResult<ResolvedField> {
        if byte_offset < 0 {
            debug!("OffsetResolver: negative offset {} resolves to field 0", byte_offset);
            return Ok(ResolvedField::inexact(0));
        }
        if let Some(st) = self.ctx.types.as_struct(pointee) {
            if self.layouts.is_union(pointee) {
                return Ok(ResolvedField::exact(0));
            }
            let resolved = self.layouts.struct_info(pointee);
            if st.is_opaque() && resolved.map_or(true, |record| record.is_opaque()) {
                return Ok(ResolvedField::inexact(0));
            }
        }

        let types = &self.ctx.types;
        let mut offset = byte_offset as u64;
        let mut current = pointee;
        let mut index = 0u32;
        let mut aggregate_base = 0u32;

        while offset > 0 {
            current = types.strip_arrays(current);
            if !types.is_struct(current) {
                let size = self.ctx.type_alloc_size(current)?.unwrap_or(0);
                if size == 0 {
                    return Ok(ResolvedField::inexact(aggregate_base));
                }
                offset %= size;
                if offset != 0 {
                    warn!(
                        "OffsetResolver: offset lands inside a field of {}; using the whole aggregate",
                        types.display(pointee)
                    );
                    return Ok(ResolvedField::inexact(aggregate_base));
                }
                break;
            }

            let Some(record) = self.layouts.struct_info(current) else {
                debug!("OffsetResolver: no layout for {}", types.display(current));
                return Ok(ResolvedField::inexact(aggregate_base));
            };
            aggregate_base = index;
            if record.is_opaque() || record.alloc_size() == 0 {
                debug!(
                    "OffsetResolver: {} has no fields to walk; using the whole aggregate",
                    types.display(current)
                );
                return Ok(ResolvedField::inexact(aggregate_base));
            }
            if record.is_union() {
                // every member aliases the union's only field
                break;
            }

            let real = record.real_type();
            let Some(layout) = self.ctx.data_layout.struct_layout(types, real)? else {
                return Ok(ResolvedField::inexact(aggregate_base));
            };
            offset %= record.alloc_size();
            let member = layout.element_containing_offset(offset);
            index += record.flattened_index(member).unwrap_or(0);
            offset -= layout.offsets.get(member).copied().unwrap_or(0);
            current = match types.get(real)? {
                Type::Struct(st) => st.fields().get(member).copied().unwrap_or(current),
                _ => current,
            };
        }
        Ok(ResolvedField::exact(index))
    }

    /// Field addressed by a constant GEP expression, relative to its
    /// underlying object
    pub fn const_gep_field(&self, expr: ValueId) -> ModelResult<ResolvedField> {
        let offset = self.byte_offset_of(expr)?;
        let object = self.underlying_object(expr)?;
        self.field_index_of(object, offset)
    }

    /// Field addressed by a GEP instruction relative to its base pointer, or
    /// `None` when some index is not constant
    pub fn gep_inst_field(&self, gep: ValueId) -> ModelResult<Option<ResolvedField>> {
        let ops = self.gep_operands(gep)?;
        let mut indices = Vec::with_capacity(ops.indices.len());
        for &i in &ops.indices {
            match self.ctx.values.const_int(i) {
                Some(c) => indices.push(c),
                None => return Ok(None),
            }
        }
        let offset = self
            .ctx
            .data_layout
            .indexed_offset_in_type(&self.ctx.types, ops.source_element, &indices)?;
        Ok(Some(self.field_index_in_type(ops.source_element, offset)?))
    }
}
