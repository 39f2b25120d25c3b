//! Target data layout
//!
//! Sizes, alignments and field offsets of IR types for an LP64 target.
//! Unsized types (void, functions, opaque structs) report `None`.

use serde::{Deserialize, Serialize};

use super::types::{Type, TypeId, TypeTable};
use crate::errors::{IrError, IrResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    pub pointer_size: u64,
    pub pointer_align: u64,
    /// Largest ABI alignment given to integers
    pub max_int_align: u64,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            pointer_align: 8,
            max_int_align: 8,
        }
    }
}

/// Byte offsets of a struct's declared members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub offsets: Vec<u64>,
    pub size: u64,
    pub align: u64,
}

impl StructLayout {
    /// Index of the last member starting at or before `offset`
    pub fn element_containing_offset(&self, offset: u64) -> usize {
        self.offsets
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }
}

#[inline]
fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

impl DataLayout {
    /// `(alloc size, ABI alignment)` or `None` for unsized types
    pub fn size_and_align(&self, types: &TypeTable, ty: TypeId) -> IrResult<Option<(u64, u64)>> {
        Ok(match types.get(ty)? {
            Type::Void | Type::Function(_) => None,
            Type::Integer { bits } => {
                let store = u64::from(bits.div_ceil(8)).max(1);
                let align = store.next_power_of_two().min(self.max_int_align);
                Some((round_up(store, align), align))
            }
            Type::Float { bits } => match bits {
                16 => Some((2, 2)),
                32 => Some((4, 4)),
                64 => Some((8, 8)),
                _ => Some((16, 16)),
            },
            Type::Pointer { .. } => Some((self.pointer_size, self.pointer_align)),
            Type::Array { element, len } => self
                .size_and_align(types, *element)?
                .map(|(size, align)| (size.saturating_mul(*len), align)),
            Type::Struct(_) => self
                .struct_layout(types, ty)?
                .map(|layout| (layout.size, layout.align)),
        })
    }

    pub fn type_alloc_size(&self, types: &TypeTable, ty: TypeId) -> IrResult<Option<u64>> {
        Ok(self.size_and_align(types, ty)?.map(|(size, _)| size))
    }

    pub fn abi_align(&self, types: &TypeTable, ty: TypeId) -> IrResult<Option<u64>> {
        Ok(self.size_and_align(types, ty)?.map(|(_, align)| align))
    }

    /// Member offsets of a struct or union
    ///
    /// Returns `None` for opaque structs and for bodies containing an
    /// unsized member.
    pub fn struct_layout(&self, types: &TypeTable, ty: TypeId) -> IrResult<Option<StructLayout>> {
        let st = types
            .as_struct(ty)
            .ok_or(IrError::TypeMismatch { expected: "struct", found: ty })?;
        let Some(body) = &st.body else {
            return Ok(None);
        };

        let mut offsets = Vec::with_capacity(body.len());
        let mut offset = 0u64;
        let mut struct_align = 1u64;
        let mut largest = 0u64;
        for &member in body {
            let Some((size, align)) = self.size_and_align(types, member)? else {
                return Ok(None);
            };
            let align = if st.packed { 1 } else { align };
            struct_align = struct_align.max(align);
            if st.is_union {
                offsets.push(0);
                largest = largest.max(size);
            } else {
                offset = round_up(offset, align);
                offsets.push(offset);
                offset += size;
            }
        }

        let end = if st.is_union { largest } else { offset };
        Ok(Some(StructLayout {
            offsets,
            size: round_up(end, struct_align),
            align: struct_align,
        }))
    }

    /// Byte offset addressed by constant GEP indices
    ///
    /// `indices[0]` steps over whole `source` objects; the remaining indices
    /// descend into structs (by member) and arrays (by element).
    pub fn indexed_offset_in_type(
        &self,
        types: &TypeTable,
        source: TypeId,
        indices: &[i64],
    ) -> IrResult<i64> {
        let Some((first, rest)) = indices.split_first() else {
            return Ok(0);
        };
        let source_size = self
            .type_alloc_size(types, source)?
            .ok_or(IrError::Unsized(source))?;
        let mut offset = first.wrapping_mul(source_size as i64);

        let mut current = source;
        for &index in rest {
            match types.get(current)? {
                Type::Struct(_) => {
                    let layout = self
                        .struct_layout(types, current)?
                        .ok_or(IrError::Unsized(current))?;
                    let member = usize::try_from(index)
                        .ok()
                        .filter(|&i| i < layout.offsets.len())
                        .ok_or(IrError::InvalidIndex { ty: current, index })?;
                    offset = offset.wrapping_add(layout.offsets[member] as i64);
                    current = types.indexed_type(current, &[Some(index)])?;
                }
                Type::Array { element, .. } => {
                    let element = *element;
                    let size = self
                        .type_alloc_size(types, element)?
                        .ok_or(IrError::Unsized(element))?;
                    offset = offset.wrapping_add(index.wrapping_mul(size as i64));
                    current = element;
                }
                _ => return Err(IrError::NotIndexable(current)),
            }
        }
        Ok(offset)
    }
}
