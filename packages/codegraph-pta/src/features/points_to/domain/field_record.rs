//! Flattened field table of one struct or union type
//!
//! Nested structs are spliced in place, arrays collapse to one field of their
//! element type, and all members of a union share field 0. Each record also
//! remembers which enclosing struct types embed it, and at which byte offset
//! (container back-edges), so a pointer to an inner struct can be mapped back
//! to the objects that contain it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::errors::{LayoutError, LayoutResult};
use crate::features::ir::TypeId;

/// `container` embeds the record's type by value at byte `offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerEdge {
    pub container: TypeId,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRecord {
    name: String,
    real_type: TypeId,

    // Parallel per-flattened-field vectors
    array_flags: Vec<bool>,
    pointer_flags: Vec<bool>,
    union_flags: Vec<bool>,
    field_offsets: Vec<u64>,
    field_real_sizes: Vec<u64>,

    /// Source types observed at each flattened field
    element_types: BTreeMap<u32, BTreeSet<TypeId>>,
    /// Declared member index → flattened field index
    offset_map: Vec<u32>,
    /// Grows after finalization as enclosing types are laid out
    containers: BTreeSet<ContainerEdge>,

    alloc_size: u64,
    is_union: bool,
    is_opaque: bool,
    finalized: bool,
}

impl FieldRecord {
    /// Empty, unfinalized record (also used as the recursion placeholder)
    pub fn new(name: impl Into<String>, real_type: TypeId, is_union: bool) -> Self {
        Self {
            name: name.into(),
            real_type,
            array_flags: Vec::new(),
            pointer_flags: Vec::new(),
            union_flags: Vec::new(),
            field_offsets: Vec::new(),
            field_real_sizes: Vec::new(),
            element_types: BTreeMap::new(),
            offset_map: Vec::new(),
            containers: BTreeSet::new(),
            alloc_size: 0,
            is_union,
            is_opaque: false,
            finalized: false,
        }
    }

    /// Finalized record of a struct without a body: no fields, unknown size
    pub fn opaque(name: impl Into<String>, real_type: TypeId) -> Self {
        let mut record = Self::new(name, real_type, false);
        record.is_opaque = true;
        record.finalized = true;
        record
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Construction (before finalize)
    // ═══════════════════════════════════════════════════════════════════════

    /// Append one flattened field, returning its index
    pub fn push_field(
        &mut self,
        offset: u64,
        real_size: u64,
        is_array: bool,
        is_pointer: bool,
        is_union: bool,
    ) -> u32 {
        let index = self.field_offsets.len() as u32;
        self.field_offsets.push(offset);
        self.field_real_sizes.push(real_size);
        self.array_flags.push(is_array);
        self.pointer_flags.push(is_pointer);
        self.union_flags.push(is_union);
        index
    }

    pub fn add_element_type(&mut self, field: u32, ty: TypeId) {
        self.element_types.entry(field).or_default().insert(ty);
    }

    /// Record where declared member number `offset_map.len()` starts
    pub fn map_declared_member(&mut self, flattened: u32) {
        self.offset_map.push(flattened);
    }

    /// Append every field of `nested` at `base_offset`, returning the index of
    /// the first spliced field
    pub fn splice(&mut self, nested: &FieldRecord, base_offset: u64) -> u32 {
        let first = self.num_fields();
        for i in 0..nested.field_offsets.len() {
            self.push_field(
                base_offset + nested.field_offsets[i],
                nested.field_real_sizes[i],
                nested.array_flags[i],
                nested.pointer_flags[i],
                nested.union_flags[i],
            );
        }
        for (field, types) in &nested.element_types {
            self.element_types
                .entry(first + field)
                .or_default()
                .extend(types.iter().copied());
        }
        first
    }

    /// Returns `true` when the edge is new
    pub fn add_container(&mut self, container: TypeId, offset: u64) -> bool {
        self.containers.insert(ContainerEdge { container, offset })
    }

    /// Check the parallel vectors and freeze the field table
    pub fn finalize(&mut self, alloc_size: u64) -> LayoutResult<()> {
        let n = self.field_offsets.len();
        let lengths = [
            ("array flags", self.array_flags.len()),
            ("pointer flags", self.pointer_flags.len()),
            ("union flags", self.union_flags.len()),
            ("real sizes", self.field_real_sizes.len()),
        ];
        for (what, len) in lengths {
            if len != n {
                return Err(LayoutError::InconsistentRecord {
                    name: self.name.clone(),
                    detail: format!("{} {} for {} fields", len, what, n),
                });
            }
        }
        if let Some((&field, _)) = self.element_types.range(n as u32..).next() {
            return Err(LayoutError::InconsistentRecord {
                name: self.name.clone(),
                detail: format!("element types recorded for missing field {}", field),
            });
        }
        if let Some(&bad) = self.offset_map.iter().find(|&&i| n > 0 && i as usize >= n) {
            return Err(LayoutError::InconsistentRecord {
                name: self.name.clone(),
                detail: format!("declared member maps to missing field {}", bad),
            });
        }
        self.alloc_size = alloc_size;
        self.finalized = true;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn real_type(&self) -> TypeId {
        self.real_type
    }

    #[inline]
    pub fn num_fields(&self) -> u32 {
        self.field_offsets.len() as u32
    }

    pub fn field_offset(&self, field: u32) -> Option<u64> {
        self.field_offsets.get(field as usize).copied()
    }

    pub fn field_real_size(&self, field: u32) -> Option<u64> {
        self.field_real_sizes.get(field as usize).copied()
    }

    pub fn is_field_array(&self, field: u32) -> bool {
        self.array_flags.get(field as usize).copied().unwrap_or(false)
    }

    pub fn is_field_pointer(&self, field: u32) -> bool {
        self.pointer_flags.get(field as usize).copied().unwrap_or(false)
    }

    pub fn is_field_union(&self, field: u32) -> bool {
        self.union_flags.get(field as usize).copied().unwrap_or(false)
    }

    pub fn pointer_flags(&self) -> &[bool] {
        &self.pointer_flags
    }

    pub fn union_flags(&self) -> &[bool] {
        &self.union_flags
    }

    pub fn field_offsets(&self) -> &[u64] {
        &self.field_offsets
    }

    pub fn element_types(&self, field: u32) -> Option<&BTreeSet<TypeId>> {
        self.element_types.get(&field)
    }

    /// Flattened index of declared member `declared`
    pub fn flattened_index(&self, declared: usize) -> Option<u32> {
        self.offset_map.get(declared).copied()
    }

    pub fn offset_map(&self) -> &[u32] {
        &self.offset_map
    }

    pub fn containers(&self) -> &BTreeSet<ContainerEdge> {
        &self.containers
    }

    /// Back-edge query: does `container` embed this type at `offset`?
    pub fn has_container(&self, container: TypeId, offset: u64) -> bool {
        self.containers.contains(&ContainerEdge { container, offset })
    }

    pub fn alloc_size(&self) -> u64 {
        self.alloc_size
    }

    pub fn is_union(&self) -> bool {
        self.is_union
    }

    pub fn is_opaque(&self) -> bool {
        self.is_opaque
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_empty(&self) -> bool {
        self.field_offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_splice_shifts_offsets_and_element_types() {
        let mut inner = FieldRecord::new("struct.inner", TypeId(1), false);
        inner.push_field(0, 4, true, false, false);
        inner.push_field(8, 8, false, true, false);
        inner.add_element_type(1, TypeId(7));
        inner.finalize(16).unwrap();

        let mut outer = FieldRecord::new("struct.outer", TypeId(2), false);
        outer.push_field(0, 4, false, false, false);
        let first = outer.splice(&inner, 8);

        assert_eq!(first, 1);
        assert_eq!(outer.field_offsets(), &[0, 8, 16]);
        assert_eq!(outer.pointer_flags(), &[false, false, true]);
        assert!(outer.is_field_array(1));
        assert_eq!(outer.element_types(2).map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_finalize_detects_inconsistency() {
        let mut record = FieldRecord::new("struct.bad", TypeId(0), false);
        record.push_field(0, 4, false, false, false);
        record.add_element_type(3, TypeId(1));
        assert!(matches!(
            record.finalize(4),
            Err(LayoutError::InconsistentRecord { .. })
        ));
    }

    #[test]
    fn test_container_edges_are_deduplicated() {
        let mut record = FieldRecord::new("struct.x", TypeId(0), false);
        assert!(record.add_container(TypeId(5), 8));
        assert!(!record.add_container(TypeId(5), 8));
        assert!(record.add_container(TypeId(5), 16));
        assert!(record.has_container(TypeId(5), 16));
        assert!(!record.has_container(TypeId(5), 0));
    }

    #[test]
    fn test_opaque_record() {
        let record = FieldRecord::opaque("struct.file", TypeId(3));
        assert!(record.is_opaque());
        assert!(record.is_finalized());
        assert_eq!(record.num_fields(), 0);
        assert_eq!(record.alloc_size(), 0);
    }
}
