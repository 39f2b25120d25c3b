//! Struct layout flattening
//!
//! Field-sensitive modeling after Pearce et al. "Efficient Field-Sensitive
//! Pointer Analysis of C" (TOPLAS 2007): every struct is flattened into a
//! sequence of scalar fields with nested structs spliced in place, arrays
//! collapsed to a single field, and unions folded onto field 0.
//!
//! Records are memoized per canonical type. Named structs that differ only by
//! a `.N` uniquing suffix (`struct.foo` in one translation unit,
//! `struct.foo.42` in another) share one record through their scope name.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::errors::{IrError, LayoutError, LayoutResult};
use crate::features::ir::{IrContext, StructType, TypeId};
use crate::features::points_to::domain::field_record::FieldRecord;

static UNIQUING_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\.\d+)+$").expect("valid regex"));

pub const DEFAULT_UNION_PREFIX: &str = "union.";

/// Scope name of a named struct: the name without its uniquing suffix.
/// Anonymous structs keep their full name and are never unified.
pub fn scope_name(name: &str) -> String {
    if is_anonymous(name) {
        name.to_string()
    } else {
        UNIQUING_SUFFIX.replace(name, "").into_owned()
    }
}

pub fn is_anonymous(name: &str) -> bool {
    name.starts_with("struct.anon") || name.starts_with("union.anon")
}

pub struct StructAnalyzer<'ctx> {
    ctx: &'ctx IrContext,
    /// Canonical struct type → flattened record
    infos: FxHashMap<TypeId, FieldRecord>,
    /// Scope name → first non-opaque definition seen
    struct_map: FxHashMap<String, TypeId>,
    union_prefix: String,
    max_struct: Option<TypeId>,
    max_struct_size: u32,
}

impl<'ctx> StructAnalyzer<'ctx> {
    pub fn new(ctx: &'ctx IrContext) -> Self {
        Self::with_union_prefix(ctx, DEFAULT_UNION_PREFIX)
    }

    pub fn with_union_prefix(ctx: &'ctx IrContext, union_prefix: impl Into<String>) -> Self {
        Self {
            ctx,
            infos: FxHashMap::default(),
            struct_map: FxHashMap::default(),
            union_prefix: union_prefix.into(),
            max_struct: None,
            max_struct_size: 0,
        }
    }

    pub fn ctx(&self) -> &'ctx IrContext {
        self.ctx
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Driver
    // ═══════════════════════════════════════════════════════════════════════

    /// Lay out every struct type used by every module
    pub fn run(&mut self) -> LayoutResult<()> {
        for module in 0..self.ctx.modules().len() {
            self.run_module(module)?;
        }
        info!(
            "StructAnalyzer: {} records, {} scope names, largest struct has {} fields",
            self.infos.len(),
            self.struct_map.len(),
            self.max_struct_size
        );
        Ok(())
    }

    /// Lay out the struct types one module uses: literal types always, named
    /// non-opaque types once per scope name
    pub fn run_module(&mut self, module: usize) -> LayoutResult<()> {
        let used = self.ctx.used_struct_types(module)?;
        debug!(
            "StructAnalyzer: module {} uses {} struct types",
            self.ctx.module(module)?.name,
            used.len()
        );
        for ty in used {
            let st = self.struct_type(ty)?;
            match &st.name {
                None => {
                    self.compute(ty)?;
                }
                Some(name) if !st.is_opaque() => {
                    let scope = scope_name(name);
                    if !self.struct_map.contains_key(&scope) {
                        self.struct_map.insert(scope, ty);
                        self.compute(ty)?;
                    }
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Record of `ty`, computing it on first use
    pub fn layout_of(&mut self, ty: TypeId) -> LayoutResult<&FieldRecord> {
        let canonical = self.compute(ty)?;
        self.infos
            .get(&canonical)
            .ok_or(LayoutError::NotAStruct(ty))
    }

    /// Finalized record of `ty`: by identity first, then by scope name
    pub fn struct_info(&self, ty: TypeId) -> Option<&FieldRecord> {
        if let Some(record) = self.infos.get(&ty) {
            return record.is_finalized().then_some(record);
        }
        let canonical = self.canonical(ty).ok()?;
        self.infos.get(&canonical).filter(|r| r.is_finalized())
    }

    /// Names of the named structs that embed `name`, looking through
    /// anonymous containers to their own containers
    pub fn containers_of(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut visiting = BTreeSet::new();
        self.collect_containers(name, &mut out, &mut visiting);
        out
    }

    fn collect_containers(&self, name: &str, out: &mut BTreeSet<String>, visiting: &mut BTreeSet<String>) {
        if !visiting.insert(name.to_string()) {
            return;
        }
        let Some(record) = self
            .struct_map
            .get(name)
            .and_then(|ty| self.infos.get(ty))
        else {
            return;
        };
        for edge in record.containers() {
            let Some(container) = self.ctx.types.struct_name(edge.container) else {
                continue;
            };
            if is_anonymous(container) {
                self.collect_containers(&scope_name(container), out, visiting);
            } else {
                out.insert(container.to_string());
            }
        }
    }

    /// Back-edge query: does `enclosing` embed `ty` at byte `offset`?
    pub fn container(&self, ty: TypeId, enclosing: TypeId, offset: u64) -> bool {
        let enclosing = self.canonical(enclosing).unwrap_or(enclosing);
        self.struct_info(ty)
            .is_some_and(|record| record.has_container(enclosing, offset))
    }

    pub fn max_struct_size(&self) -> u32 {
        self.max_struct_size
    }

    pub fn max_struct(&self) -> Option<TypeId> {
        self.max_struct
    }

    /// Number of distinct scope names registered
    pub fn len(&self) -> usize {
        self.struct_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.struct_map.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (TypeId, &FieldRecord)> {
        self.infos.iter().map(|(&ty, record)| (ty, record))
    }

    pub fn is_union(&self, ty: TypeId) -> bool {
        self.ctx
            .types
            .as_struct(ty)
            .is_some_and(|st| self.is_union_type(st))
    }

    fn is_union_type(&self, st: &StructType) -> bool {
        st.is_union
            || st
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(&self.union_prefix))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flattening
    // ═══════════════════════════════════════════════════════════════════════

    fn struct_type(&self, ty: TypeId) -> LayoutResult<&'ctx StructType> {
        self.ctx
            .types
            .as_struct(ty)
            .ok_or(LayoutError::NotAStruct(ty))
    }

    /// Registered definition sharing `ty`'s scope name, or `ty` itself
    fn canonical(&self, ty: TypeId) -> LayoutResult<TypeId> {
        let st = self.struct_type(ty)?;
        Ok(st
            .name
            .as_deref()
            .and_then(|name| self.struct_map.get(&scope_name(name)))
            .copied()
            .unwrap_or(ty))
    }

    /// Compute (or fetch) the record of `ty`, returning its canonical key
    fn compute(&mut self, ty: TypeId) -> LayoutResult<TypeId> {
        let st = self.struct_type(ty)?;
        if let Some(name) = st.name.as_deref().filter(|_| !st.is_opaque()) {
            self.struct_map.entry(scope_name(name)).or_insert(ty);
        }
        let canonical = self.canonical(ty)?;
        if let Some(existing) = self.infos.get(&canonical) {
            if !existing.is_finalized() {
                return Err(LayoutError::RecursiveByValue(existing.name().to_string()));
            }
            return Ok(canonical);
        }

        let st = self.struct_type(canonical)?;
        let name = self.ctx.types.display(canonical);
        if st.is_opaque() {
            debug!("StructAnalyzer: {} is opaque", name);
            self.infos
                .insert(canonical, FieldRecord::opaque(name, canonical));
            return Ok(canonical);
        }

        let is_union = self.is_union_type(st);
        self.infos
            .insert(canonical, FieldRecord::new(name.clone(), canonical, is_union));

        let built = if is_union {
            self.flatten_union(canonical, st, &name)
        } else {
            self.flatten_struct(canonical, st, &name)
        };
        let record = match built {
            Ok(record) => record,
            Err(err) => {
                self.infos.remove(&canonical);
                return Err(err);
            }
        };

        let num_fields = record.num_fields();
        if num_fields > self.max_struct_size {
            self.max_struct_size = num_fields;
            self.max_struct = Some(canonical);
        }

        #[cfg(feature = "trace")]
        debug!(
            "StructAnalyzer: {} size {} offsets {:?} pointers {:?} map {:?}",
            record.name(),
            record.alloc_size(),
            record.field_offsets(),
            record.pointer_flags(),
            record.offset_map()
        );

        self.infos.insert(canonical, record);
        Ok(canonical)
    }

    /// Record of a nested member, which must have a body
    fn nested(&mut self, outer: &str, member: TypeId) -> LayoutResult<TypeId> {
        let sub = self.compute(member)?;
        match self.infos.get(&sub) {
            Some(record) if record.is_opaque() => Err(LayoutError::NestedOpaque {
                outer: outer.to_string(),
                inner: record.name().to_string(),
            }),
            _ => Ok(sub),
        }
    }

    fn member_size(&self, ty: TypeId) -> LayoutResult<u64> {
        Ok(self.ctx.type_alloc_size(ty)?.unwrap_or(0))
    }

    fn flatten_struct(&mut self, ty: TypeId, st: &StructType, name: &str) -> LayoutResult<FieldRecord> {
        let ctx = self.ctx;
        let types = &ctx.types;
        let mut record = FieldRecord::new(name, ty, false);

        // Nested opaque members must be reported before asking for offsets
        for &member in st.fields() {
            let stripped = types.strip_arrays(member);
            if types.is_struct(stripped) {
                self.nested(name, stripped)?;
            }
        }
        let layout = ctx
            .data_layout
            .struct_layout(types, ty)?
            .ok_or(IrError::Unsized(ty))?;

        for (i, &member) in st.fields().iter().enumerate() {
            let offset = layout.offsets[i];
            let is_array = types.is_array(member);
            let stripped = types.strip_arrays(member);
            let first = record.num_fields();
            record.map_declared_member(first);

            if types.is_struct(stripped) {
                let sub = self.nested(name, stripped)?;
                self.add_container(ty, sub, offset)?;
                if let Some(sub_record) = self.infos.get(&sub) {
                    record.splice(sub_record, offset);
                }
            } else {
                let real_size = self.member_size(member)?;
                record.push_field(offset, real_size, is_array, types.is_pointer(stripped), false);
            }
            if first < record.num_fields() {
                record.add_element_type(first, stripped);
            }
        }

        if !record.is_empty() {
            record.add_element_type(0, ty);
        }
        record.finalize(layout.size)?;
        Ok(record)
    }

    fn flatten_union(&mut self, ty: TypeId, st: &StructType, name: &str) -> LayoutResult<FieldRecord> {
        let ctx = self.ctx;
        let types = &ctx.types;
        let mut record = FieldRecord::new(name, ty, true);
        if st.fields().is_empty() {
            record.finalize(0)?;
            return Ok(record);
        }

        let mut any_array = false;
        let mut any_pointer = false;
        let mut element_types = BTreeSet::new();
        for &member in st.fields() {
            record.map_declared_member(0);
            any_array |= types.is_array(member);
            let stripped = types.strip_arrays(member);
            element_types.insert(stripped);

            if types.is_struct(stripped) {
                let sub = self.nested(name, stripped)?;
                self.add_container(ty, sub, 0)?;
                if let Some(sub_record) = self.infos.get(&sub) {
                    any_pointer |= sub_record.pointer_flags().iter().any(|&p| p);
                    any_array |= (0..sub_record.num_fields()).any(|f| sub_record.is_field_array(f));
                    for field in 0..sub_record.num_fields() {
                        if let Some(tys) = sub_record.element_types(field) {
                            element_types.extend(tys.iter().copied());
                        }
                    }
                }
            } else {
                any_pointer |= types.is_pointer(stripped);
            }
        }

        let size = self.member_size(ty)?;
        record.push_field(0, size, any_array, any_pointer, true);
        record.add_element_type(0, ty);
        for elem in element_types {
            record.add_element_type(0, elem);
        }
        record.finalize(size)?;
        Ok(record)
    }

    /// Add `container → containee @ offset` and propagate it to every struct
    /// nested (transitively) inside `containee`
    fn add_container(&mut self, container: TypeId, containee: TypeId, offset: u64) -> LayoutResult<()> {
        let ctx = self.ctx;
        let inner_edges: Vec<(TypeId, u64)> = {
            let Some(record) = self.infos.get_mut(&containee) else {
                return Ok(());
            };
            record.add_container(container, offset);
            let real = record.real_type();
            let st = self.struct_type(real)?;
            let types = &ctx.types;
            let mut edges = Vec::new();
            for &member in st.fields() {
                let stripped = types.strip_arrays(member);
                if !types.is_struct(stripped) {
                    continue;
                }
                let sub = self.canonical(stripped)?;
                if let Some(sub_record) = self.infos.get(&sub) {
                    edges.extend(
                        sub_record
                            .containers()
                            .iter()
                            .filter(|edge| edge.container == containee)
                            .map(|edge| (sub, edge.offset)),
                    );
                }
            }
            edges
        };
        for (sub, inner_offset) in inner_edges {
            self.add_container(container, sub, inner_offset + offset)?;
        }
        Ok(())
    }
}
