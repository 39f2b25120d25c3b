//! Node arena
//!
//! Append-only vector of [`MemoryNode`]s with union-find merging. The K
//! object nodes of one allocation get K consecutive ids, so the node for
//! field `i` of the allocation starting at `b` is always `b + i`.
//!
//! # Performance Characteristics
//! - create_*: O(1) amortized
//! - offset_object_node: O(1)
//! - merge_target: near O(1) with path compression (no rank)
//! - object_size: O(fields) forward scan

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::errors::{ModelError, ModelResult};
use crate::features::ir::{CastKind, ConstExpr, Constant, ValueId, ValueKind};
use crate::features::points_to::domain::node::{
    is_sentinel, MemoryNode, NodeId, NodeKind, CONSTANT_INT, FIRST_USER_NODE, NULL_OBJ, NULL_PTR,
    UNIVERSAL_OBJ, UNIVERSAL_PTR,
};
use crate::features::points_to::infrastructure::offset_resolver::OffsetResolver;

#[derive(Debug, Clone, Serialize)]
pub struct NodeFactory {
    nodes: Vec<MemoryNode>,
    value_nodes: FxHashMap<ValueId, NodeId>,
    object_nodes: FxHashMap<ValueId, NodeId>,
    return_nodes: FxHashMap<ValueId, NodeId>,
    vararg_nodes: FxHashMap<ValueId, NodeId>,
    /// (base value node, field) → synthetic value node of a constant GEP
    #[serde(skip)]
    gep_map: FxHashMap<(NodeId, u32), NodeId>,
    #[serde(skip)]
    gep_node_map: FxHashMap<NodeId, (NodeId, u32)>,
    tainted: BTreeSet<NodeId>,
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory {
    pub fn new() -> Self {
        let nodes = vec![
            MemoryNode::value(UNIVERSAL_PTR, None),
            MemoryNode::object(UNIVERSAL_OBJ, None, 0, false, false),
            MemoryNode::value(NULL_PTR, None),
            MemoryNode::object(NULL_OBJ, None, 0, false, false),
            MemoryNode::object(CONSTANT_INT, None, 0, false, false),
        ];
        debug_assert_eq!(nodes.len() as NodeId, FIRST_USER_NODE);
        Self {
            nodes,
            value_nodes: FxHashMap::default(),
            object_nodes: FxHashMap::default(),
            return_nodes: FxHashMap::default(),
            vararg_nodes: FxHashMap::default(),
            gep_map: FxHashMap::default(),
            gep_node_map: FxHashMap::default(),
            tainted: BTreeSet::new(),
        }
    }

    #[inline]
    fn next_id(&self) -> NodeId {
        self.nodes.len() as NodeId
    }

    fn node(&self, n: NodeId) -> ModelResult<&MemoryNode> {
        self.nodes.get(n as usize).ok_or(ModelError::UnknownNode(n))
    }

    fn object(&self, n: NodeId) -> ModelResult<&MemoryNode> {
        let node = self.node(n)?;
        if node.is_object() {
            Ok(node)
        } else {
            Err(ModelError::NotAnObject(n))
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Node Creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Fresh value node; a value may own at most one
    pub fn create_value_node(&mut self, origin: Option<ValueId>) -> ModelResult<NodeId> {
        let id = self.next_id();
        if let Some(v) = origin {
            if self.value_nodes.contains_key(&v) {
                return Err(ModelError::DuplicateValueNode(v));
            }
            self.value_nodes.insert(v, id);
        }
        self.nodes.push(MemoryNode::value(id, origin));
        Ok(id)
    }

    /// First object node (field 0) of a new allocation
    ///
    /// Returns the existing node when `origin` already has one.
    pub fn create_object_node(&mut self, origin: Option<ValueId>, is_union: bool, is_heap: bool) -> NodeId {
        if let Some(existing) = origin.and_then(|v| self.object_nodes.get(&v).copied()) {
            return existing;
        }
        let id = self.next_id();
        if let Some(v) = origin {
            self.object_nodes.insert(v, id);
        }
        self.nodes
            .push(MemoryNode::object(id, origin, 0, is_union, is_heap));
        id
    }

    /// Object node for field `offset` of the allocation starting at `base`
    pub fn create_field_object_node(
        &mut self,
        base: NodeId,
        offset: u32,
        is_union: bool,
        is_heap: bool,
    ) -> ModelResult<NodeId> {
        if offset == 0 {
            return Err(ModelError::ZeroFieldOffset(base));
        }
        self.object(base)?;
        let id = self.next_id();
        if base.checked_add(offset) != Some(id) {
            return Err(ModelError::ContiguityViolation { base, offset });
        }
        self.nodes
            .push(MemoryNode::object(id, None, offset, is_union, is_heap));
        Ok(id)
    }

    pub fn create_return_node(&mut self, func: ValueId) -> ModelResult<NodeId> {
        if self.return_nodes.contains_key(&func) {
            return Err(ModelError::DuplicateReturnNode(func));
        }
        let id = self.next_id();
        self.nodes.push(MemoryNode::value(id, Some(func)));
        self.return_nodes.insert(func, id);
        Ok(id)
    }

    /// Vararg nodes are objects: the variadic area a `va_list` points into
    pub fn create_vararg_node(&mut self, func: ValueId) -> ModelResult<NodeId> {
        if self.vararg_nodes.contains_key(&func) {
            return Err(ModelError::DuplicateVarargNode(func));
        }
        let id = self.next_id();
        self.nodes
            .push(MemoryNode::object(id, Some(func), 0, false, false));
        self.vararg_nodes.insert(func, id);
        Ok(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════════

    /// Value node of `v`
    ///
    /// Constant expressions always resolve, possibly to a sentinel or to a
    /// synthetic node created for a constant GEP. Declarations resolve to
    /// their definition. `None` means `v` was never modeled.
    pub fn value_node_for(&mut self, resolver: &OffsetResolver<'_, '_>, v: ValueId) -> ModelResult<Option<NodeId>> {
        let ctx = resolver.ctx();
        let value = ctx.value(v)?;
        match &value.kind {
            ValueKind::Constant(constant) => {
                if !ctx.types.is_pointer(value.ty) {
                    return Ok(Some(CONSTANT_INT));
                }
                self.value_node_for_constant(resolver, v, constant).map(Some)
            }
            ValueKind::Global(_) | ValueKind::Function(_) => match ctx.definition_of(v)? {
                Some(def) => Ok(self.value_nodes.get(&def).copied()),
                None => Ok(Some(UNIVERSAL_PTR)),
            },
            _ => Ok(self.value_nodes.get(&v).copied()),
        }
    }

    fn value_node_for_constant(
        &mut self,
        resolver: &OffsetResolver<'_, '_>,
        v: ValueId,
        constant: &Constant,
    ) -> ModelResult<NodeId> {
        let expr = match constant {
            Constant::Null | Constant::Undef | Constant::BlockAddress | Constant::Int(0) => {
                return Ok(NULL_PTR)
            }
            Constant::Int(_) => return Ok(UNIVERSAL_PTR),
            Constant::Expr(expr) => expr,
        };
        match expr {
            ConstExpr::GetElementPtr(_) => {
                let object = resolver.underlying_object(v)?;
                let base = self
                    .value_node_for(resolver, object)?
                    .ok_or(ModelError::MissingBaseNode(v))?;
                if base == NULL_PTR || base == UNIVERSAL_PTR {
                    return Ok(base);
                }
                let field = resolver.const_gep_field(v)?.index;
                if field == 0 {
                    return Ok(base);
                }
                if let Some(&cached) = self.gep_map.get(&(base, field)) {
                    return Ok(cached);
                }
                // survives clear_gep_map
                let id = match self.value_nodes.get(&v) {
                    Some(&existing) => existing,
                    None => self.create_value_node(Some(v))?,
                };
                self.gep_map.insert((base, field), id);
                self.gep_node_map.insert(id, (base, field));
                debug!("NodeFactory: constant GEP {} → node {} (base {}, field {})", v, id, base, field);
                Ok(id)
            }
            ConstExpr::Cast { kind, src } if kind.is_pointer_preserving() => self
                .value_node_for(resolver, *src)?
                .ok_or(ModelError::MissingBaseNode(v)),
            ConstExpr::Cast {
                kind: CastKind::IntToPtr,
                ..
            } => Ok(UNIVERSAL_PTR),
            other => Err(ModelError::UnhandledConstExpr {
                value: v,
                opcode: other.opcode().to_string(),
            }),
        }
    }

    /// Object node of `v`, following the same resolution rules as
    /// [`value_node_for`](Self::value_node_for)
    pub fn object_node_for(&self, resolver: &OffsetResolver<'_, '_>, v: ValueId) -> ModelResult<Option<NodeId>> {
        let ctx = resolver.ctx();
        let value = ctx.value(v)?;
        match &value.kind {
            ValueKind::Constant(constant) => {
                if !ctx.types.is_pointer(value.ty) {
                    return Ok(Some(UNIVERSAL_OBJ));
                }
                self.object_node_for_constant(resolver, v, constant).map(Some)
            }
            ValueKind::Global(_) | ValueKind::Function(_) => match ctx.definition_of(v)? {
                Some(def) => Ok(self.object_nodes.get(&def).copied()),
                None => Ok(Some(UNIVERSAL_OBJ)),
            },
            _ => Ok(self.object_nodes.get(&v).copied()),
        }
    }

    fn object_node_for_constant(
        &self,
        resolver: &OffsetResolver<'_, '_>,
        v: ValueId,
        constant: &Constant,
    ) -> ModelResult<NodeId> {
        let expr = match constant {
            Constant::Null | Constant::Undef | Constant::BlockAddress | Constant::Int(0) => {
                return Ok(NULL_OBJ)
            }
            Constant::Int(_) => return Ok(UNIVERSAL_OBJ),
            Constant::Expr(expr) => expr,
        };
        match expr {
            ConstExpr::GetElementPtr(_) => {
                let object = resolver.underlying_object(v)?;
                let base = self
                    .object_node_for(resolver, object)?
                    .ok_or(ModelError::MissingBaseNode(v))?;
                if base == NULL_OBJ || base == UNIVERSAL_OBJ {
                    return Ok(base);
                }
                let field = resolver.const_gep_field(v)?.index;
                self.offset_object_node(base, field)
            }
            ConstExpr::Cast { kind, src } if kind.is_pointer_preserving() => self
                .object_node_for(resolver, *src)?
                .ok_or(ModelError::MissingBaseNode(v)),
            ConstExpr::Cast {
                kind: CastKind::IntToPtr,
                ..
            } => Ok(UNIVERSAL_OBJ),
            other => Err(ModelError::UnhandledConstExpr {
                value: v,
                opcode: other.opcode().to_string(),
            }),
        }
    }

    pub fn return_node_for(&self, func: ValueId) -> Option<NodeId> {
        self.return_nodes.get(&func).copied()
    }

    pub fn vararg_node_for(&self, func: ValueId) -> Option<NodeId> {
        self.vararg_nodes.get(&func).copied()
    }

    /// Registered value node of `v`, without constant resolution
    pub fn mapped_value_node(&self, v: ValueId) -> Option<NodeId> {
        self.value_nodes.get(&v).copied()
    }

    /// Registered object node of `v`, without constant resolution
    pub fn mapped_object_node(&self, v: ValueId) -> Option<NodeId> {
        self.object_nodes.get(&v).copied()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Constant GEP Cache
    // ═══════════════════════════════════════════════════════════════════════

    /// `(base value node, field)` a synthetic GEP node stands for
    pub fn gep_origin(&self, n: NodeId) -> Option<(NodeId, u32)> {
        self.gep_node_map.get(&n).copied()
    }

    pub fn gep_entries(&self) -> impl Iterator<Item = (NodeId, NodeId, u32)> + '_ {
        self.gep_node_map
            .iter()
            .map(|(&node, &(base, field))| (node, base, field))
    }

    pub fn clear_gep_map(&mut self) {
        self.gep_map.clear();
        self.gep_node_map.clear();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Union-Find
    // ═══════════════════════════════════════════════════════════════════════

    /// Merge `b` into `a`: `b`'s representative now points at `a`'s
    pub fn merge_node(&mut self, a: NodeId, b: NodeId) -> ModelResult<()> {
        let rep_a = self.merge_target(a)?;
        let rep_b = self.merge_target(b)?;
        if rep_a == rep_b {
            return Ok(());
        }
        if is_sentinel(rep_b) {
            return Err(ModelError::SentinelMerge(rep_b));
        }
        self.nodes[rep_b as usize].merge_target = rep_a;
        Ok(())
    }

    /// Representative of `n`, compressing the path behind it
    pub fn merge_target(&mut self, n: NodeId) -> ModelResult<NodeId> {
        let mut rep = self.node(n)?.merge_target;
        if rep == n {
            return Ok(n);
        }
        let mut path = vec![n];
        while rep != self.nodes[rep as usize].merge_target {
            path.push(rep);
            rep = self.nodes[rep as usize].merge_target;
        }
        for idx in path {
            self.nodes[idx as usize].merge_target = rep;
        }
        Ok(rep)
    }

    /// Representative of `n` without touching the forest
    pub fn merge_target_readonly(&self, n: NodeId) -> ModelResult<NodeId> {
        let mut rep = self.node(n)?.merge_target;
        while rep != self.nodes[rep as usize].merge_target {
            rep = self.nodes[rep as usize].merge_target;
        }
        Ok(rep)
    }

    /// Merged nodes and their representatives
    pub fn rep_info(&self) -> Vec<(NodeId, NodeId)> {
        (0..self.next_id())
            .filter_map(|n| {
                let rep = self.merge_target_readonly(n).ok()?;
                (rep != n).then_some((n, rep))
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object Geometry
    // ═══════════════════════════════════════════════════════════════════════

    /// Node `delta` fields after object node `n`; a union object is its own
    /// every field
    pub fn offset_object_node(&self, n: NodeId, delta: u32) -> ModelResult<NodeId> {
        let node = self.object(n)?;
        if node.is_union || delta == 0 {
            return Ok(n);
        }
        let violation = ModelError::ContiguityViolation { base: n, offset: delta };
        let target = n.checked_add(delta).ok_or(violation.clone())?;
        match self.nodes.get(target as usize) {
            Some(t) if t.is_object() && t.offset == node.offset + delta => Ok(target),
            _ => Err(violation),
        }
    }

    /// Number of fields of the allocation `n` belongs to, counted from its
    /// first field
    pub fn object_size(&self, n: NodeId) -> ModelResult<u32> {
        let mut offset = self.object(n)?.offset;
        let mut i = n as usize;
        while let Some(next) = self.nodes.get(i + 1) {
            if !next.is_object() || next.offset != offset + 1 {
                break;
            }
            i += 1;
            offset += 1;
        }
        Ok(offset + 1)
    }

    pub fn object_offset(&self, n: NodeId) -> ModelResult<u32> {
        Ok(self.object(n)?.offset)
    }

    /// One past the last node of `n`'s allocation
    pub fn object_bound(&self, n: NodeId) -> ModelResult<NodeId> {
        let offset = self.object_offset(n)?;
        Ok(n - offset + self.object_size(n)?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Node Properties
    // ═══════════════════════════════════════════════════════════════════════

    pub fn is_object_node(&self, n: NodeId) -> bool {
        self.nodes
            .get(n as usize)
            .is_some_and(MemoryNode::is_object)
    }

    pub fn is_union_object(&self, n: NodeId) -> bool {
        self.nodes
            .get(n as usize)
            .is_some_and(|node| node.is_object() && node.is_union)
    }

    pub fn is_heap_node(&self, n: NodeId) -> bool {
        self.nodes.get(n as usize).is_some_and(|node| node.is_heap)
    }

    pub fn node_kind(&self, n: NodeId) -> Option<NodeKind> {
        self.nodes.get(n as usize).map(|node| node.kind)
    }

    /// Origin value of `n`, or of its allocation's first field
    pub fn value_for_node(&self, n: NodeId) -> ModelResult<Option<ValueId>> {
        let node = self.node(n)?;
        if node.value.is_some() {
            return Ok(node.value);
        }
        Ok(self.node(n - node.offset)?.value)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[MemoryNode] {
        &self.nodes
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Map Maintenance
    // ═══════════════════════════════════════════════════════════════════════

    pub fn remove_node_for_value(&mut self, v: ValueId) -> Option<NodeId> {
        self.value_nodes.remove(&v)
    }

    pub fn remove_node_for_object(&mut self, v: ValueId) -> Option<NodeId> {
        self.object_nodes.remove(&v)
    }

    /// Point `v`'s object mapping at an existing object node (used to alias
    /// opaque and empty objects onto sentinels)
    pub fn update_node_for_object(&mut self, v: ValueId, n: NodeId) -> ModelResult<()> {
        self.object(n)?;
        self.object_nodes.insert(v, n);
        Ok(())
    }

    pub fn set_node_as_tainted(&mut self, n: NodeId) -> ModelResult<()> {
        match self.node(n)?.kind {
            NodeKind::Object => {
                self.tainted.insert(n);
                Ok(())
            }
            NodeKind::Value => Err(ModelError::TaintOnValueNode(n)),
        }
    }

    pub fn is_tainted(&self, n: NodeId) -> bool {
        self.tainted.contains(&n)
    }

    pub fn tainted_nodes(&self) -> &BTreeSet<NodeId> {
        &self.tainted
    }

    // Sentinel accessors
    pub const fn universal_ptr_node(&self) -> NodeId {
        UNIVERSAL_PTR
    }

    pub const fn universal_obj_node(&self) -> NodeId {
        UNIVERSAL_OBJ
    }

    pub const fn null_ptr_node(&self) -> NodeId {
        NULL_PTR
    }

    pub const fn null_object_node(&self) -> NodeId {
        NULL_OBJ
    }

    pub const fn constant_int_node(&self) -> NodeId {
        CONSTANT_INT
    }
}
