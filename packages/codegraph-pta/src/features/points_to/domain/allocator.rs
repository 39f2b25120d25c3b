//! Heap allocation functions and allocation sites

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::features::ir::{TypeId, ValueId};
use crate::features::points_to::domain::node::NodeId;
use crate::features::points_to::ports::AllocatorLookup;

/// An allocation function and where its size and flags arguments are
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorSpec {
    pub name: String,
    #[serde(default)]
    pub size_arg: Option<u32>,
    #[serde(default)]
    pub flags_arg: Option<u32>,
}

impl AllocatorSpec {
    pub fn new(name: impl Into<String>, size_arg: Option<u32>, flags_arg: Option<u32>) -> Self {
        Self {
            name: name.into(),
            size_arg,
            flags_arg,
        }
    }
}

/// Allocator name → spec
#[derive(Debug, Clone, Default)]
pub struct AllocatorTable {
    specs: FxHashMap<String, AllocatorSpec>,
}

impl AllocatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation functions of the Linux kernel and libc
    pub fn kernel_defaults() -> Self {
        Self::from_specs(default_allocators())
    }

    pub fn from_specs(specs: impl IntoIterator<Item = AllocatorSpec>) -> Self {
        let mut table = Self::new();
        for spec in specs {
            table.insert(spec);
        }
        table
    }

    /// Later entries replace earlier ones with the same name
    pub fn insert(&mut self, spec: AllocatorSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl AllocatorLookup for AllocatorTable {
    fn allocator(&self, name: &str) -> Option<&AllocatorSpec> {
        self.specs.get(name)
    }
}

pub fn default_allocators() -> Vec<AllocatorSpec> {
    let sized_with_flags = [
        "kmalloc",
        "kzalloc",
        "__kmalloc",
        "kmalloc_node",
        "kzalloc_node",
        "__kmalloc_node",
        "kmalloc_large",
        "__kmalloc_track_caller",
        "kvmalloc_node",
    ];
    let sized = ["malloc", "vmalloc", "vzalloc", "__vmalloc", "vmalloc_user", "kvmalloc"];
    let cache = ["kmem_cache_alloc", "kmem_cache_zalloc", "kmem_cache_alloc_node"];

    let mut specs = Vec::new();
    specs.extend(
        sized_with_flags
            .iter()
            .map(|name| AllocatorSpec::new(*name, Some(0), Some(1))),
    );
    specs.extend(sized.iter().map(|name| AllocatorSpec::new(*name, Some(0), None)));
    specs.extend(cache.iter().map(|name| AllocatorSpec::new(*name, None, Some(1))));
    specs.push(AllocatorSpec::new("kcalloc", Some(1), Some(2)));
    specs.push(AllocatorSpec::new("kmemdup", Some(1), Some(2)));
    specs.push(AllocatorSpec::new("calloc", Some(1), None));
    specs
}

/// One heap allocation site and how it was expanded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapAllocation {
    pub site: ValueId,
    pub allocator: String,
    /// First object node of the allocation
    pub object: NodeId,
    /// Element type after cast refinement and array stripping
    pub element_type: Option<TypeId>,
    /// Constant size argument, recorded but not used for expansion
    pub requested_bytes: Option<u64>,
    pub field_count: u32,
    /// `true` when the element type was unknown and the object was expanded
    /// to the largest struct's field count
    pub unknown_type: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_defaults() {
        let table = AllocatorTable::kernel_defaults();
        let kmalloc = table.allocator("kmalloc").unwrap();
        assert_eq!(kmalloc.size_arg, Some(0));
        assert_eq!(kmalloc.flags_arg, Some(1));

        let cache = table.allocator("kmem_cache_alloc").unwrap();
        assert_eq!(cache.size_arg, None);

        assert!(table.allocator("printk").is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = AllocatorTable::kernel_defaults();
        let before = table.len();
        table.insert(AllocatorSpec::new("malloc", Some(1), None));
        assert_eq!(table.len(), before);
        assert_eq!(table.allocator("malloc").unwrap().size_arg, Some(1));
    }
}
