//! Configuration loading from disk

use std::io::Write;

use codegraph_pta::config::{ConfigError, MemoryModelConfig};
use codegraph_pta::features::points_to::{AllocatorLookup, AllocatorSpec};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

fn write_yaml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_loading() {
    let file = write_yaml(
        r#"
version: 1
allocators:
  - name: pool_alloc
    size_arg: 1
  - name: slab_get
    flags_arg: 0
union_name_prefix: "union."
model_function_objects: false
"#,
    );

    let config = MemoryModelConfig::from_yaml(file.path().to_str().unwrap()).unwrap();
    assert_eq!(
        config.allocators,
        vec![
            AllocatorSpec::new("pool_alloc", Some(1), None),
            AllocatorSpec::new("slab_get", None, Some(0)),
        ]
    );
    assert!(!config.model_function_objects);

    let table = config.allocator_table();
    assert!(table.is_allocator("pool_alloc"));
    assert!(!table.is_allocator("kmalloc"));
}

#[test]
fn test_yaml_file_roundtrip() {
    let config = MemoryModelConfig::default().allocator(AllocatorSpec::new("arena_new", Some(0), None));
    let file = write_yaml(&config.to_yaml().unwrap());

    let loaded = MemoryModelConfig::from_yaml(file.path().to_str().unwrap()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_is_io_error() {
    let result = MemoryModelConfig::from_yaml("/nonexistent/memory-model.yaml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_invalid_allocator_is_rejected_on_load() {
    let file = write_yaml(
        r#"
version: 1
allocators:
  - name: broken
    size_arg: 99
"#,
    );

    let result = MemoryModelConfig::from_yaml(file.path().to_str().unwrap());
    assert!(matches!(result, Err(ConfigError::Range { .. })));
}
