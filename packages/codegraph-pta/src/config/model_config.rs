//! Memory model configuration (YAML schema v1)

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use crate::features::points_to::domain::allocator::{default_allocators, AllocatorSpec, AllocatorTable};

pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Highest argument position an allocator spec may name
const MAX_ARG_POSITION: u32 = 15;

/// On-disk form; `version` is optional here only so a missing field gets a
/// precise error
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,
    #[serde(default = "default_allocators")]
    allocators: Vec<AllocatorSpec>,
    #[serde(default = "default_union_prefix")]
    union_name_prefix: String,
    #[serde(default = "default_true")]
    model_function_objects: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryModelConfig {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Heap allocation functions; calls to these create heap objects and
    /// their bodies are not modeled
    pub allocators: Vec<AllocatorSpec>,

    /// Struct names starting with this prefix are unions
    pub union_name_prefix: String,

    /// Give address-taken functions an object node
    pub model_function_objects: bool,
}

fn default_union_prefix() -> String {
    "union.".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MemoryModelConfig {
    fn default() -> Self {
        Self {
            version: 1,
            allocators: default_allocators(),
            union_name_prefix: default_union_prefix(),
            model_function_objects: true,
        }
    }
}

impl MemoryModelConfig {
    pub fn from_yaml(path: &str) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let config = Self {
            version,
            allocators: file.allocators,
            union_name_prefix: file.union_name_prefix,
            model_function_objects: file.model_function_objects,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        serde_yaml::to_string(self).map_err(ConfigError::Yaml)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.union_name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "union_name_prefix must not be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for (i, spec) in self.allocators.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "allocators[{}] has an empty name",
                    i
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "allocator '{}' is listed twice",
                    spec.name
                )));
            }
            for (field, position) in [("size_arg", spec.size_arg), ("flags_arg", spec.flags_arg)] {
                if let Some(p) = position {
                    if p > MAX_ARG_POSITION {
                        return Err(ConfigError::range_with_hint(
                            format!("allocators[{}].{}", i, field),
                            p,
                            0,
                            MAX_ARG_POSITION,
                            "Argument positions are zero-based",
                        ));
                    }
                }
            }
            if spec.size_arg.is_some() && spec.size_arg == spec.flags_arg {
                return Err(ConfigError::Validation(format!(
                    "allocator '{}' uses the same argument for size and flags",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    /// Builder: Replace the allocator list
    pub fn allocators(mut self, v: Vec<AllocatorSpec>) -> Self {
        self.allocators = v;
        self
    }

    /// Builder: Add one allocator
    pub fn allocator(mut self, v: AllocatorSpec) -> Self {
        self.allocators.push(v);
        self
    }

    /// Builder: Set union_name_prefix
    pub fn union_name_prefix(mut self, v: impl Into<String>) -> Self {
        self.union_name_prefix = v.into();
        self
    }

    /// Builder: Set model_function_objects
    pub fn model_function_objects(mut self, v: bool) -> Self {
        self.model_function_objects = v;
        self
    }

    pub fn allocator_table(&self) -> AllocatorTable {
        AllocatorTable::from_specs(self.allocators.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::points_to::ports::AllocatorLookup;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = MemoryModelConfig::default();
        config.validate().unwrap();
        assert!(config.allocator_table().is_allocator("kmalloc"));
        assert!(config.model_function_objects);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = MemoryModelConfig::default()
            .allocators(vec![AllocatorSpec::new("pool_alloc", Some(1), None)])
            .union_name_prefix("u.");

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("pool_alloc"));

        let back = MemoryModelConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_omitted_sections_use_defaults() {
        let config = MemoryModelConfig::from_yaml_str("version: 1\n").unwrap();
        assert_eq!(config, MemoryModelConfig::default());
    }

    #[test]
    fn test_missing_version() {
        let result = MemoryModelConfig::from_yaml_str("union_name_prefix: \"union.\"\n");
        assert!(matches!(result, Err(ConfigError::MissingVersion)));
    }

    #[test]
    fn test_unsupported_version() {
        let result = MemoryModelConfig::from_yaml_str("version: 2\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = MemoryModelConfig::from_yaml_str("version: 1\nstore_flags: true\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_validation_errors() {
        let dup = MemoryModelConfig::default().allocator(AllocatorSpec::new("kmalloc", Some(0), None));
        assert!(matches!(dup.validate(), Err(ConfigError::Validation(_))));

        let far = MemoryModelConfig::default()
            .allocators(vec![AllocatorSpec::new("a", Some(40), None)]);
        assert!(matches!(far.validate(), Err(ConfigError::Range { .. })));

        let clash = MemoryModelConfig::default()
            .allocators(vec![AllocatorSpec::new("a", Some(1), Some(1))]);
        assert!(matches!(clash.validate(), Err(ConfigError::Validation(_))));

        let prefix = MemoryModelConfig::default().union_name_prefix("");
        assert!(matches!(prefix.validate(), Err(ConfigError::Validation(_))));
    }
}
