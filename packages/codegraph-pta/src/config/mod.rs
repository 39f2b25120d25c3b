//! Memory model configuration
//!
//! Defaults cover the Linux kernel and libc allocators. Teams that model a
//! different allocator family load a YAML file instead:
//!
//! ```rust,ignore
//! use codegraph_pta::config::MemoryModelConfig;
//!
//! let config = MemoryModelConfig::default()
//!     .union_name_prefix("union.")
//!     .model_function_objects(true);
//!
//! let config = MemoryModelConfig::from_yaml("allocators.yaml")?;
//! ```

pub mod error;
pub mod model_config;

// Re-exports
pub use error::{ConfigError, ConfigResult};
pub use model_config::{MemoryModelConfig, SUPPORTED_VERSIONS};
