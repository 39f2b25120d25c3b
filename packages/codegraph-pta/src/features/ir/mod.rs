//! IR input model
//!
//! In-memory, typed-pointer IR that a front-end fills in before the memory
//! model is built: a shared type table, a target data layout, and a value
//! table of globals, functions, arguments, instructions and constants,
//! grouped into modules.
//!
//! ```text
//! IrContext
//!   ├── TypeTable   (interned unnamed types, nominal named structs)
//!   ├── ValueTable  (def-use edges in both directions)
//!   ├── DataLayout  (sizes, alignments, struct offsets)
//!   └── Module*     (globals + functions of one translation unit)
//! ```

pub mod builder;
pub mod data_layout;
pub mod module;
pub mod types;
pub mod values;

pub use builder::IrBuilder;
pub use data_layout::{DataLayout, StructLayout};
pub use module::{IrContext, Module};
pub use types::{FunctionType, StructType, Type, TypeId, TypeTable};
pub use values::{
    CastKind, ConstExpr, Constant, Function, GepOperands, GlobalVariable, InstOp, Value, ValueId,
    ValueKind, ValueTable,
};
