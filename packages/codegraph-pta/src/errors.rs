//! Error types for codegraph-pta
//!
//! One `thiserror` enum per layer, unified by [`PtaError`]:
//! - [`IrError`]: malformed or inconsistent IR input
//! - [`LayoutError`]: struct flattening failures
//! - [`ModelError`]: memory-model contract violations and unmodelable input
//!
//! Conservative approximations (non-constant GEP indices, mid-field accesses,
//! unknown heap element types) are never errors. They are logged instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::features::ir::{TypeId, ValueId};
use crate::features::points_to::domain::node::NodeId;

/// Errors raised while reading the IR input model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("unknown type {0}")]
    UnknownType(TypeId),

    #[error("unknown value {0}")]
    UnknownValue(ValueId),

    #[error("unknown module #{0}")]
    UnknownModule(usize),

    #[error("type {0} has no size")]
    Unsized(TypeId),

    #[error("index {index} is not valid for type {ty}")]
    InvalidIndex { ty: TypeId, index: i64 },

    #[error("type {0} cannot be indexed")]
    NotIndexable(TypeId),

    #[error("struct index into {0} must be a constant integer")]
    NonConstantStructIndex(TypeId),

    #[error("type {0} is not a named struct")]
    NotANamedStruct(TypeId),

    #[error("body of struct {0} is already set")]
    BodyAlreadySet(TypeId),

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: TypeId,
    },

    #[error("value {0} is not a function")]
    NotAFunction(ValueId),

    #[error("no insertion point: call position_at_end first")]
    NoInsertionPoint,

    #[error("symbol '{0}' is defined twice")]
    DuplicateSymbol(String),
}

/// Errors raised while flattening struct layouts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("type {0} is not a struct")]
    NotAStruct(TypeId),

    #[error("opaque struct '{inner}' is embedded by value in '{outer}'")]
    NestedOpaque { outer: String, inner: String },

    #[error("struct '{0}' contains itself by value")]
    RecursiveByValue(String),

    #[error("field record for '{name}' is inconsistent: {detail}")]
    InconsistentRecord { name: String, detail: String },

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Errors raised by the node arena and the populator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("value {0} already has a value node")]
    DuplicateValueNode(ValueId),

    #[error("function {0} already has a return node")]
    DuplicateReturnNode(ValueId),

    #[error("function {0} already has a vararg node")]
    DuplicateVarargNode(ValueId),

    #[error("object node {base} has no contiguous field at offset {offset}")]
    ContiguityViolation { base: NodeId, offset: u32 },

    #[error("field object nodes need a non-zero offset (base {0})")]
    ZeroFieldOffset(NodeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is not an object node")]
    NotAnObject(NodeId),

    #[error("sentinel node {0} cannot be merged into another node")]
    SentinelMerge(NodeId),

    #[error("only object nodes can be tainted (node {0})")]
    TaintOnValueNode(NodeId),

    #[error("no node for the base of constant GEP {0}")]
    MissingBaseNode(ValueId),

    #[error("unhandled constant expression '{opcode}' ({value})")]
    UnhandledConstExpr { value: ValueId, opcode: String },

    #[error("allocation site {0} does not return a pointer")]
    NonPointerAllocation(ValueId),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Main error type for codegraph-pta operations
#[derive(Debug, Error)]
pub enum PtaError {
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Memory model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for IR input operations
pub type IrResult<T> = std::result::Result<T, IrError>;

/// Result type alias for layout operations
pub type LayoutResult<T> = std::result::Result<T, LayoutError>;

/// Result type alias for memory-model operations
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for codegraph-pta operations
pub type Result<T> = std::result::Result<T, PtaError>;
