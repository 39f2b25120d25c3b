//! Feature modules - Each feature follows Hexagonal Architecture
//!
//! - ir/        - In-memory IR a front-end fills in (types, layout, values)
//! - points_to/ - Field-sensitive memory model over that IR
//!   - domain/         - Plain data (nodes, field records, allocators)
//!   - ports/          - Interface definitions (traits)
//!   - application/    - Population and the finished model
//!   - infrastructure/ - Layout, offset and arena algorithms

pub mod ir;

// Field-sensitive memory model (Pearce-style flattening)
pub mod points_to;
