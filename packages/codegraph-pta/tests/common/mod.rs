//! Shared program builders for integration tests
//!
//! Every builder returns the context plus the handles a test needs; types
//! follow the default 64-bit data layout.

#![allow(dead_code)]

use codegraph_pta::features::ir::{CastKind, IrBuilder, IrContext, TypeId, ValueId};

/// `struct S { int a; struct { char b[4]; int *c; } inner; }` and the values
/// built around it
pub struct SProgram {
    pub ctx: IrContext,
    pub s_type: TypeId,
    pub inner_type: TypeId,
    /// `@s = global S`
    pub s: ValueId,
    /// `&s.inner.c` as a constant GEP
    pub inner_c: ValueId,
    /// `&s.inner` as a constant GEP
    pub inner: ValueId,
    /// `define i32* @main(i32* %arg)`
    pub main: ValueId,
    pub arg: ValueId,
    /// `%local = alloca S` in main
    pub local: ValueId,
    /// `%p = call i8* @kmalloc(i64 64, i32 0)`, never cast
    pub raw_heap: ValueId,
    /// `%q = call i8* @kmalloc(i64 24, i32 0)` followed by `bitcast %q to S*`
    pub typed_heap: ValueId,
}

pub fn s_program() -> SProgram {
    let mut ctx = IrContext::default();
    let m = ctx.add_module("s.c");

    let types = &mut ctx.types;
    let i8t = types.int(8);
    let i32t = types.int(32);
    let i64t = types.int(64);
    let i32p = types.pointer_to(i32t);
    let i8p = types.pointer_to(i8t);
    let b_array = types.array_of(i8t, 4);
    let inner_type = types.define_struct("struct.anon", vec![b_array, i32p]).unwrap();
    let s_type = types.define_struct("struct.S", vec![i32t, inner_type]).unwrap();
    let s_ptr = types.pointer_to(s_type);
    let kmalloc_type = types.function(i8p, vec![i64t, i32t], false);
    let main_type = types.function(i32p, vec![i32p], false);

    let mut b = IrBuilder::new(&mut ctx, m);
    let s = b.global("s", s_type).unwrap();
    let inner_c = b.const_gep(s_type, s, &[0, 1, 1]).unwrap();
    let inner = b.const_gep(s_type, s, &[0, 1]).unwrap();

    let kmalloc = b.declare_function("kmalloc", kmalloc_type).unwrap();
    let main = b.function("main", main_type).unwrap();
    let arg = b.args(main).unwrap()[0];
    b.position_at_end(main).unwrap();
    let local = b.alloca(s_type).unwrap();
    let size64 = b.const_int(i64t, 64).unwrap();
    let size24 = b.const_int(i64t, 24).unwrap();
    let flags = b.const_int(i32t, 0).unwrap();
    let raw_heap = b.call(kmalloc, vec![size64, flags]).unwrap();
    let typed_heap = b.call(kmalloc, vec![size24, flags]).unwrap();
    b.cast(CastKind::BitCast, typed_heap, s_ptr).unwrap();
    b.ret(Some(arg)).unwrap();

    SProgram {
        ctx,
        s_type,
        inner_type,
        s,
        inner_c,
        inner,
        main,
        arg,
        local,
        raw_heap,
        typed_heap,
    }
}

/// A program with one global of each interesting pointee shape
pub struct ShapesProgram {
    pub ctx: IrContext,
    /// `@u = global union.U { i32, i64* }`
    pub union_global: ValueId,
    /// `@o = global %struct.opaque` (no body anywhere)
    pub opaque_global: ValueId,
    /// `@e = global {}`
    pub empty_global: ValueId,
    /// `@arr = global [8 x %struct.pair]`
    pub array_global: ValueId,
    pub pair_type: TypeId,
}

pub fn shapes_program() -> ShapesProgram {
    let mut ctx = IrContext::default();
    let m = ctx.add_module("shapes.c");

    let types = &mut ctx.types;
    let i32t = types.int(32);
    let i64t = types.int(64);
    let i64p = types.pointer_to(i64t);
    let union_type = types.define_union("union.U", vec![i32t, i64p]).unwrap();
    let opaque = types.named_struct("struct.opaque");
    let empty = types.define_struct("struct.empty", vec![]).unwrap();
    let pair_type = types.define_struct("struct.pair", vec![i64p, i64p]).unwrap();
    let pairs = types.array_of(pair_type, 8);

    let mut b = IrBuilder::new(&mut ctx, m);
    let union_global = b.global("u", union_type).unwrap();
    let opaque_global = b.global("o", opaque).unwrap();
    let empty_global = b.global("e", empty).unwrap();
    let array_global = b.global("arr", pairs).unwrap();

    ShapesProgram {
        ctx,
        union_global,
        opaque_global,
        empty_global,
        array_global,
        pair_type,
    }
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
