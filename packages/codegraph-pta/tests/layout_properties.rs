//! Property-based tests for struct flattening and offset resolution
//!
//! Invariants over randomly shaped, acyclic, union-free structs:
//! - Idempotence: laying out the same type twice yields the same record
//! - Round trip: the byte offset recorded for a field resolves back to it
//! - GEP round trip: a constant GEP chain to a member resolves to its field
//! - Monotonicity: flattened field offsets never decrease

use codegraph_pta::features::ir::{IrBuilder, IrContext, TypeId, ValueId};
use codegraph_pta::features::points_to::{OffsetResolver, ResolvedField, StructAnalyzer};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Scalar {
    I8,
    I16,
    I32,
    I64,
    Ptr,
}

#[derive(Debug, Clone)]
enum Member {
    Scalar(Scalar),
    Array(Scalar, u64),
    Nested(Vec<Scalar>),
}

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::I8),
        Just(Scalar::I16),
        Just(Scalar::I32),
        Just(Scalar::I64),
        Just(Scalar::Ptr),
    ]
}

fn member() -> impl Strategy<Value = Member> {
    prop_oneof![
        3 => scalar().prop_map(Member::Scalar),
        1 => (scalar(), 1u64..5).prop_map(|(s, n)| Member::Array(s, n)),
        1 => prop::collection::vec(scalar(), 1..4).prop_map(Member::Nested),
    ]
}

fn scalar_type(ctx: &mut IrContext, s: Scalar) -> TypeId {
    match s {
        Scalar::I8 => ctx.types.int(8),
        Scalar::I16 => ctx.types.int(16),
        Scalar::I32 => ctx.types.int(32),
        Scalar::I64 => ctx.types.int(64),
        Scalar::Ptr => {
            let i32t = ctx.types.int(32);
            ctx.types.pointer_to(i32t)
        }
    }
}

fn build(members: &[Member]) -> (IrContext, TypeId) {
    let mut ctx = IrContext::default();
    let mut fields = Vec::new();
    for (i, m) in members.iter().enumerate() {
        let ty = match m {
            Member::Scalar(s) => scalar_type(&mut ctx, *s),
            Member::Array(s, n) => {
                let element = scalar_type(&mut ctx, *s);
                ctx.types.array_of(element, *n)
            }
            Member::Nested(inner) => {
                let inner_fields: Vec<TypeId> = inner.iter().map(|s| scalar_type(&mut ctx, *s)).collect();
                ctx.types
                    .define_struct(&format!("struct.inner{}", i), inner_fields)
                    .unwrap()
            }
        };
        fields.push(ty);
    }
    let outer = ctx.types.define_struct("struct.outer", fields).unwrap();
    (ctx, outer)
}

/// Constant GEPs to every declared member of a global of type `outer`, with
/// the flattened field each one must resolve to and any byte distance past
/// that field's offset. Array members are also reached through their last
/// element; nested members through a two-step chain.
fn member_geps(
    ctx: &mut IrContext,
    module: usize,
    outer: TypeId,
    members: &[Member],
) -> Vec<(ValueId, u32, Option<i64>)> {
    let inner_types: Vec<Option<TypeId>> = members
        .iter()
        .enumerate()
        .map(|(i, m)| match m {
            Member::Nested(_) => ctx.types.by_name(&format!("struct.inner{}", i)),
            _ => None,
        })
        .collect();
    let element_sizes: Vec<Option<i64>> = members
        .iter()
        .map(|m| match m {
            Member::Array(s, _) => Some(scalar_size(*s)),
            _ => None,
        })
        .collect();

    let mut b = IrBuilder::new(ctx, module);
    let global = b.global("g", outer).unwrap();
    let mut geps = Vec::new();
    let mut field = 0u32;
    for (i, m) in members.iter().enumerate() {
        let i = i as i64;
        match m {
            Member::Scalar(_) => {
                geps.push((b.const_gep(outer, global, &[0, i]).unwrap(), field, None));
                field += 1;
            }
            Member::Array(_, n) => {
                let whole = b.const_gep(outer, global, &[0, i]).unwrap();
                let last = b.const_gep(outer, global, &[0, i, *n as i64 - 1]).unwrap();
                geps.push((whole, field, None));
                let step = element_sizes[i as usize].unwrap_or(0) * (*n as i64 - 1);
                geps.push((last, field, Some(step)));
                field += 1;
            }
            Member::Nested(inner) => {
                let inner_type = inner_types[i as usize].unwrap();
                let head = b.const_gep(outer, global, &[0, i]).unwrap();
                for j in 0..inner.len() {
                    let chained = b.const_gep(inner_type, head, &[0, j as i64]).unwrap();
                    geps.push((chained, field, None));
                    field += 1;
                }
            }
        }
    }
    geps
}

fn scalar_size(s: Scalar) -> i64 {
    match s {
        Scalar::I8 => 1,
        Scalar::I16 => 2,
        Scalar::I32 => 4,
        Scalar::I64 | Scalar::Ptr => 8,
    }
}

fn expected_fields(members: &[Member]) -> u32 {
    members
        .iter()
        .map(|m| match m {
            Member::Nested(inner) => inner.len() as u32,
            _ => 1,
        })
        .sum()
}

proptest! {
    #[test]
    fn prop_layout_is_idempotent(members in prop::collection::vec(member(), 1..7)) {
        let (ctx, outer) = build(&members);

        let mut first = StructAnalyzer::new(&ctx);
        let a = first.layout_of(outer).unwrap().clone();
        let again = first.layout_of(outer).unwrap().clone();
        prop_assert_eq!(&a, &again);

        let mut second = StructAnalyzer::new(&ctx);
        let b = second.layout_of(outer).unwrap().clone();
        prop_assert_eq!(a.num_fields(), b.num_fields());
        prop_assert_eq!(a.field_offsets(), b.field_offsets());
        prop_assert_eq!(a.pointer_flags(), b.pointer_flags());
        prop_assert_eq!(a.num_fields(), expected_fields(&members));
    }

    #[test]
    fn prop_field_offsets_round_trip(members in prop::collection::vec(member(), 1..7)) {
        let (ctx, outer) = build(&members);
        let mut layouts = StructAnalyzer::new(&ctx);
        let offsets = layouts.layout_of(outer).unwrap().field_offsets().to_vec();

        let resolver = OffsetResolver::new(&layouts);
        for (field, &offset) in offsets.iter().enumerate() {
            let resolved = resolver.field_index_in_type(outer, offset as i64).unwrap();
            prop_assert_eq!(resolved, ResolvedField::exact(field as u32));
        }
    }

    #[test]
    fn prop_const_gep_chains_round_trip(members in prop::collection::vec(member(), 1..7)) {
        let (mut ctx, outer) = build(&members);
        let m = ctx.add_module("props.o");
        let geps = member_geps(&mut ctx, m, outer, &members);

        let mut layouts = StructAnalyzer::new(&ctx);
        let offsets = layouts.layout_of(outer).unwrap().field_offsets().to_vec();
        let resolver = OffsetResolver::new(&layouts);
        for (gep, field, byte_offset) in geps {
            let resolved = resolver.const_gep_field(gep).unwrap();
            prop_assert_eq!(resolved, ResolvedField::exact(field));
            let offset = resolver.byte_offset_of(gep).unwrap();
            let expected = offsets[field as usize] as i64 + byte_offset.unwrap_or(0);
            prop_assert_eq!(offset, expected);
        }
    }

    #[test]
    fn prop_field_offsets_are_monotonic(members in prop::collection::vec(member(), 1..7)) {
        let (ctx, outer) = build(&members);
        let mut layouts = StructAnalyzer::new(&ctx);
        let record = layouts.layout_of(outer).unwrap();
        let offsets = record.field_offsets();
        prop_assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(offsets.last().copied().unwrap_or(0) < record.alloc_size());
    }

    #[test]
    fn prop_nested_structs_record_back_edges(members in prop::collection::vec(member(), 1..7)) {
        let (ctx, outer) = build(&members);
        let mut layouts = StructAnalyzer::new(&ctx);
        layouts.layout_of(outer).unwrap();
        let layout = ctx.data_layout.struct_layout(&ctx.types, outer).unwrap().unwrap();

        for (i, m) in members.iter().enumerate() {
            if let Member::Nested(_) = m {
                let inner = ctx.types.by_name(&format!("struct.inner{}", i)).unwrap();
                prop_assert!(layouts.container(inner, outer, layout.offsets[i]));
            }
        }
    }
}
