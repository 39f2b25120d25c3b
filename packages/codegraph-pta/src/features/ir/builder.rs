//! IR construction helper for front-ends and tests

use super::module::IrContext;
use super::types::{Type, TypeId};
use super::values::{
    CastKind, ConstExpr, Constant, Function, GepOperands, GlobalVariable, InstOp, Value, ValueId,
    ValueKind,
};
use crate::errors::{IrError, IrResult};

/// Appends values to one module of an [`IrContext`]
pub struct IrBuilder<'a> {
    ctx: &'a mut IrContext,
    module: usize,
    insert_into: Option<ValueId>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(ctx: &'a mut IrContext, module: usize) -> Self {
        Self {
            ctx,
            module,
            insert_into: None,
        }
    }

    pub fn ctx(&mut self) -> &mut IrContext {
        self.ctx
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Globals and functions
    // ═══════════════════════════════════════════════════════════════════════

    pub fn global(&mut self, name: &str, value_type: TypeId) -> IrResult<ValueId> {
        self.add_global(name, value_type, false)
    }

    pub fn declare_global(&mut self, name: &str, value_type: TypeId) -> IrResult<ValueId> {
        self.add_global(name, value_type, true)
    }

    fn add_global(&mut self, name: &str, value_type: TypeId, is_declaration: bool) -> IrResult<ValueId> {
        self.ctx.module(self.module)?;
        let ty = self.ctx.types.pointer_to(value_type);
        let id = self.ctx.values.push(Value::new(
            ty,
            Some(name.to_string()),
            ValueKind::Global(GlobalVariable {
                value_type,
                is_declaration,
                module: self.module,
            }),
        ))?;
        if !is_declaration {
            self.ctx.define_symbol(name, id)?;
        }
        self.ctx.module_mut(self.module)?.globals.push(id);
        Ok(id)
    }

    /// Define a function with a (still empty) body
    pub fn function(&mut self, name: &str, fn_type: TypeId) -> IrResult<ValueId> {
        self.add_function(name, fn_type, false)
    }

    pub fn declare_function(&mut self, name: &str, fn_type: TypeId) -> IrResult<ValueId> {
        self.add_function(name, fn_type, true)
    }

    fn add_function(&mut self, name: &str, fn_type: TypeId, is_declaration: bool) -> IrResult<ValueId> {
        self.ctx.module(self.module)?;
        let params = match self.ctx.types.get(fn_type)? {
            Type::Function(func) => func.params.clone(),
            _ => {
                return Err(IrError::TypeMismatch {
                    expected: "function type",
                    found: fn_type,
                })
            }
        };
        let ty = self.ctx.types.pointer_to(fn_type);
        let id = self.ctx.values.push(Value::new(
            ty,
            Some(name.to_string()),
            ValueKind::Function(Function {
                fn_type,
                is_declaration,
                args: Vec::new(),
                body: Vec::new(),
                module: self.module,
            }),
        ))?;

        if !is_declaration {
            let mut args = Vec::with_capacity(params.len());
            for (index, param) in params.into_iter().enumerate() {
                args.push(self.ctx.values.push(Value::new(
                    param,
                    None,
                    ValueKind::Argument {
                        parent: id,
                        index: index as u32,
                    },
                ))?);
            }
            if let ValueKind::Function(func) = &mut self.ctx.values.get_mut(id)?.kind {
                func.args = args;
            }
            self.ctx.define_symbol(name, id)?;
        }
        self.ctx.module_mut(self.module)?.functions.push(id);
        Ok(id)
    }

    pub fn args(&self, func: ValueId) -> IrResult<Vec<ValueId>> {
        self.ctx
            .values
            .get(func)?
            .as_function()
            .map(|f| f.args.clone())
            .ok_or(IrError::NotAFunction(func))
    }

    pub fn position_at_end(&mut self, func: ValueId) -> IrResult<()> {
        match self.ctx.values.get(func)?.as_function() {
            Some(f) if !f.is_declaration => {
                self.insert_into = Some(func);
                Ok(())
            }
            _ => Err(IrError::NotAFunction(func)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Instructions
    // ═══════════════════════════════════════════════════════════════════════

    fn push_inst(&mut self, ty: TypeId, op: InstOp) -> IrResult<ValueId> {
        let parent = self.insert_into.ok_or(IrError::NoInsertionPoint)?;
        let id = self
            .ctx
            .values
            .push(Value::new(ty, None, ValueKind::Instruction { parent, op }))?;
        if let ValueKind::Function(func) = &mut self.ctx.values.get_mut(parent)?.kind {
            func.body.push(id);
        }
        Ok(id)
    }

    pub fn alloca(&mut self, allocated: TypeId) -> IrResult<ValueId> {
        let ty = self.ctx.types.pointer_to(allocated);
        self.push_inst(ty, InstOp::Alloca { allocated })
    }

    pub fn call(&mut self, callee: ValueId, args: Vec<ValueId>) -> IrResult<ValueId> {
        let callee_ty = self.ctx.values.get(callee)?.ty;
        let ret = self
            .ctx
            .types
            .pointee(callee_ty)
            .and_then(|fn_ty| match self.ctx.types.get(fn_ty) {
                Ok(Type::Function(func)) => Some(func.ret),
                _ => None,
            })
            .ok_or(IrError::TypeMismatch {
                expected: "pointer to function",
                found: callee_ty,
            })?;
        self.push_inst(ret, InstOp::Call { callee, args })
    }

    pub fn cast(&mut self, kind: CastKind, src: ValueId, to: TypeId) -> IrResult<ValueId> {
        self.push_inst(to, InstOp::Cast { kind, src })
    }

    pub fn gep(&mut self, source_element: TypeId, base: ValueId, indices: Vec<ValueId>) -> IrResult<ValueId> {
        let ty = self.gep_result_type(source_element, &indices)?;
        self.push_inst(ty, InstOp::GetElementPtr(GepOperands { source_element, base, indices }))
    }

    pub fn load(&mut self, ptr: ValueId) -> IrResult<ValueId> {
        let ptr_ty = self.ctx.values.get(ptr)?.ty;
        let ty = self.ctx.types.pointee(ptr_ty).ok_or(IrError::TypeMismatch {
            expected: "pointer",
            found: ptr_ty,
        })?;
        self.push_inst(ty, InstOp::Load { ptr })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> IrResult<ValueId> {
        let void = self.ctx.types.void();
        self.push_inst(void, InstOp::Store { value, ptr })
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> IrResult<ValueId> {
        let void = self.ctx.types.void();
        self.push_inst(void, InstOp::Ret { value })
    }

    pub fn other(&mut self, opcode: &str, ty: TypeId, operands: Vec<ValueId>) -> IrResult<ValueId> {
        self.push_inst(
            ty,
            InstOp::Other {
                opcode: opcode.to_string(),
                operands,
            },
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Constants
    // ═══════════════════════════════════════════════════════════════════════

    fn push_const(&mut self, ty: TypeId, constant: Constant) -> IrResult<ValueId> {
        self.ctx
            .values
            .push(Value::new(ty, None, ValueKind::Constant(constant)))
    }

    pub fn const_int(&mut self, ty: TypeId, value: i64) -> IrResult<ValueId> {
        self.push_const(ty, Constant::Int(value))
    }

    pub fn null(&mut self, ty: TypeId) -> IrResult<ValueId> {
        self.push_const(ty, Constant::Null)
    }

    pub fn undef(&mut self, ty: TypeId) -> IrResult<ValueId> {
        self.push_const(ty, Constant::Undef)
    }

    pub fn block_address(&mut self) -> IrResult<ValueId> {
        let i8t = self.ctx.types.int(8);
        let ty = self.ctx.types.pointer_to(i8t);
        self.push_const(ty, Constant::BlockAddress)
    }

    /// Constant GEP with integer indices (`i64` for the first index and
    /// array steps, `i32` for struct members)
    pub fn const_gep(&mut self, source_element: TypeId, base: ValueId, indices: &[i64]) -> IrResult<ValueId> {
        let i32t = self.ctx.types.int(32);
        let i64t = self.ctx.types.int(64);
        let mut operands = Vec::with_capacity(indices.len());
        let mut current = source_element;
        for (position, &index) in indices.iter().enumerate() {
            let is_struct_step = position > 0 && self.ctx.types.is_struct(current);
            let ty = if is_struct_step { i32t } else { i64t };
            operands.push(self.const_int(ty, index)?);
            if position > 0 {
                current = self.ctx.types.indexed_type(current, &[Some(index)])?;
            }
        }
        let ty = self.gep_result_type(source_element, &operands)?;
        self.push_const(
            ty,
            Constant::Expr(ConstExpr::GetElementPtr(GepOperands {
                source_element,
                base,
                indices: operands,
            })),
        )
    }

    pub fn const_cast(&mut self, kind: CastKind, src: ValueId, to: TypeId) -> IrResult<ValueId> {
        self.push_const(to, Constant::Expr(ConstExpr::Cast { kind, src }))
    }

    pub fn const_expr(&mut self, opcode: &str, ty: TypeId, operands: Vec<ValueId>) -> IrResult<ValueId> {
        self.push_const(
            ty,
            Constant::Expr(ConstExpr::Other {
                opcode: opcode.to_string(),
                operands,
            }),
        )
    }

    fn gep_result_type(&mut self, source_element: TypeId, indices: &[ValueId]) -> IrResult<TypeId> {
        let steps: Vec<Option<i64>> = indices
            .iter()
            .skip(1)
            .map(|&i| self.ctx.values.const_int(i))
            .collect();
        let element = self.ctx.types.indexed_type(source_element, &steps)?;
        Ok(self.ctx.types.pointer_to(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::DataLayout;

    #[test]
    fn test_function_body_and_args() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let i32t = ctx.types.int(32);
        let p = ctx.types.pointer_to(i32t);
        let fn_ty = ctx.types.function(i32t, vec![p], false);

        let mut b = IrBuilder::new(&mut ctx, m);
        let f = b.function("read", fn_ty).unwrap();
        let args = b.args(f).unwrap();
        b.position_at_end(f).unwrap();
        let v = b.load(args[0]).unwrap();
        b.ret(Some(v)).unwrap();

        let func = ctx.values.get(f).unwrap().as_function().unwrap().clone();
        assert_eq!(func.args.len(), 1);
        assert_eq!(func.body.len(), 2);
        assert_eq!(ctx.values.get(v).unwrap().ty, i32t);
        assert_eq!(ctx.module(m).unwrap().functions, vec![f]);
    }

    #[test]
    fn test_instruction_without_position_fails() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let i32t = ctx.types.int(32);
        let mut b = IrBuilder::new(&mut ctx, m);
        assert_eq!(b.alloca(i32t), Err(IrError::NoInsertionPoint));
    }

    #[test]
    fn test_const_gep_result_type() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let i32t = ctx.types.int(32);
        let i8t = ctx.types.int(8);
        let chars = ctx.types.array_of(i8t, 4);
        let s = ctx.types.define_struct("struct.s", vec![i32t, chars]).unwrap();

        let mut b = IrBuilder::new(&mut ctx, m);
        let g = b.global("g", s).unwrap();
        let gep = b.const_gep(s, g, &[0, 1, 2]).unwrap();

        let i8p = ctx.types.pointer_to(i8t);
        assert_eq!(ctx.values.get(gep).unwrap().ty, i8p);
    }

    #[test]
    fn test_duplicate_definition_is_rejected() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let i32t = ctx.types.int(32);
        let mut b = IrBuilder::new(&mut ctx, m);
        b.global("x", i32t).unwrap();
        assert_eq!(b.global("x", i32t), Err(IrError::DuplicateSymbol("x".to_string())));
    }

    #[test]
    fn test_address_taken() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let void = ctx.types.void();
        let fn_ty = ctx.types.function(void, vec![], false);
        let fn_ptr = ctx.types.pointer_to(fn_ty);

        let mut b = IrBuilder::new(&mut ctx, m);
        let callee = b.function("callee", fn_ty).unwrap();
        let handler = b.function("handler", fn_ty).unwrap();
        let caller = b.function("caller", fn_ty).unwrap();
        b.position_at_end(caller).unwrap();
        b.call(callee, vec![]).unwrap();
        let slot = b.alloca(fn_ptr).unwrap();
        b.store(handler, slot).unwrap();

        assert!(!ctx.values.has_address_taken(callee).unwrap());
        assert!(ctx.values.has_address_taken(handler).unwrap());
    }
}
