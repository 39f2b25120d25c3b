//! Modules and the program-wide context

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::data_layout::DataLayout;
use super::types::{Type, TypeId, TypeTable};
use super::values::{ConstExpr, Constant, InstOp, Value, ValueId, ValueKind, ValueTable};
use crate::errors::{IrError, IrResult};

/// One translation unit
#[derive(Debug, Clone, Default, Serialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<ValueId>,
    pub functions: Vec<ValueId>,
}

/// Every module of a program, sharing one type context and one value table
#[derive(Debug, Clone, Default, Serialize)]
pub struct IrContext {
    pub types: TypeTable,
    pub values: ValueTable,
    pub data_layout: DataLayout,
    modules: Vec<Module>,
    /// Defined globals and functions by symbol name
    #[serde(skip)]
    symbols: FxHashMap<String, ValueId>,
}

impl IrContext {
    pub fn new(data_layout: DataLayout) -> Self {
        Self {
            data_layout,
            ..Self::default()
        }
    }

    pub fn add_module(&mut self, name: impl Into<String>) -> usize {
        self.modules.push(Module {
            name: name.into(),
            ..Module::default()
        });
        self.modules.len() - 1
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, index: usize) -> IrResult<&Module> {
        self.modules.get(index).ok_or(IrError::UnknownModule(index))
    }

    pub(crate) fn module_mut(&mut self, index: usize) -> IrResult<&mut Module> {
        self.modules
            .get_mut(index)
            .ok_or(IrError::UnknownModule(index))
    }

    pub fn value(&self, id: ValueId) -> IrResult<&Value> {
        self.values.get(id)
    }

    pub fn ty(&self, id: TypeId) -> IrResult<&Type> {
        self.types.get(id)
    }

    pub(crate) fn define_symbol(&mut self, name: &str, id: ValueId) -> IrResult<()> {
        if self.symbols.contains_key(name) {
            return Err(IrError::DuplicateSymbol(name.to_string()));
        }
        self.symbols.insert(name.to_string(), id);
        Ok(())
    }

    /// Definition of a declared global or function, possibly in another module
    pub fn definition_of(&self, declaration: ValueId) -> IrResult<Option<ValueId>> {
        let value = self.values.get(declaration)?;
        if !value.is_declaration() {
            return Ok(Some(declaration));
        }
        Ok(value
            .name
            .as_deref()
            .and_then(|name| self.symbols.get(name))
            .copied())
    }

    pub fn type_alloc_size(&self, ty: TypeId) -> IrResult<Option<u64>> {
        self.data_layout.type_alloc_size(&self.types, ty)
    }

    /// Every struct type reachable from the module's globals, functions and
    /// instructions, in discovery order
    pub fn used_struct_types(&self, module: usize) -> IrResult<Vec<TypeId>> {
        let mut finder = TypeFinder::new(&self.types);
        let module = self.module(module)?;

        for &global in &module.globals {
            let value = self.values.get(global)?;
            finder.visit(value.ty)?;
            if let Some(g) = value.as_global() {
                finder.visit(g.value_type)?;
            }
        }
        for &func in &module.functions {
            let value = self.values.get(func)?;
            finder.visit(value.ty)?;
            let Some(f) = value.as_function() else {
                continue;
            };
            finder.visit(f.fn_type)?;
            for &arg in &f.args {
                finder.visit(self.values.get(arg)?.ty)?;
            }
            for &inst in &f.body {
                let value = self.values.get(inst)?;
                finder.visit(value.ty)?;
                match value.as_instruction() {
                    Some(InstOp::Alloca { allocated }) => finder.visit(*allocated)?,
                    Some(InstOp::GetElementPtr(gep)) => finder.visit(gep.source_element)?,
                    _ => {}
                }
                if let Some(op) = value.as_instruction() {
                    for operand in op.operands() {
                        self.visit_constant(&mut finder, operand)?;
                    }
                }
            }
        }
        Ok(finder.found)
    }

    fn visit_constant(&self, finder: &mut TypeFinder<'_>, id: ValueId) -> IrResult<()> {
        if !finder.seen_values.insert(id) {
            return Ok(());
        }
        let value = self.values.get(id)?;
        let ValueKind::Constant(constant) = &value.kind else {
            return Ok(());
        };
        finder.visit(value.ty)?;
        if let Constant::Expr(expr) = constant {
            if let ConstExpr::GetElementPtr(gep) = expr {
                finder.visit(gep.source_element)?;
            }
            for operand in expr.operands() {
                self.visit_constant(finder, operand)?;
            }
        }
        Ok(())
    }
}

struct TypeFinder<'a> {
    types: &'a TypeTable,
    visited: FxHashSet<TypeId>,
    seen_values: FxHashSet<ValueId>,
    found: Vec<TypeId>,
}

impl<'a> TypeFinder<'a> {
    fn new(types: &'a TypeTable) -> Self {
        Self {
            types,
            visited: FxHashSet::default(),
            seen_values: FxHashSet::default(),
            found: Vec::new(),
        }
    }

    fn visit(&mut self, root: TypeId) -> IrResult<()> {
        let mut stack = vec![root];
        while let Some(ty) = stack.pop() {
            if !self.visited.insert(ty) {
                continue;
            }
            match self.types.get(ty)? {
                Type::Pointer { pointee } => stack.push(*pointee),
                Type::Array { element, .. } => stack.push(*element),
                Type::Function(func) => {
                    stack.push(func.ret);
                    stack.extend(func.params.iter().rev());
                }
                Type::Struct(st) => {
                    self.found.push(ty);
                    stack.extend(st.fields().iter().rev());
                }
                Type::Void | Type::Integer { .. } | Type::Float { .. } => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir::IrBuilder;

    #[test]
    fn test_used_struct_types_follows_pointers() {
        let mut ctx = IrContext::new(DataLayout::default());
        let m = ctx.add_module("a.o");
        let i32t = ctx.types.int(32);
        let list = ctx.types.named_struct("struct.list");
        let list_ptr = ctx.types.pointer_to(list);
        ctx.types.set_body(list, vec![list_ptr, i32t], false).unwrap();
        let unused = ctx.types.define_struct("struct.unused", vec![i32t]).unwrap();

        let mut b = IrBuilder::new(&mut ctx, m);
        b.global("head", list_ptr).unwrap();

        let used = ctx.used_struct_types(m).unwrap();
        assert_eq!(used, vec![list]);
        assert!(!used.contains(&unused));
    }

    #[test]
    fn test_definition_of_crosses_modules() {
        let mut ctx = IrContext::new(DataLayout::default());
        let a = ctx.add_module("a.o");
        let b = ctx.add_module("b.o");
        let i32t = ctx.types.int(32);

        let decl = IrBuilder::new(&mut ctx, a).declare_global("jiffies", i32t).unwrap();
        let def = IrBuilder::new(&mut ctx, b).global("jiffies", i32t).unwrap();
        let missing = IrBuilder::new(&mut ctx, a).declare_global("nowhere", i32t).unwrap();

        assert_eq!(ctx.definition_of(decl).unwrap(), Some(def));
        assert_eq!(ctx.definition_of(def).unwrap(), Some(def));
        assert_eq!(ctx.definition_of(missing).unwrap(), None);
    }
}
