//! Value table
//!
//! Globals, functions, arguments, instructions and constants. Every value
//! records its users so passes can walk def-use edges in both directions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::TypeId;
use crate::errors::{IrError, IrResult};

/// Index into the [`ValueTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    BitCast,
    AddrSpaceCast,
    IntToPtr,
    PtrToInt,
    Trunc,
    ZExt,
    SExt,
    Other,
}

impl CastKind {
    /// Casts that keep the pointer value unchanged
    pub fn is_pointer_preserving(self) -> bool {
        matches!(self, CastKind::BitCast | CastKind::AddrSpaceCast)
    }
}

/// Operands of a `getelementptr`, shared by the instruction and the
/// constant expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GepOperands {
    pub source_element: TypeId,
    pub base: ValueId,
    pub indices: Vec<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstExpr {
    GetElementPtr(GepOperands),
    Cast { kind: CastKind, src: ValueId },
    Other { opcode: String, operands: Vec<ValueId> },
}

impl ConstExpr {
    pub fn opcode(&self) -> &str {
        match self {
            ConstExpr::GetElementPtr(_) => "getelementptr",
            ConstExpr::Cast { kind, .. } => cast_opcode(*kind),
            ConstExpr::Other { opcode, .. } => opcode,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            ConstExpr::GetElementPtr(gep) => gep.operands(),
            ConstExpr::Cast { src, .. } => vec![*src],
            ConstExpr::Other { operands, .. } => operands.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Undef,
    Int(i64),
    BlockAddress,
    Expr(ConstExpr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstOp {
    Alloca { allocated: TypeId },
    Call { callee: ValueId, args: Vec<ValueId> },
    Cast { kind: CastKind, src: ValueId },
    GetElementPtr(GepOperands),
    Load { ptr: ValueId },
    Store { value: ValueId, ptr: ValueId },
    Phi { incoming: Vec<ValueId> },
    Ret { value: Option<ValueId> },
    Other { opcode: String, operands: Vec<ValueId> },
}

impl InstOp {
    pub fn opcode(&self) -> &str {
        match self {
            InstOp::Alloca { .. } => "alloca",
            InstOp::Call { .. } => "call",
            InstOp::Cast { kind, .. } => cast_opcode(*kind),
            InstOp::GetElementPtr(_) => "getelementptr",
            InstOp::Load { .. } => "load",
            InstOp::Store { .. } => "store",
            InstOp::Phi { .. } => "phi",
            InstOp::Ret { .. } => "ret",
            InstOp::Other { opcode, .. } => opcode,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstOp::Alloca { .. } => Vec::new(),
            InstOp::Call { callee, args } => std::iter::once(*callee).chain(args.iter().copied()).collect(),
            InstOp::Cast { src, .. } => vec![*src],
            InstOp::GetElementPtr(gep) => gep.operands(),
            InstOp::Load { ptr } => vec![*ptr],
            InstOp::Store { value, ptr } => vec![*value, *ptr],
            InstOp::Phi { incoming } => incoming.clone(),
            InstOp::Ret { value } => value.iter().copied().collect(),
            InstOp::Other { operands, .. } => operands.clone(),
        }
    }
}

impl GepOperands {
    pub fn operands(&self) -> Vec<ValueId> {
        std::iter::once(self.base).chain(self.indices.iter().copied()).collect()
    }
}

fn cast_opcode(kind: CastKind) -> &'static str {
    match kind {
        CastKind::BitCast => "bitcast",
        CastKind::AddrSpaceCast => "addrspacecast",
        CastKind::IntToPtr => "inttoptr",
        CastKind::PtrToInt => "ptrtoint",
        CastKind::Trunc => "trunc",
        CastKind::ZExt => "zext",
        CastKind::SExt => "sext",
        CastKind::Other => "cast",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub value_type: TypeId,
    pub is_declaration: bool,
    pub module: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub fn_type: TypeId,
    pub is_declaration: bool,
    pub args: Vec<ValueId>,
    pub body: Vec<ValueId>,
    pub module: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Global(GlobalVariable),
    Function(Function),
    Argument { parent: ValueId, index: u32 },
    Instruction { parent: ValueId, op: InstOp },
    Constant(Constant),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub ty: TypeId,
    pub name: Option<String>,
    pub kind: ValueKind,
    users: Vec<ValueId>,
}

impl Value {
    pub fn new(ty: TypeId, name: Option<String>, kind: ValueKind) -> Self {
        Self {
            ty,
            name,
            kind,
            users: Vec::new(),
        }
    }

    pub fn users(&self) -> &[ValueId] {
        &self.users
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ValueKind::Constant(_))
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            ValueKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&GlobalVariable> {
        match &self.kind {
            ValueKind::Global(global) => Some(global),
            _ => None,
        }
    }

    pub fn as_instruction(&self) -> Option<&InstOp> {
        match &self.kind {
            ValueKind::Instruction { op, .. } => Some(op),
            _ => None,
        }
    }

    pub fn as_const_expr(&self) -> Option<&ConstExpr> {
        match &self.kind {
            ValueKind::Constant(Constant::Expr(expr)) => Some(expr),
            _ => None,
        }
    }

    /// `llvm.*` functions never get nodes
    pub fn is_intrinsic(&self) -> bool {
        matches!(self.kind, ValueKind::Function(_))
            && self.name.as_deref().is_some_and(|n| n.starts_with("llvm."))
    }

    pub fn is_declaration(&self) -> bool {
        match &self.kind {
            ValueKind::Global(global) => global.is_declaration,
            ValueKind::Function(func) => func.is_declaration,
            _ => false,
        }
    }

    fn operands(&self) -> Vec<ValueId> {
        match &self.kind {
            ValueKind::Instruction { op, .. } => op.operands(),
            ValueKind::Constant(Constant::Expr(expr)) => expr.operands(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueTable {
    values: Vec<Value>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and register it as a user of its operands
    pub fn push(&mut self, value: Value) -> IrResult<ValueId> {
        let id = ValueId(self.values.len() as u32);
        let operands = value.operands();
        for &operand in &operands {
            if operand.0 as usize >= self.values.len() {
                return Err(IrError::UnknownValue(operand));
            }
        }
        for operand in operands {
            let users = &mut self.values[operand.0 as usize].users;
            if !users.contains(&id) {
                users.push(id);
            }
        }
        self.values.push(value);
        Ok(id)
    }

    pub fn get(&self, id: ValueId) -> IrResult<&Value> {
        self.values
            .get(id.0 as usize)
            .ok_or(IrError::UnknownValue(id))
    }

    pub(crate) fn get_mut(&mut self, id: ValueId) -> IrResult<&mut Value> {
        self.values
            .get_mut(id.0 as usize)
            .ok_or(IrError::UnknownValue(id))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId(i as u32), v))
    }

    /// Constant integer value, if `id` is one
    pub fn const_int(&self, id: ValueId) -> Option<i64> {
        match self.values.get(id.0 as usize).map(|v| &v.kind) {
            Some(ValueKind::Constant(Constant::Int(i))) => Some(*i),
            _ => None,
        }
    }

    /// A function's address is taken when it is used other than as the
    /// callee of a direct call
    pub fn has_address_taken(&self, func: ValueId) -> IrResult<bool> {
        for &user in self.get(func)?.users() {
            match &self.get(user)?.kind {
                ValueKind::Instruction {
                    op: InstOp::Call { callee, args },
                    ..
                } if *callee == func && !args.contains(&func) => {}
                _ => return Ok(true),
            }
        }
        Ok(false)
    }

    /// Callee of a direct call, looking through pointer-preserving casts
    pub fn called_function(&self, call: ValueId) -> IrResult<Option<ValueId>> {
        let Some(InstOp::Call { callee, .. }) = self.get(call)?.as_instruction() else {
            return Ok(None);
        };
        let target = self.strip_pointer_casts(*callee)?;
        Ok(self.get(target)?.as_function().map(|_| target))
    }

    /// Strip bitcasts, address-space casts and all-zero GEPs
    pub fn strip_pointer_casts(&self, mut id: ValueId) -> IrResult<ValueId> {
        loop {
            let value = self.get(id)?;
            let next = match &value.kind {
                ValueKind::Instruction {
                    op: InstOp::Cast { kind, src },
                    ..
                } if kind.is_pointer_preserving() => Some(*src),
                ValueKind::Constant(Constant::Expr(ConstExpr::Cast { kind, src }))
                    if kind.is_pointer_preserving() =>
                {
                    Some(*src)
                }
                ValueKind::Instruction {
                    op: InstOp::GetElementPtr(gep),
                    ..
                }
                | ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr(gep)))
                    if self.all_zero_indices(&gep.indices) =>
                {
                    Some(gep.base)
                }
                _ => None,
            };
            match next {
                Some(src) => id = src,
                None => return Ok(id),
            }
        }
    }

    fn all_zero_indices(&self, indices: &[ValueId]) -> bool {
        indices.iter().all(|&i| self.const_int(i) == Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(table: &mut ValueTable, c: Constant) -> ValueId {
        table
            .push(Value::new(TypeId(0), None, ValueKind::Constant(c)))
            .unwrap()
    }

    #[test]
    fn test_push_records_users() {
        let mut table = ValueTable::new();
        let src = constant(&mut table, Constant::Null);
        let cast = constant(
            &mut table,
            Constant::Expr(ConstExpr::Cast {
                kind: CastKind::BitCast,
                src,
            }),
        );
        assert_eq!(table.get(src).unwrap().users(), &[cast]);
        assert_eq!(table.strip_pointer_casts(cast).unwrap(), src);
    }

    #[test]
    fn test_push_rejects_forward_operands() {
        let mut table = ValueTable::new();
        let err = table.push(Value::new(
            TypeId(0),
            None,
            ValueKind::Constant(Constant::Expr(ConstExpr::Cast {
                kind: CastKind::BitCast,
                src: ValueId(7),
            })),
        ));
        assert_eq!(err, Err(IrError::UnknownValue(ValueId(7))));
    }

    #[test]
    fn test_zero_gep_is_stripped() {
        let mut table = ValueTable::new();
        let base = constant(&mut table, Constant::Null);
        let zero = constant(&mut table, Constant::Int(0));
        let one = constant(&mut table, Constant::Int(1));
        let zero_gep = constant(
            &mut table,
            Constant::Expr(ConstExpr::GetElementPtr(GepOperands {
                source_element: TypeId(0),
                base,
                indices: vec![zero, zero],
            })),
        );
        let field_gep = constant(
            &mut table,
            Constant::Expr(ConstExpr::GetElementPtr(GepOperands {
                source_element: TypeId(0),
                base,
                indices: vec![zero, one],
            })),
        );
        assert_eq!(table.strip_pointer_casts(zero_gep).unwrap(), base);
        assert_eq!(table.strip_pointer_casts(field_gep).unwrap(), field_gep);
    }
}
