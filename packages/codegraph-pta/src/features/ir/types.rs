//! Type context
//!
//! Typed-pointer IR types shared by every module of a program. Unnamed types
//! are interned structurally; named structs are nominal and may be declared
//! opaque first and given a body later.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{IrError, IrResult};

/// Index into the [`TypeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// Struct or union type
///
/// `name == None` is a literal (structural) struct. A named struct with
/// `body == None` is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: Option<String>,
    pub body: Option<Vec<TypeId>>,
    pub packed: bool,
    pub is_union: bool,
}

impl StructType {
    pub fn is_opaque(&self) -> bool {
        self.body.is_none()
    }

    pub fn is_literal(&self) -> bool {
        self.name.is_none()
    }

    pub fn fields(&self) -> &[TypeId] {
        self.body.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub ret: TypeId,
    pub params: Vec<TypeId>,
    pub vararg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Integer { bits: u32 },
    Float { bits: u32 },
    Pointer { pointee: TypeId },
    Array { element: TypeId, len: u64 },
    Struct(StructType),
    Function(FunctionType),
}

/// Owner of every type in an [`IrContext`](super::IrContext)
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeTable {
    types: Vec<Type>,
    #[serde(skip)]
    interned: FxHashMap<Type, TypeId>,
    #[serde(skip)]
    named: FxHashMap<String, TypeId>,
    #[serde(skip)]
    rename_counter: u32,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = self.push(ty.clone());
        self.interned.insert(ty, id);
        id
    }

    pub fn void(&mut self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn int(&mut self, bits: u32) -> TypeId {
        self.intern(Type::Integer { bits })
    }

    pub fn float(&mut self, bits: u32) -> TypeId {
        self.intern(Type::Float { bits })
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer { pointee })
    }

    pub fn array_of(&mut self, element: TypeId, len: u64) -> TypeId {
        self.intern(Type::Array { element, len })
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>, vararg: bool) -> TypeId {
        self.intern(Type::Function(FunctionType { ret, params, vararg }))
    }

    /// Structural struct type, interned by its field list
    pub fn literal_struct(&mut self, fields: Vec<TypeId>, packed: bool) -> TypeId {
        self.intern(Type::Struct(StructType {
            name: None,
            body: Some(fields),
            packed,
            is_union: false,
        }))
    }

    /// Declare an opaque named struct
    ///
    /// A name already in use gets a `.N` suffix, the way separately compiled
    /// translation units end up with `struct.foo` and `struct.foo.12`.
    pub fn named_struct(&mut self, name: &str) -> TypeId {
        let mut unique = name.to_string();
        while self.named.contains_key(&unique) {
            unique = format!("{}.{}", name, self.rename_counter);
            self.rename_counter += 1;
        }
        let id = self.push(Type::Struct(StructType {
            name: Some(unique.clone()),
            body: None,
            packed: false,
            is_union: false,
        }));
        self.named.insert(unique, id);
        id
    }

    /// Give a named struct its body
    pub fn set_body(&mut self, id: TypeId, fields: Vec<TypeId>, packed: bool) -> IrResult<()> {
        match self.types.get_mut(id.0 as usize) {
            Some(Type::Struct(st)) if st.name.is_some() => {
                if st.body.is_some() {
                    return Err(IrError::BodyAlreadySet(id));
                }
                st.body = Some(fields);
                st.packed = packed;
                Ok(())
            }
            Some(_) => Err(IrError::NotANamedStruct(id)),
            None => Err(IrError::UnknownType(id)),
        }
    }

    /// Declare a named struct with a body in one step
    pub fn define_struct(&mut self, name: &str, fields: Vec<TypeId>) -> IrResult<TypeId> {
        let id = self.named_struct(name);
        self.set_body(id, fields, false)?;
        Ok(id)
    }

    /// Declare a named union: every member starts at offset 0
    pub fn define_union(&mut self, name: &str, members: Vec<TypeId>) -> IrResult<TypeId> {
        let id = self.define_struct(name, members)?;
        if let Some(Type::Struct(st)) = self.types.get_mut(id.0 as usize) {
            st.is_union = true;
        }
        Ok(id)
    }

    pub fn get(&self, id: TypeId) -> IrResult<&Type> {
        self.types
            .get(id.0 as usize)
            .ok_or(IrError::UnknownType(id))
    }

    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }

    pub fn as_struct(&self, id: TypeId) -> Option<&StructType> {
        match self.types.get(id.0 as usize) {
            Some(Type::Struct(st)) => Some(st),
            _ => None,
        }
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        self.as_struct(id).is_some()
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.types.get(id.0 as usize), Some(Type::Pointer { .. }))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.types.get(id.0 as usize), Some(Type::Array { .. }))
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.types.get(id.0 as usize), Some(Type::Void))
    }

    pub fn is_integer(&self, id: TypeId, bits: u32) -> bool {
        matches!(self.types.get(id.0 as usize), Some(Type::Integer { bits: b }) if *b == bits)
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.types.get(id.0 as usize) {
            Some(Type::Pointer { pointee }) => Some(*pointee),
            _ => None,
        }
    }

    /// Peel every array dimension: `[4 x [2 x T]]` becomes `T`
    pub fn strip_arrays(&self, mut id: TypeId) -> TypeId {
        while let Some(Type::Array { element, .. }) = self.types.get(id.0 as usize) {
            id = *element;
        }
        id
    }

    /// Total element count across every stripped array dimension
    pub fn array_element_count(&self, mut id: TypeId) -> u64 {
        let mut count = 1u64;
        while let Some(Type::Array { element, len }) = self.types.get(id.0 as usize) {
            count = count.saturating_mul(*len);
            id = *element;
        }
        count
    }

    pub fn struct_name(&self, id: TypeId) -> Option<&str> {
        self.as_struct(id).and_then(|st| st.name.as_deref())
    }

    /// Type reached by indexing `source` with the trailing GEP indices
    ///
    /// The first GEP index steps over whole `source` objects and is not part
    /// of `indices`. Struct steps need a constant index (`None` is rejected).
    pub fn indexed_type(&self, source: TypeId, indices: &[Option<i64>]) -> IrResult<TypeId> {
        let mut current = source;
        for index in indices {
            current = match self.get(current)? {
                Type::Struct(st) => {
                    let index = index.ok_or(IrError::NonConstantStructIndex(current))?;
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| st.fields().get(i).copied())
                        .ok_or(IrError::InvalidIndex { ty: current, index })?
                }
                Type::Array { element, .. } => *element,
                _ => return Err(IrError::NotIndexable(current)),
            };
        }
        Ok(current)
    }

    /// Human-readable rendering for logs
    pub fn display(&self, id: TypeId) -> String {
        match self.types.get(id.0 as usize) {
            None => id.to_string(),
            Some(Type::Void) => "void".to_string(),
            Some(Type::Integer { bits }) => format!("i{}", bits),
            Some(Type::Float { bits }) => format!("f{}", bits),
            Some(Type::Pointer { pointee }) => format!("{}*", self.display(*pointee)),
            Some(Type::Array { element, len }) => format!("[{} x {}]", len, self.display(*element)),
            Some(Type::Function(func)) => {
                let params: Vec<String> = func.params.iter().map(|p| self.display(*p)).collect();
                let dots = if func.vararg { ", ..." } else { "" };
                format!("{} ({}{})", self.display(func.ret), params.join(", "), dots)
            }
            Some(Type::Struct(st)) => match &st.name {
                Some(name) => format!("%{}", name),
                None => {
                    let fields: Vec<String> = st.fields().iter().map(|f| self.display(*f)).collect();
                    format!("{{ {} }}", fields.join(", "))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_types_are_interned() {
        let mut types = TypeTable::new();
        let a = types.int(32);
        let b = types.int(32);
        assert_eq!(a, b);

        let p1 = types.pointer_to(a);
        let p2 = types.pointer_to(b);
        assert_eq!(p1, p2);

        let s1 = types.literal_struct(vec![a, p1], false);
        let s2 = types.literal_struct(vec![a, p1], false);
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_named_structs_are_nominal() {
        let mut types = TypeTable::new();
        let a = types.named_struct("struct.foo");
        let b = types.named_struct("struct.foo");
        assert_ne!(a, b);
        assert_eq!(types.struct_name(a), Some("struct.foo"));
        assert_eq!(types.struct_name(b), Some("struct.foo.0"));
        assert_eq!(types.by_name("struct.foo.0"), Some(b));
    }

    #[test]
    fn test_set_body_once() {
        let mut types = TypeTable::new();
        let i8t = types.int(8);
        let s = types.named_struct("struct.buf");
        assert!(types.as_struct(s).map(StructType::is_opaque).unwrap_or(false));

        types.set_body(s, vec![i8t], false).unwrap();
        assert_eq!(types.set_body(s, vec![i8t], false), Err(IrError::BodyAlreadySet(s)));
        assert_eq!(types.set_body(i8t, vec![], false), Err(IrError::NotANamedStruct(i8t)));
    }

    #[test]
    fn test_strip_arrays() {
        let mut types = TypeTable::new();
        let i16t = types.int(16);
        let inner = types.array_of(i16t, 4);
        let outer = types.array_of(inner, 3);
        assert_eq!(types.strip_arrays(outer), i16t);
        assert_eq!(types.array_element_count(outer), 12);
        assert_eq!(types.strip_arrays(i16t), i16t);
    }

    #[test]
    fn test_indexed_type() {
        let mut types = TypeTable::new();
        let i32t = types.int(32);
        let i8t = types.int(8);
        let arr = types.array_of(i8t, 4);
        let s = types.define_struct("struct.s", vec![i32t, arr]).unwrap();

        assert_eq!(types.indexed_type(s, &[Some(1), None]).unwrap(), i8t);
        assert_eq!(types.indexed_type(s, &[Some(0)]).unwrap(), i32t);
        assert_eq!(
            types.indexed_type(s, &[Some(2)]),
            Err(IrError::InvalidIndex { ty: s, index: 2 })
        );
        assert_eq!(
            types.indexed_type(s, &[None]),
            Err(IrError::NonConstantStructIndex(s))
        );
    }

    #[test]
    fn test_display() {
        let mut types = TypeTable::new();
        let i32t = types.int(32);
        let p = types.pointer_to(i32t);
        let s = types.literal_struct(vec![i32t, p], false);
        assert_eq!(types.display(s), "{ i32, i32* }");
    }
}
