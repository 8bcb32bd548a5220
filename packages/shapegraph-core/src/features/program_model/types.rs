//! Type interning context
//!
//! `TypeTable` is owned by the program (and therefore by the analysis session);
//! builders get it by `&mut`. Scalar, pointer and array types are interned
//! structurally, structs nominally so that recursive types can be declared
//! before their layout is known.

use crate::shared::models::{EngineError, EngineResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Size of every pointer (and function pointer) in bytes
pub const PTR_SIZE: i64 = 8;

/// Dense handle into a [`TypeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub offset: i64,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Void,
    Int { size: u32 },
    Bool,
    Ptr { target: TypeId },
    Struct { name: String, fields: Vec<StructField> },
    Array { elem: TypeId, len: u32 },
    Fnc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Void,
    Int(u32),
    Bool,
    Ptr(TypeId),
    Struct(String),
    Array(TypeId, u32),
    Fnc,
}

#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
    index: FxHashMap<TypeKey, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            index: FxHashMap::default(),
        };
        // index 0 is always void, used as fallback for dangling ids
        table.intern(TypeKey::Void, TypeInfo { kind: TypeKind::Void, size: 0 });
        table
    }

    fn intern(&mut self, key: TypeKey, info: TypeInfo) -> TypeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(info);
        self.index.insert(key, id);
        id
    }

    pub fn void(&self) -> TypeId {
        TypeId(0)
    }

    pub fn int(&mut self, size: u32) -> TypeId {
        self.intern(
            TypeKey::Int(size),
            TypeInfo {
                kind: TypeKind::Int { size },
                size: i64::from(size),
            },
        )
    }

    pub fn bool(&mut self) -> TypeId {
        self.intern(TypeKey::Bool, TypeInfo { kind: TypeKind::Bool, size: 1 })
    }

    pub fn ptr(&mut self, target: TypeId) -> TypeId {
        self.intern(
            TypeKey::Ptr(target),
            TypeInfo {
                kind: TypeKind::Ptr { target },
                size: PTR_SIZE,
            },
        )
    }

    pub fn fnc(&mut self) -> TypeId {
        self.intern(TypeKey::Fnc, TypeInfo { kind: TypeKind::Fnc, size: PTR_SIZE })
    }

    pub fn array(&mut self, elem: TypeId, len: u32) -> TypeId {
        let size = self.size_of(elem) * i64::from(len);
        self.intern(
            TypeKey::Array(elem, len),
            TypeInfo {
                kind: TypeKind::Array { elem, len },
                size,
            },
        )
    }

    /// Declare a (possibly recursive) struct; its layout is given by [`Self::define_struct`]
    pub fn declare_struct(&mut self, name: &str) -> TypeId {
        self.intern(
            TypeKey::Struct(name.to_string()),
            TypeInfo {
                kind: TypeKind::Struct {
                    name: name.to_string(),
                    fields: Vec::new(),
                },
                size: 0,
            },
        )
    }

    /// Lay out the fields of a declared struct with natural alignment
    pub fn define_struct(&mut self, id: TypeId, fields: &[(&str, TypeId)]) -> EngineResult<()> {
        let mut offset = 0i64;
        let mut max_align = 1i64;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (name, ty) in fields {
            let size = self.size_of(*ty);
            if size == 0 {
                return Err(EngineError::malformed(format!(
                    "field '{}' has incomplete type",
                    name
                )));
            }
            let align = self.align_of(*ty);
            max_align = max_align.max(align);
            offset = round_up(offset, align);
            laid_out.push(StructField {
                name: name.to_string(),
                offset,
                ty: *ty,
            });
            offset += size;
        }
        let size = round_up(offset, max_align);

        match self.types.get_mut(id.0 as usize) {
            Some(TypeInfo {
                kind: TypeKind::Struct { fields, .. },
                size: struct_size,
            }) if fields.is_empty() => {
                *fields = laid_out;
                *struct_size = size;
                Ok(())
            }
            _ => Err(EngineError::malformed(format!(
                "type {:?} is not an undefined struct",
                id
            ))),
        }
    }

    pub fn info(&self, id: TypeId) -> &TypeInfo {
        self.types.get(id.0 as usize).unwrap_or(&self.types[0])
    }

    pub fn contains(&self, id: TypeId) -> bool {
        (id.0 as usize) < self.types.len()
    }

    pub fn size_of(&self, id: TypeId) -> i64 {
        self.info(id).size
    }

    fn align_of(&self, id: TypeId) -> i64 {
        match &self.info(id).kind {
            TypeKind::Struct { fields, .. } => fields
                .iter()
                .map(|f| self.align_of(f.ty))
                .max()
                .unwrap_or(1),
            TypeKind::Array { elem, .. } => self.align_of(*elem),
            _ => self.size_of(id).clamp(1, PTR_SIZE),
        }
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.info(id).kind {
            TypeKind::Ptr { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_ptr(&self, id: TypeId) -> bool {
        matches!(self.info(id).kind, TypeKind::Ptr { .. } | TypeKind::Fnc)
    }

    pub fn is_composite(&self, id: TypeId) -> bool {
        matches!(
            self.info(id).kind,
            TypeKind::Struct { .. } | TypeKind::Array { .. }
        )
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.info(id).kind, TypeKind::Bool)
    }

    /// Field `idx` of a struct type
    pub fn field(&self, id: TypeId, idx: usize) -> Option<&StructField> {
        match &self.info(id).kind {
            TypeKind::Struct { fields, .. } => fields.get(idx),
            _ => None,
        }
    }

    pub fn array_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.info(id).kind {
            TypeKind::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Direct sub-objects of a composite type as `(offset, type)` pairs
    pub fn children(&self, id: TypeId) -> Vec<(i64, TypeId)> {
        match &self.info(id).kind {
            TypeKind::Struct { fields, .. } => fields.iter().map(|f| (f.offset, f.ty)).collect(),
            TypeKind::Array { elem, len } => {
                let elem_size = self.size_of(*elem);
                (0..i64::from(*len)).map(|i| (i * elem_size, *elem)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Every scalar leaf of a type as `(offset, type)` pairs, depth first
    pub fn scalar_leaves(&self, id: TypeId) -> Vec<(i64, TypeId)> {
        let mut leaves = Vec::new();
        self.collect_leaves(id, 0, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, id: TypeId, base: i64, out: &mut Vec<(i64, TypeId)>) {
        if !self.is_composite(id) {
            out.push((base, id));
            return;
        }
        for (off, ty) in self.children(id) {
            self.collect_leaves(ty, base + off, out);
        }
    }

    pub fn name(&self, id: TypeId) -> String {
        match &self.info(id).kind {
            TypeKind::Void => "void".to_string(),
            TypeKind::Int { size } => format!("int{}", size * 8),
            TypeKind::Bool => "bool".to_string(),
            TypeKind::Ptr { target } => format!("{}*", self.name(*target)),
            TypeKind::Struct { name, .. } => format!("struct {}", name),
            TypeKind::Array { elem, len } => format!("{}[{}]", self.name(*elem), len),
            TypeKind::Fnc => "fnc".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(value: i64, align: i64) -> i64 {
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_interning() {
        let mut types = TypeTable::new();
        let int = types.int(4);
        assert_eq!(types.int(4), int);
        assert_eq!(types.ptr(int), types.ptr(int));
        assert_ne!(types.ptr(int), int);
    }

    #[test]
    fn test_recursive_struct_layout() {
        let mut types = TypeTable::new();
        let node = types.declare_struct("node");
        let node_ptr = types.ptr(node);
        let int = types.int(4);
        types
            .define_struct(node, &[("data", int), ("next", node_ptr)])
            .unwrap();

        assert_eq!(types.size_of(node), 16);
        assert_eq!(types.field(node, 1).unwrap().offset, 8);
        assert_eq!(types.pointee(node_ptr), Some(node));
        assert_eq!(types.name(node_ptr), "struct node*");
    }

    #[test]
    fn test_define_struct_twice_fails() {
        let mut types = TypeTable::new();
        let s = types.declare_struct("s");
        let int = types.int(4);
        types.define_struct(s, &[("a", int)]).unwrap();
        assert!(types.define_struct(s, &[("a", int)]).is_err());
    }

    #[test]
    fn test_scalar_leaves_of_nested_struct() {
        let mut types = TypeTable::new();
        let int = types.int(4);
        let inner = types.declare_struct("inner");
        types.define_struct(inner, &[("x", int), ("y", int)]).unwrap();
        let outer = types.declare_struct("outer");
        types.define_struct(outer, &[("a", int), ("in", inner)]).unwrap();

        assert_eq!(types.scalar_leaves(outer), vec![(0, int), (4, int), (8, int)]);
    }

    #[test]
    fn test_dangling_type_falls_back_to_void() {
        let types = TypeTable::new();
        assert_eq!(types.size_of(TypeId(99)), 0);
        assert!(!types.contains(TypeId(99)));
    }
}
