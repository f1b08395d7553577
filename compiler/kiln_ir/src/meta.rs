//! Host-provided type, field and method metadata.
//!
//! The compiler never mutates metadata: a [`HostTypes`] table is built once by
//! the runtime and then shared read-only (it is `Sync`) by every compilation
//! that runs concurrently. Field order is the contract the virtual object
//! model relies on: [`HostTypes::instance_fields`] always lists supertype
//! fields before declared fields, each group in declaration order.

use std::fmt;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Index of a type in a [`HostTypes`] table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a field in a [`HostTypes`] table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FieldId(u32);

impl FieldId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a method in a [`HostTypes`] table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MethodId(u32);

impl MethodId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Kinds ───────────────────────────────────────────────────────────

/// Storage kind of a field or array element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl StorageKind {
    /// The kind a value of this storage kind has once loaded.
    ///
    /// Sub-word integer kinds widen to [`ValueKind::Int`].
    pub fn stack_kind(self) -> ValueKind {
        match self {
            StorageKind::Boolean
            | StorageKind::Byte
            | StorageKind::Short
            | StorageKind::Char
            | StorageKind::Int => ValueKind::Int,
            StorageKind::Long => ValueKind::Long,
            StorageKind::Float => ValueKind::Float,
            StorageKind::Double => ValueKind::Double,
            StorageKind::Object => ValueKind::Object,
        }
    }

    /// Size in bytes when stored in an object or array.
    pub fn size_in_bytes(self) -> u32 {
        match self {
            StorageKind::Boolean | StorageKind::Byte => 1,
            StorageKind::Short | StorageKind::Char => 2,
            StorageKind::Int | StorageKind::Float => 4,
            StorageKind::Long | StorageKind::Double | StorageKind::Object => 8,
        }
    }
}

/// The kind of value a node produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value (control flow, stores, monitors).
    Void,
    Int,
    Long,
    Float,
    Double,
    Object,
}

// ── Descriptors ─────────────────────────────────────────────────────

/// Size of the object header preceding the first instance field.
pub const OBJECT_HEADER_SIZE: u32 = 16;

#[derive(Clone, Debug)]
pub struct TypeDesc {
    pub name: String,
    pub superclass: Option<TypeId>,
    /// Fields declared by this type itself, in declaration order.
    pub declared_fields: Vec<FieldId>,
    /// Total instance size in bytes, header included.
    pub instance_size: u32,
}

#[derive(Clone, Debug)]
pub struct FieldDesc {
    pub name: String,
    pub holder: TypeId,
    pub kind: StorageKind,
    /// Byte offset from the start of the object.
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct MethodDesc {
    pub name: String,
    pub return_kind: ValueKind,
}

/// Immutable host metadata shared by all compilations.
#[derive(Clone, Debug, Default)]
pub struct HostTypes {
    types: Vec<TypeDesc>,
    fields: Vec<FieldDesc>,
    methods: Vec<MethodDesc>,
}

impl HostTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a type with the given declared fields.
    ///
    /// Offsets continue after the superclass layout, each field aligned to
    /// its own size.
    pub fn define_type(
        &mut self,
        name: &str,
        superclass: Option<TypeId>,
        fields: &[(&str, StorageKind)],
    ) -> TypeId {
        let ty = TypeId::new(
            u32::try_from(self.types.len()).unwrap_or_else(|_| panic!("type count exceeds u32")),
        );
        let mut offset =
            superclass.map_or(OBJECT_HEADER_SIZE, |s| self.types[s.index()].instance_size);
        let mut declared = Vec::with_capacity(fields.len());
        for &(field_name, kind) in fields {
            let size = kind.size_in_bytes();
            offset = offset.next_multiple_of(size);
            let id = FieldId::new(
                u32::try_from(self.fields.len())
                    .unwrap_or_else(|_| panic!("field count exceeds u32")),
            );
            self.fields.push(FieldDesc {
                name: field_name.to_owned(),
                holder: ty,
                kind,
                offset,
            });
            declared.push(id);
            offset += size;
        }
        self.types.push(TypeDesc {
            name: name.to_owned(),
            superclass,
            declared_fields: declared,
            instance_size: offset.next_multiple_of(8),
        });
        ty
    }

    pub fn define_method(&mut self, name: &str, return_kind: ValueKind) -> MethodId {
        let id = MethodId::new(
            u32::try_from(self.methods.len())
                .unwrap_or_else(|_| panic!("method count exceeds u32")),
        );
        self.methods.push(MethodDesc {
            name: name.to_owned(),
            return_kind,
        });
        id
    }

    #[inline]
    pub fn type_desc(&self, ty: TypeId) -> &TypeDesc {
        &self.types[ty.index()]
    }

    #[inline]
    pub fn field(&self, field: FieldId) -> &FieldDesc {
        &self.fields[field.index()]
    }

    #[inline]
    pub fn method(&self, method: MethodId) -> &MethodDesc {
        &self.methods[method.index()]
    }

    /// All instance fields of `ty`, supertype fields first.
    pub fn instance_fields(&self, ty: TypeId) -> Vec<FieldId> {
        let mut chain = Vec::new();
        let mut current = Some(ty);
        while let Some(t) = current {
            chain.push(t);
            current = self.types[t.index()].superclass;
        }
        chain
            .iter()
            .rev()
            .flat_map(|t| self.types[t.index()].declared_fields.iter().copied())
            .collect()
    }

    pub fn find_instance_field_with_offset(&self, ty: TypeId, offset: u32) -> Option<FieldId> {
        self.instance_fields(ty)
            .into_iter()
            .find(|&f| self.fields[f.index()].offset == offset)
    }

    /// Returns `true` if `sub` is `sup` or inherits from it.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(t) = current {
            if t == sup {
                return true;
            }
            current = self.types[t.index()].superclass;
        }
        false
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}
