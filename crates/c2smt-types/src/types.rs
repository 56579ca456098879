//! Simplified C type system
//!
//! Types entering the pointer-aliasing core are *simplified*: typedefs are
//! resolved and `const`/`volatile` qualifiers are stripped everywhere. Equality
//! is structural, which makes simplified types usable as map keys and region
//! discriminators.
//!
//! ## Data Model
//!
//! We use the LP64 data model (common on 64-bit Unix):
//! - char: 1 byte
//! - short: 2 bytes
//! - int: 4 bytes
//! - long: 8 bytes
//! - long long: 8 bytes
//! - pointer: 8 bytes
//!
//! Struct layout follows the natural-alignment rules of C11.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a data pointer in bytes (LP64)
pub const POINTER_SIZE: usize = 8;

/// Integer kinds in C
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntKind {
    /// _Bool / bool (1 byte, C99+)
    Bool,
    /// char (1 byte)
    Char,
    /// short (2 bytes)
    Short,
    /// int (4 bytes)
    Int,
    /// long (8 bytes on LP64)
    Long,
    /// long long (8 bytes)
    LongLong,
}

impl IntKind {
    /// Size in bytes (LP64 model)
    pub fn size(&self) -> usize {
        match self {
            IntKind::Bool | IntKind::Char => 1,
            IntKind::Short => 2,
            IntKind::Int => 4,
            IntKind::Long | IntKind::LongLong => 8,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            IntKind::Bool => "_Bool",
            IntKind::Char => "char",
            IntKind::Short => "short",
            IntKind::Int => "int",
            IntKind::Long => "long",
            IntKind::LongLong => "long long",
        }
    }
}

/// Floating-point kinds in C
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

impl FloatKind {
    /// Size in bytes
    pub fn size(&self) -> usize {
        match self {
            FloatKind::Float => 4,
            FloatKind::Double => 8,
            FloatKind::LongDouble => 16,
        }
    }
}

/// Signedness of integer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// A member of a struct or union
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: CType,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// C type representation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CType {
    /// void (incomplete type)
    Void,

    /// Integer types: char, short, int, long, long long, _Bool
    Int(IntKind, Signedness),

    /// Floating-point types: float, double, long double
    Float(FloatKind),

    /// Pointer to another type: T*
    Pointer(Box<CType>),

    /// Array type: `T[N]`, or `T[]` when the length is not a literal
    Array(Box<CType>, Option<usize>),

    /// Struct type: struct { ... }
    Struct {
        name: Option<String>,
        fields: Vec<StructField>,
    },

    /// Union type: union { ... }
    Union {
        name: Option<String>,
        fields: Vec<StructField>,
    },

    /// Enum type: enum { ... }
    Enum {
        name: Option<String>,
        variants: Vec<(String, i64)>,
    },

    /// Function type: RetT(T1, T2, ...)
    Function {
        return_type: Box<CType>,
        params: Vec<CType>,
        variadic: bool,
    },

    /// A typedef name together with the type it stands for
    TypeDef(String, Box<CType>),

    /// Qualified type (const, volatile)
    Qualified {
        ty: Box<CType>,
        is_const: bool,
        is_volatile: bool,
    },
}

impl CType {
    /// Create a signed int type
    pub fn int() -> Self {
        CType::Int(IntKind::Int, Signedness::Signed)
    }

    /// Create an unsigned int type
    pub fn uint() -> Self {
        CType::Int(IntKind::Int, Signedness::Unsigned)
    }

    /// Create a signed char type
    pub fn char() -> Self {
        CType::Int(IntKind::Char, Signedness::Signed)
    }

    /// Create an unsigned char type
    pub fn unsigned_char() -> Self {
        CType::Int(IntKind::Char, Signedness::Unsigned)
    }

    pub fn short() -> Self {
        CType::Int(IntKind::Short, Signedness::Signed)
    }

    pub fn long() -> Self {
        CType::Int(IntKind::Long, Signedness::Signed)
    }

    /// Create a size_t type (unsigned long on LP64)
    pub fn size_t() -> Self {
        CType::Int(IntKind::Long, Signedness::Unsigned)
    }

    /// Create a pointer type
    pub fn ptr(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }

    /// `void *`
    pub fn void_ptr() -> Self {
        CType::Pointer(Box::new(CType::Void))
    }

    /// Create an array type with a known length
    pub fn array(elem: CType, len: usize) -> Self {
        CType::Array(Box::new(elem), Some(len))
    }

    /// Create an array type without a literal length
    pub fn unsized_array(elem: CType) -> Self {
        CType::Array(Box::new(elem), None)
    }

    /// Create a named struct type
    pub fn structure(name: impl Into<String>, fields: Vec<StructField>) -> Self {
        CType::Struct {
            name: Some(name.into()),
            fields,
        }
    }

    /// Create a named union type
    pub fn union(name: impl Into<String>, fields: Vec<StructField>) -> Self {
        CType::Union {
            name: Some(name.into()),
            fields,
        }
    }

    /// Create a typedef alias for `target`
    pub fn typedef(name: impl Into<String>, target: CType) -> Self {
        CType::TypeDef(name.into(), Box::new(target))
    }

    /// Create a const-qualified type
    pub fn const_ty(ty: CType) -> Self {
        CType::Qualified {
            ty: Box::new(ty),
            is_const: true,
            is_volatile: false,
        }
    }

    /// Create a volatile-qualified type
    pub fn volatile_ty(ty: CType) -> Self {
        CType::Qualified {
            ty: Box::new(ty),
            is_const: false,
            is_volatile: true,
        }
    }

    /// Type of a "fake" base: an address-taken object whose type is not known yet.
    ///
    /// Modelled as a `void` array of the allocation size in bytes (or of
    /// unknown length), which no declared C object can have.
    pub fn fake_base(size: Option<usize>) -> Self {
        CType::Array(Box::new(CType::Void), size)
    }

    pub fn is_fake_base(&self) -> bool {
        matches!(self, CType::Array(elem, _) if elem.is_void())
    }

    /// Size in bytes. Incomplete types (void, `T[]`, functions) have size 0.
    pub fn size(&self) -> usize {
        match self {
            CType::Void | CType::Function { .. } => 0,
            CType::Int(kind, _) => kind.size(),
            CType::Float(kind) => kind.size(),
            CType::Pointer(_) => POINTER_SIZE,
            // void elements of fake bases count as bytes
            CType::Array(elem, len) if elem.is_void() => len.unwrap_or(0),
            CType::Array(elem, len) => elem.size() * len.unwrap_or(0),
            CType::Struct { fields, .. } => {
                let mut offset = 0usize;
                for field in fields {
                    offset = align_up(offset, field.ty.align());
                    offset += field.ty.size();
                }
                align_up(offset, self.align())
            }
            CType::Union { fields, .. } => {
                let max = fields.iter().map(|f| f.ty.size()).max().unwrap_or(0);
                align_up(max, self.align())
            }
            CType::Enum { .. } => 4,
            CType::TypeDef(_, target) => target.size(),
            CType::Qualified { ty, .. } => ty.size(),
        }
    }

    /// Alignment in bytes
    pub fn align(&self) -> usize {
        match self {
            CType::Void | CType::Function { .. } => 1,
            CType::Int(kind, _) => kind.size(),
            CType::Float(kind) => kind.size().min(16),
            CType::Pointer(_) => POINTER_SIZE,
            CType::Array(elem, _) => elem.align(),
            CType::Struct { fields, .. } | CType::Union { fields, .. } => {
                fields.iter().map(|f| f.ty.align()).max().unwrap_or(1)
            }
            CType::Enum { .. } => 4,
            CType::TypeDef(_, target) => target.align(),
            CType::Qualified { ty, .. } => ty.align(),
        }
    }

    /// Width in bits of a value of this type
    pub fn bit_width(&self) -> u32 {
        // Sizes are bounded by the array caps applied before encoding.
        (self.size() * 8) as u32
    }

    pub fn is_integer(&self) -> bool {
        match self {
            CType::Int(_, _) | CType::Enum { .. } => true,
            CType::TypeDef(_, t) => t.is_integer(),
            CType::Qualified { ty, .. } => ty.is_integer(),
            _ => false,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            CType::Int(IntKind::Bool, _) => false,
            CType::Int(_, s) => *s == Signedness::Signed,
            CType::Enum { .. } => true,
            CType::TypeDef(_, t) => t.is_signed(),
            CType::Qualified { ty, .. } => ty.is_signed(),
            _ => false,
        }
    }

    pub fn is_pointer(&self) -> bool {
        match self {
            CType::Pointer(_) => true,
            CType::TypeDef(_, t) => t.is_pointer(),
            CType::Qualified { ty, .. } => ty.is_pointer(),
            _ => false,
        }
    }

    pub fn is_array(&self) -> bool {
        match self {
            CType::Array(_, _) => true,
            CType::TypeDef(_, t) => t.is_array(),
            CType::Qualified { ty, .. } => ty.is_array(),
            _ => false,
        }
    }

    /// Struct or union
    pub fn is_composite(&self) -> bool {
        matches!(self, CType::Struct { .. } | CType::Union { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    /// Scalar types are stored as one heap cell (arithmetic, enum, pointer)
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            CType::Int(..) | CType::Float(_) | CType::Enum { .. } | CType::Pointer(_)
        )
    }

    /// `const` on the outermost level
    pub fn is_const(&self) -> bool {
        matches!(self, CType::Qualified { is_const: true, .. })
    }

    /// `volatile` on the outermost level
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            CType::Qualified {
                is_volatile: true,
                ..
            }
        )
    }

    /// Get the pointee type if this is a pointer
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(inner) => Some(inner),
            CType::TypeDef(_, t) => t.pointee(),
            CType::Qualified { ty, .. } => ty.pointee(),
            _ => None,
        }
    }

    /// Get the element type if this is an array
    pub fn element(&self) -> Option<&CType> {
        match self {
            CType::Array(elem, _) => Some(elem),
            CType::TypeDef(_, t) => t.element(),
            CType::Qualified { ty, .. } => ty.element(),
            _ => None,
        }
    }

    /// Members of a struct or union
    pub fn fields(&self) -> &[StructField] {
        match self {
            CType::Struct { fields, .. } | CType::Union { fields, .. } => fields,
            CType::TypeDef(_, t) => t.fields(),
            CType::Qualified { ty, .. } => ty.fields(),
            _ => &[],
        }
    }

    /// Get struct field by name
    pub fn get_field(&self, name: &str) -> Option<&StructField> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Byte offset of a member inside a struct or union
    pub fn field_offset(&self, name: &str) -> Option<usize> {
        match self {
            CType::Struct { fields, .. } => {
                let mut offset = 0usize;
                for field in fields {
                    offset = align_up(offset, field.ty.align());
                    if field.name == name {
                        return Some(offset);
                    }
                    offset += field.ty.size();
                }
                None
            }
            CType::Union { fields, .. } => fields.iter().any(|f| f.name == name).then_some(0),
            CType::TypeDef(_, t) => t.field_offset(name),
            CType::Qualified { ty, .. } => ty.field_offset(name),
            _ => None,
        }
    }

    /// Whether an array type occurs inside this type (outside of pointees).
    ///
    /// Variables of such types cannot be encoded as plain scalar symbols.
    pub fn contains_array(&self) -> bool {
        match self {
            CType::Array(..) => true,
            CType::Struct { fields, .. } | CType::Union { fields, .. } => {
                fields.iter().any(|f| f.ty.contains_array())
            }
            CType::TypeDef(_, t) => t.contains_array(),
            CType::Qualified { ty, .. } => ty.contains_array(),
            _ => false,
        }
    }

    /// Resolve typedefs everywhere while keeping qualifiers
    pub fn canonical(&self) -> CType {
        self.rebuild(false)
    }

    /// Resolve typedefs and strip `const`/`volatile` everywhere
    pub fn simplified(&self) -> CType {
        self.rebuild(true)
    }

    fn rebuild(&self, strip_qualifiers: bool) -> CType {
        let map_fields = |fields: &[StructField]| {
            fields
                .iter()
                .map(|f| StructField::new(f.name.clone(), f.ty.rebuild(strip_qualifiers)))
                .collect::<Vec<_>>()
        };
        match self {
            CType::Void | CType::Int(..) | CType::Float(_) | CType::Enum { .. } => self.clone(),
            CType::Pointer(inner) => CType::Pointer(Box::new(inner.rebuild(strip_qualifiers))),
            CType::Array(elem, len) => CType::Array(Box::new(elem.rebuild(strip_qualifiers)), *len),
            CType::Struct { name, fields } => CType::Struct {
                name: name.clone(),
                fields: map_fields(fields),
            },
            CType::Union { name, fields } => CType::Union {
                name: name.clone(),
                fields: map_fields(fields),
            },
            CType::Function {
                return_type,
                params,
                variadic,
            } => CType::Function {
                return_type: Box::new(return_type.rebuild(strip_qualifiers)),
                params: params.iter().map(|p| p.rebuild(strip_qualifiers)).collect(),
                variadic: *variadic,
            },
            CType::TypeDef(_, target) => target.rebuild(strip_qualifiers),
            CType::Qualified {
                ty,
                is_const,
                is_volatile,
            } => {
                let inner = ty.rebuild(strip_qualifiers);
                if strip_qualifiers || (!is_const && !is_volatile) {
                    return inner;
                }
                // Collapse nested qualifiers into one level.
                match inner {
                    CType::Qualified {
                        ty,
                        is_const: c,
                        is_volatile: v,
                    } => CType::Qualified {
                        ty,
                        is_const: *is_const || c,
                        is_volatile: *is_volatile || v,
                    },
                    other => CType::Qualified {
                        ty: Box::new(other),
                        is_const: *is_const,
                        is_volatile: *is_volatile,
                    },
                }
            }
        }
    }

    /// Stable textual form used for region names and composite-field ordering.
    ///
    /// Two simplified types have the same string iff they are structurally
    /// equal, with the exception of named composites, which are identified by
    /// their tag.
    pub fn type_to_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Int(IntKind::Char, Signedness::Signed) => write!(f, "char"),
            CType::Int(IntKind::Bool, _) => write!(f, "_Bool"),
            CType::Int(kind, Signedness::Signed) => write!(f, "{}", kind.keyword()),
            CType::Int(kind, Signedness::Unsigned) => write!(f, "unsigned {}", kind.keyword()),
            CType::Float(FloatKind::Float) => write!(f, "float"),
            CType::Float(FloatKind::Double) => write!(f, "double"),
            CType::Float(FloatKind::LongDouble) => write!(f, "long double"),
            CType::Pointer(inner) => write!(f, "{inner}*"),
            CType::Array(elem, Some(n)) => write!(f, "{elem}[{n}]"),
            CType::Array(elem, None) => write!(f, "{elem}[]"),
            CType::Struct { name, fields } => write_composite(f, "struct", name, fields),
            CType::Union { name, fields } => write_composite(f, "union", name, fields),
            CType::Enum { name: Some(n), .. } => write!(f, "enum {n}"),
            CType::Enum { name: None, variants } => {
                write!(f, "enum {{")?;
                for (i, (n, v)) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n} = {v}")?;
                }
                write!(f, "}}")
            }
            CType::Function {
                return_type,
                params,
                variadic,
            } => {
                write!(f, "{return_type}(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *variadic {
                    write!(f, ", ...")?;
                }
                write!(f, ")")
            }
            CType::TypeDef(name, _) => write!(f, "{name}"),
            CType::Qualified {
                ty,
                is_const,
                is_volatile,
            } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                if *is_volatile {
                    write!(f, "volatile ")?;
                }
                write!(f, "{ty}")
            }
        }
    }
}

fn write_composite(
    f: &mut fmt::Formatter<'_>,
    keyword: &str,
    name: &Option<String>,
    fields: &[StructField],
) -> fmt::Result {
    match name {
        Some(n) => write!(f, "{keyword} {n}"),
        None => {
            write!(f, "{keyword} {{")?;
            for field in fields {
                write!(f, "{} {};", field.ty, field.name)?;
            }
            write!(f, "}}")
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    let align = align.max(1);
    offset.div_ceil(align) * align
}
