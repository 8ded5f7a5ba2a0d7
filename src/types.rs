use crate::error::{CodegenError, CodegenResult};
use crate::signatures::StructTable;
use std::fmt;

/// A resolved G type.
///
/// Primitives and pointers fit in a register. Arrays and structs are
/// "non-primitive": they are moved around by bulk copy and always occupy a
/// multiple of 4 bytes on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Primitive { width: u32, signed: bool },
    Pointer(Box<Type>),
    Array { element: Box<Type>, count: u32 },
    Struct { name: String, size: u32 },
}

/// Largest object or stack frame, in bytes, the compiler will lay out.
pub const MAX_FRAME_SIZE: u32 = 1 << 30;

pub fn align_up(value: i32, align: i32) -> i32 {
    if align <= 1 {
        return value;
    }
    (value + align - 1).div_euclid(align) * align
}

impl Type {
    /// Resolves a descriptor such as `i32`, `u8(16)`, `Pair*` or `u16*(4)`.
    ///
    /// Suffixes bind from the right: `u8*(4)` is an array of four byte
    /// pointers, `u8(4)*` a pointer to a four byte array.
    pub fn parse(descriptor: &str, structs: &StructTable) -> CodegenResult<Type> {
        let text = descriptor.trim();
        let unknown = || CodegenError::UnknownType(descriptor.to_string());

        if text.is_empty() {
            return Err(unknown());
        }

        if let Some(prefix) = text.strip_suffix('*') {
            return Ok(Type::pointer_to(Type::parse(prefix, structs)?));
        }

        if let Some(head) = text.strip_suffix(')') {
            let open = head.rfind('(').ok_or_else(unknown)?;
            let count: u32 = head[open + 1..].trim().parse().map_err(|_| unknown())?;
            let element = Type::parse(&head[..open], structs)?;
            element
                .aligned_size()
                .checked_mul(count)
                .filter(|size| *size <= MAX_FRAME_SIZE)
                .ok_or_else(|| {
                    CodegenError::NotSupported(format!("the oversized array type '{}'", text))
                })?;
            return Ok(Type::Array {
                element: Box::new(element),
                count,
            });
        }

        if let Some(primitive) = Type::primitive_from_name(text) {
            return Ok(primitive);
        }

        match structs.get(text) {
            Some(signature) => Ok(Type::Struct {
                name: signature.name.clone(),
                size: signature.size,
            }),
            None => Err(unknown()),
        }
    }

    /// `i8`..`i32` are signed, `u8`..`u32` unsigned.
    fn primitive_from_name(name: &str) -> Option<Type> {
        let signed = match name.chars().next()? {
            'i' => true,
            'u' => false,
            _ => return None,
        };
        let width = match &name[1..] {
            "8" => 1,
            "16" => 2,
            "32" => 4,
            _ => return None,
        };
        Some(Type::Primitive { width, signed })
    }

    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer(Box::new(pointee))
    }

    pub fn i32() -> Type {
        Type::Primitive {
            width: 4,
            signed: true,
        }
    }

    pub fn u8() -> Type {
        Type::Primitive {
            width: 1,
            signed: false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive { .. } | Type::Pointer(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// Raw byte size, before padding.
    pub fn ideal_size(&self) -> u32 {
        match self {
            Type::Primitive { width, .. } => *width,
            Type::Pointer(_) => 4,
            Type::Array { element, count } => element.aligned_size() * count,
            Type::Struct { size, .. } => *size,
        }
    }

    pub fn aligned_size(&self) -> u32 {
        match self {
            Type::Primitive { width, .. } => match width {
                1 => 1,
                2 => 2,
                _ => 4,
            },
            Type::Pointer(_) => 4,
            Type::Array { .. } | Type::Struct { .. } => {
                align_up(self.ideal_size() as i32, 4) as u32
            }
        }
    }

    pub fn asm_size(&self) -> &'static str {
        match self.aligned_size() {
            1 => "BYTE",
            2 => "WORD",
            _ => "DWORD",
        }
    }

    /// The slice of `eax` matching this type's width.
    pub fn register(&self) -> &'static str {
        match self.aligned_size() {
            1 => "al",
            2 => "ax",
            _ => "eax",
        }
    }

    /// What a dereference of this type reads: the pointee of a pointer or the
    /// element of an array.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(pointee) => Some(pointee),
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Primitive { width, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, width * 8)
            }
            Type::Pointer(pointee) => write!(f, "{}*", pointee),
            Type::Array { element, count } => write!(f, "{}({})", element, count),
            Type::Struct { name, .. } => write!(f, "{}", name),
        }
    }
}
