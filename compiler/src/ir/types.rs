//! IR Type System
//!
//! Defines the types kernels are written against. Kernel element types are
//! scalars, short vectors, or pointers to runtime-owned structures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (no value)
    Void,

    /// Boolean type
    Bool,

    /// Integer types
    I8,
    I16,
    I32,
    I64,

    /// Unsigned integer types
    U8,
    U16,
    U32,
    U64,

    /// Floating point types
    F32,
    F64,

    /// Pointer type
    Ptr(Box<IrType>),

    /// Short SIMD vector (e.g. float4 pixels)
    Vector {
        /// Element type (must be numeric)
        element: Box<IrType>,
        /// Number of lanes (2, 3 or 4 for kernel element types)
        count: usize,
    },
}

impl IrType {
    /// Get the size of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::Bool | IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 | IrType::F32 => 4,
            IrType::I64 | IrType::U64 | IrType::F64 => 8,
            IrType::Ptr(_) => std::mem::size_of::<usize>(),
            IrType::Vector { element, count } => element.size() * count,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::I8
                | IrType::I16
                | IrType::I32
                | IrType::I64
                | IrType::U8
                | IrType::U16
                | IrType::U32
                | IrType::U64
        )
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Create a pointer type
    pub fn ptr(pointee: IrType) -> Self {
        IrType::Ptr(Box::new(pointee))
    }

    /// Create a vector type
    pub fn vector(element: IrType, count: usize) -> Self {
        IrType::Vector {
            element: Box::new(element),
            count,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr(pointee) => write!(f, "ptr<{}>", pointee),
            IrType::Vector { element, count } => write!(f, "<{} x {}>", count, element),
        }
    }
}

/// Constant values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Null pointer of the given pointee type
    Null(IrType),
}

impl IrValue {
    /// The type a constant of this value has
    pub fn ty(&self) -> IrType {
        match self {
            IrValue::Bool(_) => IrType::Bool,
            IrValue::I32(_) => IrType::I32,
            IrValue::I64(_) => IrType::I64,
            IrValue::U32(_) => IrType::U32,
            IrValue::U64(_) => IrType::U64,
            IrValue::F32(_) => IrType::F32,
            IrValue::F64(_) => IrType::F64,
            IrValue::Null(pointee) => IrType::ptr(pointee.clone()),
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Bool(v) => write!(f, "{}", v),
            IrValue::I32(v) => write!(f, "{}i32", v),
            IrValue::I64(v) => write!(f, "{}i64", v),
            IrValue::U32(v) => write!(f, "{}u32", v),
            IrValue::U64(v) => write!(f, "{}u64", v),
            IrValue::F32(v) => write!(f, "{:?}f32", v),
            IrValue::F64(v) => write!(f, "{:?}f64", v),
            IrValue::Null(_) => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sizes() {
        assert_eq!(IrType::Void.size(), 0);
        assert_eq!(IrType::U32.size(), 4);
        assert_eq!(IrType::vector(IrType::F32, 4).size(), 16);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(IrType::ptr(IrType::U8).to_string(), "ptr<u8>");
        assert_eq!(IrType::vector(IrType::F32, 4).to_string(), "<4 x f32>");
    }

    #[test]
    fn test_value_types() {
        assert_eq!(IrValue::F32(1.5).ty(), IrType::F32);
        assert_eq!(IrValue::Null(IrType::U8).ty(), IrType::ptr(IrType::U8));
    }
}
