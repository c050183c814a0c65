//! Intermediate Representation (IR) for compiled kernel modules
//!
//! This module defines the low-level, strongly typed SSA representation that
//! the bitcode pipeline hands to the fusion engine. It is small:
//! elementwise kernels are straight-line functions over scalars and vectors,
//! so the IR only needs values, arithmetic, direct calls and returns.
//! The IR is designed to be:
//! - Simple and explicit (no implicit operations)
//! - Strongly typed with explicit type information
//! - Serializable, so kernel bundles can be stored and reloaded

pub mod types;
pub mod instructions;
pub mod blocks;
pub mod functions;
pub mod modules;
pub mod builder;
pub mod linker;
pub mod dump;
pub mod validation;

pub use types::*;
pub use instructions::*;
pub use blocks::*;
pub use functions::*;
pub use modules::*;
pub use builder::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for IR values (virtual registers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrId(u32);

impl IrId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn invalid() -> Self {
        Self(u32::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Linkage type for symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Private to the module
    Private,
    /// Visible to the runtime and to other modules
    Public,
    /// External symbol (defined elsewhere)
    External,
}

/// Calling convention for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallingConvention {
    /// Per-element kernel convention used by the runtime driver
    Kernel,
    /// C calling convention (invokables, runtime helpers)
    C,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ir_id() {
        let id = IrId::new(42);
        assert_eq!(format!("{}", id), "$42");
        assert!(id.is_valid());

        let invalid = IrId::invalid();
        assert!(!invalid.is_valid());
    }
}
