//! IR Instructions
//!
//! Defines the instruction set for kernel bodies. Control flow lives in block
//! terminators; instructions are the straight-line operations inside a block.

use super::{IrFunctionId, IrId, IrType, IrValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Value Operations ===

    /// Load constant value
    Const {
        dest: IrId,
        value: IrValue,
    },

    /// Copy value from one register to another
    Copy {
        dest: IrId,
        src: IrId,
    },

    /// Load value from memory
    Load {
        dest: IrId,
        ptr: IrId,
        ty: IrType,
    },

    /// Store value to memory
    Store {
        ptr: IrId,
        value: IrId,
    },

    // === Arithmetic Operations ===

    /// Binary arithmetic operation
    BinOp {
        dest: IrId,
        op: BinaryOp,
        left: IrId,
        right: IrId,
    },

    /// Unary operation
    UnOp {
        dest: IrId,
        op: UnaryOp,
        operand: IrId,
    },

    /// Compare operation
    Cmp {
        dest: IrId,
        op: CompareOp,
        left: IrId,
        right: IrId,
    },

    /// Numeric conversion
    Cast {
        dest: IrId,
        src: IrId,
        from_ty: IrType,
        to_ty: IrType,
    },

    // === Calls ===

    /// Direct call to a function of the same module.
    /// `dest` is `None` when the callee returns void.
    CallDirect {
        dest: Option<IrId>,
        func_id: IrFunctionId,
        args: Vec<IrId>,
    },
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,

    // Floating point
    FAdd,
    FSub,
    FMul,
    FDiv,
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    FNeg,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl IrInstruction {
    /// Get the destination register if this instruction produces a value
    pub fn dest(&self) -> Option<IrId> {
        match self {
            IrInstruction::Const { dest, .. }
            | IrInstruction::Copy { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::UnOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Cast { dest, .. } => Some(*dest),

            IrInstruction::CallDirect { dest, .. } => *dest,

            IrInstruction::Store { .. } => None,
        }
    }

    /// Get all registers used by this instruction
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrInstruction::Const { .. } => Vec::new(),
            IrInstruction::Copy { src, .. } => vec![*src],
            IrInstruction::Load { ptr, .. } => vec![*ptr],
            IrInstruction::Store { ptr, value } => vec![*ptr, *value],
            IrInstruction::BinOp { left, right, .. } => vec![*left, *right],
            IrInstruction::UnOp { operand, .. } => vec![*operand],
            IrInstruction::Cmp { left, right, .. } => vec![*left, *right],
            IrInstruction::Cast { src, .. } => vec![*src],
            IrInstruction::CallDirect { args, .. } => args.clone(),
        }
    }

    /// Check if this instruction has side effects
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            IrInstruction::Store { .. } | IrInstruction::CallDirect { .. }
        )
    }

    /// Callee of a direct call
    pub fn callee(&self) -> Option<IrFunctionId> {
        match self {
            IrInstruction::CallDirect { func_id, .. } => Some(*func_id),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        };
        f.write_str(name)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::FNeg => "fneg",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        };
        f.write_str(name)
    }
}
