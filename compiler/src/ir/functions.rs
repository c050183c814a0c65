//! IR Functions
//!
//! This module defines function representation in the IR, including
//! function signatures, parameters, and the function body.

use super::{CallingConvention, IrBlockId, IrControlFlowGraph, IrId, IrType, Linkage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IR function representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique identifier for this function within its module
    pub id: IrFunctionId,

    /// Symbol name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Control flow graph (function body). Empty for declarations.
    pub cfg: IrControlFlowGraph,

    /// Type information for all registers (parameters and intermediate values)
    pub register_types: BTreeMap<IrId, IrType>,

    /// Function attributes
    pub attributes: FunctionAttributes,

    /// Next available register ID
    pub next_reg_id: u32,
}

/// Unique identifier for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrFunctionId(pub u32);

impl std::fmt::Display for IrFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    /// Parameter types and names
    pub parameters: Vec<IrParameter>,

    /// Return type
    pub return_type: IrType,

    /// Calling convention
    pub calling_convention: CallingConvention,
}

impl IrFunctionSignature {
    /// Build a signature from `(name, type)` pairs; registers are assigned
    /// when the function is created.
    pub fn new<N: Into<String>>(
        parameters: impl IntoIterator<Item = (N, IrType)>,
        return_type: IrType,
        calling_convention: CallingConvention,
    ) -> Self {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(name, ty)| IrParameter {
                    name: name.into(),
                    ty,
                    reg: IrId::invalid(),
                })
                .collect(),
            return_type,
            calling_convention,
        }
    }

    /// Parameter types in order
    pub fn param_types(&self) -> Vec<IrType> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub ty: IrType,

    /// Register assigned to this parameter
    pub reg: IrId,
}

/// Function attributes and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Linkage type
    pub linkage: Linkage,

    /// Whether this function is pure (no side effects)
    pub pure: bool,
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        Self {
            linkage: Linkage::Private,
            pure: false,
        }
    }
}

impl IrFunction {
    /// Create a new function with an empty entry block
    pub fn new(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        let mut function = Self::declaration(id, name, signature);
        function.cfg = IrControlFlowGraph::new();
        function
    }

    /// Create a body-less declaration
    pub fn declaration(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        let mut function = Self {
            id,
            name,
            signature,
            cfg: IrControlFlowGraph::empty(),
            register_types: BTreeMap::new(),
            attributes: FunctionAttributes::default(),
            next_reg_id: 0,
        };

        // Allocate registers for parameters and register their types
        for i in 0..function.signature.parameters.len() {
            let reg = function.alloc_reg();
            let param_ty = function.signature.parameters[i].ty.clone();
            function.signature.parameters[i].reg = reg;
            function.register_types.insert(reg, param_ty);
        }

        function
    }

    /// Allocate a new register
    pub fn alloc_reg(&mut self) -> IrId {
        let id = IrId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    /// Get the entry block
    pub fn entry_block(&self) -> IrBlockId {
        self.cfg.entry_block
    }

    /// Whether this function has no body
    pub fn is_declaration(&self) -> bool {
        self.cfg.is_empty()
    }

    /// Get parameter register by index
    pub fn get_param_reg(&self, index: usize) -> Option<IrId> {
        self.signature.parameters.get(index).map(|p| p.reg)
    }

    pub fn return_type(&self) -> &IrType {
        &self.signature.return_type
    }

    /// Check if this function is a leaf function (doesn't call other functions)
    pub fn is_leaf(&self) -> bool {
        self.cfg.instructions().all(|inst| inst.callee().is_none())
    }

    /// A stripped copy holding only the signature and attributes
    pub fn to_declaration(&self) -> IrFunction {
        let mut decl = IrFunction::declaration(self.id, self.name.clone(), self.signature.clone());
        decl.attributes = self.attributes.clone();
        decl
    }

    /// Verify function integrity
    pub fn verify(&self) -> Result<(), String> {
        if self.is_declaration() {
            return Ok(());
        }

        self.cfg.verify()
    }
}
