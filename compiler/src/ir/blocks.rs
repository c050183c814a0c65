//! IR Basic Blocks
//!
//! This module defines basic blocks, which are sequences of instructions with
//! a single entry point and a single exit point, and the control flow graph
//! built from them.

use super::{IrId, IrInstruction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A basic block in the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBasicBlock {
    /// Unique identifier for this block
    pub id: IrBlockId,

    /// Human-readable label (for debugging)
    pub label: Option<String>,

    /// Instructions in this block (executed sequentially)
    pub instructions: Vec<IrInstruction>,

    /// Terminator instruction (branch, return, etc.)
    pub terminator: IrTerminator,

    /// Predecessors in the CFG
    pub predecessors: Vec<IrBlockId>,
}

/// Unique identifier for basic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrBlockId(pub u32);

impl IrBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }

    pub fn is_entry(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for IrBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Terminator instructions that end a basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrTerminator {
    /// Unconditional branch to another block
    Branch { target: IrBlockId },

    /// Conditional branch based on a boolean value
    CondBranch {
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    },

    /// Return from function
    Return { value: Option<IrId> },

    /// Not yet terminated
    Unreachable,
}

impl IrBasicBlock {
    /// Create a new basic block
    pub fn new(id: IrBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: IrTerminator::Unreachable,
            predecessors: Vec::new(),
        }
    }

    /// Add an instruction to this block
    pub fn add_instruction(&mut self, inst: IrInstruction) {
        self.instructions.push(inst);
    }

    /// Set the terminator for this block
    pub fn set_terminator(&mut self, term: IrTerminator) {
        self.terminator = term;
    }

    /// Get all successor blocks based on the terminator
    pub fn successors(&self) -> Vec<IrBlockId> {
        match &self.terminator {
            IrTerminator::Branch { target } => vec![*target],
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            IrTerminator::Return { .. } | IrTerminator::Unreachable => Vec::new(),
        }
    }

    /// Check if this block is terminated properly
    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, IrTerminator::Unreachable)
    }

    /// Number of call instructions in the block
    pub fn call_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|inst| matches!(inst, IrInstruction::CallDirect { .. }))
            .count()
    }
}

/// Control flow graph of a function body.
///
/// An empty graph (no blocks) marks a declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrControlFlowGraph {
    /// All basic blocks in the function
    pub blocks: BTreeMap<IrBlockId, IrBasicBlock>,

    /// Entry block ID
    pub entry_block: IrBlockId,

    /// Next available block ID
    pub next_block_id: u32,
}

impl IrControlFlowGraph {
    /// Create a new CFG with an entry block
    pub fn new() -> Self {
        let mut blocks = BTreeMap::new();
        let entry_block = IrBlockId::entry();
        blocks.insert(entry_block, IrBasicBlock::new(entry_block));

        Self {
            blocks,
            entry_block,
            next_block_id: 1,
        }
    }

    /// Create an empty CFG (for declarations)
    pub fn empty() -> Self {
        Self {
            blocks: BTreeMap::new(),
            entry_block: IrBlockId::entry(),
            next_block_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Create a new basic block
    pub fn create_block(&mut self) -> IrBlockId {
        let id = IrBlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, IrBasicBlock::new(id));
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: IrBlockId) -> Option<&IrBasicBlock> {
        self.blocks.get(&id)
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: IrBlockId) -> Option<&mut IrBasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Connect two blocks (update predecessors)
    pub fn connect_blocks(&mut self, from: IrBlockId, to: IrBlockId) {
        if let Some(to_block) = self.blocks.get_mut(&to) {
            if !to_block.predecessors.contains(&from) {
                to_block.predecessors.push(from);
            }
        }
    }

    /// Iterate over every instruction of every block, in block order
    pub fn instructions(&self) -> impl Iterator<Item = &IrInstruction> {
        self.blocks.values().flat_map(|b| b.instructions.iter())
    }

    /// Verify CFG integrity
    pub fn verify(&self) -> Result<(), String> {
        if !self.blocks.contains_key(&self.entry_block) {
            return Err("Entry block not found".to_string());
        }

        for (id, block) in &self.blocks {
            if !block.is_terminated() {
                return Err(format!("Block {} is not properly terminated", id));
            }

            for succ in block.successors() {
                if !self.blocks.contains_key(&succ) {
                    return Err(format!(
                        "Block {} references non-existent successor {}",
                        id, succ
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for IrControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
