//! IR Dump Utility
//!
//! Pretty-prints IR in a human-readable format similar to LLVM IR.
//! Used by the `kfuse` driver and when debugging fused output.

use super::{
    IrBasicBlock, IrControlFlowGraph, IrFunction, IrInstruction, IrModule, IrTerminator, Linkage,
};
use std::fmt::Write;

/// Dump an entire module to a string.
pub fn dump_module(module: &IrModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; Module: {}", module.name);
    let _ = writeln!(
        out,
        "; Functions: {} ({} not materialized)",
        module.functions.len(),
        module.lazy_bodies.len()
    );
    let _ = writeln!(out);

    for func in module.functions.values() {
        if module.lazy_bodies.contains_key(&func.id) {
            let _ = writeln!(out, "; lazy");
        }
        let _ = writeln!(out, "{}", dump_function(module, func));
    }

    for (key, entries) in &module.named_metadata {
        let quoted: Vec<String> = entries.iter().map(|e| format!("{:?}", e)).collect();
        let _ = writeln!(out, "!{} = {{{}}}", key, quoted.join(", "));
    }

    out
}

/// Dump a single function to a string.
pub fn dump_function(module: &IrModule, func: &IrFunction) -> String {
    let mut out = String::new();

    let params: Vec<String> = func
        .signature
        .parameters
        .iter()
        .map(|p| format!("{} %{}: {}", p.reg, p.name, p.ty))
        .collect();

    let keyword = if func.is_declaration() { "declare" } else { "define" };
    let linkage = match func.attributes.linkage {
        Linkage::Private => "private ",
        Linkage::Public => "",
        Linkage::External => "external ",
    };

    let _ = write!(
        out,
        "{} {}{} @{}({})",
        keyword,
        linkage,
        func.signature.return_type,
        func.name,
        params.join(", ")
    );

    if func.is_declaration() {
        return out;
    }

    let _ = writeln!(out, " {{");
    let _ = write!(out, "{}", dump_cfg(module, &func.cfg));
    let _ = write!(out, "}}");
    out
}

/// Dump a CFG to a string.
pub fn dump_cfg(module: &IrModule, cfg: &IrControlFlowGraph) -> String {
    let mut out = String::new();
    for block in cfg.blocks.values() {
        let _ = write!(out, "{}", dump_block(module, block));
    }
    out
}

/// Dump a basic block to a string.
pub fn dump_block(module: &IrModule, block: &IrBasicBlock) -> String {
    let mut out = String::new();

    let label = block
        .label
        .as_ref()
        .map(|l| format!(" ; {}", l))
        .unwrap_or_default();
    let _ = writeln!(out, "  {}:{}", block.id, label);

    if !block.predecessors.is_empty() {
        let preds: Vec<String> = block.predecessors.iter().map(|p| p.to_string()).collect();
        let _ = writeln!(out, "    ; preds: {}", preds.join(", "));
    }

    for inst in &block.instructions {
        let _ = writeln!(out, "    {}", dump_instruction(module, inst));
    }

    let _ = writeln!(out, "    {}", dump_terminator(&block.terminator));
    out
}

/// Dump an instruction to a string. Call targets are printed by name when
/// the callee is known to `module`.
pub fn dump_instruction(module: &IrModule, inst: &IrInstruction) -> String {
    match inst {
        IrInstruction::Const { dest, value } => format!("{} = const {}", dest, value),
        IrInstruction::Copy { dest, src } => format!("{} = copy {}", dest, src),
        IrInstruction::Load { dest, ptr, ty } => format!("{} = load {} {}", dest, ty, ptr),
        IrInstruction::Store { ptr, value } => format!("store {}, {}", ptr, value),
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {}, {}", dest, op, left, right),
        IrInstruction::UnOp { dest, op, operand } => format!("{} = {} {}", dest, op, operand),
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } => format!("{} = cmp {} {}, {}", dest, op, left, right),
        IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        } => format!("{} = cast {} {} to {}", dest, from_ty, src, to_ty),
        IrInstruction::CallDirect {
            dest,
            func_id,
            args,
        } => {
            let callee = module
                .get_function(*func_id)
                .map(|f| format!("@{}", f.name))
                .unwrap_or_else(|| func_id.to_string());
            let args_str: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            match dest {
                Some(d) => format!("{} = call {}({})", d, callee, args_str.join(", ")),
                None => format!("call {}({})", callee, args_str.join(", ")),
            }
        }
    }
}

/// Dump a terminator to a string.
pub fn dump_terminator(term: &IrTerminator) -> String {
    match term {
        IrTerminator::Branch { target } => format!("br {}", target),
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => format!("br_if {}, {}, {}", condition, true_target, false_target),
        IrTerminator::Return { value: Some(v) } => format!("ret {}", v),
        IrTerminator::Return { value: None } => "ret void".to_string(),
        IrTerminator::Unreachable => "unreachable".to_string(),
    }
}
