//! IR Validation
//!
//! Structural checks run over synthesized or loaded IR before it is handed to
//! the runtime: SSA definitions precede uses, every block is terminated,
//! returns agree with the declared return type, and every direct call targets
//! a known function with a matching argument count.

use super::{
    IrBasicBlock, IrBlockId, IrFunction, IrFunctionId, IrId, IrInstruction, IrModule,
    IrTerminator,
};
use std::collections::HashSet;
use std::fmt;

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub function: String,
    pub block: Option<IrBlockId>,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// Register used before definition
    UseBeforeDefine { register: IrId },

    /// Register defined multiple times
    MultipleDefinitions { register: IrId },

    /// Missing terminator in basic block
    MissingTerminator,

    /// Branch to a block that does not exist
    InvalidTarget { target: IrBlockId },

    /// Return disagrees with the declared return type
    ReturnMismatch { reason: String },

    /// Call to a function the module does not know
    UnknownCallee { callee: IrFunctionId },

    /// Wrong number of call arguments
    ArgumentCount {
        callee: String,
        expected: usize,
        found: usize,
    },

    /// Call result presence disagrees with the callee's return type
    CallResult { callee: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in @{}", self.function)?;
        if let Some(block) = self.block {
            write!(f, " {}", block)?;
        }
        write!(f, ": ")?;
        match &self.kind {
            ValidationErrorKind::UseBeforeDefine { register } => {
                write!(f, "register {} used before definition", register)
            }
            ValidationErrorKind::MultipleDefinitions { register } => {
                write!(f, "register {} defined more than once", register)
            }
            ValidationErrorKind::MissingTerminator => write!(f, "block is not terminated"),
            ValidationErrorKind::InvalidTarget { target } => {
                write!(f, "branch to missing block {}", target)
            }
            ValidationErrorKind::ReturnMismatch { reason } => write!(f, "{}", reason),
            ValidationErrorKind::UnknownCallee { callee } => {
                write!(f, "call to unknown function {}", callee)
            }
            ValidationErrorKind::ArgumentCount {
                callee,
                expected,
                found,
            } => write!(
                f,
                "call to @{} passes {} arguments, expected {}",
                callee, found, expected
            ),
            ValidationErrorKind::CallResult { callee, reason } => {
                write!(f, "call to @{}: {}", callee, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validation context for a single function
struct ValidationContext<'a> {
    module: &'a IrModule,
    function: &'a IrFunction,
    block: Option<IrBlockId>,
    errors: Vec<ValidationError>,
    defined: HashSet<IrId>,
}

impl<'a> ValidationContext<'a> {
    fn new(module: &'a IrModule, function: &'a IrFunction) -> Self {
        Self {
            module,
            function,
            block: None,
            errors: Vec::new(),
            defined: HashSet::new(),
        }
    }

    fn add_error(&mut self, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            kind,
            function: self.function.name.clone(),
            block: self.block,
        });
    }

    fn define(&mut self, reg: IrId) {
        if !self.defined.insert(reg) {
            self.add_error(ValidationErrorKind::MultipleDefinitions { register: reg });
        }
    }

    fn use_reg(&mut self, reg: IrId) {
        if !self.defined.contains(&reg) {
            self.add_error(ValidationErrorKind::UseBeforeDefine { register: reg });
        }
    }
}

/// Validate an entire module. Declarations and unmaterialized bodies are skipped.
pub fn validate_module(module: &IrModule) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<ValidationError> = module
        .functions
        .values()
        .filter(|f| !f.is_declaration())
        .flat_map(|f| validate_function(module, f))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one function, returning every error found
pub fn validate_function(module: &IrModule, function: &IrFunction) -> Vec<ValidationError> {
    let mut ctx = ValidationContext::new(module, function);

    for param in &function.signature.parameters {
        ctx.define(param.reg);
    }

    // Blocks are visited in id order; kernel bodies are emitted in dominance order
    for block in function.cfg.blocks.values() {
        ctx.block = Some(block.id);
        validate_block(&mut ctx, block);
    }

    ctx.errors
}

fn validate_block(ctx: &mut ValidationContext<'_>, block: &IrBasicBlock) {
    for inst in &block.instructions {
        for reg in inst.uses() {
            ctx.use_reg(reg);
        }
        if let IrInstruction::CallDirect {
            dest,
            func_id,
            args,
        } = inst
        {
            validate_call(ctx, *dest, *func_id, args.len());
        }
        if let Some(dest) = inst.dest() {
            ctx.define(dest);
        }
    }

    match &block.terminator {
        IrTerminator::Unreachable => ctx.add_error(ValidationErrorKind::MissingTerminator),
        IrTerminator::Return { value } => validate_return(ctx, *value),
        IrTerminator::Branch { target } => validate_target(ctx, *target),
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => {
            ctx.use_reg(*condition);
            validate_target(ctx, *true_target);
            validate_target(ctx, *false_target);
        }
    }
}

fn validate_target(ctx: &mut ValidationContext<'_>, target: IrBlockId) {
    if ctx.function.cfg.get_block(target).is_none() {
        ctx.add_error(ValidationErrorKind::InvalidTarget { target });
    }
}

fn validate_return(ctx: &mut ValidationContext<'_>, value: Option<IrId>) {
    let return_type = &ctx.function.signature.return_type;
    match value {
        None if !return_type.is_void() => {
            ctx.add_error(ValidationErrorKind::ReturnMismatch {
                reason: format!("void return from function returning {}", return_type),
            });
        }
        Some(_) if return_type.is_void() => {
            ctx.add_error(ValidationErrorKind::ReturnMismatch {
                reason: "value returned from void function".to_string(),
            });
        }
        Some(reg) => {
            ctx.use_reg(reg);
            if let Some(found) = ctx.function.register_types.get(&reg) {
                if found != return_type {
                    let reason = format!("returns {} but declares {}", found, return_type);
                    ctx.add_error(ValidationErrorKind::ReturnMismatch { reason });
                }
            }
        }
        None => {}
    }
}

fn validate_call(
    ctx: &mut ValidationContext<'_>,
    dest: Option<IrId>,
    callee: IrFunctionId,
    arg_count: usize,
) {
    let Some(target) = ctx.module.get_function(callee) else {
        ctx.add_error(ValidationErrorKind::UnknownCallee { callee });
        return;
    };

    let expected = target.signature.parameters.len();
    if expected != arg_count {
        ctx.add_error(ValidationErrorKind::ArgumentCount {
            callee: target.name.clone(),
            expected,
            found: arg_count,
        });
    }

    let returns_value = !target.signature.return_type.is_void();
    if returns_value != dest.is_some() {
        let reason = if returns_value {
            "result of non-void call is dropped"
        } else {
            "void call binds a result"
        };
        ctx.add_error(ValidationErrorKind::CallResult {
            callee: target.name.clone(),
            reason: reason.to_string(),
        });
    }
}
