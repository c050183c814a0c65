//! IR Builder
//!
//! This module provides a builder interface for constructing IR in a convenient way.
//! The builder borrows the module it writes into, keeps track of the function and
//! block being built, and records result types as it goes.

use tracing::debug;

use super::{
    BinaryOp, CompareOp, IrBlockId, IrFunction, IrFunctionId, IrFunctionSignature, IrId,
    IrInstruction, IrModule, IrTerminator, IrType, IrValue, Linkage, UnaryOp,
};

/// IR builder writing into an existing module
pub struct IrBuilder<'m> {
    /// The module being built
    pub module: &'m mut IrModule,

    /// Current function being built
    pub(crate) current_function: Option<IrFunctionId>,

    /// Current basic block being built
    pub(crate) current_block: Option<IrBlockId>,
}

impl<'m> IrBuilder<'m> {
    /// Create a new IR builder for `module`
    pub fn new(module: &'m mut IrModule) -> Self {
        Self {
            module,
            current_function: None,
            current_block: None,
        }
    }

    // === Module Building ===

    /// Start building a new function with an empty entry block
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        signature: IrFunctionSignature,
        linkage: Linkage,
    ) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        let mut function = IrFunction::new(id, name.into(), signature);
        function.attributes.linkage = linkage;
        debug!("start_function {} ({})", function.name, id);
        self.current_function = Some(id);
        self.current_block = Some(function.entry_block());
        self.module.add_function(function);
        id
    }

    /// Declare a function without a body
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        signature: IrFunctionSignature,
        linkage: Linkage,
    ) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        let mut function = IrFunction::declaration(id, name.into(), signature);
        function.attributes.linkage = linkage;
        self.module.add_function(function)
    }

    /// Finish building the current function
    pub fn finish_function(&mut self) {
        self.current_function = None;
        self.current_block = None;
    }

    /// Get the current function
    pub fn current_function(&self) -> Option<&IrFunction> {
        self.current_function
            .and_then(|id| self.module.functions.get(&id))
    }

    /// Get the current function mutably
    pub fn current_function_mut(&mut self) -> Option<&mut IrFunction> {
        self.current_function
            .and_then(move |id| self.module.functions.get_mut(&id))
    }

    // === Block Building ===

    /// Label the current block
    pub fn set_block_label(&mut self, label: impl Into<String>) -> Option<()> {
        let block_id = self.current_block?;
        let block = self.current_function_mut()?.cfg.get_block_mut(block_id)?;
        block.label = Some(label.into());
        Some(())
    }

    // === Register Management ===

    /// Register bound to the `index`-th parameter of the current function
    pub fn param_reg(&self, index: usize) -> Option<IrId> {
        self.current_function()?.get_param_reg(index)
    }

    /// Allocate a new register in the current function
    pub fn alloc_reg(&mut self) -> Option<IrId> {
        self.current_function_mut().map(|f| f.alloc_reg())
    }

    /// Get the type of a register
    pub fn get_register_type(&self, reg: IrId) -> Option<IrType> {
        self.current_function()?.register_types.get(&reg).cloned()
    }

    /// Set the type of a register
    pub fn set_register_type(&mut self, reg: IrId, ty: IrType) {
        if let Some(func) = self.current_function_mut() {
            func.register_types.insert(reg, ty);
        }
    }

    // === Instruction Building ===

    /// Add an instruction to the current block
    fn add_instruction(&mut self, inst: IrInstruction) -> Option<()> {
        let block_id = self.current_block?;
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))
            .map(|b| b.add_instruction(inst))
    }

    /// Build a constant instruction
    pub fn build_const(&mut self, value: IrValue) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, value.ty());
        self.add_instruction(IrInstruction::Const { dest, value })?;
        Some(dest)
    }

    /// Build a load instruction
    pub fn build_load(&mut self, ptr: IrId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty.clone());
        self.add_instruction(IrInstruction::Load { dest, ptr, ty })?;
        Some(dest)
    }

    /// Build a store instruction
    pub fn build_store(&mut self, ptr: IrId, value: IrId) -> Option<()> {
        self.add_instruction(IrInstruction::Store { ptr, value })
    }

    /// Build a binary operation
    pub fn build_binop(&mut self, op: BinaryOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        // Result type follows the left operand (or right if left is unknown)
        if let Some(ty) = self
            .get_register_type(left)
            .or_else(|| self.get_register_type(right))
        {
            self.set_register_type(dest, ty);
        }
        self.add_instruction(IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        })?;
        Some(dest)
    }

    /// Build a unary operation
    pub fn build_unop(&mut self, op: UnaryOp, operand: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        if let Some(ty) = self.get_register_type(operand) {
            self.set_register_type(dest, ty);
        }
        self.add_instruction(IrInstruction::UnOp { dest, op, operand })?;
        Some(dest)
    }

    /// Build a comparison operation
    pub fn build_cmp(&mut self, op: CompareOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        // Comparisons always return Bool
        self.set_register_type(dest, IrType::Bool);
        self.add_instruction(IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        })?;
        Some(dest)
    }

    /// Build a numeric conversion
    pub fn build_cast(&mut self, src: IrId, from_ty: IrType, to_ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, to_ty.clone());
        self.add_instruction(IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        })?;
        Some(dest)
    }

    /// Build a direct function call.
    ///
    /// The callee must already be known to the module. A destination register
    /// is allocated only when the callee returns a value, so `None` is returned
    /// both for void callees and when there is no function being built.
    pub fn build_call_direct(&mut self, func_id: IrFunctionId, args: Vec<IrId>) -> Option<IrId> {
        let return_type = self
            .module
            .functions
            .get(&func_id)
            .map(|f| f.signature.return_type.clone())?;

        let dest = if return_type.is_void() {
            None
        } else {
            let reg = self.alloc_reg()?;
            self.set_register_type(reg, return_type);
            Some(reg)
        };

        debug!("call {} with {} args", func_id, args.len());
        self.add_instruction(IrInstruction::CallDirect {
            dest,
            func_id,
            args,
        })?;
        dest
    }

    // === Terminators ===

    /// Terminate the current block with a return
    pub fn build_return(&mut self, value: Option<IrId>) -> Option<()> {
        let block_id = self.current_block?;
        let block = self.current_function_mut()?.cfg.get_block_mut(block_id)?;
        block.set_terminator(IrTerminator::Return { value });
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallingConvention, IrFunctionSignature};

    #[test]
    fn test_build_simple_kernel() {
        let mut module = IrModule::new("test");
        let mut builder = IrBuilder::new(&mut module);

        let sig = IrFunctionSignature::new(
            vec![("in", IrType::F32)],
            IrType::F32,
            CallingConvention::Kernel,
        );
        let id = builder.start_function("double", sig, Linkage::Public);
        let input = builder.param_reg(0).unwrap();
        let two = builder.build_const(IrValue::F32(2.0)).unwrap();
        let result = builder.build_binop(BinaryOp::FMul, input, two).unwrap();
        builder.build_return(Some(result)).unwrap();
        builder.finish_function();

        let func = module.get_function(id).unwrap();
        assert_eq!(func.register_types[&result], IrType::F32);
        assert!(func.verify().is_ok());
        assert_eq!(func.attributes.linkage, Linkage::Public);
    }

    #[test]
    fn test_void_call_has_no_dest() {
        let mut module = IrModule::new("test");
        let mut builder = IrBuilder::new(&mut module);

        let sink_sig = IrFunctionSignature::new(
            vec![("v", IrType::U32)],
            IrType::Void,
            CallingConvention::C,
        );
        let sink = builder.declare_function("sink", sink_sig, Linkage::External);

        let caller_sig = IrFunctionSignature::new(
            vec![("v", IrType::U32)],
            IrType::Void,
            CallingConvention::C,
        );
        builder.start_function("caller", caller_sig, Linkage::Public);
        let v = builder.param_reg(0).unwrap();
        assert_eq!(builder.build_call_direct(sink, vec![v]), None);
        builder.build_return(None).unwrap();

        let caller = builder.current_function().unwrap();
        let entry = caller.cfg.get_block(caller.entry_block()).unwrap();
        assert_eq!(entry.call_count(), 1);
    }

    #[test]
    fn test_memory_and_compare() {
        let mut module = IrModule::new("test");
        let mut builder = IrBuilder::new(&mut module);

        let sig = IrFunctionSignature::new(
            vec![("slot", IrType::ptr(IrType::F32)), ("v", IrType::F32)],
            IrType::Bool,
            CallingConvention::Kernel,
        );
        let id = builder.start_function("replace_if_less", sig, Linkage::Public);
        let slot = builder.param_reg(0).unwrap();
        let v = builder.param_reg(1).unwrap();
        let old = builder.build_load(slot, IrType::F32).unwrap();
        let less = builder.build_cmp(CompareOp::Lt, old, v).unwrap();
        builder.build_store(slot, v).unwrap();
        builder.build_return(Some(less)).unwrap();
        builder.finish_function();

        assert!(builder.current_function().is_none());
        let func = module.get_function(id).unwrap();
        assert_eq!(func.register_types[&old], IrType::F32);
        assert_eq!(func.register_types[&less], IrType::Bool);
        assert!(crate::ir::validation::validate_function(&module, func).is_empty());

        let text = crate::ir::dump::dump_function(&module, func);
        assert!(text.contains("$2 = load f32 $0"));
        assert!(text.contains("$3 = cmp lt $2, $1"));
        assert!(text.contains("store $0, $1"));
        assert!(text.contains("ret $3"));
    }
}
