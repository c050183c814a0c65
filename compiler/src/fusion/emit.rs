//! Single-block function emission shared by fusion and invoke wrapping.

use crate::ir::{
    IrFunction, IrFunctionId, IrFunctionSignature, IrId, IrInstruction, IrTerminator, IrType,
    Linkage,
};

/// Accumulates the body of a straight-line function: calls, then one return.
pub(crate) struct BlockEmitter {
    function: IrFunction,
    instructions: Vec<IrInstruction>,
}

impl BlockEmitter {
    pub(crate) fn new(
        id: IrFunctionId,
        name: &str,
        signature: IrFunctionSignature,
        linkage: Linkage,
    ) -> Self {
        let mut function = IrFunction::new(id, name.to_string(), signature);
        function.attributes.linkage = linkage;
        Self {
            function,
            instructions: Vec::new(),
        }
    }

    /// Register of the `index`-th parameter, `IrId::invalid()` past the end
    pub(crate) fn param(&self, index: usize) -> IrId {
        self.function
            .get_param_reg(index)
            .unwrap_or_else(IrId::invalid)
    }

    /// Emit a direct call. Returns the result register, or `IrId::invalid()`
    /// for a void callee.
    pub(crate) fn call(&mut self, callee: IrFunctionId, args: Vec<IrId>, result: &IrType) -> IrId {
        let dest = if result.is_void() {
            None
        } else {
            let reg = self.function.alloc_reg();
            self.function.register_types.insert(reg, result.clone());
            Some(reg)
        };
        self.instructions.push(IrInstruction::CallDirect {
            dest,
            func_id: callee,
            args,
        });
        dest.unwrap_or_else(IrId::invalid)
    }

    /// Close the entry block with a return and hand back the function
    pub(crate) fn finish(mut self, label: &str, value: Option<IrId>) -> IrFunction {
        let entry = self.function.entry_block();
        if let Some(block) = self.function.cfg.get_block_mut(entry) {
            block.label = Some(label.to_string());
            block.instructions = self.instructions;
            block.set_terminator(IrTerminator::Return { value });
        }
        self.function
    }
}
