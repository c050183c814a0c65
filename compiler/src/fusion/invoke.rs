//! Invoke wrapping
//!
//! Group-level setup functions run once per invocation rather than once per
//! element. Wrapping re-exports such a function under a new name through a
//! void pass-through that forwards its single argument.

use super::emit::BlockEmitter;
use super::error::FusionError;
use crate::config::FusionConfig;
use crate::ir::{IrFunctionId, IrFunctionSignature, IrModule, IrType, Linkage};
use crate::metadata::{export_func, MetadataExtractor};
use log::{debug, info};

/// One slot of a module's invokable table.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRef<'m> {
    pub module: &'m IrModule,
    pub slot: usize,
}

impl<'m> InvokeRef<'m> {
    pub fn new(module: &'m IrModule, slot: usize) -> Self {
        Self { module, slot }
    }

    /// Exported name of the invokable in this slot
    pub fn name(&self) -> Result<String, FusionError> {
        let mut metadata = MetadataExtractor::new(self.module);
        metadata.extract()?;
        metadata.check_func_slot(self.slot)?;
        Ok(metadata.export_func_names()[self.slot].clone())
    }
}

/// Wrap `target` as a void function called `name` in `dest`.
pub(crate) fn wrap(
    target: &InvokeRef<'_>,
    name: &str,
    dest: &mut IrModule,
    config: &FusionConfig,
) -> Result<IrFunctionId, FusionError> {
    let target_name = target.name()?;
    if target_name.is_empty() {
        return Err(FusionError::UnresolvedFunction {
            name: target_name,
            module: target.module.name.clone(),
        });
    }
    if dest.has_symbol(name) {
        return Err(FusionError::NameCollision {
            name: name.to_string(),
            module: dest.name.clone(),
        });
    }

    dest.materialize(&target_name);
    let callee = dest
        .get_function_by_name(&target_name)
        .ok_or_else(|| FusionError::UnresolvedFunction {
            name: target_name.clone(),
            module: dest.name.clone(),
        })?;

    let params = &callee.signature.parameters;
    if params.len() != 1 {
        return Err(FusionError::ArityMismatch {
            function: target_name,
            expected: 1,
            found: params.len(),
        });
    }

    let callee_id = callee.id;
    let result = callee.return_type().clone();
    let signature = IrFunctionSignature::new(
        params.iter().map(|p| (p.name.clone(), p.ty.clone())),
        IrType::Void,
        callee.signature.calling_convention,
    );
    debug!("wrapping '{}' ({}) as '{}'", target_name, callee_id, name);

    let id = dest.alloc_function_id();
    let mut emitter = BlockEmitter::new(id, name, signature, Linkage::Public);
    let arg = emitter.param(0);
    emitter.call(callee_id, vec![arg], &result);
    dest.add_function(emitter.finish(&config.entry_label, None));
    export_func(dest, name);

    info!("wrapped invokable '{}' as '{}'", target_name, name);
    Ok(id)
}
