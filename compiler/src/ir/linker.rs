//! Lazy module linking.
//!
//! Merges the functions of one module into another without realizing their
//! bodies. Each imported definition lands as a declaration whose body waits in
//! the destination's lazy table until something materializes it by name.
//! Call targets inside imported bodies are renumbered into the destination's
//! function id space.

use super::instructions::IrInstruction;
use super::modules::IrModule;
use super::{IrFunction, IrFunctionId};
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

/// Statistics from a link step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub functions_imported: usize,
    pub declarations_merged: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("function '{name}' is defined in both '{existing}' and '{incoming}'")]
    DuplicateDefinition {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("call in '{function}' targets {callee}, which module '{module}' does not define")]
    DanglingCall {
        function: String,
        callee: IrFunctionId,
        module: String,
    },
}

/// Import every function of `source` into `dest`, leaving bodies unmaterialized.
///
/// A declaration and a definition sharing a name are merged into one symbol.
pub fn link_lazily(dest: &mut IrModule, source: &IrModule) -> Result<LinkStats, LinkError> {
    let mut stats = LinkStats::default();

    // Phase 1: assign every source function a slot in the destination.
    // Ids are counted locally so a failed link leaves `dest` untouched.
    let mut next_id = dest.next_function_id;
    let mut remap: HashMap<IrFunctionId, IrFunctionId> = HashMap::new();
    let mut incoming: Vec<(IrFunctionId, IrFunction)> = Vec::new();

    for (src_id, decl) in &source.functions {
        let function = source.lazy_bodies.get(src_id).unwrap_or(decl);
        let has_body = !function.is_declaration();

        match dest.function_id(&function.name) {
            Some(existing_id) => {
                let existing_has_body = dest.lazy_bodies.contains_key(&existing_id)
                    || dest
                        .get_function(existing_id)
                        .is_some_and(|f| !f.is_declaration());
                if has_body && existing_has_body {
                    return Err(LinkError::DuplicateDefinition {
                        name: function.name.clone(),
                        existing: dest.name.clone(),
                        incoming: source.name.clone(),
                    });
                }
                remap.insert(*src_id, existing_id);
                stats.declarations_merged += 1;
                if has_body {
                    incoming.push((existing_id, function.clone()));
                }
            }
            None => {
                let new_id = IrFunctionId(next_id);
                next_id += 1;
                remap.insert(*src_id, new_id);
                incoming.push((new_id, function.clone()));
            }
        }
    }

    // Phase 2: renumber calls
    for (new_id, function) in &mut incoming {
        function.id = *new_id;
        for block in function.cfg.blocks.values_mut() {
            for inst in &mut block.instructions {
                if let IrInstruction::CallDirect { func_id, .. } = inst {
                    let target = remap.get(&*func_id).copied().ok_or_else(|| {
                        LinkError::DanglingCall {
                            function: function.name.clone(),
                            callee: *func_id,
                            module: source.name.clone(),
                        }
                    })?;
                    *func_id = target;
                }
            }
        }
    }

    // Phase 3: register
    dest.next_function_id = dest.next_function_id.max(next_id);
    for (new_id, mut function) in incoming {
        debug!(
            "link {}::{} -> {}::{}",
            source.name, function.name, dest.name, new_id
        );
        if let Some(existing) = dest.get_function(new_id) {
            // Definition for a declaration the destination already had
            function.attributes.linkage = existing.attributes.linkage;
            dest.lazy_bodies.insert(new_id, function);
        } else {
            dest.add_lazy_function(function);
            stats.functions_imported += 1;
        }
    }

    Ok(stats)
}

/// Link a sequence of modules into a fresh, empty module named `name`.
pub fn link_all<'a>(
    name: &str,
    sources: impl IntoIterator<Item = &'a IrModule>,
) -> Result<IrModule, LinkError> {
    let mut merged = IrModule::new(name);
    for source in sources {
        link_lazily(&mut merged, source)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallingConvention, IrBuilder, IrFunctionSignature, IrType, Linkage};

    fn f32_sig() -> IrFunctionSignature {
        IrFunctionSignature::new(vec![("in", IrType::F32)], IrType::F32, CallingConvention::Kernel)
    }

    /// Module with `helper` and a `kernel` calling it
    fn module_with_call(name: &str) -> IrModule {
        let mut module = IrModule::new(name);
        let mut b = IrBuilder::new(&mut module);
        let helper = b.start_function("helper", f32_sig(), Linkage::Private);
        let v = b.param_reg(0).unwrap();
        b.build_return(Some(v)).unwrap();
        b.finish_function();

        b.start_function("kernel", f32_sig(), Linkage::Public);
        let v = b.param_reg(0).unwrap();
        let r = b.build_call_direct(helper, vec![v]).unwrap();
        b.build_return(Some(r)).unwrap();
        b.finish_function();
        module
    }

    #[test]
    fn test_link_remaps_calls_and_defers_bodies() {
        let mut dest = IrModule::new("merged");
        // Occupy id 0 so the remap is observable
        IrBuilder::new(&mut dest).declare_function("other", f32_sig(), Linkage::External);

        let source = module_with_call("a");
        let stats = link_lazily(&mut dest, &source).unwrap();
        assert_eq!(stats.functions_imported, 2);
        assert!(dest.get_function_by_name("kernel").is_none());

        assert!(dest.materialize("kernel"));
        let helper_id = dest.function_id("helper").unwrap();
        let kernel = dest.get_function_by_name("kernel").unwrap();
        let callees: Vec<_> = kernel.cfg.instructions().filter_map(|i| i.callee()).collect();
        assert_eq!(callees, vec![helper_id]);
        assert_ne!(helper_id, IrFunctionId(0));
    }

    #[test]
    fn test_duplicate_definitions_are_rejected() {
        let a = module_with_call("a");
        let b = module_with_call("b");
        let err = link_all("merged", [&a, &b]).unwrap_err();
        assert!(matches!(err, LinkError::DuplicateDefinition { .. }));
    }

    #[test]
    fn test_failed_link_leaves_destination_untouched() {
        let mut dest = IrModule::new("merged");
        IrBuilder::new(&mut dest).declare_function("other", f32_sig(), Linkage::External);
        let before = dest.clone();

        // `kernel` calls `helper`, which the source no longer knows
        let mut source = module_with_call("a");
        let helper = source.function_id("helper").unwrap();
        source.functions.remove(&helper);

        let err = link_lazily(&mut dest, &source).unwrap_err();
        assert!(matches!(err, LinkError::DanglingCall { callee, .. } if callee == helper));
        assert_eq!(dest, before);
    }

    #[test]
    fn test_declaration_merges_with_definition() {
        let mut decl_only = IrModule::new("decls");
        IrBuilder::new(&mut decl_only).declare_function("helper", f32_sig(), Linkage::External);

        let merged = link_all("merged", [&decl_only, &module_with_call("a")]).unwrap();
        assert_eq!(merged.functions.len(), 2);
        assert!(merged.is_materializable("helper"));
    }
}
