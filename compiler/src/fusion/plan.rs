//! Fusion planning
//!
//! A [`FusionPlan`] is built in full before anything is written to the
//! destination module. Building resolves every stage, derives the fused
//! parameter list and checks each call; committing only emits what the plan
//! describes and cannot fail.

use super::chain::{FusionChain, KernelDescriptor, KernelRef};
use super::emit::BlockEmitter;
use super::error::FusionError;
use super::signature::reconcile;
use crate::config::FusionConfig;
use crate::ir::{CallingConvention, IrFunctionId, IrFunctionSignature, IrId, IrModule, IrType, Linkage};
use crate::metadata::{export_foreach, ForEachSignature};
use log::{debug, info};
use smallvec::SmallVec;

/// Value passed to a planned call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The fused kernel's input element
    DataIn,
    X,
    Y,
    Z,
    /// Result of the preceding call
    Previous,
}

impl Operand {
    fn coordinate(flag: ForEachSignature) -> Self {
        if flag == ForEachSignature::X {
            Operand::X
        } else if flag == ForEachSignature::Y {
            Operand::Y
        } else {
            Operand::Z
        }
    }

    fn param_name(self) -> &'static str {
        match self {
            Operand::DataIn => "in",
            Operand::X => "x",
            Operand::Y => "y",
            Operand::Z => "z",
            Operand::Previous => "prev",
        }
    }
}

/// One parameter of the fused kernel
#[derive(Debug, Clone, PartialEq)]
pub struct FusedParam {
    pub operand: Operand,
    pub name: &'static str,
    pub ty: IrType,
}

/// One stage call of the fused body
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCall {
    pub stage: usize,
    pub callee: IrFunctionId,
    pub callee_name: String,
    pub operands: SmallVec<[Operand; 4]>,
    pub result_type: IrType,
}

/// Everything needed to emit a fused kernel
#[derive(Debug, Clone, PartialEq)]
pub struct FusionPlan {
    pub name: String,
    pub signature: ForEachSignature,
    pub params: Vec<FusedParam>,
    pub return_type: IrType,
    pub calls: Vec<PlannedCall>,
}

/// Result of committing a plan
#[derive(Debug, Clone, PartialEq)]
pub struct FusedKernel {
    pub id: IrFunctionId,
    pub name: String,
    pub signature: ForEachSignature,
    pub stages: usize,
}

/// A stage whose entry point has been found in the destination module
struct ResolvedStage {
    descriptor: KernelDescriptor,
    id: IrFunctionId,
    params: Vec<IrType>,
    return_type: IrType,
}

fn resolve_stage(
    stage: usize,
    kernel: &KernelRef<'_>,
    dest: &mut IrModule,
) -> Result<ResolvedStage, FusionError> {
    let descriptor = kernel.describe()?;
    if !descriptor.has_name() {
        return Err(FusionError::UnnamedKernel {
            stage,
            module: descriptor.module,
            slot: descriptor.slot,
        });
    }

    dest.materialize(&descriptor.name);
    let function = dest.get_function_by_name(&descriptor.name).ok_or_else(|| {
        FusionError::UnresolvedFunction {
            name: descriptor.name.clone(),
            module: dest.name.clone(),
        }
    })?;

    Ok(ResolvedStage {
        id: function.id,
        params: function.signature.param_types(),
        return_type: function.return_type().clone(),
        descriptor,
    })
}

impl FusionPlan {
    /// Plan the fusion of `chain` into a kernel called `name`.
    ///
    /// The only change this makes to `dest` is materializing the stages'
    /// entry points.
    pub fn build(
        chain: &FusionChain<'_>,
        name: &str,
        dest: &mut IrModule,
        config: &FusionConfig,
    ) -> Result<Self, FusionError> {
        let signature = reconcile(chain)?;
        debug!("chain of {} stages reconciled to {}", chain.len(), signature);

        if dest.has_symbol(name) {
            return Err(FusionError::NameCollision {
                name: name.to_string(),
                module: dest.name.clone(),
            });
        }

        let first = resolve_stage(0, chain.first(), dest)?;
        let last = resolve_stage(chain.len() - 1, chain.last(), dest)?;

        let mut params = Vec::new();
        if signature.has_input() {
            let ty = first.params.first().cloned().ok_or_else(|| {
                FusionError::MissingInputParameter {
                    name: first.descriptor.name.clone(),
                }
            })?;
            params.push(FusedParam {
                operand: Operand::DataIn,
                name: Operand::DataIn.param_name(),
                ty,
            });
        }
        for flag in signature.coordinates() {
            let operand = Operand::coordinate(flag);
            params.push(FusedParam {
                operand,
                name: operand.param_name(),
                ty: config.coordinate_type.clone(),
            });
        }

        let mut current = signature.has_input().then_some(Operand::DataIn);
        let mut calls = Vec::with_capacity(chain.len());
        for (stage, kernel) in chain.stages().iter().enumerate() {
            let resolved = resolve_stage(stage, kernel, dest)?;
            let stage_sig = resolved.descriptor.signature;

            let mut operands = SmallVec::new();
            if stage_sig.has_input() {
                let value = current.ok_or_else(|| FusionError::VoidIntermediate {
                    stage,
                    name: resolved.descriptor.name.clone(),
                })?;
                operands.push(value);
            }
            operands.extend(stage_sig.coordinates().map(Operand::coordinate));

            if operands.len() != resolved.params.len() {
                return Err(FusionError::ArityMismatch {
                    function: resolved.descriptor.name,
                    expected: resolved.params.len(),
                    found: operands.len(),
                });
            }

            current = (!resolved.return_type.is_void()).then_some(Operand::Previous);
            debug!(
                "stage {}: call '{}' with {:?}",
                stage, resolved.descriptor.name, operands
            );
            calls.push(PlannedCall {
                stage,
                callee: resolved.id,
                callee_name: resolved.descriptor.name,
                operands,
                result_type: resolved.return_type,
            });
        }

        Ok(Self {
            name: name.to_string(),
            signature,
            params,
            return_type: last.return_type,
            calls,
        })
    }

    /// Signature of the function the plan emits
    pub fn function_signature(&self) -> IrFunctionSignature {
        IrFunctionSignature::new(
            self.params.iter().map(|p| (p.name, p.ty.clone())),
            self.return_type.clone(),
            CallingConvention::Kernel,
        )
    }

    /// Emit the fused kernel into `dest` and advertise it.
    pub fn commit(self, dest: &mut IrModule, config: &FusionConfig) -> FusedKernel {
        let id = dest.alloc_function_id();
        let mut emitter =
            BlockEmitter::new(id, &self.name, self.function_signature(), Linkage::Public);

        let bind = |operand: Operand| {
            self.params
                .iter()
                .position(|p| p.operand == operand)
                .map(|i| emitter.param(i))
                .unwrap_or_else(IrId::invalid)
        };
        let data_in = bind(Operand::DataIn);
        let coords = [bind(Operand::X), bind(Operand::Y), bind(Operand::Z)];

        let mut current = data_in;
        for call in &self.calls {
            let args = call
                .operands
                .iter()
                .map(|operand| match operand {
                    Operand::DataIn => data_in,
                    Operand::X => coords[0],
                    Operand::Y => coords[1],
                    Operand::Z => coords[2],
                    Operand::Previous => current,
                })
                .collect();
            current = emitter.call(call.callee, args, &call.result_type);
        }

        let value = (!self.return_type.is_void()).then_some(current);
        dest.add_function(emitter.finish(&config.entry_label, value));
        export_foreach(dest, &self.name, self.signature);

        info!(
            "fused {} kernels into '{}' ({}) in module '{}'",
            self.calls.len(),
            self.name,
            self.signature,
            dest.name
        );
        FusedKernel {
            id,
            name: self.name,
            signature: self.signature,
            stages: self.calls.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use crate::metadata::export_foreach;

    const KERNEL: ForEachSignature = ForEachSignature::KERNEL;

    fn declare(module: &mut IrModule, name: &str, params: &[(&str, IrType)], ret: IrType) {
        let sig = IrFunctionSignature::new(params.iter().cloned(), ret, CallingConvention::Kernel);
        IrBuilder::new(module).declare_function(name, sig, Linkage::External);
    }

    fn sources() -> IrModule {
        let mut m = IrModule::new("src");
        declare(&mut m, "ax", &[("in", IrType::F32), ("x", IrType::U32)], IrType::F32);
        declare(&mut m, "b", &[("in", IrType::F32)], IrType::F32);
        declare(&mut m, "sink", &[("in", IrType::F32)], IrType::Void);
        let io = KERNEL | ForEachSignature::IN | ForEachSignature::OUT;
        export_foreach(&mut m, "ax", io | ForEachSignature::X);
        export_foreach(&mut m, "b", io);
        export_foreach(&mut m, "sink", KERNEL | ForEachSignature::IN);
        m
    }

    fn chain<'m>(module: &'m IrModule, slots: &[usize]) -> FusionChain<'m> {
        FusionChain::new(slots.iter().map(|s| KernelRef::new(module, *s)).collect()).unwrap()
    }

    #[test]
    fn test_plan_operands() {
        let src = sources();
        let mut dest = src.clone();
        let plan =
            FusionPlan::build(&chain(&src, &[0, 1]), "fused", &mut dest, &FusionConfig::default())
                .unwrap();

        let names: Vec<_> = plan.params.iter().map(|p| p.name).collect();
        assert_eq!(names, ["in", "x"]);
        assert_eq!(plan.calls[0].operands.as_slice(), [Operand::DataIn, Operand::X]);
        assert_eq!(plan.calls[1].operands.as_slice(), [Operand::Previous]);
        assert_eq!(plan.return_type, IrType::F32);
    }

    #[test]
    fn test_void_stage_cannot_feed_next() {
        let src = sources();
        let mut dest = src.clone();
        let err =
            FusionPlan::build(&chain(&src, &[2, 1]), "fused", &mut dest, &FusionConfig::default())
                .unwrap_err();
        assert_eq!(
            err,
            FusionError::VoidIntermediate {
                stage: 1,
                name: "b".to_string()
            }
        );
    }

    #[test]
    fn test_planning_leaves_destination_untouched() {
        let src = sources();
        let mut dest = src.clone();
        let before = dest.clone();
        let _ = FusionPlan::build(&chain(&src, &[2, 1]), "fused", &mut dest, &FusionConfig::default());
        assert_eq!(dest, before);
    }

    #[test]
    fn test_commit_returns_nothing_for_void_chain() {
        let src = sources();
        let mut dest = src.clone();
        let config = FusionConfig::default();
        let plan = FusionPlan::build(&chain(&src, &[1, 2]), "drain", &mut dest, &config).unwrap();
        assert_eq!(plan.return_type, IrType::Void);

        let fused = plan.commit(&mut dest, &config);
        let f = dest.get_function(fused.id).unwrap();
        let block = f.cfg.get_block(f.entry_block()).unwrap();
        assert_eq!(block.call_count(), 2);
        assert!(matches!(
            block.terminator,
            crate::ir::IrTerminator::Return { value: None }
        ));
    }
}
