//! Kernel Fusion
//!
//! Synthesizes one kernel out of a chain of elementwise kernels so the chain
//! runs as a single dispatch. Each element is passed through the stages as
//! direct calls:
//!
//! ```text
//! define f32 @fused($0 %in: f32, $1 %x: u32, $2 %y: u32) {
//!   bb0: ; entry
//!     $3 = call @scale_x($0, $1)
//!     $4 = call @offset($3)
//!     $5 = call @bias_y($4, $2)
//!     ret $5
//! }
//! ```
//!
//! The pipeline is:
//! 1. [`reconcile`] merges the stage signatures, rejecting multi-input kernels
//!    and unknown signature bits.
//! 2. [`FusionPlan::build`] resolves every stage's entry point in the
//!    destination module and checks each call.
//! 3. [`FusionPlan::commit`] writes the fused function and its export record.
//!
//! Nothing but materialization touches the destination module before the
//! commit, so a failed request leaves it as it was.

mod chain;
mod emit;
mod error;
mod invoke;
mod plan;
mod signature;

pub use chain::{FusionChain, KernelDescriptor, KernelRef};
pub use error::{FusionError, ReconcileError};
pub use invoke::InvokeRef;
pub use plan::{FusedKernel, FusedParam, FusionPlan, Operand, PlannedCall};
pub use signature::reconcile;

use crate::config::FusionConfig;
use crate::ir::{IrFunctionId, IrModule};

/// Runs fusion and invoke-wrapping requests against destination modules.
///
/// Requests against one destination module must not overlap; the `&mut`
/// borrow on every entry point enforces that.
#[derive(Debug, Clone, Copy)]
pub struct Fuser<'c> {
    config: &'c FusionConfig,
}

impl<'c> Fuser<'c> {
    pub fn new(config: &'c FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse `chain` into a new kernel `name` in `dest`.
    pub fn fuse(
        &self,
        chain: &FusionChain<'_>,
        name: &str,
        dest: &mut IrModule,
    ) -> Result<FusedKernel, FusionError> {
        let plan = FusionPlan::build(chain, name, dest, self.config)?;
        Ok(plan.commit(dest, self.config))
    }

    /// Export the invokable `target` as a void wrapper called `name`.
    pub fn wrap_invoke(
        &self,
        target: &InvokeRef<'_>,
        name: &str,
        dest: &mut IrModule,
    ) -> Result<IrFunctionId, FusionError> {
        invoke::wrap(target, name, dest, self.config)
    }
}

/// [`Fuser::fuse`] with the default configuration
pub fn fuse_kernels(
    chain: &FusionChain<'_>,
    name: &str,
    dest: &mut IrModule,
) -> Result<FusedKernel, FusionError> {
    Fuser::new(&FusionConfig::default()).fuse(chain, name, dest)
}

/// [`Fuser::wrap_invoke`] with the default configuration
pub fn wrap_invoke(
    target: &InvokeRef<'_>,
    name: &str,
    dest: &mut IrModule,
) -> Result<IrFunctionId, FusionError> {
    Fuser::new(&FusionConfig::default()).wrap_invoke(target, name, dest)
}
