//! Signature reconciliation
//!
//! Computes the calling signature a fused kernel exposes. Coordinates are the
//! union of what the stages need, the input comes from the first stage, and
//! the output from the last one.

use super::chain::FusionChain;
use super::error::ReconcileError;
use crate::metadata::ForEachSignature;
use log::{trace, warn};

/// Merge the signatures of every stage of `chain`.
///
/// Fails if any stage reads more than one input or carries a signature bit
/// outside [`ForEachSignature::FUSIBLE`].
pub fn reconcile(chain: &FusionChain<'_>) -> Result<ForEachSignature, ReconcileError> {
    let mut merged = ForEachSignature::empty();
    let mut first: Option<ForEachSignature> = None;
    let mut signature = ForEachSignature::empty();

    for (stage, kernel) in chain.stages().iter().enumerate() {
        let descriptor = kernel
            .describe()
            .map_err(|source| ReconcileError::Metadata { stage, source })?;

        if descriptor.input_count > 1 {
            warn!(
                "Kernel {} in module {} has multiple inputs",
                descriptor.slot, descriptor.module
            );
            return Err(ReconcileError::UnsupportedInput {
                stage,
                module: descriptor.module,
                kernel: descriptor.name,
                count: descriptor.input_count,
            });
        }

        signature = descriptor.signature;
        let unexpected = signature.unexpected_bits();
        if !unexpected.is_empty() {
            warn!("Unexpected signature {} seen while fusing kernels", signature);
            return Err(ReconcileError::UnsupportedSignatureBit {
                stage,
                module: descriptor.module,
                kernel: descriptor.name,
                signature,
                unexpected,
            });
        }

        trace!("stage {} '{}' signature {}", stage, descriptor.name, signature);
        if first.is_none() {
            first = Some(signature);
        }
        merged |= signature;
    }

    // `signature` now holds the last stage's bits
    if !first.is_some_and(|s| s.has_input()) {
        merged.remove(ForEachSignature::IN);
    }
    if !signature.has_output() {
        merged.remove(ForEachSignature::OUT);
    }

    Ok(merged)
}
