//! Fusion error types

use crate::metadata::{ForEachSignature, MetadataError};
use thiserror::Error;

/// Why a chain could not be given a single merged signature
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A stage reads more than one input array
    #[error("stage {stage}: kernel '{kernel}' in module '{module}' reads {count} inputs")]
    UnsupportedInput {
        stage: usize,
        module: String,
        kernel: String,
        count: u32,
    },

    /// A stage's signature carries bits outside the fusible set
    #[error(
        "stage {stage}: kernel '{kernel}' in module '{module}' has unexpected signature {signature} (bits {unexpected})"
    )]
    UnsupportedSignatureBit {
        stage: usize,
        module: String,
        kernel: String,
        signature: ForEachSignature,
        unexpected: ForEachSignature,
    },

    /// The stage's metadata could not be read
    #[error("stage {stage}: {source}")]
    Metadata {
        stage: usize,
        #[source]
        source: MetadataError,
    },
}

/// Errors reported by [`crate::fusion::Fuser`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FusionError {
    #[error("cannot fuse an empty kernel chain")]
    EmptyChain,

    /// Parallel module and slot lists of different lengths
    #[error("{modules} modules given for {slots} slots")]
    SlotCountMismatch { modules: usize, slots: usize },

    #[error("signature reconciliation failed: {0}")]
    Reconciliation(#[from] ReconcileError),

    /// The slot exists but exports no kernel
    #[error("stage {stage}: slot {slot} of module '{module}' exports no kernel")]
    UnnamedKernel {
        stage: usize,
        module: String,
        slot: usize,
    },

    /// The entry point is missing from the destination module
    #[error("'{name}' cannot be resolved in module '{module}'")]
    UnresolvedFunction { name: String, module: String },

    #[error("kernel '{name}' declares an input but takes no parameters")]
    MissingInputParameter { name: String },

    #[error("stage {stage}: kernel '{name}' expects an input but the previous stage returns void")]
    VoidIntermediate { stage: usize, name: String },

    #[error("'{function}' takes {expected} arguments but is given {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("symbol '{name}' already exists in module '{module}'")]
    NameCollision { name: String, module: String },

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl FusionError {
    /// Whether the failure came from signature reconciliation
    pub fn is_reconciliation(&self) -> bool {
        matches!(self, FusionError::Reconciliation(_))
    }
}
