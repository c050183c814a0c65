//! Kernel references and fusion chains

use super::error::FusionError;
use crate::ir::IrModule;
use crate::metadata::{ForEachSignature, MetadataError, MetadataExtractor};

/// One kernel slot of a compiled module.
#[derive(Debug, Clone, Copy)]
pub struct KernelRef<'m> {
    pub module: &'m IrModule,
    pub slot: usize,
}

/// What the metadata of a [`KernelRef`] says about the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDescriptor {
    pub module: String,
    pub slot: usize,
    /// Exported symbol name; empty when the slot is unused
    pub name: String,
    pub input_count: u32,
    pub signature: ForEachSignature,
}

impl<'m> KernelRef<'m> {
    pub fn new(module: &'m IrModule, slot: usize) -> Self {
        Self { module, slot }
    }

    /// Read this slot's metadata. Nothing is cached: every call extracts again.
    pub fn describe(&self) -> Result<KernelDescriptor, MetadataError> {
        let mut metadata = MetadataExtractor::new(self.module);
        metadata.extract()?;
        metadata.check_foreach_slot(self.slot)?;

        Ok(KernelDescriptor {
            module: self.module.name.clone(),
            slot: self.slot,
            name: metadata.export_foreach_names()[self.slot].clone(),
            input_count: metadata.export_foreach_input_counts()[self.slot],
            signature: metadata.export_foreach_signatures()[self.slot],
        })
    }
}

impl KernelDescriptor {
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Ordered, non-empty list of kernels to run back to back on one element.
///
/// Stages may come from different source modules.
#[derive(Debug, Clone)]
pub struct FusionChain<'m> {
    stages: Vec<KernelRef<'m>>,
}

impl<'m> FusionChain<'m> {
    pub fn new(stages: Vec<KernelRef<'m>>) -> Result<Self, FusionError> {
        if stages.is_empty() {
            return Err(FusionError::EmptyChain);
        }
        Ok(Self { stages })
    }

    /// Build a chain from parallel module and slot lists
    pub fn from_slots(
        modules: &[&'m IrModule],
        slots: &[usize],
    ) -> Result<Self, FusionError> {
        if modules.len() != slots.len() {
            return Err(FusionError::SlotCountMismatch {
                modules: modules.len(),
                slots: slots.len(),
            });
        }
        let stages = modules
            .iter()
            .zip(slots)
            .map(|(module, slot)| KernelRef::new(*module, *slot))
            .collect();
        Self::new(stages)
    }

    pub fn stages(&self) -> &[KernelRef<'m>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Never true for a constructed chain; pairs with `len`
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn first(&self) -> &KernelRef<'m> {
        &self.stages[0]
    }

    pub fn last(&self) -> &KernelRef<'m> {
        &self.stages[self.stages.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::export_foreach;

    #[test]
    fn test_empty_chain_is_rejected() {
        let err = FusionChain::new(Vec::new()).unwrap_err();
        assert_eq!(err, FusionError::EmptyChain);
    }

    #[test]
    fn test_describe_reads_slot() {
        let mut module = IrModule::new("m");
        export_foreach(&mut module, "", ForEachSignature::empty());
        export_foreach(&mut module, "legacy", ForEachSignature::IN | ForEachSignature::OUT);

        let d = KernelRef::new(&module, 1).describe().unwrap();
        assert_eq!(d.name, "legacy");
        assert_eq!(d.input_count, 1);
        assert!(d.has_name());

        let unused = KernelRef::new(&module, 0).describe().unwrap();
        assert!(!unused.has_name());

        assert!(KernelRef::new(&module, 2).describe().is_err());
    }

    #[test]
    fn test_from_slots_pairs_modules_and_slots() {
        let a = IrModule::new("a");
        let b = IrModule::new("b");
        let chain = FusionChain::from_slots(&[&a, &b], &[3, 1]).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
        assert_eq!(chain.first().module.name, "a");
        assert_eq!(chain.last().slot, 1);
    }

    #[test]
    fn test_from_slots_rejects_unpaired_lists() {
        let a = IrModule::new("a");
        let err = FusionChain::from_slots(&[&a, &a], &[0]).unwrap_err();
        assert_eq!(err, FusionError::SlotCountMismatch { modules: 2, slots: 1 });

        let err = FusionChain::from_slots(&[&a], &[0, 1]).unwrap_err();
        assert_eq!(err, FusionError::SlotCountMismatch { modules: 1, slots: 2 });
    }
}
