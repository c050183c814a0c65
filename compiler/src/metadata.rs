//! Kernel export metadata
//!
//! Compiled kernel modules advertise their entry points through named string
//! tables. Each foreach slot has a name (possibly empty for an unused slot) and
//! a decimal signature token; invokable functions live in a separate table.
//!
//! | table                     | one entry per slot                 |
//! |---------------------------|------------------------------------|
//! | `#rs_export_foreach_name` | kernel symbol name                 |
//! | `#rs_export_foreach`      | signature bitmask, decimal string  |
//! | `#rs_export_func`         | invokable symbol name              |
//!
//! [`MetadataExtractor`] reads these tables back and derives each kernel's
//! input count from its declared parameters.

use crate::ir::IrModule;
use bitflags::bitflags;
use log::trace;
use std::fmt;
use thiserror::Error;

pub const EXPORT_FOREACH_NAME_MD: &str = "#rs_export_foreach_name";
pub const EXPORT_FOREACH_MD: &str = "#rs_export_foreach";
pub const EXPORT_FUNC_MD: &str = "#rs_export_func";

bitflags! {
    /// Parameter shape of a foreach kernel.
    #[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ForEachSignature: u32 {
        const IN     = 0x01;
        const OUT    = 0x02;
        const USR    = 0x04;
        const X      = 0x08;
        const Y      = 0x10;
        const KERNEL = 0x20;
        const Z      = 0x40;
        const CTXT   = 0x80;
    }
}

impl ForEachSignature {
    /// Bits a kernel may carry and still take part in fusion
    pub const FUSIBLE: Self = Self::IN
        .union(Self::OUT)
        .union(Self::X)
        .union(Self::Y)
        .union(Self::Z)
        .union(Self::KERNEL);

    /// Coordinates in argument order
    pub const COORDINATES: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Wrap a raw bitmask, keeping bits this version does not name
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn has_input(self) -> bool {
        self.contains(Self::IN)
    }

    pub fn has_output(self) -> bool {
        self.contains(Self::OUT)
    }

    pub fn has_x(self) -> bool {
        self.contains(Self::X)
    }

    pub fn has_y(self) -> bool {
        self.contains(Self::Y)
    }

    pub fn has_z(self) -> bool {
        self.contains(Self::Z)
    }

    pub fn is_kernel(self) -> bool {
        self.contains(Self::KERNEL)
    }

    pub fn has_context(self) -> bool {
        self.contains(Self::CTXT)
    }

    /// Bits outside [`ForEachSignature::FUSIBLE`]
    pub fn unexpected_bits(self) -> Self {
        self.difference(Self::FUSIBLE)
    }

    /// Coordinate flags set in this signature, in X, Y, Z order
    pub fn coordinates(self) -> impl Iterator<Item = Self> {
        Self::COORDINATES.into_iter().filter(move |c| self.contains(*c))
    }

    /// Decimal token as stored in `#rs_export_foreach`
    pub fn to_token(self) -> String {
        self.bits().to_string()
    }

    pub fn parse_token(token: &str) -> Option<Self> {
        token.trim().parse::<u32>().ok().map(Self::from_raw)
    }
}

impl fmt::Display for ForEachSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.bits())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("module '{module}' exports {names} foreach names but {signatures} signatures")]
    LengthMismatch {
        module: String,
        names: usize,
        signatures: usize,
    },

    #[error("module '{module}' slot {slot}: invalid signature token '{token}'")]
    InvalidSignature {
        module: String,
        slot: usize,
        token: String,
    },

    #[error("module '{module}' exports kernel '{name}' but does not declare it")]
    MissingKernel { module: String, name: String },

    #[error("module '{module}' slot {slot}: {reason}")]
    MalformedKernel {
        module: String,
        slot: usize,
        reason: String,
    },

    #[error("module '{module}' has no {table} slot {slot} (only {len})")]
    SlotOutOfRange {
        module: String,
        table: &'static str,
        slot: usize,
        len: usize,
    },
}

/// Reads the export tables of one module.
pub struct MetadataExtractor<'m> {
    module: &'m IrModule,
    foreach_names: Vec<String>,
    foreach_input_counts: Vec<u32>,
    foreach_signatures: Vec<ForEachSignature>,
    func_names: Vec<String>,
}

impl<'m> MetadataExtractor<'m> {
    pub fn new(module: &'m IrModule) -> Self {
        Self {
            module,
            foreach_names: Vec::new(),
            foreach_input_counts: Vec::new(),
            foreach_signatures: Vec::new(),
            func_names: Vec::new(),
        }
    }

    /// Parse the export tables. Accessors return empty slices until this succeeds.
    pub fn extract(&mut self) -> Result<(), MetadataError> {
        let module = self.module;
        let names = module.named_metadata(EXPORT_FOREACH_NAME_MD);
        let tokens = module.named_metadata(EXPORT_FOREACH_MD);

        if names.len() != tokens.len() {
            return Err(MetadataError::LengthMismatch {
                module: module.name.clone(),
                names: names.len(),
                signatures: tokens.len(),
            });
        }

        let mut signatures = Vec::with_capacity(tokens.len());
        let mut input_counts = Vec::with_capacity(tokens.len());
        for (slot, (name, token)) in names.iter().zip(tokens).enumerate() {
            let signature = ForEachSignature::parse_token(token).ok_or_else(|| {
                MetadataError::InvalidSignature {
                    module: module.name.clone(),
                    slot,
                    token: token.clone(),
                }
            })?;
            input_counts.push(input_count(module, slot, name, signature)?);
            signatures.push(signature);
        }

        self.foreach_names = names.to_vec();
        self.foreach_signatures = signatures;
        self.foreach_input_counts = input_counts;
        self.func_names = module.named_metadata(EXPORT_FUNC_MD).to_vec();
        trace!(
            "extracted {} foreach / {} invokable slots from '{}'",
            self.foreach_names.len(),
            self.func_names.len(),
            module.name
        );
        Ok(())
    }

    pub fn module(&self) -> &'m IrModule {
        self.module
    }

    pub fn export_foreach_names(&self) -> &[String] {
        &self.foreach_names
    }

    pub fn export_foreach_input_counts(&self) -> &[u32] {
        &self.foreach_input_counts
    }

    pub fn export_foreach_signatures(&self) -> &[ForEachSignature] {
        &self.foreach_signatures
    }

    pub fn export_func_names(&self) -> &[String] {
        &self.func_names
    }

    /// Check `slot` against the foreach tables
    pub fn check_foreach_slot(&self, slot: usize) -> Result<(), MetadataError> {
        check_slot(self.module, "foreach", slot, self.foreach_names.len())
    }

    /// Check `slot` against the invokable table
    pub fn check_func_slot(&self, slot: usize) -> Result<(), MetadataError> {
        check_slot(self.module, "invokable", slot, self.func_names.len())
    }
}

fn check_slot(
    module: &IrModule,
    table: &'static str,
    slot: usize,
    len: usize,
) -> Result<(), MetadataError> {
    if slot < len {
        Ok(())
    } else {
        Err(MetadataError::SlotOutOfRange {
            module: module.name.clone(),
            table,
            slot,
            len,
        })
    }
}

/// Number of data inputs a kernel reads.
///
/// Kernel-style entry points take their inputs first, followed by the context
/// argument (if any) and one integer per coordinate. Legacy entry points read
/// at most one input, flagged by `IN`.
fn input_count(
    module: &IrModule,
    slot: usize,
    name: &str,
    signature: ForEachSignature,
) -> Result<u32, MetadataError> {
    if name.is_empty() {
        return Ok(0);
    }
    if !signature.is_kernel() {
        return Ok(u32::from(signature.has_input()));
    }

    let id = module
        .function_id(name)
        .ok_or_else(|| MetadataError::MissingKernel {
            module: module.name.clone(),
            name: name.to_string(),
        })?;
    let params = module
        .get_function(id)
        .map(|f| f.signature.parameters.len())
        .unwrap_or(0);

    let special = signature.coordinates().count() + usize::from(signature.has_context());
    let inputs = params
        .checked_sub(special)
        .ok_or_else(|| MetadataError::MalformedKernel {
            module: module.name.clone(),
            slot,
            reason: format!(
                "kernel '{}' has {} parameters but its signature needs {}",
                name, params, special
            ),
        })?;
    Ok(inputs as u32)
}

/// Advertise `name` as a foreach kernel with the given signature.
pub fn export_foreach(module: &mut IrModule, name: &str, signature: ForEachSignature) {
    module.append_named_metadata(EXPORT_FOREACH_NAME_MD, name);
    module.append_named_metadata(EXPORT_FOREACH_MD, signature.to_token());
}

/// Advertise `name` as an invokable function.
pub fn export_func(module: &mut IrModule, name: &str) {
    module.append_named_metadata(EXPORT_FUNC_MD, name);
}
