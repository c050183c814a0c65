//! Kernel bundles
//!
//! A bundle is the set of compiled kernel modules a fusion request draws its
//! stages from. Bundles are stored either as JSON, for inspection and hand
//! editing, or as a compact `postcard` image:
//!
//! | bytes | content                      |
//! |-------|------------------------------|
//! | 0..4  | magic `KFBN`                 |
//! | 4..   | varint format version, then the modules |
//!
//! [`KernelBundle::load`] tells the two apart by the magic.

use crate::ir::linker::{link_all, LinkError};
use crate::ir::IrModule;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Magic number of binary bundle images
const BUNDLE_MAGIC: &[u8; 4] = b"KFBN";

/// Current binary bundle version
const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("invalid bundle magic number")]
    InvalidMagic,

    #[error("unsupported bundle version: {0}")]
    UnsupportedVersion(u32),
}

/// On-disk encoding of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    Json,
    Postcard,
}

#[derive(Serialize, Deserialize)]
struct BundleImage<M> {
    magic: [u8; 4],
    version: u32,
    modules: M,
}

/// An ordered collection of kernel modules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelBundle {
    pub modules: Vec<IrModule>,
}

impl KernelBundle {
    pub fn new(modules: Vec<IrModule>) -> Self {
        Self { modules }
    }

    pub fn module(&self, name: &str) -> Option<&IrModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Link every module into one destination module called `name`
    pub fn link(&self, name: &str) -> Result<IrModule, LinkError> {
        link_all(name, &self.modules)
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
        let image = BundleImage {
            magic: *BUNDLE_MAGIC,
            version: BUNDLE_VERSION,
            modules: &self.modules,
        };
        Ok(postcard::to_allocvec(&image)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
        let image: BundleImage<Vec<IrModule>> = postcard::from_bytes(bytes)?;

        if &image.magic != BUNDLE_MAGIC {
            return Err(BundleError::InvalidMagic);
        }
        if image.version != BUNDLE_VERSION {
            return Err(BundleError::UnsupportedVersion(image.version));
        }

        Ok(Self::new(image.modules))
    }

    /// Encode in `format`
    pub fn encode(&self, format: BundleFormat) -> Result<Vec<u8>, BundleError> {
        match format {
            BundleFormat::Json => Ok(self.to_json()?.into_bytes()),
            BundleFormat::Postcard => self.to_bytes(),
        }
    }

    /// Decode either format
    pub fn decode(bytes: &[u8]) -> Result<Self, BundleError> {
        if bytes.starts_with(BUNDLE_MAGIC) {
            Self::from_bytes(bytes)
        } else {
            Ok(serde_json::from_slice(bytes)?)
        }
    }

    pub fn save(&self, path: impl AsRef<Path>, format: BundleFormat) -> Result<(), BundleError> {
        let path = path.as_ref();
        let bytes = self.encode(format)?;
        debug!("writing {} bytes of {:?} bundle to {}", bytes.len(), format, path.display());
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}
