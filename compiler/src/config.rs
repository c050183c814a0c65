//! Fusion configuration
//!
//! One [`FusionConfig`] is created at startup and passed by reference to every
//! fusion request. It can be loaded from a TOML file; absent keys keep their
//! defaults:
//!
//! ```toml
//! coordinate_type = "U32"
//! entry_label = "entry"
//! verify = true
//! ```

use crate::ir::IrType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Type of the x/y/z coordinate parameters of synthesized kernels
    pub coordinate_type: IrType,

    /// Label given to the entry block of synthesized functions
    pub entry_label: String,

    /// Validate the destination module after each successful request
    pub verify: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            coordinate_type: IrType::U32,
            entry_label: "entry".to_string(),
            verify: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fusion config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("coordinate type must be an integer type, got {0}")]
    CoordinateType(IrType),
}

impl FusionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: FusionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.coordinate_type.is_integer() {
            return Err(ConfigError::CoordinateType(self.coordinate_type.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = FusionConfig::from_toml_str("verify = false").unwrap();
        assert_eq!(config.coordinate_type, IrType::U32);
        assert_eq!(config.entry_label, "entry");
        assert!(!config.verify);
    }

    #[test]
    fn test_coordinate_type_override() {
        let config = FusionConfig::from_toml_str("coordinate_type = \"I32\"").unwrap();
        assert_eq!(config.coordinate_type, IrType::I32);
    }

    #[test]
    fn test_rejects_non_integer_coordinates() {
        let err = FusionConfig::from_toml_str("coordinate_type = \"F32\"").unwrap_err();
        assert!(matches!(err, ConfigError::CoordinateType(IrType::F32)));
        assert!(matches!(
            FusionConfig::from_toml_str("verify = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
