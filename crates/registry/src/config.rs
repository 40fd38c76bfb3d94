//! Registry configuration.
//!
//! Loaded from TOML; every field has a default, so an empty document is valid.
//!
//! ```toml
//! enforce_access = true
//! max_alias_hops = 16
//! max_address_depth = 64
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::ManagementRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
	/// When false, every caller is treated as holding every permission.
	pub enforce_access: bool,
	/// Maximum number of alias redirections a single resolution may follow.
	pub max_alias_hops: usize,
	/// Longest address accepted by registration and resolution entry points.
	pub max_address_depth: usize,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			enforce_access: true,
			max_alias_hops: 16,
			max_address_depth: 64,
		}
	}
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read registry config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid registry config: {0}")]
	Parse(#[from] toml::de::Error),
}

impl RegistryConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML config file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), ?config, "loaded registry config");
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_empty_document_yields_defaults() {
		assert_eq!(RegistryConfig::from_toml_str("").unwrap(), RegistryConfig::default());
	}

	#[test]
	fn test_partial_document_keeps_other_defaults() {
		let config = RegistryConfig::from_toml_str("max_alias_hops = 3").unwrap();
		assert_eq!(config.max_alias_hops, 3);
		assert!(config.enforce_access);
		assert_eq!(config.max_address_depth, 64);
	}

	#[test]
	fn test_unknown_field_rejected() {
		let err = RegistryConfig::from_toml_str("max_hops = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "enforce_access = false").unwrap();
		let config = RegistryConfig::load(file.path()).unwrap();
		assert!(!config.enforce_access);
	}

	#[test]
	fn test_load_missing_file_reports_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		match RegistryConfig::load(&path) {
			Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
			other => panic!("expected io error, got {other:?}"),
		}
	}
}
