// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration
//!
//! The two locations the kernel needs: the catalog database file and the
//! content store directory. Values come from defaults, a TOML file, or
//! direct construction.
//!
//! ```toml
//! catalog_path = "provenance/rms_catalog.db"
//! content_dir = "provenance/resources"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rms_domain::RmsError;

/// Locations of the catalog and the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RmsConfig {
    /// SQLite database file; created when missing.
    pub catalog_path: PathBuf,
    /// Flat directory of dumped resource payloads; created when missing.
    pub content_dir: PathBuf,
}

impl Default for RmsConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("rms_catalog.db"),
            content_dir: PathBuf::from("rms_resources"),
        }
    }
}

impl RmsConfig {
    /// Builds a configuration rooted at a directory, with the default
    /// file names inside it.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            catalog_path: root.join("rms_catalog.db"),
            content_dir: root.join("rms_resources"),
        }
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, RmsError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RmsError::io_error(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| RmsError::serialization_error(format!("bad config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot work.
    pub fn validate(&self) -> Result<(), RmsError> {
        if self.catalog_path.as_os_str().is_empty() {
            return Err(RmsError::invalid_input("catalog_path must not be empty"));
        }
        if self.content_dir.as_os_str().is_empty() {
            return Err(RmsError::invalid_input("content_dir must not be empty"));
        }
        if self.catalog_path == self.content_dir {
            return Err(RmsError::invalid_input(
                "catalog_path and content_dir must differ",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        RmsConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_toml_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "catalog_path = \"cat.db\"\ncontent_dir = \"payloads\"").unwrap();
        let config = RmsConfig::from_toml_file(f.path()).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("cat.db"));
        assert_eq!(config.content_dir, PathBuf::from("payloads"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "content_dir = \"payloads\"").unwrap();
        let config = RmsConfig::from_toml_file(f.path()).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("rms_catalog.db"));
    }

    #[test]
    fn test_same_locations_rejected() {
        let config = RmsConfig {
            catalog_path: PathBuf::from("x"),
            content_dir: PathBuf::from("x"),
        };
        assert!(matches!(config.validate(), Err(RmsError::InvalidInput(_))));
    }
}
