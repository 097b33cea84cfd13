// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::model::{DemRegistry, RegistryFile};
use crate::errors::Result;

/// Build the effective DEM registry: built-in defaults, optionally merged
/// with a user-supplied TOML file.
pub fn load_registry(path: Option<&Path>) -> Result<DemRegistry> {
    let mut registry = DemRegistry::with_defaults();

    if let Some(path) = path {
        let contents = fs::read_to_string(path)?;
        let file: RegistryFile = toml::from_str(&contents)?;
        info!(path = %path.display(), entries = file.dems.len(), "merging DEM registry file");
        registry.merge(file)?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_yields_defaults() {
        let registry = load_registry(None).unwrap();
        assert!(registry.aliases().any(|a| a == "SRTM"));
    }

    #[test]
    fn file_entries_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        fs::write(
            &path,
            "[dems]\nCOP30 = \"https://example.com/cop30.tif\"\n",
        )
        .unwrap();

        let registry = load_registry(Some(&path)).unwrap();
        assert_eq!(
            registry.resolve("COP30").unwrap(),
            "https://example.com/cop30.tif"
        );
        // Defaults survive the merge.
        assert!(registry.resolve("SRTM").is_ok());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        fs::write(&path, "[dems\n").unwrap();
        assert!(load_registry(Some(&path)).is_err());
    }
}
