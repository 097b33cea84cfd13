// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::{DemflowError, Result};

/// Public data-cache URL base the built-in DEM aliases resolve against.
const URL_BASE: &str = "https://storage.googleapis.com/natcap-data-cache/global";

/// On-disk registry file:
///
/// ```toml
/// [dems]
/// SRTM = "https://example.com/srtm.tif"
/// LOCAL_LIDAR = "https://tiles.example.org/lidar-1m.tif"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub dems: BTreeMap<String, String>,
}

/// Known DEM aliases, each mapping to the HTTPS URL of a global raster
/// layer.
#[derive(Debug, Clone)]
pub struct DemRegistry {
    dems: BTreeMap<String, String>,
}

impl DemRegistry {
    /// Registry with only the built-in aliases.
    pub fn with_defaults() -> Self {
        let mut dems = BTreeMap::new();
        dems.insert(
            "SRTM".to_string(),
            format!("{URL_BASE}/nasa-srtm-v3-1s/srtm-v3-1s.tif"),
        );
        dems.insert(
            "ASTER".to_string(),
            format!("{URL_BASE}/aster-v3-1s/aster-v3-1s.tif"),
        );
        dems.insert(
            "NASA_HGT".to_string(),
            format!("{URL_BASE}/nasa-hgt-v1-1s/nasa-hgt-v1-1s.tif"),
        );
        Self { dems }
    }

    /// Merge entries from a registry file over the defaults. User entries
    /// win on alias collision.
    pub fn merge(&mut self, file: RegistryFile) -> Result<()> {
        for (alias, url) in file.dems {
            if alias.trim().is_empty() {
                return Err(DemflowError::Configuration(
                    "DEM registry contains an empty alias".to_string(),
                ));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DemflowError::Configuration(format!(
                    "DEM '{alias}' has a non-http(s) URL: '{url}'"
                )));
            }
            self.dems.insert(alias, url);
        }
        Ok(())
    }

    /// Resolve an alias to its source URL.
    pub fn resolve(&self, alias: &str) -> Result<&str> {
        self.dems.get(alias).map(|s| s.as_str()).ok_or_else(|| {
            let known: Vec<&str> = self.dems.keys().map(|s| s.as_str()).collect();
            DemflowError::Configuration(format!(
                "unknown DEM alias '{alias}'; known aliases: {}",
                known.join(", ")
            ))
        })
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.dems.keys().map(|s| s.as_str())
    }
}
