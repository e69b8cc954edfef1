//! Static region / sub-region reference data
//!
//! Loaded once at startup from `provinces.json` and `cities.json`. Lookups
//! preserve the file order, which is the order suggestions are shown in.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRegion {
    pub id: i64,
    pub name: String,
    #[serde(rename = "province_id")]
    pub region_id: i64,
}

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Read-only lookup over the reference data
pub trait RegionLookup: Send + Sync {
    fn regions(&self) -> &[Region];

    fn sub_regions(&self) -> &[SubRegion];

    fn region(&self, id: i64) -> Option<&Region> {
        self.regions().iter().find(|r| r.id == id)
    }

    fn sub_region(&self, id: i64) -> Option<&SubRegion> {
        self.sub_regions().iter().find(|c| c.id == id)
    }

    /// Sub-regions belonging to `region_id`, in source order
    fn sub_regions_of(&self, region_id: i64) -> Vec<&SubRegion> {
        self.sub_regions()
            .iter()
            .filter(|c| c.region_id == region_id)
            .collect()
    }
}

/// In-memory reference data
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    regions: Vec<Region>,
    sub_regions: Vec<SubRegion>,
}

impl ReferenceData {
    pub fn new(regions: Vec<Region>, sub_regions: Vec<SubRegion>) -> Self {
        Self {
            regions,
            sub_regions,
        }
    }

    /// Load `provinces.json` and `cities.json` from `dir`
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let dir = dir.as_ref();
        let regions = read_json(&dir.join("provinces.json"))?;
        let sub_regions = read_json(&dir.join("cities.json"))?;
        Ok(Self::new(regions, sub_regions))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ReferenceError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ReferenceError::Parse {
        path: display,
        source,
    })
}

impl RegionLookup for ReferenceData {
    fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn sub_regions(&self) -> &[SubRegion] {
        &self.sub_regions
    }
}
