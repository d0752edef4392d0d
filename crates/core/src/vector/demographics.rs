//! Demographic polygon sources
//!
//! The pipeline consumes census-style polygons through [`DemographicSource`].
//! Retrieval from a live census service is out of scope; the file-backed
//! [`GeoJsonDemographics`] reads a local GeoJSON export instead.

use super::{read_features, FeatureCollection};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Selection of demographic units for one county
#[derive(Debug, Clone, PartialEq)]
pub struct CensusQuery {
    /// Survey year
    pub year: u16,
    /// State FIPS code, e.g. `"39"`
    pub state: String,
    /// County FIPS code, e.g. `"049"`
    pub county: String,
    /// Credential for sources that need one, loaded once at startup
    pub api_key: Option<String>,
}

impl CensusQuery {
    pub fn new(year: u16, state: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            year,
            state: state.into(),
            county: county.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Provider of demographic polygons with their attribute tables
pub trait DemographicSource {
    /// Fetch the units matching `query`
    fn fetch(&self, query: &CensusQuery) -> Result<FeatureCollection>;
}

/// Demographic units read from a GeoJSON file
#[derive(Debug, Clone)]
pub struct GeoJsonDemographics {
    path: PathBuf,
    state_field: String,
    county_field: String,
}

impl GeoJsonDemographics {
    /// Source filtering on the TIGER/Line `STATEFP` and `COUNTYFP` attributes
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state_field: "STATEFP".into(),
            county_field: "COUNTYFP".into(),
        }
    }

    pub fn with_fields(mut self, state_field: impl Into<String>, county_field: impl Into<String>) -> Self {
        self.state_field = state_field.into();
        self.county_field = county_field.into();
        self
    }
}

impl DemographicSource for GeoJsonDemographics {
    fn fetch(&self, query: &CensusQuery) -> Result<FeatureCollection> {
        let all = read_features(&self.path)?;
        let total = all.len();
        let crs = all.crs.clone();
        let features: Vec<_> = all
            .features
            .into_iter()
            .filter(|f| {
                let state = f.get_property(&self.state_field).map(|v| v.to_string());
                let county = f.get_property(&self.county_field).map(|v| v.to_string());
                state.as_deref() == Some(query.state.as_str())
                    && county.as_deref() == Some(query.county.as_str())
            })
            .collect();

        if features.is_empty() {
            return Err(Error::EmptyInput(format!(
                "no demographic units for state {} county {} in {}",
                query.state,
                query.county,
                self.path.display()
            )));
        }
        info!(
            year = query.year,
            state = %query.state,
            county = %query.county,
            units = features.len(),
            total,
            "loaded demographic units"
        );
        Ok(FeatureCollection { features, crs })
    }
}
