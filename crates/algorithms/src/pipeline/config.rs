//! Run configuration loaded from JSON

use crate::alignment::{AlignParams, ReferenceRule, ResamplingMethod};
use crate::classification::check_percentile;
use crate::imagery::{BandMapping, SensorCalibration};
use heatrisk_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings of one pipeline run. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stack positions of red, NIR, SWIR1 and thermal bands
    pub bands: BandMapping,
    /// Thermal band calibration (default Landsat 8 band 10)
    pub calibration: SensorCalibration,
    /// Percentile of UHRI above which a cell is a hotspot
    pub hotspot_percentile: f64,
    pub resampling: ResamplingMethod,
    pub reference: ReferenceRule,
    /// Mask cells outside the boundary polygon after the rectangular clip
    pub mask_polygon: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bands: BandMapping::default(),
            calibration: SensorCalibration::default(),
            hotspot_percentile: 90.0,
            resampling: ResamplingMethod::default(),
            reference: ReferenceRule::default(),
            mask_polygon: false,
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text, &path.display().to_string())
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(text: &str, source_name: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| Error::format(source_name, format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the percentile range and that band positions are distinct.
    ///
    /// Positions are checked against the band count when the stack is known.
    pub fn validate(&self) -> Result<()> {
        check_percentile(self.hotspot_percentile)?;
        self.bands.validate(usize::MAX)
    }

    pub fn align_params(&self) -> AlignParams {
        AlignParams {
            method: self.resampling,
            reference: self.reference,
        }
    }
}
