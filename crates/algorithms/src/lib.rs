//! # HeatRisk Algorithms
//!
//! Urban heat risk analysis on band rasters.
//!
//! ## Available Algorithm Categories
//!
//! - **alignment**: Reproject, intersect and resample bands onto one grid
//! - **clip**: Crop a stack to an area-of-interest boundary
//! - **imagery**: NDVI, NDBI, thermal conversion, UHRI
//! - **classification**: Percentile hotspots
//! - **statistics**: Correlation matrix, zonal statistics
//! - **pipeline**: The full run and its configuration

pub mod alignment;
pub mod classification;
pub mod clip;
pub mod imagery;
pub mod pipeline;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::alignment::{align, AlignParams, GridAligner, ReferenceRule, ResamplingMethod};
    pub use crate::classification::{
        classify_hotspots, percentile_threshold, HotspotClassifier, HotspotMap, Threshold,
    };
    pub use crate::clip::{clip_to_boundary, mask_to_boundary, BoundaryClipper};
    pub use crate::imagery::{
        ndbi, ndvi, normalized_difference, BandMapping, IndexEngine, IndexKind, IndexSet,
        SensorCalibration,
    };
    pub use crate::pipeline::{run, PipelineConfig, PipelineOutput, Stage, StageError};
    pub use crate::statistics::{
        correlation_matrix, polygon_zonal_statistics, CorrelationMatrix, ZoneSummary,
    };
    pub use heatrisk_core::prelude::*;
}
