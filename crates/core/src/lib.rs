//! # HeatRisk Core
//!
//! Core types, traits and I/O for the HeatRisk urban heat analysis pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with nodata handling
//! - `GridStack`: co-registered, named band layers
//! - `GeoTransform` and `Extent`: pixel/map coordinate geometry
//! - `CRS` and `Transformer`: reference systems and pure-Rust projection math
//! - GeoTIFF raster I/O and GeoJSON boundary / demographic I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::{Transformer, CRS};
pub use error::{Error, Result};
pub use raster::{Extent, GeoTransform, GridStack, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{Transformer, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Extent, GeoTransform, GridStack, Raster, RasterElement};
    pub use crate::vector::{Boundary, Feature, FeatureCollection};
    pub use crate::Algorithm;
}

/// Core trait for the pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the stage
    type Input;
    /// Output type for the stage
    type Output;
    /// Parameters controlling stage behavior
    type Params: Default;
    /// Error type for stage execution
    type Error: std::error::Error;

    /// Returns the stage name
    fn name(&self) -> &'static str;

    /// Returns a description of what the stage does
    fn description(&self) -> &'static str;

    /// Execute the stage
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
