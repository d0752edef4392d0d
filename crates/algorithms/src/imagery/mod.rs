//! Imagery analysis algorithms
//!
//! - Spectral indices: NDVI, NDBI and the generic normalized difference
//! - Thermal conversion: radiance, brightness temperature, LST
//! - Band math: element-wise raster algebra
//! - Index engine: every derived field of a band stack, including UHRI

mod band_math;
mod engine;
mod indices;
mod thermal;

pub use band_math::{band_math, band_math_binary, BandMathOp};
pub use engine::{uhri, BandMapping, IndexEngine, IndexField, IndexKind, IndexSet};
pub use indices::{ndbi, ndvi, normalized_difference};
pub use thermal::{
    brightness_temperature, land_surface_temperature, radiance, SensorCalibration, KELVIN_OFFSET,
};
