//! Statistical summaries of derived fields
//!
//! - **correlation**: Pearson correlation matrix between layers
//! - **zonal**: Statistics by integer zones and by demographic polygons

pub mod correlation;
pub mod zonal;

pub use correlation::{correlation_matrix, CorrelationMatrix};
pub use zonal::{
    polygon_zonal_statistics, rasterize_features, zonal_statistics, ZonalResult, ZoneSummary,
};
