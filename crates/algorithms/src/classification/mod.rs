//! Raster classification
//!
//! - **Hotspots**: percentile threshold classification into a binary grid

mod hotspot;

pub use hotspot::{
    classify_hotspots, percentile_threshold, HotspotClassifier, HotspotMap, HotspotParams,
    Threshold, CLASS_NODATA, HOTSPOT, NOT_HOTSPOT,
};
pub(crate) use hotspot::check_percentile;
