//! Raster data structures and operations

mod element;
mod extent;
mod geotransform;
mod grid;
mod stack;

pub use element::RasterElement;
pub use extent::Extent;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use stack::GridStack;
