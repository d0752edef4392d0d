//! End-to-end heat risk run
//!
//! align → clip → indices → hotspots → correlation, on grids that were
//! loaded by [`heatrisk_core::io::load_bands`]. Each stage failure is
//! reported with the stage that produced it.

mod config;

pub use config::PipelineConfig;

use crate::alignment::GridAligner;
use crate::classification::{classify_hotspots, HotspotMap};
use crate::clip::{BoundaryClipper, ClipParams};
use crate::imagery::{IndexEngine, IndexKind, IndexSet};
use crate::statistics::{
    correlation_matrix, polygon_zonal_statistics, CorrelationMatrix, ZoneSummary,
};
use heatrisk_core::io::{write_geotiff, GeoTiffOptions};
use heatrisk_core::raster::{GridStack, Raster};
use heatrisk_core::vector::{Boundary, FeatureCollection};
use heatrisk_core::{Algorithm, Error};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tracing::{debug, info};

/// File name of the serialised correlation matrix
pub const CORRELATION_FILE: &str = "correlation.json";
/// File name of the serialised zonal summaries
pub const ZONES_FILE: &str = "zones.json";
/// File name of the hotspot grid
pub const HOTSPOTS_FILE: &str = "hotspots.tif";

/// Stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Align,
    Clip,
    Indices,
    Hotspots,
    Statistics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Align => "align",
            Stage::Clip => "clip",
            Stage::Indices => "indices",
            Stage::Hotspots => "hotspots",
            Stage::Statistics => "statistics",
        };
        f.write_str(name)
    }
}

/// A failure tagged with the stage it happened in
#[derive(Debug, ThisError)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: Error,
}

impl StageError {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }

    fn at(stage: Stage) -> impl Fn(Error) -> StageError {
        move |source| StageError { stage, source }
    }
}

/// Everything one run derives
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Aligned bands clipped to the boundary
    pub stack: GridStack,
    pub indices: IndexSet,
    /// UHRI hotspots
    pub hotspots: HotspotMap,
    /// Pearson matrix of NDVI, NDBI and LST
    pub correlation: CorrelationMatrix,
}

/// Run the heat risk pipeline on loaded band grids.
pub fn run(
    grids: Vec<(String, Raster<f64>)>,
    boundary: &Boundary,
    config: &PipelineConfig,
) -> Result<PipelineOutput, StageError> {
    if grids.is_empty() {
        return Err(StageError::new(
            Stage::Load,
            Error::EmptyInput("no band grids loaded".into()),
        ));
    }
    config.validate().map_err(StageError::at(Stage::Load))?;
    config
        .bands
        .validate(grids.len())
        .map_err(StageError::at(Stage::Load))?;

    let aligned = GridAligner
        .execute(grids, config.align_params())
        .map_err(StageError::at(Stage::Align))?;
    debug!(shape = ?aligned.shape(), "aligned stack");

    let stack = BoundaryClipper
        .execute(
            (aligned, boundary.clone()),
            ClipParams {
                mask_polygon: config.mask_polygon,
            },
        )
        .map_err(StageError::at(Stage::Clip))?;
    debug!(shape = ?stack.shape(), "clipped stack");

    let indices = IndexEngine::new(config.bands, config.calibration)
        .compute(&stack)
        .map_err(StageError::at(Stage::Indices))?;

    let hotspots = classify_hotspots(indices.uhri.raster(), config.hotspot_percentile)
        .map_err(StageError::at(Stage::Hotspots))?;

    let correlation = correlation_matrix(&[
        ("ndvi", indices.ndvi.raster()),
        ("ndbi", indices.ndbi.raster()),
        ("lst", indices.lst.raster()),
    ])
    .map_err(StageError::at(Stage::Statistics))?;

    info!(
        rows = stack.shape().0,
        cols = stack.shape().1,
        threshold = hotspots.threshold.value,
        hotspots = hotspots.hotspot_count(),
        "pipeline finished"
    );
    Ok(PipelineOutput {
        stack,
        indices,
        hotspots,
        correlation,
    })
}

/// Zonal UHRI per demographic unit touching the boundary.
///
/// `id_field` names the attribute used as the unit identifier.
pub fn join_demographics(
    output: &PipelineOutput,
    boundary: &Boundary,
    features: &FeatureCollection,
    id_field: Option<&str>,
) -> Result<Vec<ZoneSummary>, StageError> {
    let at = StageError::at(Stage::Statistics);
    let inside = features.intersecting(boundary).map_err(&at)?;
    debug!(
        features = features.len(),
        intersecting = inside.len(),
        "selected demographic units"
    );
    polygon_zonal_statistics(output.indices.uhri.raster(), &inside, id_field).map_err(at)
}

fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> heatrisk_core::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Other(format!("Failed to serialise JSON: {e}")))?;
    fs::write(path, text)?;
    Ok(())
}

/// Write `zones.json` into `dir`
pub fn write_zones<P: AsRef<Path>>(dir: P, zones: &[ZoneSummary]) -> heatrisk_core::Result<PathBuf> {
    let path = dir.as_ref().join(ZONES_FILE);
    write_json(&zones, &path)?;
    Ok(path)
}

impl PipelineOutput {
    /// Write NDVI, NDBI, LST, UHRI and hotspot GeoTIFFs plus
    /// `correlation.json` into `dir`, creating it when missing.
    ///
    /// Returns the written paths.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> heatrisk_core::Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for kind in [IndexKind::Ndvi, IndexKind::Ndbi, IndexKind::Lst, IndexKind::Uhri] {
            let path = dir.join(format!("{}.tif", kind.name()));
            write_geotiff(self.indices.get(kind).raster(), &path, Some(GeoTiffOptions::default()))?;
            written.push(path);
        }

        let path = dir.join(HOTSPOTS_FILE);
        write_geotiff(&self.hotspots.grid, &path, Some(GeoTiffOptions::default()))?;
        written.push(path);

        let path = dir.join(CORRELATION_FILE);
        write_json(&self.correlation, &path)?;
        written.push(path);

        info!(dir = %dir.display(), files = written.len(), "wrote outputs");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatrisk_core::{GeoTransform, CRS};

    fn band(value: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(500_000.0, 4_000_300.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32617)));
        for row in 0..10 {
            for col in 0..10 {
                r.set(row, col, value(row, col)).unwrap();
            }
        }
        r
    }

    fn grids() -> Vec<(String, Raster<f64>)> {
        vec![
            ("B10".into(), band(|r, c| 25_000.0 + (r * 10 + c) as f64 * 10.0)),
            ("B4".into(), band(|_, c| 0.05 + c as f64 * 0.01)),
            ("B5".into(), band(|r, _| 0.30 + r as f64 * 0.01)),
            ("B6".into(), band(|r, c| 0.20 + (r + c) as f64 * 0.005)),
        ]
    }

    fn boundary() -> Boundary {
        let extent = heatrisk_core::Extent::new(500_030.0, 4_000_030.0, 500_270.0, 4_000_270.0);
        Boundary::from_extent(&extent, Some(CRS::from_epsg(32617)))
    }

    #[test]
    fn test_run_produces_clipped_outputs() {
        let out = run(grids(), &boundary(), &PipelineConfig::default()).unwrap();
        assert_eq!(out.stack.shape(), (8, 8));
        for field in out.indices.iter() {
            assert_eq!(field.raster().shape(), (8, 8));
        }
        assert_eq!(out.hotspots.grid.shape(), (8, 8));
        assert_eq!(out.correlation.names, vec!["ndvi", "ndbi", "lst"]);
        assert!(out.hotspots.hotspot_count() > 0);
    }

    #[test]
    fn test_stage_is_reported() {
        let err = run(Vec::new(), &boundary(), &PipelineConfig::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Load);

        let far = Boundary::from_extent(
            &heatrisk_core::Extent::new(0.0, 0.0, 10.0, 10.0),
            Some(CRS::from_epsg(32617)),
        );
        let err = run(grids(), &far, &PipelineConfig::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Clip);
        assert!(matches!(err.source, Error::EmptyIntersection(_)));
        assert!(err.to_string().starts_with("clip stage failed"));
    }

    #[test]
    fn test_band_mapping_checked_against_inputs() {
        let mut few = grids();
        few.truncate(3);
        let err = run(few, &boundary(), &PipelineConfig::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Load);
        assert!(matches!(err.source, Error::InvalidParameter { name: "swir1", .. }));
    }
}
