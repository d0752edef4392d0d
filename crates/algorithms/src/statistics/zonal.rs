//! Zonal statistics
//!
//! Computes statistics for each zone defined by an integer zone raster,
//! and for each polygon of a demographic feature collection.

use geo::{BoundingRect, Contains, Point};
use heatrisk_core::raster::{Extent, Raster};
use heatrisk_core::vector::{AttributeValue, FeatureCollection};
use heatrisk_core::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Result of zonal statistics for one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalResult {
    pub zone_id: i32,
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub median: f64,
}

/// Compute zonal statistics
///
/// For each unique zone in the zone raster, computes statistics from
/// the corresponding valid cells in the value raster. Zone 0 means
/// "no zone".
///
/// # Returns
/// HashMap mapping zone_id → ZonalResult
pub fn zonal_statistics(
    values: &Raster<f64>,
    zones: &Raster<i32>,
) -> Result<HashMap<i32, ZonalResult>> {
    let (rows_v, cols_v) = values.shape();
    let (rows_z, cols_z) = zones.shape();

    if rows_v != rows_z || cols_v != cols_z {
        return Err(Error::SizeMismatch {
            er: rows_v,
            ec: cols_v,
            ar: rows_z,
            ac: cols_z,
        });
    }

    // Collect values per zone
    let mut zone_values: HashMap<i32, Vec<f64>> = HashMap::new();

    for row in 0..rows_v {
        for col in 0..cols_v {
            let zone = unsafe { zones.get_unchecked(row, col) };
            let val = unsafe { values.get_unchecked(row, col) };

            if zone == 0 || values.is_nodata(val) {
                continue;
            }

            zone_values.entry(zone).or_default().push(val);
        }
    }

    let mut results = HashMap::new();

    for (zone_id, mut vals) in zone_values {
        let count = vals.len();
        let sum: f64 = vals.iter().sum();
        let mean = sum / count as f64;
        let var = vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
        let std_dev = var.sqrt();

        vals.sort_by(|a, b| a.total_cmp(b));
        let min = vals[0];
        let max = vals[count - 1];

        let median = if count % 2 == 0 {
            (vals[count / 2 - 1] + vals[count / 2]) / 2.0
        } else {
            vals[count / 2]
        };

        results.insert(
            zone_id,
            ZonalResult {
                zone_id,
                count,
                sum,
                mean,
                std_dev,
                min,
                max,
                range: max - min,
                median,
            },
        );
    }

    Ok(results)
}

/// Statistics of a scalar raster within one demographic unit, joined with
/// the unit's attributes
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSummary {
    /// Feature key (identifier attribute or feature id, else its position)
    pub id: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub median: f64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Burn feature polygons into a zone raster on the grid of `template`.
///
/// Zone `i + 1` marks cells whose centre lies inside feature `i`; where
/// features overlap the first one wins. Features must already be in the
/// raster's CRS.
pub fn rasterize_features(template: &Raster<f64>, features: &FeatureCollection) -> Raster<i32> {
    let (rows, cols) = template.shape();
    let mut zones = template.with_same_meta::<i32>(rows, cols);
    zones.set_nodata(Some(0));

    for (index, feature) in features.iter().enumerate() {
        let Some(polygons) = feature.polygons() else {
            continue;
        };
        let Some(window) = polygons.bounding_rect().and_then(|r| {
            let e = Extent::new(r.min().x, r.min().y, r.max().x, r.max().y);
            template.window_for_extent(&e)
        }) else {
            continue;
        };
        let (row0, col0, nrows, ncols) = window;
        let zone = (index + 1) as i32;
        let data = zones.data_mut();
        for row in row0..row0 + nrows {
            for col in col0..col0 + ncols {
                if data[(row, col)] != 0 {
                    continue;
                }
                let (x, y) = template.pixel_to_geo(col, row);
                if polygons.contains(&Point::new(x, y)) {
                    data[(row, col)] = zone;
                }
            }
        }
    }
    zones
}

/// Zonal statistics of `values` for every polygon feature.
///
/// Features are reprojected into the raster's CRS first. One summary is
/// returned per feature covering at least one valid cell, in feature
/// order; `id_field` names the identifier attribute.
pub fn polygon_zonal_statistics(
    values: &Raster<f64>,
    features: &FeatureCollection,
    id_field: Option<&str>,
) -> Result<Vec<ZoneSummary>> {
    let features = match values.crs() {
        Some(crs) => features.reproject(crs)?,
        None => features.clone(),
    };
    let zones = rasterize_features(values, &features);
    let stats = zonal_statistics(values, &zones)?;

    let summaries: Vec<ZoneSummary> = features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let zr = stats.get(&((index + 1) as i32))?;
            Some(ZoneSummary {
                id: feature.key(id_field).unwrap_or_else(|| index.to_string()),
                count: zr.count,
                mean: zr.mean,
                min: zr.min,
                max: zr.max,
                std_dev: zr.std_dev,
                median: zr.median,
                attributes: feature.properties.clone(),
            })
        })
        .collect();

    let skipped = features.len() - summaries.len();
    if skipped > 0 {
        debug!(skipped, "features without valid cells");
    }
    info!(zones = summaries.len(), "computed polygon zonal statistics");
    Ok(summaries)
}
