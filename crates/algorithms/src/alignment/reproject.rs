//! Grid reprojection between reference systems

use super::resample::{sample, Footprint, ResamplingMethod};
use heatrisk_core::raster::{GeoTransform, Raster};
use heatrisk_core::{Error, Result, Transformer, CRS};
use tracing::debug;

/// Extra points per extent edge when projecting a grid's bounds.
const EDGE_DENSIFY: usize = 21;

/// Reproject `src` into `target`.
///
/// A grid already in `target` is returned as an unchanged copy. Otherwise
/// the densified source extent is transformed to give the target extent,
/// the source pixel count is kept, and each target cell centre is mapped
/// back into the source and sampled with `method`. Fails with
/// [`Error::CrsMismatch`] when the grid has no CRS or no transform exists.
pub fn reproject(src: &Raster<f64>, target: &CRS, method: ResamplingMethod) -> Result<Raster<f64>> {
    if CRS::same_system(src.crs(), Some(target)) {
        return Ok(src.clone());
    }
    let source = src
        .crs()
        .ok_or_else(|| Error::CrsMismatch("<undefined CRS>".into(), target.identifier()))?;
    let forward = Transformer::new(source, target)?;

    if forward.is_identity() {
        // same datum and projection under another code
        let mut out = src.clone();
        out.set_crs(Some(target.clone()));
        return Ok(out);
    }

    let (rows, cols) = src.shape();
    let extent = forward.transform_extent(&src.extent(), EDGE_DENSIFY);
    if extent.is_degenerate() {
        return Err(Error::CrsMismatch(source.identifier(), target.identifier()));
    }
    let transform = GeoTransform::from_extent(
        &extent,
        extent.width() / cols as f64,
        extent.height() / rows as f64,
    );

    let backward = forward.inverse();
    let src_gt = *src.transform();
    let to_src = |c: f64, r: f64| {
        let (x, y) = transform.fractional_to_geo(c, r);
        let (sx, sy) = backward.transform(x, y);
        src_gt.geo_to_pixel(sx, sy)
    };

    let mut out = Raster::filled(rows, cols, f64::NAN);
    out.set_transform(transform);
    out.set_crs(Some(target.clone()));
    out.set_nodata(Some(f64::NAN));
    let data = out.data_mut();
    for row in 0..rows {
        for col in 0..cols {
            let (c, r) = (col as f64, row as f64);
            let center = to_src(c + 0.5, r + 0.5);
            let corners = [
                to_src(c, r),
                to_src(c + 1.0, r),
                to_src(c, r + 1.0),
                to_src(c + 1.0, r + 1.0),
            ];
            let min = corners
                .iter()
                .fold((f64::INFINITY, f64::INFINITY), |m, p| (m.0.min(p.0), m.1.min(p.1)));
            let max = corners
                .iter()
                .fold((f64::NEG_INFINITY, f64::NEG_INFINITY), |m, p| {
                    (m.0.max(p.0), m.1.max(p.1))
                });
            data[(row, col)] = sample(src, &Footprint { center, min, max }, method);
        }
    }

    debug!(
        from = %source,
        to = %target,
        rows,
        cols,
        extent = %extent,
        "reprojected grid"
    );
    Ok(out)
}
