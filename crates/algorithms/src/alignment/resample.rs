//! Resampling kernels
//!
//! Positions are fractional, edge-based source pixel coordinates: cell
//! `(row, col)` covers `[col, col + 1) x [row, row + 1)` and its centre is
//! `(col + 0.5, row + 0.5)`. A kernel returns NaN as soon as any cell it
//! actually draws on is nodata or lies outside the source.

use heatrisk_core::raster::{GeoTransform, Raster};
use heatrisk_core::CRS;
use serde::{Deserialize, Serialize};

/// Weights below this are treated as exactly zero.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Resampling method used when a grid is moved onto another grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Bilinear interpolation between the four nearest cell centres
    #[default]
    Bilinear,
    /// Area-weighted mean of the source cells under the target cell
    Average,
    /// Value of the source cell containing the target centre
    Nearest,
}

impl std::str::FromStr for ResamplingMethod {
    type Err = heatrisk_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bilinear" => Ok(ResamplingMethod::Bilinear),
            "average" => Ok(ResamplingMethod::Average),
            "nearest" => Ok(ResamplingMethod::Nearest),
            _ => Err(heatrisk_core::Error::InvalidParameter {
                name: "resampling",
                value: s.to_string(),
                reason: "expected bilinear, average or nearest".into(),
            }),
        }
    }
}

/// Footprint of a target cell in source pixel coordinates
#[derive(Debug, Clone, Copy)]
pub(crate) struct Footprint {
    pub center: (f64, f64),
    pub min: (f64, f64),
    pub max: (f64, f64),
}

fn valid_at(src: &Raster<f64>, row: i64, col: i64) -> Option<f64> {
    if row < 0 || col < 0 || row as usize >= src.rows() || col as usize >= src.cols() {
        return None;
    }
    let v = unsafe { src.get_unchecked(row as usize, col as usize) };
    if src.is_nodata(v) { None } else { Some(v) }
}

fn nearest(src: &Raster<f64>, x: f64, y: f64) -> f64 {
    valid_at(src, y.floor() as i64, x.floor() as i64).unwrap_or(f64::NAN)
}

fn bilinear(src: &Raster<f64>, x: f64, y: f64) -> f64 {
    let fx = x - 0.5;
    let fy = y - 0.5;
    let c0 = fx.floor();
    let r0 = fy.floor();
    let tx = fx - c0;
    let ty = fy - r0;
    let (c0, r0) = (c0 as i64, r0 as i64);

    let taps = [
        (r0, c0, (1.0 - tx) * (1.0 - ty)),
        (r0, c0 + 1, tx * (1.0 - ty)),
        (r0 + 1, c0, (1.0 - tx) * ty),
        (r0 + 1, c0 + 1, tx * ty),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (row, col, w) in taps {
        if w <= WEIGHT_EPSILON {
            continue;
        }
        match valid_at(src, row, col) {
            Some(v) => {
                sum += w * v;
                weight += w;
            }
            None => return f64::NAN,
        }
    }
    if weight <= WEIGHT_EPSILON { f64::NAN } else { sum / weight }
}

fn average(src: &Raster<f64>, fp: &Footprint) -> f64 {
    let (x0, y0) = fp.min;
    let (x1, y1) = fp.max;
    if !(x1 > x0 && y1 > y0) {
        return nearest(src, fp.center.0, fp.center.1);
    }

    let mut sum = 0.0;
    let mut weight = 0.0;
    let (row_start, row_end) = (y0.floor() as i64, y1.ceil() as i64);
    let (col_start, col_end) = (x0.floor() as i64, x1.ceil() as i64);
    for row in row_start..row_end {
        let dy = (y1.min((row + 1) as f64) - y0.max(row as f64)).max(0.0);
        for col in col_start..col_end {
            let dx = (x1.min((col + 1) as f64) - x0.max(col as f64)).max(0.0);
            let w = dx * dy;
            if w <= WEIGHT_EPSILON {
                continue;
            }
            match valid_at(src, row, col) {
                Some(v) => {
                    sum += w * v;
                    weight += w;
                }
                None => return f64::NAN,
            }
        }
    }
    if weight <= WEIGHT_EPSILON { f64::NAN } else { sum / weight }
}

/// Sample `src` for one target cell.
pub(crate) fn sample(src: &Raster<f64>, fp: &Footprint, method: ResamplingMethod) -> f64 {
    let (x, y) = fp.center;
    if !(x.is_finite() && y.is_finite()) {
        return f64::NAN;
    }
    match method {
        ResamplingMethod::Nearest => nearest(src, x, y),
        ResamplingMethod::Bilinear => bilinear(src, x, y),
        ResamplingMethod::Average => average(src, fp),
    }
}

/// Resample `src` onto the grid `(transform, rows, cols)` of the same CRS.
///
/// The output uses NaN as nodata and carries `crs`.
pub fn resample_to_grid(
    src: &Raster<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    crs: Option<CRS>,
    method: ResamplingMethod,
) -> Raster<f64> {
    let src_gt = *src.transform();
    let mut out = Raster::filled(rows, cols, f64::NAN);
    out.set_transform(*transform);
    out.set_crs(crs);
    out.set_nodata(Some(f64::NAN));

    let data = out.data_mut();
    for row in 0..rows {
        for col in 0..cols {
            let to_src = |c: f64, r: f64| {
                let (x, y) = transform.fractional_to_geo(c, r);
                src_gt.geo_to_pixel(x, y)
            };
            let center = to_src(col as f64 + 0.5, row as f64 + 0.5);
            let a = to_src(col as f64, row as f64);
            let b = to_src(col as f64 + 1.0, row as f64 + 1.0);
            let fp = Footprint {
                center,
                min: (a.0.min(b.0), a.1.min(b.1)),
                max: (a.0.max(b.0), a.1.max(b.1)),
            };
            data[(row, col)] = sample(src, &fp, method);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, (col * 10) as f64).unwrap();
            }
        }
        r
    }

    #[test]
    fn test_identity_grid_is_exact() {
        let src = ramp(5, 5);
        for method in [
            ResamplingMethod::Bilinear,
            ResamplingMethod::Average,
            ResamplingMethod::Nearest,
        ] {
            let out = resample_to_grid(&src, src.transform(), 5, 5, None, method);
            for row in 0..5 {
                for col in 0..5 {
                    assert_relative_eq!(
                        out.get(row, col).unwrap(),
                        src.get(row, col).unwrap(),
                        epsilon = 1e-9
                    );
                }
            }
        }
    }

    #[test]
    fn test_bilinear_half_cell_shift() {
        let src = ramp(4, 6);
        // shift the grid half a cell east; interior values interpolate
        let gt = GeoTransform::new(5.0, 40.0, 10.0, -10.0);
        let out = resample_to_grid(&src, &gt, 4, 5, None, ResamplingMethod::Bilinear);
        assert_relative_eq!(out.get(1, 0).unwrap(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(2, 3).unwrap(), 35.0, epsilon = 1e-9);
        // the last column needs a neighbour beyond the source edge
        let wide = resample_to_grid(&src, &gt, 4, 6, None, ResamplingMethod::Bilinear);
        assert!(wide.get(1, 5).unwrap().is_nan());
    }

    #[test]
    fn test_average_aggregates_area() {
        let src = ramp(4, 4);
        // one 20 m cell covers a 2x2 block of 10 m cells
        let gt = GeoTransform::new(0.0, 40.0, 20.0, -20.0);
        let out = resample_to_grid(&src, &gt, 2, 2, None, ResamplingMethod::Average);
        assert_relative_eq!(out.get(0, 0).unwrap(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(1, 1).unwrap(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_contributor_gives_nan() {
        let mut src = ramp(4, 4);
        src.set(0, 1, f64::NAN).unwrap();
        let gt = GeoTransform::new(0.0, 40.0, 20.0, -20.0);
        let avg = resample_to_grid(&src, &gt, 2, 2, None, ResamplingMethod::Average);
        assert!(avg.get(0, 0).unwrap().is_nan());
        assert!(!avg.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_outside_source_is_nan_not_zero() {
        let src = ramp(3, 3);
        let gt = GeoTransform::new(100.0, 30.0, 10.0, -10.0);
        let out = resample_to_grid(&src, &gt, 3, 3, None, ResamplingMethod::Nearest);
        assert!(out.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("Average".parse::<ResamplingMethod>().unwrap(), ResamplingMethod::Average);
        assert!("cubic".parse::<ResamplingMethod>().is_err());
    }
}
