//! Percentile hotspot classification
//!
//! A cell is a hotspot when its value reaches the `p`-th percentile of all
//! valid cells of the grid. The percentile interpolates linearly between
//! order statistics: `rank = p / 100 * (n - 1)`.

use heatrisk_core::raster::Raster;
use heatrisk_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Cell value of a hotspot
pub const HOTSPOT: u8 = 1;
/// Cell value of a valid non-hotspot cell
pub const NOT_HOTSPOT: u8 = 0;
/// Nodata marker of classification grids
pub const CLASS_NODATA: u8 = u8::MAX;

/// A percentile cut computed over one grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Requested percentile in (0, 100)
    pub percentile: f64,
    /// Value at that percentile
    pub value: f64,
    /// Number of valid cells the percentile was taken over
    pub valid_count: usize,
}

/// Binary hotspot grid with the threshold that produced it
#[derive(Debug, Clone)]
pub struct HotspotMap {
    pub threshold: Threshold,
    /// 1 = hotspot, 0 = not, 255 = nodata
    pub grid: Raster<u8>,
}

impl HotspotMap {
    pub fn hotspot_count(&self) -> usize {
        self.grid.data().iter().filter(|&&v| v == HOTSPOT).count()
    }
}

/// Parameters for hotspot classification
#[derive(Debug, Clone, Copy)]
pub struct HotspotParams {
    /// Percentile, exclusive of 0 and 100 (default 90)
    pub percentile: f64,
}

impl Default for HotspotParams {
    fn default() -> Self {
        Self { percentile: 90.0 }
    }
}

/// Hotspot classifier stage
#[derive(Debug, Clone, Default)]
pub struct HotspotClassifier;

impl Algorithm for HotspotClassifier {
    type Input = Raster<f64>;
    type Output = HotspotMap;
    type Params = HotspotParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "HotspotClassifier"
    }

    fn description(&self) -> &'static str {
        "Flag cells at or above a percentile of the grid's valid values"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        classify_hotspots(&input, params.percentile)
    }
}

pub(crate) fn check_percentile(p: f64) -> Result<()> {
    if p.is_finite() && p > 0.0 && p < 100.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: "percentile",
            value: p.to_string(),
            reason: "must lie strictly between 0 and 100".into(),
        })
    }
}

/// Linearly interpolated percentile over sorted values.
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// The `p`-th percentile of the valid cells of `raster`.
///
/// Fails with [`Error::InvalidParameter`] when `p` is outside (0, 100)
/// and with [`Error::EmptyInput`] when every cell is nodata.
pub fn percentile_threshold(raster: &Raster<f64>, p: f64) -> Result<Threshold> {
    check_percentile(p)?;
    let mut values = raster.valid_values();
    if values.is_empty() {
        return Err(Error::EmptyInput(
            "percentile of a grid without valid cells".into(),
        ));
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Ok(Threshold {
        percentile: p,
        value: interpolate(&values, p),
        valid_count: values.len(),
    })
}

/// Classify cells of `raster` at or above its `p`-th percentile.
///
/// Nodata cells stay nodata in the output.
pub fn classify_hotspots(raster: &Raster<f64>, p: f64) -> Result<HotspotMap> {
    let threshold = percentile_threshold(raster, p)?;
    let (rows, cols) = raster.shape();

    let mut grid = raster.with_same_meta::<u8>(rows, cols);
    grid.set_nodata(Some(CLASS_NODATA));
    for ((row, col), out) in grid.data_mut().indexed_iter_mut() {
        let v = unsafe { raster.get_unchecked(row, col) };
        *out = if raster.is_nodata(v) {
            CLASS_NODATA
        } else if v >= threshold.value {
            HOTSPOT
        } else {
            NOT_HOTSPOT
        };
    }

    let map = HotspotMap { threshold, grid };
    info!(
        percentile = p,
        threshold = threshold.value,
        hotspots = map.hotspot_count(),
        valid = threshold.valid_count,
        "classified hotspots"
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heatrisk_core::GeoTransform;

    fn one_to_hundred() -> Raster<f64> {
        let data: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let mut r = Raster::from_vec(data, 10, 10).unwrap();
        r.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_p90_of_one_to_hundred() {
        let map = classify_hotspots(&one_to_hundred(), 90.0).unwrap();
        assert_relative_eq!(map.threshold.value, 90.1, epsilon = 1e-9);
        assert_eq!(map.threshold.valid_count, 100);
        assert_eq!(map.hotspot_count(), 10);
        assert_eq!(map.grid.get(9, 9).unwrap(), HOTSPOT);
        assert_eq!(map.grid.get(8, 9).unwrap(), NOT_HOTSPOT);
    }

    #[test]
    fn test_median_interpolates() {
        let t = percentile_threshold(&one_to_hundred(), 50.0).unwrap();
        assert_relative_eq!(t.value, 50.5, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_stays_nodata() {
        let mut r = one_to_hundred();
        r.set(9, 9, f64::NAN).unwrap();
        let map = classify_hotspots(&r, 90.0).unwrap();
        assert_eq!(map.threshold.valid_count, 99);
        assert_eq!(map.grid.get(9, 9).unwrap(), CLASS_NODATA);
        assert!(map.grid.is_nodata_at(9, 9).unwrap());
        assert_eq!(map.grid.transform(), r.transform());
    }

    #[test]
    fn test_all_nodata_is_empty_input() {
        let r = Raster::filled(3, 3, f64::NAN);
        assert!(matches!(percentile_threshold(&r, 90.0), Err(Error::EmptyInput(_))));
    }

    #[test]
    fn test_percentile_bounds_rejected() {
        let r = one_to_hundred();
        for p in [0.0, 100.0, -5.0, 150.0, f64::NAN] {
            assert!(matches!(
                percentile_threshold(&r, p),
                Err(Error::InvalidParameter { name: "percentile", .. })
            ));
        }
    }

    #[test]
    fn test_single_valid_cell() {
        let mut r = Raster::filled(2, 2, f64::NAN);
        r.set(0, 1, 7.0).unwrap();
        let map = classify_hotspots(&r, 90.0).unwrap();
        assert_relative_eq!(map.threshold.value, 7.0);
        assert_eq!(map.hotspot_count(), 1);
    }

    #[test]
    fn test_deterministic() {
        let r = one_to_hundred();
        let a = classify_hotspots(&r, 75.0).unwrap();
        let b = HotspotClassifier
            .execute(r, HotspotParams { percentile: 75.0 })
            .unwrap();
        assert_eq!(a.threshold, b.threshold);
        assert_eq!(a.grid.data(), b.grid.data());
    }
}
