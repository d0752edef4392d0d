//! Grid alignment
//!
//! Brings independently loaded band grids onto one common grid:
//! reference CRS, intersection extent, reference resolution.

mod reproject;
mod resample;

pub use reproject::reproject;
pub use resample::{resample_to_grid, ResamplingMethod};

use heatrisk_core::raster::{Extent, GeoTransform, GridStack, Raster};
use heatrisk_core::{Algorithm, Error, Result, CRS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Slack, in cells, when snapping the common extent to the reference lattice.
const LATTICE_EPSILON: f64 = 1e-6;

/// Which input grid defines the target CRS and resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRule {
    /// The first grid in input order
    #[default]
    FirstInput,
    /// The grid at this input position
    Input(usize),
}

impl ReferenceRule {
    fn index(&self, count: usize) -> Result<usize> {
        let index = match self {
            ReferenceRule::FirstInput => 0,
            ReferenceRule::Input(i) => *i,
        };
        if index >= count {
            return Err(Error::InvalidParameter {
                name: "reference",
                value: index.to_string(),
                reason: format!("only {} input grids", count),
            });
        }
        Ok(index)
    }
}

/// Parameters for grid alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    pub method: ResamplingMethod,
    pub reference: ReferenceRule,
}

/// Grid aligner stage
#[derive(Debug, Clone, Default)]
pub struct GridAligner;

impl Algorithm for GridAligner {
    type Input = Vec<(String, Raster<f64>)>;
    type Output = GridStack;
    type Params = AlignParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "GridAligner"
    }

    fn description(&self) -> &'static str {
        "Reproject, intersect and resample band grids onto one common grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        align(input, params)
    }
}

/// The grid every aligned layer is resampled onto
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: Option<CRS>,
}

impl TargetGrid {
    pub fn extent(&self) -> Extent {
        self.transform.extent(self.cols, self.rows)
    }

    fn holds(&self, raster: &Raster<f64>) -> bool {
        let (rx, ry) = self.transform.resolution();
        raster.shape() == (self.rows, self.cols)
            && CRS::same_system(raster.crs(), self.crs.as_ref())
            && raster
                .transform()
                .approx_eq(&self.transform, rx.min(ry) * LATTICE_EPSILON)
    }

    /// Cell offset of this grid inside `raster` when both share one lattice.
    fn lattice_offset(&self, raster: &Raster<f64>) -> Option<(usize, usize)> {
        let gt = raster.transform();
        let (rx, ry) = self.transform.resolution();
        let (sx, sy) = gt.resolution();
        let same_res = (rx - sx).abs() <= rx * 1e-9 && (ry - sy).abs() <= ry * 1e-9;
        if !same_res || !gt.is_north_up() || !self.transform.is_north_up() {
            return None;
        }
        let col = (self.transform.origin_x - gt.origin_x) / sx;
        let row = (gt.origin_y - self.transform.origin_y) / sy;
        let (col_r, row_r) = (col.round(), row.round());
        if (col - col_r).abs() > LATTICE_EPSILON || (row - row_r).abs() > LATTICE_EPSILON {
            return None;
        }
        if col_r < 0.0 || row_r < 0.0 {
            return None;
        }
        let (col, row) = (col_r as usize, row_r as usize);
        (row + self.rows <= raster.rows() && col + self.cols <= raster.cols()).then_some((row, col))
    }
}

/// Common grid of `grids` once they share the reference CRS.
///
/// The intersection of all extents is snapped inward to the cell lattice
/// of the reference grid, so the reference is cut, never interpolated.
pub fn common_grid(grids: &[(String, Raster<f64>)], reference: usize) -> Result<TargetGrid> {
    let (ref_name, ref_grid) = grids
        .get(reference)
        .ok_or_else(|| Error::EmptyInput("no grids to align".into()))?;
    let mut extent = ref_grid.extent();
    for (name, grid) in grids {
        extent = extent.intersection(&grid.extent()).ok_or_else(|| {
            Error::EmptyIntersection(format!(
                "'{}' {} does not overlap the common extent {}",
                name,
                grid.extent(),
                extent
            ))
        })?;
    }
    if extent.is_degenerate() {
        return Err(Error::EmptyIntersection(format!(
            "common extent {} has zero area",
            extent
        )));
    }

    let (res_x, res_y) = ref_grid.resolution();
    let ref_extent = ref_grid.extent();
    let snap_min = |v: f64, origin: f64, res: f64| {
        origin + ((v - origin) / res - LATTICE_EPSILON).ceil() * res
    };
    let snap_max = |v: f64, origin: f64, res: f64| {
        origin + ((v - origin) / res + LATTICE_EPSILON).floor() * res
    };
    let min_x = snap_min(extent.min_x, ref_extent.min_x, res_x);
    let max_x = snap_max(extent.max_x, ref_extent.min_x, res_x);
    let max_y = ref_extent.max_y - snap_min(ref_extent.max_y - extent.max_y, 0.0, res_y);
    let min_y = ref_extent.max_y - snap_max(ref_extent.max_y - extent.min_y, 0.0, res_y);

    let cols = ((max_x - min_x) / res_x).round();
    let rows = ((max_y - min_y) / res_y).round();
    if cols < 1.0 || rows < 1.0 {
        return Err(Error::EmptyIntersection(format!(
            "common extent {} is smaller than one {}x{} cell of '{}'",
            extent, res_x, res_y, ref_name
        )));
    }

    let transform = GeoTransform::new(min_x, max_y, res_x, -res_y);
    debug!(
        reference = %ref_name,
        min_x, min_y, max_x, max_y,
        rows, cols,
        "common grid"
    );
    Ok(TargetGrid {
        transform,
        rows: rows as usize,
        cols: cols as usize,
        crs: ref_grid.crs().cloned(),
    })
}

/// Move one grid onto `target`: pass-through, lattice cut, or resampling.
pub fn align_to(
    name: &str,
    raster: &Raster<f64>,
    target: &TargetGrid,
    method: ResamplingMethod,
) -> Result<Raster<f64>> {
    if target.holds(raster) {
        debug!(layer = name, "already on the common grid");
        return Ok(raster.clone());
    }
    if let Some((row, col)) = target.lattice_offset(raster) {
        debug!(layer = name, row, col, "cut from shared lattice");
        return raster.window(row, col, target.rows, target.cols);
    }

    // Crop with a one-cell pad to give the kernel its neighbours
    let (sx, sy) = raster.resolution();
    let e = target.extent();
    let padded = Extent::new(e.min_x - sx, e.min_y - sy, e.max_x + sx, e.max_y + sy);
    let source = match raster.window_for_extent(&padded) {
        Some((row, col, rows, cols)) => raster.window(row, col, rows, cols)?,
        None => raster.clone(),
    };
    let source_nodata = source.data().iter().filter(|&&v| source.is_nodata(v)).count();

    let out = resample_to_grid(
        &source,
        &target.transform,
        target.rows,
        target.cols,
        target.crs.clone(),
        method,
    );
    let out_nodata = out.data().iter().filter(|v| v.is_nan()).count();
    if out_nodata > 0 && source_nodata == 0 {
        warn!(
            layer = name,
            cells = out_nodata,
            "resampling introduced nodata along the grid edge"
        );
    }
    debug!(layer = name, method = ?method, "resampled onto common grid");
    Ok(out)
}

/// Align independently loaded grids into a co-registered [`GridStack`].
///
/// 1. Target CRS: the reference grid's (first input by default).
/// 2. Grids in another CRS are reprojected into it.
/// 3. Common extent: the intersection of every extent.
/// 4. Common resolution: the reference grid's.
/// 5. Each grid is moved onto the common grid. Grids already on it are
///    passed through, so aligning an aligned stack changes nothing.
pub fn align(grids: Vec<(String, Raster<f64>)>, params: AlignParams) -> Result<GridStack> {
    if grids.is_empty() {
        return Err(Error::EmptyInput("no grids to align".into()));
    }
    let reference = params.reference.index(grids.len())?;
    let target_crs = grids[reference].1.crs().cloned();

    let mut projected = Vec::with_capacity(grids.len());
    for (name, grid) in grids {
        if CRS::same_system(grid.crs(), target_crs.as_ref()) {
            projected.push((name, grid));
            continue;
        }
        let Some(crs) = target_crs.as_ref() else {
            return Err(Error::CrsMismatch(
                grid.crs().map(|c| c.identifier()).unwrap_or_default(),
                "<undefined CRS>".into(),
            ));
        };
        debug!(layer = %name, to = %crs, "reprojecting to reference CRS");
        let grid = reproject(&grid, crs, params.method)?;
        projected.push((name, grid));
    }

    let target = common_grid(&projected, reference)?;
    let mut layers = Vec::with_capacity(projected.len());
    for (name, grid) in &projected {
        let aligned = align_to(name, grid, &target, params.method)?;
        layers.push((name.clone(), aligned));
    }

    info!(
        layers = layers.len(),
        rows = target.rows,
        cols = target.cols,
        crs = %target.crs.as_ref().map(|c| c.identifier()).unwrap_or_else(|| "none".into()),
        "aligned grids"
    );
    GridStack::new(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(origin_x: f64, origin_y: f64, res: f64, rows: usize, cols: usize, epsg: u32) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(origin_x, origin_y, res, -res));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, (row * cols + col) as f64).unwrap();
            }
        }
        r
    }

    fn named(name: &str, r: Raster<f64>) -> (String, Raster<f64>) {
        (name.to_string(), r)
    }

    #[test]
    fn test_identical_grids_pass_through() {
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let b = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let stack = align(vec![named("a", a.clone()), named("b", b)], AlignParams::default()).unwrap();
        assert_eq!(stack.shape(), (10, 10));
        assert_eq!(stack.get(0).unwrap().data(), a.data());
        assert_eq!(stack.transform(), a.transform());
    }

    #[test]
    fn test_aligning_twice_changes_nothing() {
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let b = grid(45.0, 285.0, 15.0, 16, 18, 32617);
        let once = align(vec![named("a", a), named("b", b)], AlignParams::default()).unwrap();
        let twice = align(once.clone().into_layers(), AlignParams::default()).unwrap();
        assert_eq!(once.transform(), twice.transform());
        for ((_, x), (_, y)) in once.iter().zip(twice.iter()) {
            for (u, v) in x.data().iter().zip(y.data().iter()) {
                assert!((u.is_nan() && v.is_nan()) || u == v);
            }
        }
    }

    #[test]
    fn test_intersection_and_reference_resolution() {
        // a: x 0..300, y 0..300 at 30 m; b: x 90..390, y -60..240 at 10 m
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let b = grid(90.0, 240.0, 10.0, 30, 30, 32617);
        let stack = align(vec![named("a", a), named("b", b)], AlignParams::default()).unwrap();

        let e = stack.extent();
        assert_relative_eq!(e.min_x, 90.0, epsilon = 1e-9);
        assert_relative_eq!(e.max_x, 300.0, epsilon = 1e-9);
        assert_relative_eq!(e.min_y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(e.max_y, 240.0, epsilon = 1e-9);
        assert_eq!(stack.resolution(), (30.0, 30.0));
        assert_eq!(stack.shape(), (8, 7));

        // every member shares extent, resolution and CRS
        for (_, layer) in stack.iter() {
            assert_eq!(layer.transform(), stack.transform());
            assert_eq!(layer.crs().and_then(|c| c.epsg()), Some(32617));
        }

        // the reference is cut, not interpolated: first cell of the stack is
        // row 2, col 3 of the original 10x10 grid
        assert_relative_eq!(stack.get(0).unwrap().get(0, 0).unwrap(), 23.0);
    }

    #[test]
    fn test_average_downsamples_finer_grid() {
        let a = grid(0.0, 60.0, 30.0, 2, 2, 32617);
        let mut b = Raster::filled(6, 6, 1.0);
        b.set_transform(GeoTransform::new(0.0, 60.0, 10.0, -10.0));
        b.set_crs(Some(CRS::from_epsg(32617)));
        b.set(0, 0, 10.0).unwrap();
        let params = AlignParams { method: ResamplingMethod::Average, ..Default::default() };
        let stack = align(vec![named("a", a), named("b", b)], params).unwrap();
        let fine = stack.by_name("b").unwrap();
        assert_relative_eq!(fine.get(0, 0).unwrap(), (10.0 + 8.0) / 9.0, epsilon = 1e-9);
        assert_relative_eq!(fine.get(1, 1).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_extents_fail() {
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let b = grid(1_000.0, 300.0, 30.0, 10, 10, 32617);
        assert!(matches!(
            align(vec![named("a", a), named("b", b)], AlignParams::default()),
            Err(Error::EmptyIntersection(_))
        ));
    }

    #[test]
    fn test_sliver_overlap_fails() {
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let b = grid(290.0, 300.0, 30.0, 10, 10, 32617);
        assert!(matches!(
            align(vec![named("a", a), named("b", b)], AlignParams::default()),
            Err(Error::EmptyIntersection(_))
        ));
    }

    #[test]
    fn test_first_input_defines_crs() {
        let utm = grid(330_000.0, 4_430_000.0, 30.0, 20, 20, 32617);
        let geo = reproject(&utm, &CRS::wgs84(), ResamplingMethod::Bilinear).unwrap();

        let stack = align(
            vec![named("utm", utm.clone()), named("geo", geo.clone())],
            AlignParams::default(),
        )
        .unwrap();
        assert_eq!(stack.crs().and_then(|c| c.epsg()), Some(32617));
        assert_eq!(stack.resolution(), (30.0, 30.0));

        let params = AlignParams { reference: ReferenceRule::Input(1), ..Default::default() };
        let stack = align(vec![named("utm", utm), named("geo", geo)], params).unwrap();
        assert_eq!(stack.crs().and_then(|c| c.epsg()), Some(4326));
    }

    #[test]
    fn test_reference_out_of_range() {
        let a = grid(0.0, 300.0, 30.0, 10, 10, 32617);
        let params = AlignParams { reference: ReferenceRule::Input(3), ..Default::default() };
        assert!(matches!(
            align(vec![named("a", a)], params),
            Err(Error::InvalidParameter { name: "reference", .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            GridAligner.execute_default(Vec::new()),
            Err(Error::EmptyInput(_))
        ));
    }
}
