//! Clipping a band stack to an area-of-interest boundary
//!
//! The clip is rectangular: every layer is cut to the bounding rectangle
//! of the boundary. Cells outside the polygon but inside the rectangle
//! are kept unless [`mask_to_boundary`] is applied as well.

use heatrisk_core::raster::{GridStack, Raster};
use heatrisk_core::vector::Boundary;
use heatrisk_core::{Algorithm, Error, Result};
use tracing::{debug, info};

/// Parameters for boundary clipping
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipParams {
    /// Also set cells whose centre lies outside the polygon to NaN
    pub mask_polygon: bool,
}

/// Boundary clipper stage
#[derive(Debug, Clone, Default)]
pub struct BoundaryClipper;

impl Algorithm for BoundaryClipper {
    type Input = (GridStack, Boundary);
    type Output = GridStack;
    type Params = ClipParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BoundaryClipper"
    }

    fn description(&self) -> &'static str {
        "Crop an aligned stack to the bounding rectangle of a boundary"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (stack, boundary) = input;
        let clipped = clip_to_boundary(&stack, &boundary)?;
        if params.mask_polygon {
            mask_to_boundary(&clipped, &boundary)
        } else {
            Ok(clipped)
        }
    }
}

/// The boundary expressed in the stack's CRS. The stack is never moved.
fn boundary_in_stack_crs(stack: &GridStack, boundary: &Boundary) -> Result<Boundary> {
    match (stack.crs(), boundary.crs()) {
        (Some(crs), _) => boundary.reproject(crs),
        (None, None) => Ok(boundary.clone()),
        (None, Some(b)) => Err(Error::CrsMismatch(b.identifier(), "<undefined CRS>".into())),
    }
}

/// Crop every layer of `stack` to the bounding rectangle of `boundary`.
///
/// A rectangle covering the whole stack returns it unchanged; one that
/// misses the stack fails with [`Error::EmptyIntersection`].
pub fn clip_to_boundary(stack: &GridStack, boundary: &Boundary) -> Result<GridStack> {
    let boundary = boundary_in_stack_crs(stack, boundary)?;
    let rect = boundary.bounding_extent()?;
    let extent = stack.extent();

    if rect.contains(&extent) {
        debug!(rect = %rect, "boundary covers the whole stack");
        return Ok(stack.clone());
    }

    let window = extent
        .intersection(&rect)
        .filter(|e| !e.is_degenerate())
        .and_then(|e| stack.get(0).and_then(|layer| layer.window_for_extent(&e)));
    let Some((row, col, rows, cols)) = window else {
        return Err(Error::EmptyIntersection(format!(
            "boundary {} does not overlap stack extent {}",
            rect, extent
        )));
    };

    let clipped = stack.try_map(|_, layer| layer.window(row, col, rows, cols))?;
    info!(
        rows,
        cols,
        row_offset = row,
        col_offset = col,
        "clipped stack to boundary"
    );
    Ok(clipped)
}

/// Set every cell whose centre lies outside the boundary polygons to NaN.
pub fn mask_to_boundary(stack: &GridStack, boundary: &Boundary) -> Result<GridStack> {
    let boundary = boundary_in_stack_crs(stack, boundary)?;
    let (rows, cols) = stack.shape();
    let transform = *stack.transform();

    let mut inside = vec![false; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = transform.pixel_to_geo(col, row);
            inside[row * cols + col] = boundary.contains_point(x, y);
        }
    }
    let masked = inside.iter().filter(|&&i| !i).count();

    let out = stack.try_map(|_, layer| {
        let mut out: Raster<f64> = layer.clone();
        out.set_nodata(Some(f64::NAN));
        for ((row, col), v) in out.data_mut().indexed_iter_mut() {
            if !inside[row * cols + col] || layer.is_nodata(*v) {
                *v = f64::NAN;
            }
        }
        Ok(out)
    })?;
    debug!(masked, total = rows * cols, "masked cells outside the boundary polygon");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};
    use heatrisk_core::raster::Extent;
    use heatrisk_core::{GeoTransform, CRS};

    fn stack() -> GridStack {
        let mut layers = Vec::new();
        for name in ["red", "nir"] {
            let mut r = Raster::new(10, 10);
            r.set_transform(GeoTransform::new(330_000.0, 4_430_300.0, 30.0, -30.0));
            r.set_crs(Some(CRS::from_epsg(32617)));
            for row in 0..10 {
                for col in 0..10 {
                    r.set(row, col, (row * 10 + col) as f64).unwrap();
                }
            }
            layers.push((name.to_string(), r));
        }
        GridStack::new(layers).unwrap()
    }

    fn utm_rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Boundary {
        Boundary::from_extent(
            &Extent::new(min_x, min_y, max_x, max_y),
            Some(CRS::from_epsg(32617)),
        )
    }

    #[test]
    fn test_containing_boundary_is_noop() {
        let s = stack();
        let b = utm_rect(329_000.0, 4_429_000.0, 331_000.0, 4_431_000.0);
        let out = clip_to_boundary(&s, &b).unwrap();
        assert_eq!(out.shape(), s.shape());
        assert_eq!(out.transform(), s.transform());
        assert_eq!(out.get(1).unwrap().data(), s.get(1).unwrap().data());
    }

    #[test]
    fn test_clip_to_inner_rectangle() {
        let s = stack();
        // x 330_060..330_150 (cols 2..5), y 4_430_090..4_430_240 (rows 2..7)
        let b = utm_rect(330_060.0, 4_430_090.0, 330_150.0, 4_430_240.0);
        let out = clip_to_boundary(&s, &b).unwrap();
        assert_eq!(out.shape(), (5, 3));
        assert_eq!(out.get(0).unwrap().get(0, 0).unwrap(), 22.0);
        assert_eq!(out.transform().origin_x, 330_060.0);
        assert_eq!(out.transform().origin_y, 4_430_240.0);
    }

    #[test]
    fn test_disjoint_boundary_fails() {
        let s = stack();
        let b = utm_rect(400_000.0, 4_430_000.0, 401_000.0, 4_431_000.0);
        assert!(matches!(clip_to_boundary(&s, &b), Err(Error::EmptyIntersection(_))));
    }

    #[test]
    fn test_geographic_boundary_is_reprojected() {
        let s = stack();
        // a lon/lat rectangle far larger than the 300 m stack
        let b = Boundary::from_extent(&Extent::new(-84.0, 39.0, -82.0, 41.0), Some(CRS::wgs84()));
        let out = clip_to_boundary(&s, &b).unwrap();
        assert_eq!(out.shape(), s.shape());
        assert_eq!(out.crs().and_then(|c| c.epsg()), Some(32617));
    }

    #[test]
    fn test_unsupported_boundary_crs_fails() {
        let s = stack();
        // Lambert-93 is not among the supported projections
        let b = Boundary::from_extent(
            &Extent::new(650_000.0, 6_860_000.0, 660_000.0, 6_870_000.0),
            Some(CRS::from_epsg(2154)),
        );
        match clip_to_boundary(&s, &b) {
            Err(Error::CrsMismatch(from, to)) => {
                assert!(from.contains("2154"), "{from}");
                assert!(to.contains("32617"), "{to}");
            }
            other => panic!("expected CrsMismatch, got {:?}", other.map(|o| o.shape())),
        }
    }

    #[test]
    fn test_stack_without_crs_rejects_referenced_boundary() {
        let mut r: Raster<f64> = Raster::filled(4, 4, 1.0);
        r.set_transform(GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        let s = GridStack::new(vec![("red".to_string(), r)]).unwrap();
        let b = utm_rect(0.0, 0.0, 60.0, 60.0);
        assert!(matches!(clip_to_boundary(&s, &b), Err(Error::CrsMismatch(_, _))));

        // Both undefined: the boundary is taken as-is
        let bare = Boundary::from_extent(&Extent::new(0.0, 0.0, 60.0, 60.0), None);
        assert_eq!(clip_to_boundary(&s, &bare).unwrap().shape(), (2, 2));
    }

    #[test]
    fn test_mask_outside_polygon() {
        let s = stack();
        // triangle over the lower-left half of the stack
        let tri = polygon![
            (x: 330_000.0, y: 4_430_000.0),
            (x: 330_300.0, y: 4_430_000.0),
            (x: 330_000.0, y: 4_430_300.0),
            (x: 330_000.0, y: 4_430_000.0),
        ];
        let b = Boundary::new(MultiPolygon(vec![tri]), Some(CRS::from_epsg(32617)));
        let out = mask_to_boundary(&s, &b).unwrap();
        let red = out.by_name("red").unwrap();
        assert!(red.get(0, 9).unwrap().is_nan());
        assert_eq!(red.get(9, 0).unwrap(), 90.0);
    }

    #[test]
    fn test_algorithm_with_mask() {
        let s = stack();
        let b = utm_rect(329_000.0, 4_429_000.0, 331_000.0, 4_431_000.0);
        let out = BoundaryClipper
            .execute((s, b), ClipParams { mask_polygon: true })
            .unwrap();
        assert!(out.get(0).unwrap().data().iter().all(|v| !v.is_nan()));
    }
}
