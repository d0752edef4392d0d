//! Axis-aligned bounding rectangles in map coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance used when comparing extent edges (map units).
const EDGE_EPSILON: f64 = 1e-9;

/// A bounding rectangle in the coordinate system of its grid or geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Build from a `(min_x, min_y, max_x, max_y)` tuple as returned by
    /// [`GeoTransform::bounds`](crate::GeoTransform::bounds).
    pub fn from_bounds(bounds: (f64, f64, f64, f64)) -> Self {
        Self::new(bounds.0, bounds.1, bounds.2, bounds.3)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Zero or negative width/height, or non-finite edges.
    pub fn is_degenerate(&self) -> bool {
        !(self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite())
            || self.width() <= EDGE_EPSILON
            || self.height() <= EDGE_EPSILON
    }

    /// Largest rectangle shared by both extents, `None` when they do not
    /// overlap with a positive area.
    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let result = Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        if result.is_degenerate() { None } else { Some(result) }
    }

    /// Whether `other` lies entirely inside this extent (edges inclusive)
    pub fn contains(&self, other: &Extent) -> bool {
        other.min_x >= self.min_x - EDGE_EPSILON
            && other.min_y >= self.min_y - EDGE_EPSILON
            && other.max_x <= self.max_x + EDGE_EPSILON
            && other.max_y <= self.max_y + EDGE_EPSILON
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Edge-wise equality within `tolerance`
    pub fn approx_eq(&self, other: &Extent, tolerance: f64) -> bool {
        (self.min_x - other.min_x).abs() <= tolerance
            && (self.min_y - other.min_y).abs() <= tolerance
            && (self.max_x - other.max_x).abs() <= tolerance
            && (self.max_y - other.max_y).abs() <= tolerance
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) - ({:.6}, {:.6})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
