//! Pure-Rust coordinate transforms between the reference systems used by
//! satellite scenes and census geometries (Snyder 1987, USGS formulas).
//!
//! Supported systems:
//! - EPSG 4326 (WGS84) and 4269 (NAD83) geographic
//! - EPSG 3857 (Web Mercator)
//! - EPSG 326xx / 327xx (WGS84 UTM North / South)
//! - EPSG 269xx (NAD83 UTM North, zones 1-23)
//!
//! NAD83 and WGS84 are treated as the same datum (sub-metre difference
//! across the conterminous US, well below a 30 m Landsat cell). Anything
//! else has no known transform and yields [`Error::CrsMismatch`].

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::Extent;

/// Reference ellipsoid
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ellipsoid {
    /// Semi-major axis (m)
    a: f64,
    /// Flattening
    f: f64,
}

impl Ellipsoid {
    const WGS84: Ellipsoid = Ellipsoid { a: 6_378_137.0, f: 1.0 / 298.257_223_563 };
    const GRS80: Ellipsoid = Ellipsoid { a: 6_378_137.0, f: 1.0 / 298.257_222_101 };

    /// Eccentricity squared
    fn e2(&self) -> f64 {
        2.0 * self.f - self.f * self.f
    }

    /// Second eccentricity squared
    fn e_prime2(&self) -> f64 {
        let e2 = self.e2();
        e2 / (1.0 - e2)
    }
}

const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
/// Web Mercator spherical radius (m)
const MERCATOR_RADIUS: f64 = 6_378_137.0;
/// Web Mercator latitude limit (degrees)
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A map projection known to the transformer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees
    Geographic,
    /// Spherical Web Mercator in metres
    WebMercator,
    /// Universal Transverse Mercator in metres
    Utm {
        zone: u32,
        north: bool,
        grs80: bool,
    },
}

impl Projection {
    /// Resolve an EPSG code, `None` when unsupported.
    pub fn from_epsg(epsg: u32) -> Option<Projection> {
        match epsg {
            4326 | 4269 => Some(Projection::Geographic),
            3857 | 900913 => Some(Projection::WebMercator),
            32601..=32660 => Some(Projection::Utm { zone: epsg - 32600, north: true, grs80: false }),
            32701..=32760 => Some(Projection::Utm { zone: epsg - 32700, north: false, grs80: false }),
            26901..=26923 => Some(Projection::Utm { zone: epsg - 26900, north: true, grs80: true }),
            _ => None,
        }
    }

    /// Resolve a CRS, `None` when it carries no EPSG code or the code is
    /// unsupported.
    pub fn from_crs(crs: &CRS) -> Option<Projection> {
        crs.epsg().and_then(Projection::from_epsg)
    }

    /// Project geographic degrees to this system
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Projection::Geographic => (lon, lat),
            Projection::WebMercator => {
                let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                let x = MERCATOR_RADIUS * lon.to_radians();
                let y = MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();
                (x, y)
            }
            Projection::Utm { zone, north, grs80 } => {
                let ellipsoid = if grs80 { Ellipsoid::GRS80 } else { Ellipsoid::WGS84 };
                geographic_to_utm(lon, lat, zone, north, ellipsoid)
            }
        }
    }

    /// Unproject coordinates of this system to geographic degrees
    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Projection::Geographic => (x, y),
            Projection::WebMercator => {
                let lon = (x / MERCATOR_RADIUS).to_degrees();
                let lat = (2.0 * (y / MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
            Projection::Utm { zone, north, grs80 } => {
                let ellipsoid = if grs80 { Ellipsoid::GRS80 } else { Ellipsoid::WGS84 };
                utm_to_geographic(x, y, zone, north, ellipsoid)
            }
        }
    }
}

/// Point transform from one CRS to another.
#[derive(Debug, Clone)]
pub struct Transformer {
    source: Projection,
    target: Projection,
}

impl Transformer {
    /// Build a transform between two reference systems.
    ///
    /// Fails with [`Error::CrsMismatch`] when either side is not a
    /// supported EPSG system (WKT/PROJ-only definitions included).
    pub fn new(source: &CRS, target: &CRS) -> Result<Self> {
        let mismatch = || Error::CrsMismatch(source.identifier(), target.identifier());
        let source_proj = Projection::from_crs(source).ok_or_else(mismatch)?;
        let target_proj = Projection::from_crs(target).ok_or_else(mismatch)?;
        Ok(Self {
            source: source_proj,
            target: target_proj,
        })
    }

    /// Whether the transform changes nothing (same projection on both sides)
    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    /// Transform a point from the source to the target system
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        if self.is_identity() {
            return (x, y);
        }
        let (lon, lat) = self.source.inverse(x, y);
        self.target.forward(lon, lat)
    }

    /// The transform in the opposite direction
    pub fn inverse(&self) -> Transformer {
        Transformer {
            source: self.target,
            target: self.source,
        }
    }

    /// Transform an extent by densifying each edge with `densify` extra
    /// points and taking the envelope of the transformed points.
    ///
    /// Edges curve under projection; corner-only transforms shrink the
    /// envelope.
    pub fn transform_extent(&self, extent: &Extent, densify: usize) -> Extent {
        if self.is_identity() {
            return *extent;
        }

        let steps = densify + 1;
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        let mut visit = |x: f64, y: f64| {
            let (tx, ty) = self.transform(x, y);
            if tx.is_finite() && ty.is_finite() {
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
            }
        };

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = extent.min_x + t * extent.width();
            let y = extent.min_y + t * extent.height();
            visit(x, extent.min_y);
            visit(x, extent.max_y);
            visit(extent.min_x, y);
            visit(extent.max_x, y);
        }

        Extent::new(min_x, min_y, max_x, max_y)
    }
}

// ── Transverse Mercator (Snyder 1987, USGS Prof. Paper 1395, pp. 61-64) ──

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Convert (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
fn geographic_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool, ell: Ellipsoid) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);
    let e2 = ell.e2();
    let ep2 = ell.e_prime2();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = ell.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ep2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);

    let m = meridional_arc(lat, ell);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0 * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// Convert UTM (easting, northing) in metres to (longitude, latitude) in
/// degrees. Snyder eqs. 8-18 to 8-25 (footpoint latitude series).
fn utm_to_geographic(easting: f64, northing: f64, zone: u32, north: bool, ell: Ellipsoid) -> (f64, f64) {
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = ell.e_prime2();

    let x = easting - FALSE_EASTING;
    let y = if north { northing } else { northing - FALSE_NORTHING_SOUTH };

    let m = y / K0;
    let mu = m / (ell.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1me2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = ell.a / denom.sqrt();
    let r1 = ell.a * (1.0 - e2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians).
/// Snyder eq. 3-21.
fn meridional_arc(lat: f64, ell: Ellipsoid) -> f64 {
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    ell.a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
