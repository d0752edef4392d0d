//! Coordinate Reference System handling

mod transform;

pub use transform::{Projection, Transformer};

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known (primary)
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// NAD83 geographic CRS (EPSG:4269), used by US census geometries
    pub fn nad83() -> Self {
        Self::from_epsg(4269)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // String comparison is imperfect but never reports a false match
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Equivalence over optional CRSs: two undefined systems match each
    /// other, a defined and an undefined one never do.
    pub fn same_system(a: Option<&CRS>, b: Option<&CRS>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_equivalent(b),
            _ => false,
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

impl FromStr for CRS {
    type Err = Error;

    /// Parse an authority string: `EPSG:32617`, `urn:ogc:def:crs:EPSG::4269`,
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`, or a bare EPSG code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("CRS84") || trimmed.ends_with(":CRS84") {
            return Ok(CRS::wgs84());
        }

        let code = trimmed
            .rsplit(':')
            .next()
            .filter(|_| {
                let upper = trimmed.to_ascii_uppercase();
                upper.starts_with("EPSG:") || upper.contains(":EPSG:") || !trimmed.contains(':')
            })
            .and_then(|c| c.parse::<u32>().ok());

        code.map(CRS::from_epsg).ok_or_else(|| Error::InvalidParameter {
            name: "crs",
            value: s.to_string(),
            reason: "expected an EPSG authority code".into(),
        })
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
