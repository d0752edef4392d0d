//! Vector data: county boundaries and demographic polygon features

mod demographics;
mod geojson;

pub use demographics::{CensusQuery, DemographicSource, GeoJsonDemographics};
pub use geojson::{parse_boundary, parse_features, read_boundary, read_features};

use crate::crs::{Transformer, CRS};
use crate::error::{Error, Result};
use crate::raster::Extent;
use geo::{BoundingRect, Contains, Coord, Intersects, MapCoords};
use geo_types::{Geometry, MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) => write!(f, "{}", s),
        }
    }
}

fn reproject_geometry<G>(geometry: &G, transformer: &Transformer) -> G
where
    G: MapCoords<f64, f64, Output = G>,
{
    geometry.map_coords(|c: Coord<f64>| {
        let (x, y) = transformer.transform(c.x, c.y);
        Coord { x, y }
    })
}

fn rect_to_extent(rect: geo_types::Rect<f64>) -> Extent {
    Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Polygonal part of the geometry, if any.
    pub fn polygons(&self) -> Option<MultiPolygon<f64>> {
        match self.geometry.as_ref()? {
            Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
            Geometry::MultiPolygon(mp) => Some(mp.clone()),
            _ => None,
        }
    }

    /// Identifier used to key per-feature results: the `field` attribute
    /// when given and present, else the feature id.
    pub fn key(&self, field: Option<&str>) -> Option<String> {
        field
            .and_then(|f| self.get_property(f))
            .filter(|v| **v != AttributeValue::Null)
            .map(|v| v.to_string())
            .or_else(|| self.id.clone())
    }

    fn reprojected(&self, transformer: &Transformer) -> Feature {
        Feature {
            geometry: self
                .geometry
                .as_ref()
                .map(|g| reproject_geometry(g, transformer)),
            properties: self.properties.clone(),
            id: self.id.clone(),
        }
    }
}

/// Collection of features sharing one CRS
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crs(crs: Option<CRS>) -> Self {
        Self {
            features: Vec::new(),
            crs,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Reproject every geometry into `target`.
    ///
    /// A collection without a CRS is assumed to be in `target` already.
    pub fn reproject(&self, target: &CRS) -> Result<FeatureCollection> {
        let Some(source) = &self.crs else {
            return Ok(FeatureCollection {
                features: self.features.clone(),
                crs: Some(target.clone()),
            });
        };
        let transformer = Transformer::new(source, target)?;
        if transformer.is_identity() {
            return Ok(FeatureCollection {
                features: self.features.clone(),
                crs: Some(target.clone()),
            });
        }
        Ok(FeatureCollection {
            features: self.features.iter().map(|f| f.reprojected(&transformer)).collect(),
            crs: Some(target.clone()),
        })
    }

    /// Features whose polygons intersect `boundary`.
    ///
    /// The boundary is reprojected into the collection's CRS first.
    pub fn intersecting(&self, boundary: &Boundary) -> Result<FeatureCollection> {
        let boundary = match &self.crs {
            Some(crs) => boundary.reproject(crs)?,
            None => boundary.clone(),
        };
        let features: Vec<Feature> = self
            .features
            .iter()
            .filter(|f| {
                f.polygons()
                    .is_some_and(|mp| mp.intersects(boundary.geometry()))
            })
            .cloned()
            .collect();
        debug!(
            kept = features.len(),
            total = self.features.len(),
            "selected features intersecting boundary"
        );
        Ok(FeatureCollection {
            features,
            crs: self.crs.clone(),
        })
    }
}

/// Polygonal area of interest (a county boundary)
#[derive(Debug, Clone)]
pub struct Boundary {
    geometry: MultiPolygon<f64>,
    crs: Option<CRS>,
}

impl Boundary {
    pub fn new(geometry: MultiPolygon<f64>, crs: Option<CRS>) -> Self {
        Self { geometry, crs }
    }

    /// Rectangular boundary, handy for synthetic areas of interest.
    pub fn from_extent(extent: &Extent, crs: Option<CRS>) -> Self {
        let rect = geo_types::Rect::new(
            Coord { x: extent.min_x, y: extent.min_y },
            Coord { x: extent.max_x, y: extent.max_y },
        );
        Self::new(MultiPolygon(vec![rect.to_polygon()]), crs)
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Bounding rectangle of the boundary polygons
    pub fn bounding_extent(&self) -> Result<Extent> {
        self.geometry
            .bounding_rect()
            .map(rect_to_extent)
            .ok_or_else(|| Error::EmptyInput("boundary has no coordinates".into()))
    }

    /// Boundary transformed into `target`.
    ///
    /// A boundary without a declared CRS is taken to be in `target`
    /// already; an unsupported pair fails with [`Error::CrsMismatch`].
    pub fn reproject(&self, target: &CRS) -> Result<Boundary> {
        let Some(source) = &self.crs else {
            return Ok(Boundary::new(self.geometry.clone(), Some(target.clone())));
        };
        let transformer = Transformer::new(source, target)?;
        if transformer.is_identity() {
            return Ok(Boundary::new(self.geometry.clone(), Some(target.clone())));
        }
        debug!(from = %source, to = %target, "reprojecting boundary");
        Ok(Boundary::new(
            reproject_geometry(&self.geometry, &transformer),
            Some(target.clone()),
        ))
    }

    /// Whether the point lies strictly inside the boundary polygons
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ])
    }

    #[test]
    fn test_boundary_extent() {
        let b = Boundary::from_extent(&Extent::new(10.0, 20.0, 30.0, 50.0), None);
        let e = b.bounding_extent().unwrap();
        assert_relative_eq!(e.min_x, 10.0);
        assert_relative_eq!(e.max_y, 50.0);
        assert!(b.contains_point(15.0, 25.0));
        assert!(!b.contains_point(35.0, 25.0));
    }

    #[test]
    fn test_boundary_reproject_to_utm() {
        let b = Boundary::from_extent(&Extent::new(-83.1, 39.9, -82.9, 40.1), Some(CRS::nad83()));
        let utm = b.reproject(&CRS::from_epsg(32617)).unwrap();
        assert_eq!(utm.crs().and_then(|c| c.epsg()), Some(32617));
        let e = utm.bounding_extent().unwrap();
        // Columbus, Ohio lies around 330 km easting, 4.42e6 m northing
        assert!(e.min_x > 300_000.0 && e.max_x < 360_000.0);
        assert!(e.min_y > 4_400_000.0 && e.max_y < 4_460_000.0);
    }

    #[test]
    fn test_boundary_reproject_identity_is_clone() {
        let b = Boundary::from_extent(&Extent::new(0.0, 0.0, 1.0, 1.0), Some(CRS::wgs84()));
        let same = b.reproject(&CRS::wgs84()).unwrap();
        assert_eq!(same.geometry(), b.geometry());
    }

    #[test]
    fn test_equivalent_reprojection_retags_crs() {
        let mut fc = FeatureCollection::with_crs(Some(CRS::nad83()));
        fc.push(Feature::new(square(-83.0, 39.9, 0.1)));
        let wgs = fc.reproject(&CRS::wgs84()).unwrap();
        assert_eq!(wgs.crs.as_ref().and_then(|c| c.epsg()), Some(4326));
        assert_eq!(wgs.features[0].geometry, fc.features[0].geometry);

        let b = Boundary::from_extent(&Extent::new(-83.0, 39.9, -82.9, 40.0), Some(CRS::nad83()));
        let same = b.reproject(&CRS::wgs84()).unwrap();
        assert_eq!(same.crs().and_then(|c| c.epsg()), Some(4326));
        assert_eq!(same.geometry(), b.geometry());
    }

    #[test]
    fn test_intersecting_filters_features() {
        let mut fc = FeatureCollection::with_crs(Some(CRS::wgs84()));
        let mut inside = Feature::new(square(0.5, 0.5, 1.0));
        inside.set_property("GEOID", AttributeValue::String("A".into()));
        fc.push(inside);
        fc.push(Feature::new(square(10.0, 10.0, 1.0)));
        fc.push(Feature::empty());

        let b = Boundary::from_extent(&Extent::new(0.0, 0.0, 2.0, 2.0), Some(CRS::wgs84()));
        let kept = fc.intersecting(&b).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.features[0].key(Some("GEOID")).as_deref(), Some("A"));
    }

    #[test]
    fn test_feature_key_falls_back_to_id() {
        let mut f = Feature::new(square(0.0, 0.0, 1.0));
        f.id = Some("tract-7".into());
        assert_eq!(f.key(Some("GEOID")).as_deref(), Some("tract-7"));
        f.set_property("GEOID", AttributeValue::Int(39049));
        assert_eq!(f.key(Some("GEOID")).as_deref(), Some("39049"));
    }
}
