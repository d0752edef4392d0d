//! GeoJSON reading for boundaries and polygon features
//!
//! Accepts a FeatureCollection, a single Feature or a bare geometry.
//! The CRS comes from the legacy `crs` member (`{"type": "name",
//! "properties": {"name": "urn:ogc:def:crs:EPSG::4269"}}`); without one
//! the coordinates are CRS84 longitude/latitude.

use super::{AttributeValue, Boundary, Feature, FeatureCollection};
use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Read a polygonal boundary from a GeoJSON file.
///
/// All polygon members are merged into one `MultiPolygon`.
pub fn read_boundary<P: AsRef<Path>>(path: P) -> Result<Boundary> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_boundary(&text, &path.display().to_string())
}

/// Read the features of a GeoJSON file.
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_features(&text, &path.display().to_string())
}

/// Parse a boundary from GeoJSON text; `source_name` labels errors.
pub fn parse_boundary(text: &str, source_name: &str) -> Result<Boundary> {
    let collection = parse_features(text, source_name)?;
    let mut polygons = Vec::new();
    for feature in &collection.features {
        match &feature.geometry {
            Some(Geometry::Polygon(p)) => polygons.push(p.clone()),
            Some(Geometry::MultiPolygon(mp)) => polygons.extend(mp.0.iter().cloned()),
            Some(_) => {
                return Err(Error::format(
                    source_name,
                    "boundary geometries must be Polygon or MultiPolygon",
                ));
            }
            None => {}
        }
    }
    if polygons.is_empty() {
        return Err(Error::format(source_name, "no boundary polygon found"));
    }
    debug!(source = source_name, polygons = polygons.len(), "parsed boundary");
    Ok(Boundary::new(MultiPolygon(polygons), collection.crs))
}

/// Parse a feature collection from GeoJSON text.
pub fn parse_features(text: &str, source_name: &str) -> Result<FeatureCollection> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| Error::format(source_name, format!("invalid JSON: {}", e)))?;
    let object = root
        .as_object()
        .ok_or_else(|| Error::format(source_name, "GeoJSON root must be an object"))?;

    let crs = parse_crs(object, source_name)?;
    let mut collection = FeatureCollection::with_crs(Some(crs));

    match type_of(object, source_name)? {
        "FeatureCollection" => {
            let features = object
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::format(source_name, "FeatureCollection without features"))?;
            for value in features {
                let feature = value
                    .as_object()
                    .ok_or_else(|| Error::format(source_name, "feature must be an object"))?;
                collection.push(parse_feature(feature, source_name)?);
            }
        }
        "Feature" => collection.push(parse_feature(object, source_name)?),
        _ => collection.push(Feature::new(parse_geometry(object, source_name)?)),
    }

    Ok(collection)
}

fn type_of<'a>(object: &'a Map<String, Value>, source_name: &str) -> Result<&'a str> {
    object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::format(source_name, "missing GeoJSON type"))
}

fn parse_crs(object: &Map<String, Value>, source_name: &str) -> Result<CRS> {
    let Some(crs) = object.get("crs").filter(|v| !v.is_null()) else {
        return Ok(CRS::wgs84());
    };
    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::format(source_name, "crs member without properties.name"))?;
    name.parse::<CRS>()
        .map_err(|e| Error::format(source_name, e.to_string()))
}

fn parse_feature(object: &Map<String, Value>, source_name: &str) -> Result<Feature> {
    let mut feature = match object.get("geometry") {
        Some(Value::Object(g)) => Feature::new(parse_geometry(g, source_name)?),
        _ => Feature::empty(),
    };

    feature.id = match object.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    if let Some(Value::Object(props)) = object.get("properties") {
        for (key, value) in props {
            feature.set_property(key.clone(), attribute(value));
        }
    }
    Ok(feature)
}

fn attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn parse_geometry(object: &Map<String, Value>, source_name: &str) -> Result<Geometry<f64>> {
    let kind = type_of(object, source_name)?;
    let coords = || {
        object
            .get("coordinates")
            .ok_or_else(|| Error::format(source_name, format!("{} without coordinates", kind)))
    };

    let geometry = match kind {
        "Point" => Geometry::Point(Point::from(position(coords()?, source_name)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint(
            positions(coords()?, source_name)?.into_iter().map(Point::from).collect(),
        )),
        "LineString" => Geometry::LineString(LineString(positions(coords()?, source_name)?)),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString(
            rings(coords()?, source_name)?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coords()?, source_name)?),
        "MultiPolygon" => {
            let members = array(coords()?, source_name)?
                .iter()
                .map(|p| polygon(p, source_name))
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon(members))
        }
        other => {
            return Err(Error::format(
                source_name,
                format!("unsupported geometry type {}", other),
            ));
        }
    };
    Ok(geometry)
}

fn array<'a>(value: &'a Value, source_name: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::format(source_name, "coordinates must be arrays"))
}

fn position(value: &Value, source_name: &str) -> Result<Coord<f64>> {
    let items = array(value, source_name)?;
    match (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(Error::format(source_name, "position needs two numbers")),
    }
}

fn positions(value: &Value, source_name: &str) -> Result<Vec<Coord<f64>>> {
    array(value, source_name)?
        .iter()
        .map(|p| position(p, source_name))
        .collect()
}

fn rings(value: &Value, source_name: &str) -> Result<Vec<LineString<f64>>> {
    array(value, source_name)?
        .iter()
        .map(|r| positions(r, source_name).map(LineString))
        .collect()
}

fn polygon(value: &Value, source_name: &str) -> Result<Polygon<f64>> {
    let mut members = rings(value, source_name)?.into_iter();
    let exterior = members
        .next()
        .ok_or_else(|| Error::format(source_name, "polygon without exterior ring"))?;
    Ok(Polygon::new(exterior, members.collect()))
}
