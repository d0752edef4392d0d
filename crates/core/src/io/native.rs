//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Reads the georeferencing tags the pipeline needs
//! (pixel scale, tiepoint or transformation matrix, GeoKeyDirectory EPSG
//! code, GDAL_NODATA) and writes single-band 32-bit float GeoTIFFs.

use crate::crs::{Projection, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::TiffError;
use tracing::debug;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (honoured by the GDAL writer; the native writer stores
    /// uncompressed strips)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Read one band of a GeoTIFF file into a Raster
///
/// `band` is 1-indexed; `None` means band 1. Files with more than one
/// sample per pixel are rejected with [`Error::Format`]: every input of
/// the pipeline is a single-band file.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    decode_geotiff(file, band, &path.display().to_string())
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band, "<buffer>")
}

fn tiff_error(source_name: &str, e: TiffError) -> Error {
    match e {
        TiffError::IoError(io) => Error::Io(io),
        other => Error::format(source_name, other.to_string()),
    }
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R, band: Option<usize>, source_name: &str) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(|e| tiff_error(source_name, e))?;

    let samples = match decoder.find_tag(Tag::SamplesPerPixel) {
        Ok(Some(value)) => value.into_u32().unwrap_or(1),
        _ => 1,
    };
    if samples != 1 {
        return Err(Error::format(
            source_name,
            format!("expected a single-band raster, found {} bands", samples),
        ));
    }
    if let Some(b) = band
        && b != 1
    {
        return Err(Error::format(
            source_name,
            format!("band {} requested from a single-band raster", b),
        ));
    }

    let (width, height) = decoder.dimensions().map_err(|e| tiff_error(source_name, e))?;
    let rows = height as usize;
    let cols = width as usize;

    let transform = read_geotransform(&mut decoder)
        .ok_or_else(|| Error::format(source_name, "missing georeferencing tags"))?;
    let (res_x, res_y) = transform.resolution();
    if !(res_x > 0.0 && res_y > 0.0) {
        return Err(Error::format(
            source_name,
            format!("non-positive resolution ({}, {})", res_x, res_y),
        ));
    }
    let crs = read_crs(&mut decoder);
    let nodata = read_nodata(&mut decoder);

    let result = decoder.read_image().map_err(|e| tiff_error(source_name, e))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I8(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::format(
            source_name,
            format!("expected {} samples, decoded {}", rows * cols, data.len()),
        ));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(transform);
    raster.set_crs(crs);
    raster.set_nodata(nodata.and_then(num_traits::cast));

    debug!(
        "decoded {}: {}x{} cells, resolution ({}, {}), crs {}",
        source_name,
        cols,
        rows,
        res_x,
        res_y,
        raster.crs().map_or_else(|| "undefined".to_string(), |c| c.identifier())
    );

    Ok(raster)
}

fn cast_all<S, T>(buf: &[S]) -> Vec<T>
where
    S: Copy + num_traits::NumCast,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or from the
/// ModelTransformation matrix.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint)
        && scale.len() >= 2
        && tiepoint.len() >= 6
    {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    // 4x4 row-major: x = t[3] + col * t[0] + row * t[1], y = t[7] + col * t[4] + row * t[5]
    let t = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    if t.len() >= 16 {
        return Some(GeoTransform {
            origin_x: t[3],
            origin_y: t[7],
            pixel_width: t[0],
            pixel_height: t[5],
            row_rotation: t[1],
            col_rotation: t[4],
        });
    }

    None
}

/// EPSG code from ProjectedCSTypeGeoKey or GeographicTypeGeoKey.
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if keys.len() < 4 {
        return None;
    }

    // Header: [version, revision, minor, count], then 4 shorts per key:
    // [key_id, tiff_tag_location, count, value_or_index]
    let num_keys = keys[3] as usize;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(num_keys) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == u16::MAX {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE_KEY => return Some(CRS::from_epsg(value as u32)),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(CRS::from_epsg(value as u32)),
            _ => {}
        }
    }
    geographic
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_end_matches('\0').trim().parse::<f64>().ok()
}

/// Write a Raster to a GeoTIFF file
///
/// Writes as 32-bit float with pixel scale, tiepoint, GeoKeyDirectory
/// (model type plus the EPSG code when known) and GDAL_NODATA tags.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path)?;
    encode_geotiff(raster, file, &path.display().to_string())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    _options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), "<buffer>")?;
    Ok(buf)
}

/// GeoKeyDirectory entries for a CRS.
fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs
        .and_then(|c| c.epsg())
        .and_then(|c| u16::try_from(c).ok().map(|short| (c, short)));

    let mut keys: Vec<[u16; 4]> = Vec::new();
    match code {
        Some((epsg, short)) if Projection::from_epsg(epsg) == Some(Projection::Geographic) => {
            keys.push([GT_MODEL_TYPE_KEY, 0, 1, 2]); // ModelTypeGeographic
            keys.push([GT_RASTER_TYPE_KEY, 0, 1, 1]); // RasterPixelIsArea
            keys.push([GEOGRAPHIC_TYPE_KEY, 0, 1, short]);
        }
        Some((_, short)) => {
            keys.push([GT_MODEL_TYPE_KEY, 0, 1, 1]); // ModelTypeProjected
            keys.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
            keys.push([PROJECTED_CS_TYPE_KEY, 0, 1, short]);
        }
        None => {
            keys.push([GT_MODEL_TYPE_KEY, 0, 1, 1]);
            keys.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
        }
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.iter().flatten());
    directory
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, sink_name: &str) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_error(sink_name, e))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) && T::is_float() {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_error(sink_name, e))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| tiff_error(sink_name, e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| tiff_error(sink_name, e))?;

    let keys = geo_keys(raster.crs());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())
        .map_err(|e| tiff_error(sink_name, e))?;

    // Float rasters store nodata as NaN; integer rasters keep their marker
    let nodata_text = match raster.nodata().and_then(|nd| nd.to_f64()) {
        Some(nd) if !T::is_float() => Some(format!("{}", nd)),
        Some(_) => Some("nan".to_string()),
        None if T::is_float() => Some("nan".to_string()),
        None => None,
    };
    if let Some(text) = nodata_text {
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| tiff_error(sink_name, e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_error(sink_name, e))?;

    Ok(())
}
