//! Derived heat-risk fields from an aligned band stack

use super::band_math::{band_math_binary, BandMathOp};
use super::indices::{ndbi, ndvi};
use super::thermal::{brightness_temperature, land_surface_temperature, radiance, SensorCalibration};
use heatrisk_core::raster::{GridStack, Raster};
use heatrisk_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Positions of the semantic bands within a [`GridStack`].
///
/// The default matches a Landsat 8/9 directory holding `B10`, `B4`, `B5`
/// and `B6` loaded in file-name order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandMapping {
    pub red: usize,
    pub nir: usize,
    pub swir1: usize,
    pub tir: usize,
}

impl Default for BandMapping {
    fn default() -> Self {
        Self {
            tir: 0,
            red: 1,
            nir: 2,
            swir1: 3,
        }
    }
}

impl BandMapping {
    fn entries(&self) -> [(&'static str, usize); 4] {
        [
            ("red", self.red),
            ("nir", self.nir),
            ("swir1", self.swir1),
            ("tir", self.tir),
        ]
    }

    /// Check that every position is distinct and below `band_count`.
    pub fn validate(&self, band_count: usize) -> Result<()> {
        let entries = self.entries();
        for (i, &(name, position)) in entries.iter().enumerate() {
            if position >= band_count {
                return Err(Error::InvalidParameter {
                    name,
                    value: position.to_string(),
                    reason: format!("stack has {} bands", band_count),
                });
            }
            if let Some((other, _)) = entries[..i].iter().find(|(_, p)| *p == position) {
                return Err(Error::InvalidParameter {
                    name,
                    value: position.to_string(),
                    reason: format!("same band as {}", other),
                });
            }
        }
        Ok(())
    }
}

/// Kind of a derived field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Ndvi,
    Ndbi,
    Radiance,
    BrightnessTemperature,
    Lst,
    Uhri,
}

impl IndexKind {
    /// Short lowercase name, also used for output file names
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Ndvi => "ndvi",
            IndexKind::Ndbi => "ndbi",
            IndexKind::Radiance => "radiance",
            IndexKind::BrightnessTemperature => "brightness_temperature",
            IndexKind::Lst => "lst",
            IndexKind::Uhri => "uhri",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A derived raster with its provenance
#[derive(Debug, Clone)]
pub struct IndexField {
    kind: IndexKind,
    raster: Raster<f64>,
    sources: Vec<String>,
}

impl IndexField {
    pub fn new(kind: IndexKind, raster: Raster<f64>, sources: Vec<String>) -> Self {
        Self { kind, raster, sources }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    /// Names of the bands or fields this one was computed from
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn into_raster(self) -> Raster<f64> {
        self.raster
    }
}

/// Every field derived from one stack; all share the stack geometry
#[derive(Debug, Clone)]
pub struct IndexSet {
    pub ndvi: IndexField,
    pub ndbi: IndexField,
    pub radiance: IndexField,
    pub brightness_temperature: IndexField,
    pub lst: IndexField,
    pub uhri: IndexField,
}

impl IndexSet {
    pub fn get(&self, kind: IndexKind) -> &IndexField {
        match kind {
            IndexKind::Ndvi => &self.ndvi,
            IndexKind::Ndbi => &self.ndbi,
            IndexKind::Radiance => &self.radiance,
            IndexKind::BrightnessTemperature => &self.brightness_temperature,
            IndexKind::Lst => &self.lst,
            IndexKind::Uhri => &self.uhri,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexField> {
        [
            &self.ndvi,
            &self.ndbi,
            &self.radiance,
            &self.brightness_temperature,
            &self.lst,
            &self.uhri,
        ]
        .into_iter()
    }
}

/// Urban heat risk index: `(LST + NDBI) - NDVI`.
///
/// Celsius and unitless indices are summed as-is, without rescaling.
pub fn uhri(lst: &Raster<f64>, ndbi: &Raster<f64>, ndvi: &Raster<f64>) -> Result<Raster<f64>> {
    let heat = band_math_binary(lst, ndbi, BandMathOp::Add)?;
    band_math_binary(&heat, ndvi, BandMathOp::Subtract)
}

/// Computes the [`IndexSet`] of a co-registered band stack
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexEngine {
    pub bands: BandMapping,
    pub calibration: SensorCalibration,
}

impl IndexEngine {
    pub fn new(bands: BandMapping, calibration: SensorCalibration) -> Self {
        Self { bands, calibration }
    }

    /// Derive NDVI, NDBI, radiance, brightness temperature, LST and UHRI.
    pub fn compute(&self, stack: &GridStack) -> Result<IndexSet> {
        self.bands.validate(stack.len())?;

        let band = |position: usize| -> Result<(String, &Raster<f64>)> {
            let raster = stack.get(position).ok_or_else(|| Error::InvalidParameter {
                name: "band",
                value: position.to_string(),
                reason: format!("stack has {} bands", stack.len()),
            })?;
            let name = stack.name(position).unwrap_or_default().to_string();
            Ok((name, raster))
        };
        let (red_name, red) = band(self.bands.red)?;
        let (nir_name, nir) = band(self.bands.nir)?;
        let (swir_name, swir1) = band(self.bands.swir1)?;
        let (tir_name, tir) = band(self.bands.tir)?;
        debug!(red = %red_name, nir = %nir_name, swir1 = %swir_name, tir = %tir_name, "band mapping");

        let ndvi_field = IndexField::new(
            IndexKind::Ndvi,
            ndvi(nir, red)?,
            vec![nir_name.clone(), red_name],
        );
        let ndbi_field = IndexField::new(
            IndexKind::Ndbi,
            ndbi(swir1, nir)?,
            vec![swir_name, nir_name],
        );
        let radiance_field = IndexField::new(
            IndexKind::Radiance,
            radiance(tir, &self.calibration)?,
            vec![tir_name],
        );
        let bt_field = IndexField::new(
            IndexKind::BrightnessTemperature,
            brightness_temperature(radiance_field.raster(), &self.calibration)?,
            vec![IndexKind::Radiance.name().to_string()],
        );
        let lst_field = IndexField::new(
            IndexKind::Lst,
            land_surface_temperature(bt_field.raster())?,
            vec![IndexKind::BrightnessTemperature.name().to_string()],
        );
        let uhri_field = IndexField::new(
            IndexKind::Uhri,
            uhri(lst_field.raster(), ndbi_field.raster(), ndvi_field.raster())?,
            [IndexKind::Lst, IndexKind::Ndbi, IndexKind::Ndvi]
                .iter()
                .map(|k| k.name().to_string())
                .collect(),
        );

        let set = IndexSet {
            ndvi: ndvi_field,
            ndbi: ndbi_field,
            radiance: radiance_field,
            brightness_temperature: bt_field,
            lst: lst_field,
            uhri: uhri_field,
        };
        for field in set.iter() {
            let stats = field.raster().statistics();
            debug!(
                field = %field.kind(),
                valid = stats.valid_count,
                min = ?stats.min,
                max = ?stats.max,
                "derived field"
            );
        }
        let (rows, cols) = stack.shape();
        info!(rows, cols, "computed spectral and thermal indices");
        Ok(set)
    }
}

impl Algorithm for IndexEngine {
    type Input = GridStack;
    type Output = IndexSet;
    type Params = IndexEngine;
    type Error = Error;

    fn name(&self) -> &'static str {
        "IndexEngine"
    }

    fn description(&self) -> &'static str {
        "Derive NDVI, NDBI, land surface temperature and the urban heat risk index"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        params.compute(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use heatrisk_core::{GeoTransform, CRS};

    fn layer(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, value);
        r.set_transform(GeoTransform::new(500_000.0, 4_000_120.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32617)));
        r
    }

    fn stack() -> GridStack {
        GridStack::new(vec![
            ("B10".into(), layer(30_000.0)),
            ("B4".into(), layer(0.2)),
            ("B5".into(), layer(0.5)),
            ("B6".into(), layer(0.4)),
        ])
        .unwrap()
    }

    #[test]
    fn test_compute_full_set() {
        let set = IndexEngine::default().compute(&stack()).unwrap();

        let ndvi = set.ndvi.raster().get(1, 1).unwrap();
        let ndbi = set.ndbi.raster().get(1, 1).unwrap();
        assert_relative_eq!(ndvi, 0.3 / 0.7, epsilon = 1e-12);
        assert_relative_eq!(ndbi, -0.1 / 0.9, epsilon = 1e-12);

        let l = 30_000.0 * 0.0003342 + 0.1;
        let kelvin = 1321.08 / (774.89 / l + 1.0_f64).ln();
        assert_relative_eq!(set.radiance.raster().get(0, 0).unwrap(), l, epsilon = 1e-12);
        assert_relative_eq!(
            set.brightness_temperature.raster().get(0, 0).unwrap(),
            kelvin,
            epsilon = 1e-9
        );
        let lst = kelvin - 273.15;
        assert_relative_eq!(set.lst.raster().get(0, 0).unwrap(), lst, epsilon = 1e-9);
        assert_relative_eq!(
            set.uhri.raster().get(3, 3).unwrap(),
            (lst + ndbi) - ndvi,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_fields_share_stack_geometry() {
        let s = stack();
        let set = IndexEngine::default().compute(&s).unwrap();
        for field in set.iter() {
            assert_eq!(field.raster().shape(), s.shape());
            assert_eq!(field.raster().transform(), s.transform());
            assert_eq!(field.raster().crs(), s.crs());
        }
    }

    #[test]
    fn test_provenance() {
        let set = IndexEngine::default().compute(&stack()).unwrap();
        assert_eq!(set.ndvi.sources(), ["B5", "B4"]);
        assert_eq!(set.ndbi.sources(), ["B6", "B5"]);
        assert_eq!(set.get(IndexKind::Uhri).sources(), ["lst", "ndbi", "ndvi"]);
    }

    #[test]
    fn test_out_of_range_band_rejected() {
        let engine = IndexEngine {
            bands: BandMapping { red: 0, nir: 1, swir1: 2, tir: 7 },
            ..Default::default()
        };
        assert!(matches!(
            engine.compute(&stack()),
            Err(Error::InvalidParameter { name: "tir", .. })
        ));
    }

    #[test]
    fn test_duplicate_band_rejected() {
        let mapping = BandMapping { red: 1, nir: 1, swir1: 2, tir: 0 };
        assert!(mapping.validate(4).is_err());
    }

    #[test]
    fn test_algorithm_trait() {
        let engine = IndexEngine::default();
        assert_eq!(engine.name(), "IndexEngine");
        let set = engine.execute_default(stack()).unwrap();
        assert_eq!(set.lst.kind(), IndexKind::Lst);
    }
}
