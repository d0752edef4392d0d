//! Thermal band conversion: digital numbers to land surface temperature
//!
//! ```text
//! L  = DN * ML + AL                 (top-of-atmosphere radiance)
//! BT = K2 / ln(K1 / L + 1)          (brightness temperature, Kelvin)
//! LST = BT - 273.15                 (degrees Celsius)
//! ```

use super::band_math::band_math;
use heatrisk_core::raster::Raster;
use heatrisk_core::Result;
use serde::{Deserialize, Serialize};

/// Absolute zero offset between Kelvin and Celsius
pub const KELVIN_OFFSET: f64 = 273.15;

/// Radiometric rescaling and thermal constants of a sensor band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorCalibration {
    /// Radiance multiplicative rescaling factor (ML)
    pub radiance_mult: f64,
    /// Radiance additive rescaling factor (AL)
    pub radiance_add: f64,
    /// Thermal conversion constant K1
    pub k1: f64,
    /// Thermal conversion constant K2
    pub k2: f64,
}

impl SensorCalibration {
    /// Landsat 8 TIRS band 10
    pub const LANDSAT8_B10: SensorCalibration = SensorCalibration {
        radiance_mult: 0.0003342,
        radiance_add: 0.1,
        k1: 774.89,
        k2: 1321.08,
    };
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self::LANDSAT8_B10
    }
}

/// Top-of-atmosphere spectral radiance from thermal digital numbers
pub fn radiance(tir: &Raster<f64>, calibration: &SensorCalibration) -> Result<Raster<f64>> {
    let (mult, add) = (calibration.radiance_mult, calibration.radiance_add);
    band_math(tir, |dn| dn * mult + add)
}

/// At-sensor brightness temperature in Kelvin.
///
/// Non-positive radiance has no defined temperature and yields NaN.
pub fn brightness_temperature(
    radiance: &Raster<f64>,
    calibration: &SensorCalibration,
) -> Result<Raster<f64>> {
    let (k1, k2) = (calibration.k1, calibration.k2);
    band_math(radiance, |l| {
        if l <= 0.0 {
            f64::NAN
        } else {
            k2 / (k1 / l + 1.0).ln()
        }
    })
}

/// Land surface temperature in degrees Celsius from brightness temperature
pub fn land_surface_temperature(kelvin: &Raster<f64>) -> Result<Raster<f64>> {
    band_math(kelvin, |k| k - KELVIN_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radiance_rescaling() {
        let tir = Raster::filled(2, 2, 30_000.0);
        let l = radiance(&tir, &SensorCalibration::default()).unwrap();
        assert_relative_eq!(l.get(0, 0).unwrap(), 30_000.0 * 0.0003342 + 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_brightness_temperature_known_value() {
        let cal = SensorCalibration::default();
        let l = Raster::filled(2, 2, 10.0);
        let bt = brightness_temperature(&l, &cal).unwrap();
        let expected = 1321.08 / (774.89_f64 / 10.0 + 1.0).ln();
        assert_relative_eq!(bt.get(1, 1).unwrap(), expected, epsilon = 1e-9);
        // roughly 302 K for a typical summer surface
        assert!((bt.get(1, 1).unwrap() - 302.0).abs() < 2.0);
    }

    #[test]
    fn test_non_positive_radiance_is_nan() {
        let mut l = Raster::filled(1, 2, 0.0);
        l.set(0, 1, -1.0).unwrap();
        let bt = brightness_temperature(&l, &SensorCalibration::default()).unwrap();
        assert!(bt.get(0, 0).unwrap().is_nan());
        assert!(bt.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_lst_is_kelvin_minus_offset() {
        let k = Raster::filled(2, 2, 300.0);
        let lst = land_surface_temperature(&k).unwrap();
        assert_relative_eq!(lst.get(0, 0).unwrap(), 26.85, epsilon = 1e-10);
    }

    #[test]
    fn test_calibration_partial_json_uses_defaults() {
        let cal: SensorCalibration = serde_json::from_str(r#"{"k1": 480.89}"#).unwrap();
        assert_relative_eq!(cal.k1, 480.89);
        assert_relative_eq!(cal.k2, 1321.08);
    }
}
