//! Pearson correlation between co-registered layers

use heatrisk_core::raster::Raster;
use heatrisk_core::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// Square matrix of Pearson coefficients between named layers.
///
/// `values[i][j]` correlates layer `i` with layer `j`. A pair involving a
/// constant layer is NaN (serialised as `null`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<f64>>,
    /// Cells valid in every layer, the sample the coefficients use
    pub sample_count: usize,
}

impl CorrelationMatrix {
    /// Coefficient between two layers by name
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.values[i][j])
    }
}

/// Pearson correlation matrix over the cells valid in every layer.
///
/// Fails with [`Error::SizeMismatch`] when shapes differ and with
/// [`Error::EmptyInput`] when fewer than two cells are valid everywhere.
pub fn correlation_matrix(layers: &[(&str, &Raster<f64>)]) -> Result<CorrelationMatrix> {
    let Some((_, first)) = layers.first() else {
        return Err(Error::EmptyInput("no layers to correlate".into()));
    };
    for (_, layer) in layers {
        if layer.shape() != first.shape() {
            return Err(Error::SizeMismatch {
                er: first.rows(),
                ec: first.cols(),
                ar: layer.rows(),
                ac: layer.cols(),
            });
        }
    }

    // Column-major samples: one vector per layer over the shared valid cells
    let k = layers.len();
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); k];
    let (rows, cols) = first.shape();
    let mut cell = vec![0.0; k];
    for row in 0..rows {
        'cells: for col in 0..cols {
            for (i, (_, layer)) in layers.iter().enumerate() {
                let v = unsafe { layer.get_unchecked(row, col) };
                if layer.is_nodata(v) {
                    continue 'cells;
                }
                cell[i] = v;
            }
            for (s, &v) in samples.iter_mut().zip(cell.iter()) {
                s.push(v);
            }
        }
    }

    let n = samples[0].len();
    if n < 2 {
        return Err(Error::EmptyInput(format!(
            "{} cells valid in every layer, need at least 2",
            n
        )));
    }

    let means: Vec<f64> = samples
        .iter()
        .map(|s| s.iter().sum::<f64>() / n as f64)
        .collect();
    let mut values = vec![vec![f64::NAN; k]; k];
    for i in 0..k {
        for j in i..k {
            let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
            for (x, y) in samples[i].iter().zip(samples[j].iter()) {
                let dx = x - means[i];
                let dy = y - means[j];
                sxy += dx * dy;
                sxx += dx * dx;
                syy += dy * dy;
            }
            let r = if sxx <= 0.0 || syy <= 0.0 {
                f64::NAN
            } else if i == j {
                1.0
            } else {
                (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
            };
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    let names: Vec<String> = layers.iter().map(|(n, _)| n.to_string()).collect();
    debug!(layers = ?names, sample_count = n, "computed correlation matrix");
    Ok(CorrelationMatrix {
        names,
        values,
        sample_count: n,
    })
}
