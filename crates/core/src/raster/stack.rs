//! Co-registered band stacks

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{Extent, GeoTransform, Raster};

/// An ordered set of named `f64` layers sharing one grid definition.
///
/// Every layer has the same shape, transform and CRS; cell `(row, col)`
/// in any layer covers the same ground location. [`GridStack::new`]
/// checks this on construction instead of assuming it.
#[derive(Debug, Clone)]
pub struct GridStack {
    layers: Vec<(String, Raster<f64>)>,
}

impl GridStack {
    /// Build a stack from named layers, rejecting layers that are not
    /// co-registered with the first one.
    pub fn new(layers: Vec<(String, Raster<f64>)>) -> Result<Self> {
        let Some((first_name, first)) = layers.first() else {
            return Err(Error::EmptyInput("grid stack has no layers".into()));
        };

        for (name, layer) in layers.iter().skip(1) {
            if layer.shape() != first.shape() {
                return Err(Error::NotCoRegistered {
                    layer: name.clone(),
                    reason: format!(
                        "shape {:?} differs from '{}' {:?}",
                        layer.shape(),
                        first_name,
                        first.shape()
                    ),
                });
            }
            if !CRS::same_system(layer.crs(), first.crs()) {
                return Err(Error::CrsMismatch(
                    describe_crs(layer.crs()),
                    describe_crs(first.crs()),
                ));
            }
            if !layer.is_coregistered_with(first) {
                return Err(Error::NotCoRegistered {
                    layer: name.clone(),
                    reason: format!(
                        "extent {} differs from '{}' {}",
                        layer.extent(),
                        first_name,
                        first.extent()
                    ),
                });
            }
        }

        Ok(Self { layers })
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false: a stack holds at least one layer
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer at `index`
    pub fn get(&self, index: usize) -> Option<&Raster<f64>> {
        self.layers.get(index).map(|(_, r)| r)
    }

    /// Layer by name
    pub fn by_name(&self, name: &str) -> Option<&Raster<f64>> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Name of the layer at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.layers.get(index).map(|(n, _)| n.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.layers.iter().map(|(n, r)| (n.as_str(), r))
    }

    fn reference(&self) -> &Raster<f64> {
        &self.layers[0].1
    }

    /// Shared shape (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.reference().shape()
    }

    /// Shared transform
    pub fn transform(&self) -> &GeoTransform {
        self.reference().transform()
    }

    /// Shared CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.reference().crs()
    }

    /// Shared extent
    pub fn extent(&self) -> Extent {
        self.reference().extent()
    }

    /// Shared resolution
    pub fn resolution(&self) -> (f64, f64) {
        self.reference().resolution()
    }

    /// Apply `f` to every layer and re-validate the result.
    pub fn try_map<F>(&self, mut f: F) -> Result<GridStack>
    where
        F: FnMut(&str, &Raster<f64>) -> Result<Raster<f64>>,
    {
        let layers = self
            .layers
            .iter()
            .map(|(name, raster)| Ok((name.clone(), f(name, raster)?)))
            .collect::<Result<Vec<_>>>()?;
        GridStack::new(layers)
    }

    pub fn into_layers(self) -> Vec<(String, Raster<f64>)> {
        self.layers
    }
}

pub(crate) fn describe_crs(crs: Option<&CRS>) -> String {
    crs.map_or_else(|| "<undefined CRS>".to_string(), |c| c.identifier())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(origin_x: f64, epsg: u32) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, 1.0);
        r.set_transform(GeoTransform::new(origin_x, 400.0, 100.0, -100.0));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        r
    }

    #[test]
    fn accepts_coregistered_layers() {
        let stack = GridStack::new(vec![
            ("red".into(), layer(0.0, 32617)),
            ("nir".into(), layer(0.0, 32617)),
        ])
        .unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.name(1), Some("nir"));
        assert!(stack.by_name("red").is_some());
        assert_eq!(stack.extent(), Extent::new(0.0, 0.0, 400.0, 400.0));
    }

    #[test]
    fn rejects_shifted_layer() {
        let err = GridStack::new(vec![
            ("red".into(), layer(0.0, 32617)),
            ("nir".into(), layer(50.0, 32617)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::NotCoRegistered { .. }));
    }

    #[test]
    fn rejects_crs_mismatch() {
        let err = GridStack::new(vec![
            ("red".into(), layer(0.0, 32617)),
            ("nir".into(), layer(0.0, 32618)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::CrsMismatch(..)));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(GridStack::new(vec![]), Err(Error::EmptyInput(_))));
    }
}
