//! Band loading: every single-band GeoTIFF in a directory becomes a named grid

use super::read_geotiff;
use crate::error::{Error, Result};
use crate::raster::Raster;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

/// Grid name for a band file: the file stem (`B4.TIF` -> `B4`).
fn band_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// List the `.tif`/`.tiff` files of a directory in lexical order.
///
/// Returns `Io(NotFound)` when the directory holds no band files.
pub fn list_band_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_tiff(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no .tif files in {}", dir.display()),
        )));
    }
    Ok(files)
}

/// Load a list of band files, each as a single-band `f64` grid named by
/// its file stem. Order follows `paths`.
pub fn load_bands<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<(String, Raster<f64>)>> {
    let mut grids = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let raster: Raster<f64> = read_geotiff(path, None)?;
        let (rows, cols) = raster.shape();
        debug!(
            band = %path.display(),
            rows,
            cols,
            crs = %raster.crs().map(|c| c.identifier()).unwrap_or_else(|| "none".into()),
            "loaded band"
        );
        grids.push((band_name(path), raster));
    }
    Ok(grids)
}

/// Load every band file of `dir`, sorted by file name.
pub fn load_band_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<(String, Raster<f64>)>> {
    let dir = dir.as_ref();
    let files = list_band_files(dir)?;
    let grids = load_bands(&files)?;
    info!(dir = %dir.display(), bands = grids.len(), "loaded band directory");
    Ok(grids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_name_is_stem() {
        assert_eq!(band_name(Path::new("/data/LC08_B10.TIF")), "LC08_B10");
        assert_eq!(band_name(Path::new("red.tiff")), "red");
    }

    #[test]
    fn test_tiff_extensions() {
        assert!(is_tiff(Path::new("a.tif")));
        assert!(is_tiff(Path::new("a.TIFF")));
        assert!(!is_tiff(Path::new("a.tif.aux.xml")));
        assert!(!is_tiff(Path::new("README")));
    }

    #[test]
    fn test_empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        match list_band_files(dir.path()) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
