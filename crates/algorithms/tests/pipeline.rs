//! End-to-end pipeline runs on synthetic Landsat-like band files written
//! to temporary directories.

use approx::assert_relative_eq;
use heatrisk_algorithms::imagery::{SensorCalibration, KELVIN_OFFSET};
use heatrisk_algorithms::pipeline::{
    join_demographics, run, write_zones, PipelineConfig, Stage, CORRELATION_FILE, HOTSPOTS_FILE,
};
use heatrisk_core::io::{load_band_directory, read_geotiff, write_geotiff};
use heatrisk_core::raster::{GeoTransform, Raster};
use heatrisk_core::vector::{parse_boundary, CensusQuery, DemographicSource, GeoJsonDemographics};
use heatrisk_core::CRS;
use std::path::Path;

const UTM17N: u32 = 32617;

/// 20 x 20 cells of 30 m in UTM 17N, filled by `value(row, col)`.
fn band(origin_x: f64, origin_y: f64, value: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::new(20, 20);
    r.set_transform(GeoTransform::new(origin_x, origin_y, 30.0, -30.0));
    r.set_crs(Some(CRS::from_epsg(UTM17N)));
    r.set_nodata(Some(f64::NAN));
    for row in 0..20 {
        for col in 0..20 {
            r.set(row, col, value(row, col)).unwrap();
        }
    }
    r
}

fn thermal_dn(row: usize, col: usize) -> f64 {
    20_000.0 + 2_000.0 * row as f64 + 100.0 * col as f64
}

/// Band files with shifted extents. Their common area is
/// x 500060..500600, y 4000000..4000540 (18 x 18 cells).
fn write_scene(dir: &Path) {
    let bands = [
        ("B10", band(500_000.0, 4_000_600.0, thermal_dn)),
        ("B4", band(500_060.0, 4_000_600.0, |_, c| 0.05 + 0.005 * c as f64)),
        ("B5", band(500_000.0, 4_000_540.0, |_, _| 0.30)),
        ("B6", band(500_000.0, 4_000_600.0, |r, _| 0.20 + 0.002 * r as f64)),
    ];
    for (name, raster) in &bands {
        write_geotiff(raster, dir.join(format!("{name}.TIF")), None).unwrap();
    }
}

fn projected_boundary(x0: f64, y0: f64, x1: f64, y1: f64) -> String {
    format!(
        r#"{{
            "type": "Feature",
            "crs": {{ "type": "name", "properties": {{ "name": "urn:ogc:def:crs:EPSG::{UTM17N}" }} }},
            "properties": {{ "NAME": "Test County" }},
            "geometry": {{
                "type": "Polygon",
                "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]
            }}
        }}"#
    )
}

fn expected_lst(dn: f64) -> f64 {
    let c = SensorCalibration::LANDSAT8_B10;
    let radiance = dn * c.radiance_mult + c.radiance_add;
    c.k2 / (c.k1 / radiance + 1.0).ln() - KELVIN_OFFSET
}

#[test]
fn run_clips_classifies_and_writes_outputs() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scene(input.path());

    let grids = load_band_directory(input.path()).unwrap();
    let names: Vec<&str> = grids.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["B10", "B4", "B5", "B6"]);

    // 12 x 10 cells starting at common column 2, row 4
    let boundary = parse_boundary(
        &projected_boundary(500_120.0, 4_000_120.0, 500_480.0, 4_000_420.0),
        "county",
    )
    .unwrap();
    let out = run(grids, &boundary, &PipelineConfig::default()).unwrap();

    assert_eq!(out.stack.shape(), (10, 12));
    assert_eq!(out.stack.transform().origin_x, 500_120.0);
    assert_eq!(out.stack.transform().origin_y, 4_000_420.0);

    // Clipped (0, 0) is native thermal cell (6, 4)
    assert_relative_eq!(
        out.indices.lst.raster().get(0, 0).unwrap(),
        expected_lst(thermal_dn(6, 4)),
        epsilon = 1e-3
    );

    // 120 distinct UHRI values: rank 107.1, so the top 12 cells are hot
    assert_eq!(out.hotspots.threshold.valid_count, 120);
    assert_eq!(out.hotspots.hotspot_count(), 12);

    let written = out.write_to(output.path()).unwrap();
    assert_eq!(written.len(), 6);
    for file in ["ndvi.tif", "ndbi.tif", "lst.tif", "uhri.tif", HOTSPOTS_FILE, CORRELATION_FILE] {
        assert!(output.path().join(file).exists(), "missing {file}");
    }

    let hotspots: Raster<u8> = read_geotiff(output.path().join(HOTSPOTS_FILE), None).unwrap();
    assert_eq!(hotspots.shape(), (10, 12));
    assert_eq!(hotspots.crs().and_then(|c| c.epsg()), Some(UTM17N));
    assert_eq!(hotspots.get(9, 11).unwrap(), 1);
    assert_eq!(hotspots.get(0, 0).unwrap(), 0);

    let uhri: Raster<f64> = read_geotiff(output.path().join("uhri.tif"), None).unwrap();
    assert_eq!(uhri.transform(), out.stack.transform());

    let text = std::fs::read_to_string(output.path().join(CORRELATION_FILE)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["names"], serde_json::json!(["ndvi", "ndbi", "lst"]));
    assert_eq!(json["sample_count"], 120);
    assert_eq!(json["values"][0][0], 1.0);
    let ndvi_lst = json["values"][0][2].as_f64().unwrap();
    assert!((-1.0..=1.0).contains(&ndvi_lst));
}

#[test]
fn geographic_boundary_covering_the_scene_keeps_the_common_grid() {
    let input = tempfile::tempdir().unwrap();
    write_scene(input.path());
    let grids = load_band_directory(input.path()).unwrap();

    // Around 81.0 W, 36.14 N in NAD83
    let boundary = parse_boundary(
        r#"{
            "type": "Polygon",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4269" } },
            "coordinates": [[[-81.1, 36.0], [-80.9, 36.0], [-80.9, 36.3], [-81.1, 36.3], [-81.1, 36.0]]]
        }"#,
        "county",
    )
    .unwrap();
    let out = run(grids, &boundary, &PipelineConfig::default()).unwrap();
    assert_eq!(out.stack.shape(), (18, 18));
    assert_eq!(out.stack.crs().and_then(|c| c.epsg()), Some(UTM17N));
}

#[test]
fn boundary_outside_the_scene_fails_in_clip_stage() {
    let input = tempfile::tempdir().unwrap();
    write_scene(input.path());
    let grids = load_band_directory(input.path()).unwrap();

    let boundary =
        parse_boundary(&projected_boundary(600_000.0, 4_100_000.0, 600_300.0, 4_100_300.0), "far")
            .unwrap();
    let err = run(grids, &boundary, &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.stage, Stage::Clip);
}

#[test]
fn demographic_units_get_zonal_uhri() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_scene(input.path());
    let grids = load_band_directory(input.path()).unwrap();
    let boundary = parse_boundary(
        &projected_boundary(500_120.0, 4_000_120.0, 500_480.0, 4_000_420.0),
        "county",
    )
    .unwrap();
    let out = run(grids, &boundary, &PipelineConfig::default()).unwrap();

    let tract = |geoid: &str, county: &str, x0: f64, x1: f64| {
        format!(
            r#"{{ "type": "Feature",
                 "properties": {{ "GEOID": "{geoid}", "STATEFP": "37", "COUNTYFP": "{county}", "POP": 1200 }},
                 "geometry": {{ "type": "Polygon", "coordinates":
                   [[[{x0}, 4000120], [{x1}, 4000120], [{x1}, 4000420], [{x0}, 4000420], [{x0}, 4000120]]] }} }}"#
        )
    };
    let tracts = format!(
        r#"{{ "type": "FeatureCollection",
             "crs": {{ "type": "name", "properties": {{ "name": "EPSG:{UTM17N}" }} }},
             "features": [{}, {}, {}] }}"#,
        tract("37001000100", "001", 500_120.0, 500_300.0),
        tract("37001000200", "001", 500_300.0, 500_480.0),
        tract("37003000100", "003", 500_120.0, 500_480.0),
    );
    let path = input.path().join("tracts.geojson");
    std::fs::write(&path, tracts).unwrap();

    let units = GeoJsonDemographics::new(&path)
        .fetch(&CensusQuery::new(2020, "37", "001").with_api_key("unused"))
        .unwrap();
    assert_eq!(units.len(), 2);

    let zones = join_demographics(&out, &boundary, &units, Some("GEOID")).unwrap();
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0].id, "37001000100");
    assert_eq!(zones[0].count, 60);
    assert_eq!(zones[1].count, 60);
    // Eastern cells are hotter
    assert!(zones[1].mean > zones[0].mean);

    let written = write_zones(output.path(), &zones).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(json[1]["id"], "37001000200");
    assert_eq!(json[1]["attributes"]["POP"], 1200);
}
