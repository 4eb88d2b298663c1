use std::fs;
use std::path::Path;

use geojson::GeoJson;
use seawall::parser::{read_assets, read_elevation};
use seawall::{write_segment_layer, GeoJsonWriter, Pipeline, PipelineConfig, PlanarEngine};
use tempfile::TempDir;

fn write_ramp_grid(path: &Path, rows: usize, cols: usize) {
    let mut text = format!(
        "ncols {cols}\nnrows {rows}\nxllcorner 1000.0\nyllcorner 2000.0\ncellsize 1.0\nNODATA_value -9999\n"
    );
    for _ in 0..rows {
        let row: Vec<String> = (0..cols).map(|c| format!("{:.1}", c as f64 * 0.1)).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

fn write_assets(path: &Path) {
    let text = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1046.5, 2150.0]},
         "properties": {"value": 90000, "id": "a"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1046.5, 2250.0]},
         "properties": {"value": 45000, "id": "b"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5000.0, 5000.0]},
         "properties": {"value": 1, "id": "outside"}}
      ]
    }"#;
    fs::write(path, text).unwrap();
}

fn feature_count(path: &Path) -> usize {
    match fs::read_to_string(path).unwrap().parse::<GeoJson>().unwrap() {
        GeoJson::FeatureCollection(collection) => collection.features.len(),
        other => panic!("unexpected GeoJSON: {}", other),
    }
}

#[test]
fn test_files_in_files_out() {
    let temp_dir = TempDir::new().unwrap();
    let dem_path = temp_dir.path().join("ramp.asc");
    let assets_path = temp_dir.path().join("assets.geojson");
    let output_path = temp_dir.path().join("segments.geojson");
    let workspace = temp_dir.path().join("workspace");

    write_ramp_grid(&dem_path, 400, 80);
    write_assets(&assets_path);

    // 1. 読み込み
    let field = read_elevation(&dem_path).unwrap();
    assert_eq!(field.shape(), (400, 80));
    let assets = read_assets(&assets_path, "value", "id").unwrap();
    assert_eq!(assets.len(), 3);

    // 2. 実行
    let mut config = PipelineConfig::new();
    config.contour.smoothing_radius = 2;
    config.contour.min_region_cells = 100;
    config.contour.min_line_length = 20.0;
    config.contour.max_extension = 20.0;
    config.sampling.spacing = 40.0;
    config.matching.cluster_link_factor = 1.0;
    let engine = PlanarEngine::new();
    let layer = Pipeline::new(&engine, config)
        .run(&field, &assets, 4.0, 5.0)
        .unwrap();

    // ラスタ外の資産は警告
    assert_eq!(layer.intermediates.asset_damages.len(), 2);
    assert_eq!(layer.warnings.len(), 1);

    // 3. 書き出し
    write_segment_layer(&layer.segments, &output_path, None).unwrap();
    assert_eq!(feature_count(&output_path), layer.segments.len());

    GeoJsonWriter::new()
        .write_intermediates(&layer.intermediates, &workspace)
        .unwrap();
    assert_eq!(feature_count(&workspace.join("contour_tide.geojson")), 1);
    assert_eq!(feature_count(&workspace.join("contour_surge.geojson")), 1);
    assert_eq!(
        feature_count(&workspace.join("candidates_tide.geojson")),
        layer.intermediates.tide_points.len()
    );
    assert_eq!(
        feature_count(&workspace.join("connectors.geojson")),
        layer.intermediates.connectors.len()
    );
    assert_eq!(feature_count(&workspace.join("asset_damage.geojson")), 2);
}
