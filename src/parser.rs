use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use geo::{Coord, InteriorPoint, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::error::{Result, SeawallError};
use crate::model::{Asset, ElevationField};

/// 行数・列数は正の整数のみ
fn grid_size(key: &str, value: f64) -> Result<usize> {
    if !(value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64) {
        return Err(SeawallError::Parse(format!("Invalid header value {key} = {value}")));
    }
    Ok(value as usize)
}

/// ESRI ASCII グリッド (.asc) を読む
pub fn parse_ascii_grid<R: Read>(mut reader: R) -> Result<ElevationField> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    let mut tokens = text.split_whitespace().peekable();
    let mut header: HashMap<String, f64> = HashMap::new();

    // ヘッダー（キーワードと値の組）
    while let Some(token) = tokens.peek() {
        if !token.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let key = token.to_ascii_lowercase();
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| SeawallError::Parse(format!("Missing value for header {key}")))?;
        let value = value
            .parse::<f64>()
            .map_err(|_| SeawallError::Parse(format!("Invalid header value {key} = {value}")))?;
        header.insert(key, value);
    }

    let required = |key: &str| {
        header
            .get(key)
            .copied()
            .ok_or_else(|| SeawallError::Parse(format!("Missing header {key}")))
    };
    let cols = grid_size("ncols", required("ncols")?)?;
    let rows = grid_size("nrows", required("nrows")?)?;
    let cell_size = required("cellsize")?;

    // コーナー基準とセル中心基準の両方に対応
    let origin_x = match header.get("xllcorner") {
        Some(&x) => x,
        None => required("xllcenter")? - cell_size / 2.0,
    };
    let lower_y = match header.get("yllcorner") {
        Some(&y) => y,
        None => required("yllcenter")? - cell_size / 2.0,
    };
    let origin_y = lower_y + rows as f64 * cell_size;

    let values = tokens
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| SeawallError::Parse(format!("Invalid cell value {token}")))
        })
        .collect::<Result<Vec<f64>>>()?;

    let field = ElevationField::new(rows, cols, (origin_x, origin_y), cell_size, values)?
        .with_nodata(header.get("nodata_value").copied());
    debug!("Parsed ASCII grid {}x{} (cell {})", rows, cols, cell_size);
    Ok(field)
}

pub fn read_ascii_grid(path: &Path) -> Result<ElevationField> {
    parse_ascii_grid(fs::File::open(path)?)
}

/// GDAL で読める任意のラスタ（1バンド目）
#[cfg(feature = "gdal")]
pub fn read_gdal_raster(path: &Path) -> Result<ElevationField> {
    use gdal::Dataset;

    let dataset = Dataset::open(path)?;
    let (cols, rows) = dataset.raster_size();
    let transform = dataset.geo_transform()?;
    if transform[2] != 0.0 || transform[4] != 0.0 || (transform[1] + transform[5]).abs() > 1e-9 {
        return Err(SeawallError::Parse(format!(
            "{} is rotated or has non-square cells",
            path.display()
        )));
    }

    let band = dataset.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
    let (_, values) = buffer.into_shape_and_vec();

    Ok(
        ElevationField::new(rows, cols, (transform[0], transform[3]), transform[1], values)?
            .with_nodata(nodata),
    )
}

/// 拡張子で読み込み方法を選ぶ
pub fn read_elevation(path: &Path) -> Result<ElevationField> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let field = match ext.as_str() {
        "asc" => read_ascii_grid(path)?,
        #[cfg(feature = "gdal")]
        _ => read_gdal_raster(path)?,
        #[cfg(not(feature = "gdal"))]
        _ => {
            return Err(SeawallError::Parse(format!(
                "Unsupported raster format: {} (build with the gdal feature)",
                path.display()
            )))
        }
    };
    info!(
        "Loaded elevation {:?}: {}x{} cells",
        path, field.rows, field.cols
    );
    Ok(field)
}

fn ring(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        ring(exterior),
        interiors.iter().map(|r| ring(r)).collect(),
    ))
}

/// 資産の外形（ポリゴンのみ）
fn footprint(value: &Value) -> Option<MultiPolygon<f64>> {
    match value {
        Value::Polygon(rings) => Some(MultiPolygon::new(vec![polygon(rings)?])),
        Value::MultiPolygon(parts) => {
            let polygons: Vec<Polygon<f64>> = parts.iter().filter_map(|r| polygon(r)).collect();
            (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
        }
        _ => None,
    }
}

/// 資産の代表点（ポリゴンは内部の点）
fn representative_point(value: &Value, shape: Option<&MultiPolygon<f64>>) -> Option<Coord<f64>> {
    match (value, shape) {
        (Value::Point(p), _) if p.len() >= 2 => Some(Coord { x: p[0], y: p[1] }),
        (_, Some(shape)) => shape.interior_point().map(|p| p.0),
        _ => None,
    }
}

fn number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn asset_id(feature: &Feature, id_field: &str, index: usize) -> String {
    let property = feature
        .properties
        .as_ref()
        .and_then(|p| p.get(id_field))
        .and_then(|v| match v {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });
    property
        .or_else(|| {
            feature.id.as_ref().map(|id| match id {
                geojson::feature::Id::String(s) => s.clone(),
                geojson::feature::Id::Number(n) => n.to_string(),
            })
        })
        .unwrap_or_else(|| index.to_string())
}

/// GeoJSON の FeatureCollection から資産を読む
pub fn parse_assets(text: &str, value_field: &str, id_field: &str) -> Result<Vec<Asset>> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(SeawallError::Parse(
                "Asset file must contain features".to_string(),
            ))
        }
    };

    let mut assets = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let geometry = feature.geometry.as_ref().map(|g| &g.value);
        let shape = geometry.and_then(footprint);
        let position = geometry
            .and_then(|g| representative_point(g, shape.as_ref()))
            .ok_or_else(|| {
                SeawallError::Parse(format!("Feature {index} has no usable geometry"))
            })?;
        let value = feature
            .properties
            .as_ref()
            .and_then(|p| p.get(value_field))
            .and_then(number)
            .ok_or_else(|| {
                SeawallError::Parse(format!(
                    "Feature {index} has no numeric '{value_field}' property"
                ))
            })?;

        assets.push(Asset {
            id: asset_id(feature, id_field, index),
            position,
            footprint: shape,
            value,
        });
    }

    info!("Loaded {} assets", assets.len());
    Ok(assets)
}

pub fn read_assets(path: &Path, value_field: &str, id_field: &str) -> Result<Vec<Asset>> {
    parse_assets(&fs::read_to_string(path)?, value_field, id_field)
}
