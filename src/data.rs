use crate::config::InputConfig;
use crate::join::{self, JoinReport};
use crate::measure::MeasureKey;
use crate::topology::Topology;
use crate::types::{CountyCollection, CountyFeature, Fips, IndicatorRecord, RawIndicatorRow};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use serde_json::{Map, Value};
use shapefile::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Dataset {
    pub counties: CountyCollection,
    pub records: Vec<IndicatorRecord>,
    pub report: JoinReport,
}

impl Dataset {
    pub fn from_sources(mut features: Vec<CountyFeature>, rows: &[RawIndicatorRow]) -> Self {
        let (records, report) = join::join(rows, &mut features);
        Self { counties: CountyCollection::new(features), records, report }
    }
}

// Load both sources concurrently, fail if either fails, then join.
pub async fn load_dataset(config: &InputConfig) -> Result<Arc<Dataset>> {
    let (features, rows) = load_sources(config).await?;
    info!(features = features.len(), rows = rows.len(), "Loaded geometry and indicator rows");
    Ok(Arc::new(Dataset::from_sources(features, &rows)))
}

pub async fn load_sources(config: &InputConfig) -> Result<(Vec<CountyFeature>, Vec<RawIndicatorRow>)> {
    let geometry_config = config.clone();
    let csv_config = config.clone();

    let geometry = tokio::task::spawn_blocking(move || load_geometry(&geometry_config));
    let rows = tokio::task::spawn_blocking(move || load_csv_rows(&csv_config));

    tokio::try_join!(async { flatten(geometry.await) }, async { flatten(rows.await) })
}

fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.map_err(|e| anyhow!("Loader task failed: {}", e))?
}

pub fn load_csv_rows(config: &InputConfig) -> Result<Vec<RawIndicatorRow>> {
    let file = File::open(&config.indicators_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", config.indicators_csv))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = rdr.headers()?.clone();

    let col_indices: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h.trim(), i)).collect();

    let id_idx = *col_indices
        .get(config.id_column.as_str())
        .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", config.id_column))?;
    let name_idx = col_indices.get(config.name_column.as_str()).copied();
    if name_idx.is_none() {
        warn!(column = %config.name_column, "Name column not found in CSV, counties will be unnamed");
    }

    let mut measure_indices = Vec::with_capacity(MeasureKey::COUNT);
    for key in MeasureKey::ALL {
        match col_indices.get(key.csv_column()) {
            Some(&idx) => measure_indices.push((key, idx)),
            None => warn!(column = key.csv_column(), "Indicator column not found in CSV, values will be missing"),
        }
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.context("Failed to read CSV record")?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let values = measure_indices
            .iter()
            .filter_map(|&(key, idx)| record.get(idx).map(|v| (key, v.to_string())))
            .collect();

        rows.push(RawIndicatorRow {
            line,
            fips: record.get(id_idx).unwrap_or("").to_string(),
            display_name: name_idx.and_then(|i| record.get(i)).unwrap_or("").to_string(),
            values,
        });
    }

    info!("Loaded CSV data for {} counties", rows.len());
    Ok(rows)
}

pub fn load_geometry(config: &InputConfig) -> Result<Vec<CountyFeature>> {
    let extension = config
        .geometry
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let features = match extension.as_str() {
        "shp" => load_shapefile(config)?,
        "json" | "geojson" | "topojson" => load_json_geometry(config)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    if features.is_empty() {
        return Err(anyhow!("Geometry source {:?} contains no features", config.geometry));
    }
    info!("Loaded geometry for {} counties", features.len());
    Ok(features)
}

fn load_json_geometry(config: &InputConfig) -> Result<Vec<CountyFeature>> {
    let file = File::open(&config.geometry)
        .with_context(|| format!("Failed to open geometry file: {:?}", config.geometry))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON in {:?}", config.geometry))?;

    match value.get("type").and_then(Value::as_str) {
        Some("Topology") => topology_features(value, config),
        _ => geojson_features(value, config),
    }
}

pub fn topology_features(value: Value, config: &InputConfig) -> Result<Vec<CountyFeature>> {
    let topology = Topology::from_value(value)?;
    let features = topology
        .features(&config.object)?
        .into_iter()
        .map(|f| {
            let geoid = identifier_property(&f.properties, &config.geoid_property);
            CountyFeature::new(geoid, f.id.as_ref().and_then(identifier_value), f.geometry)
        })
        .collect();
    Ok(features)
}

pub fn geojson_features(value: Value, config: &InputConfig) -> Result<Vec<CountyFeature>> {
    use geojson::feature::Id;
    use geojson::GeoJson;

    let geojson = GeoJson::from_json_value(value).context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let geoid = feature
            .properties
            .as_ref()
            .and_then(|props| identifier_property(props, &config.geoid_property));
        let id = match &feature.id {
            Some(Id::String(s)) => Some(s.clone()),
            Some(Id::Number(n)) => identifier_value(&Value::Number(n.clone())),
            None => None,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => MultiPolygon::new(vec![]),
                }
            }
            None => MultiPolygon::new(vec![]),
        };

        features.push(CountyFeature::new(geoid, id, geometry));
    }
    Ok(features)
}

fn load_shapefile(config: &InputConfig) -> Result<Vec<CountyFeature>> {
    let mut reader = Reader::from_path(&config.geometry)
        .with_context(|| format!("Failed to open Shapefile: {:?}", config.geometry))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let geoid = match record.get(&config.geoid_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => Some(s.trim().to_string()),
            Some(shapefile::dbase::FieldValue::Numeric(Some(n))) => numeric_identifier(*n),
            _ => None,
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => MultiPolygon::new(vec![]),
        };

        features.push(CountyFeature::new(geoid, None, geometry));
    }
    Ok(features)
}

fn identifier_property(props: &Map<String, Value>, name: &str) -> Option<String> {
    props.get(name).and_then(identifier_value)
}

// Strings are taken as-is; numbers lost their leading zeros and are padded back.
fn identifier_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => match n.as_u64() {
            Some(whole) => Some(padded(whole.to_string())),
            None => n.as_f64().and_then(numeric_identifier),
        },
        _ => None,
    }
}

// `1001.0` reads as `01001`; fractional or negative values keep their text.
fn numeric_identifier(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n >= 0.0 && n.fract() == 0.0 && n < 1e15 {
        return Some(padded(format!("{}", n as u64)));
    }
    Some(n.to_string())
}

fn padded(text: String) -> String {
    join::normalize_fips(&text).map(|f: Fips| f.to_string()).unwrap_or(text)
}
