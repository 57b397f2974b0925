use crate::measure::MeasureKey;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub charts: ChartsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    // County geometry: TopoJSON, GeoJSON or Shapefile.
    pub geometry: PathBuf,
    #[serde(default = "default_object")]
    pub object: String,
    pub indicators_csv: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
    #[serde(default = "default_geoid_property")]
    pub geoid_property: String,
}

fn default_object() -> String {
    "counties".to_string()
}

fn default_id_column() -> String {
    "cnty_fips".to_string()
}

fn default_name_column() -> String {
    "display_name".to_string()
}

fn default_geoid_property() -> String {
    "GEOID".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self { top: 20.0, right: 20.0, bottom: 20.0, left: 20.0 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LegendConfig {
    pub bottom: f64,
    pub left: f64,
    pub rect_height: f64,
    pub rect_width: f64,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self { bottom: 50.0, left: 50.0, rect_height: 12.0, rect_width: 150.0 }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub container_width: f64,
    pub container_height: f64,
    pub margin: Margin,
    pub tooltip_padding: f64,
    pub legend: LegendConfig,
    pub default_measure: MeasureKey,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container_width: 800.0,
            container_height: 600.0,
            margin: Margin::default(),
            tooltip_padding: 10.0,
            legend: LegendConfig::default(),
            default_measure: MeasureKey::Poverty,
        }
    }
}

impl MapConfig {
    pub fn inner_size(&self) -> (f64, f64) {
        (
            (self.container_width - self.margin.left - self.margin.right).max(0.0),
            (self.container_height - self.margin.top - self.margin.bottom).max(0.0),
        )
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChartsConfig {
    pub width: u32,
    pub height: u32,
    pub histogram_thresholds: usize,
    pub scatter_x: MeasureKey,
    pub scatter_y: MeasureKey,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            histogram_thresholds: 20,
            scatter_x: MeasureKey::Poverty,
            scatter_y: MeasureKey::PercentHighBloodPressure,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
