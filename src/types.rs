use crate::measure::{Indicators, MeasureKey};
use geo::MultiPolygon;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RawIndicatorRow {
    // 1-based, for error reports.
    pub line: u64,
    pub fips: String,
    pub display_name: String,
    // Raw text per registered indicator; no entry when the column is missing.
    pub values: HashMap<MeasureKey, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub fips: Fips,
    pub display_name: String,
    pub indicators: Indicators,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fips(String);

impl Fips {
    pub const WIDTH: usize = 5;

    pub(crate) fn from_normalized(value: String) -> Self {
        Fips(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fips {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Attributes attached by the join. Before the join (or when unmatched)
// every slot is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountyAttributes {
    pub name: Option<String>,
    pub indicators: Indicators,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountyFeature {
    // Geometry-level property, e.g. `GEOID`.
    pub geoid: Option<String>,
    pub id: Option<String>,
    pub geometry: MultiPolygon<f64>,
    pub attributes: CountyAttributes,
}

impl CountyFeature {
    pub fn new(geoid: Option<String>, id: Option<String>, geometry: MultiPolygon<f64>) -> Self {
        Self { geoid, id, geometry, attributes: CountyAttributes::default() }
    }

    pub fn join_key(&self) -> Option<&str> {
        self.geoid.as_deref().filter(|g| !g.is_empty()).or(self.id.as_deref())
    }

    pub fn display_title(&self) -> &str {
        self.attributes
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.join_key().filter(|k| !k.is_empty()))
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountyCollection {
    pub features: Vec<CountyFeature>,
}

impl CountyCollection {
    pub fn new(features: Vec<CountyFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
