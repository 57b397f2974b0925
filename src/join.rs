use crate::measure::{Indicators, MeasureKey};
use crate::types::{CountyAttributes, CountyFeature, Fips, IndicatorRecord, RawIndicatorRow};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("county identifier is empty")]
    EmptyIdentifier,
    #[error("county identifier {0:?} is longer than {width} characters", width = Fips::WIDTH)]
    IdentifierTooLong(String),
    #[error("county identifier {0:?} is not numeric")]
    InvalidIdentifier(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub line: u64,
    pub error: DataError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_ids: Vec<Fips>,
    pub rejected: Vec<RejectedRow>,
}

/// Left-pad a county identifier with '0' to the fixed width. Values that
/// would need truncating are rejected instead.
pub fn normalize_fips(raw: &str) -> Result<Fips, DataError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DataError::EmptyIdentifier);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DataError::InvalidIdentifier(trimmed.to_string()));
    }
    if trimmed.len() > Fips::WIDTH {
        return Err(DataError::IdentifierTooLong(trimmed.to_string()));
    }
    Ok(Fips::from_normalized(format!("{:0>width$}", trimmed, width = Fips::WIDTH)))
}

/// Permissive numeric parse. Blank or unparseable text and non-finite
/// results are the missing marker.
pub fn parse_indicator(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok().map(|v| v as f64),
        None => text.parse::<f64>().ok(),
    };
    value.filter(|v| v.is_finite())
}

pub fn normalize_row(row: &RawIndicatorRow) -> Result<IndicatorRecord, DataError> {
    let fips = normalize_fips(&row.fips)?;
    let mut indicators = Indicators::default();
    for key in MeasureKey::ALL {
        let value = row.values.get(&key).and_then(|text| parse_indicator(text));
        indicators.set(key, value);
    }
    Ok(IndicatorRecord { fips, display_name: row.display_name.clone(), indicators })
}

pub fn normalize_rows(rows: &[RawIndicatorRow]) -> (Vec<IndicatorRecord>, Vec<RejectedRow>) {
    let mut records = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        match normalize_row(row) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!(line = row.line, %error, "rejecting indicator row");
                rejected.push(RejectedRow { line: row.line, error });
            }
        }
    }
    (records, rejected)
}

// Attach the indicators of `records` onto `features`. Every feature gets
// every registered slot; unmatched features are reset to all-missing.
// Re-running with the same inputs rewrites identical values.
pub fn join_records(records: &[IndicatorRecord], features: &mut [CountyFeature]) -> JoinReport {
    let mut report = JoinReport::default();

    let mut by_fips: HashMap<&str, &IndicatorRecord> = HashMap::with_capacity(records.len());
    for record in records {
        if by_fips.insert(record.fips.as_str(), record).is_some() {
            report.duplicate_ids.push(record.fips.clone());
        }
    }
    if !report.duplicate_ids.is_empty() {
        warn!(count = report.duplicate_ids.len(), "duplicate county identifiers, last row wins");
    }

    for feature in features.iter_mut() {
        let record = feature.join_key().and_then(|key| by_fips.get(key).copied());
        feature.attributes = match record {
            Some(record) => {
                report.matched += 1;
                CountyAttributes {
                    name: Some(record.display_name.clone()),
                    indicators: record.indicators,
                }
            }
            None => {
                report.unmatched += 1;
                CountyAttributes::default()
            }
        };
    }

    info!(matched = report.matched, unmatched = report.unmatched, "joined indicators onto counties");
    report
}

pub fn join(rows: &[RawIndicatorRow], features: &mut [CountyFeature]) -> (Vec<IndicatorRecord>, JoinReport) {
    let (records, rejected) = normalize_rows(rows);
    let mut report = join_records(&records, features);
    report.rejected = rejected;
    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::MultiPolygon;

    fn row(line: u64, fips: &str, name: &str, values: &[(MeasureKey, &str)]) -> RawIndicatorRow {
        RawIndicatorRow {
            line,
            fips: fips.to_string(),
            display_name: name.to_string(),
            values: values.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        }
    }

    fn feature(geoid: Option<&str>, id: Option<&str>) -> CountyFeature {
        CountyFeature::new(geoid.map(String::from), id.map(String::from), MultiPolygon::new(vec![]))
    }

    #[test]
    fn pads_to_five_characters_without_truncating() {
        assert_eq!(normalize_fips("1001").unwrap().as_str(), "01001");
        assert_eq!(normalize_fips("01001").unwrap().as_str(), "01001");
        assert_eq!(normalize_fips("7").unwrap().as_str(), "00007");
        assert_eq!(normalize_fips(" 6037 ").unwrap().as_str(), "06037");
        for raw in ["1", "12", "123", "1234", "12345"] {
            let fips = normalize_fips(raw).unwrap();
            assert_eq!(fips.as_str().len(), Fips::WIDTH);
            assert!(fips.as_str().ends_with(raw));
            assert!(fips.as_str()[..Fips::WIDTH - raw.len()].chars().all(|c| c == '0'));
        }
    }

    #[test]
    fn malformed_identifiers_are_data_errors() {
        assert_eq!(normalize_fips(""), Err(DataError::EmptyIdentifier));
        assert_eq!(normalize_fips("   "), Err(DataError::EmptyIdentifier));
        assert_eq!(normalize_fips("123456"), Err(DataError::IdentifierTooLong("123456".into())));
        assert_eq!(normalize_fips("1a01"), Err(DataError::InvalidIdentifier("1a01".into())));
    }

    #[test]
    fn numeric_coercion_is_permissive_but_never_zero_fills() {
        assert_eq!(parse_indicator("18.5"), Some(18.5));
        assert_eq!(parse_indicator(" 42 "), Some(42.0));
        assert_eq!(parse_indicator("1e3"), Some(1000.0));
        assert_eq!(parse_indicator("0x1F"), Some(31.0));
        assert_eq!(parse_indicator(""), None);
        assert_eq!(parse_indicator("n/a"), None);
        assert_eq!(parse_indicator("-1"), Some(-1.0));
        assert_eq!(parse_indicator("Infinity"), None);
        assert_eq!(parse_indicator("NaN"), None);
    }

    #[test]
    fn padded_row_joins_with_numeric_value() {
        let rows = vec![row(2, "1001", "Autauga County", &[(MeasureKey::Poverty, "18.5")])];
        let mut features = vec![feature(None, Some("01001"))];
        let (_, report) = join(&rows, &mut features);

        assert_eq!(report.matched, 1);
        let attrs = &features[0].attributes;
        assert_eq!(attrs.indicators.get(MeasureKey::Poverty), Some(18.5));
        assert_eq!(attrs.name.as_deref(), Some("Autauga County"));
    }

    #[test]
    fn empty_income_becomes_missing() {
        let rows = vec![row(2, "01001", "Autauga County", &[(MeasureKey::MedianHouseholdIncome, "")])];
        let mut features = vec![feature(Some("01001"), None)];
        join(&rows, &mut features);
        assert_eq!(features[0].attributes.indicators.get(MeasureKey::MedianHouseholdIncome), None);
    }

    #[test]
    fn unmatched_features_stay_with_every_slot_missing() {
        let rows = vec![row(2, "01001", "Autauga County", &[(MeasureKey::Poverty, "18.5")])];
        let mut features = vec![feature(Some("01001"), None), feature(Some("99999"), None)];
        let (_, report) = join(&rows, &mut features);

        assert_eq!(features.len(), 2);
        assert_eq!(report.unmatched, 1);
        let attrs = &features[1].attributes;
        assert_eq!(attrs.name, None);
        assert!(attrs.indicators.iter().all(|(_, v)| v.is_none()));
        assert_eq!(attrs.indicators.iter().count(), MeasureKey::COUNT);
    }

    #[test]
    fn geometry_identifier_takes_precedence_over_generic_id() {
        let rows = vec![
            row(2, "01001", "Autauga County", &[(MeasureKey::Poverty, "18.5")]),
            row(3, "01003", "Baldwin County", &[(MeasureKey::Poverty, "12.0")]),
        ];
        let mut features = vec![feature(Some("01003"), Some("01001")), feature(None, Some("01001"))];
        join(&rows, &mut features);
        assert_eq!(features[0].attributes.name.as_deref(), Some("Baldwin County"));
        assert_eq!(features[1].attributes.name.as_deref(), Some("Autauga County"));
    }

    #[test]
    fn duplicate_identifiers_keep_the_last_row() {
        let rows = vec![
            row(2, "1001", "First", &[(MeasureKey::Poverty, "1")]),
            row(3, "01001", "Second", &[(MeasureKey::Poverty, "2")]),
        ];
        let mut features = vec![feature(Some("01001"), None)];
        let (_, report) = join(&rows, &mut features);
        assert_eq!(report.duplicate_ids.len(), 1);
        assert_eq!(features[0].attributes.name.as_deref(), Some("Second"));
        assert_eq!(features[0].attributes.indicators.get(MeasureKey::Poverty), Some(2.0));
    }

    #[test]
    fn bad_rows_are_reported_not_joined() {
        let rows = vec![
            row(2, "", "Nowhere", &[(MeasureKey::Poverty, "50")]),
            row(3, "01001", "Autauga County", &[(MeasureKey::Poverty, "18.5")]),
        ];
        let mut features = vec![feature(Some("01001"), None)];
        let (records, report) = join(&rows, &mut features);
        assert_eq!(records.len(), 1);
        assert_eq!(report.rejected, vec![RejectedRow { line: 2, error: DataError::EmptyIdentifier }]);
    }

    #[test]
    fn rerunning_the_join_is_idempotent() {
        let rows = vec![
            row(2, "1001", "Autauga County", &[(MeasureKey::Poverty, "18.5"), (MeasureKey::AirQuality, "7.1")]),
            row(3, "1003", "Baldwin County", &[(MeasureKey::Poverty, "abc")]),
        ];
        let mut features = vec![feature(Some("01001"), None), feature(None, Some("01003")), feature(None, None)];
        join(&rows, &mut features);
        let first = features.clone();
        join(&rows, &mut features);
        assert_eq!(first, features);
    }
}
