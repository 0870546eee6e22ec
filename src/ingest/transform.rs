//! Provider payload model and row extraction

use crate::ingest::FetchError;
use crate::storage::{Row, Schema, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Response body of a historical station query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub timestamps: Vec<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureProperties {
    #[serde(deserialize_with = "station_id")]
    pub station: i64,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSeries>,
}

/// One parameter's data points, aligned with `RawPayload::timestamps`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterSeries {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Accepts the station id as a JSON number or a numeric string
fn station_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Flattens a payload into schema-ordered rows
///
/// Produces one row per (feature, timestamp). Each row's date is the
/// calendar date of its timestamp. A parameter the feature lacks, or a data
/// array shorter than the timestamp list, yields `Null` for that field.
///
/// # Returns
///
/// * `Ok(rows)` - Possibly empty when the payload has no features
/// * `Err(FetchError::Decode)` - A timestamp is not an ISO date or datetime
pub fn rows_from_payload(payload: &RawPayload, schema: &Schema) -> Result<Vec<Row>, FetchError> {
    if payload.features.is_empty() {
        return Ok(Vec::new());
    }

    let dates = payload
        .timestamps
        .iter()
        .map(|ts| timestamp_date(ts))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(payload.features.len() * dates.len());

    for feature in &payload.features {
        let props = &feature.properties;
        let series: Vec<Option<&ParameterSeries>> = schema
            .parameters()
            .iter()
            .map(|name| lookup(&props.parameters, name))
            .collect();

        for (i, date) in dates.iter().enumerate() {
            let values = series
                .iter()
                .map(|s| {
                    s.and_then(|s| s.data.get(i))
                        .map(Value::from_json)
                        .unwrap_or(Value::Null)
                })
                .collect();
            rows.push(Row::new(props.station, *date, values));
        }
    }

    Ok(rows)
}

/// Finds a parameter by exact name, falling back to a case-insensitive match
fn lookup<'a>(
    parameters: &'a HashMap<String, ParameterSeries>,
    name: &str,
) -> Option<&'a ParameterSeries> {
    parameters.get(name).or_else(|| {
        parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, series)| series)
    })
}

fn timestamp_date(timestamp: &str) -> Result<NaiveDate, FetchError> {
    timestamp
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| FetchError::Decode(format!("unparseable timestamp '{}'", timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> RawPayload {
        serde_json::from_value(value).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rows_in_schema_order() {
        let schema = Schema::new(["tl_mittel", "rr"]);
        let raw = payload(json!({
            "timestamps": ["2024-03-01T00:00+00:00"],
            "features": [
                {"properties": {"station": 5904, "parameters": {
                    "RR": {"name": "precip", "data": [42.1]},
                    "TL_MITTEL": {"data": [7]}
                }}},
                {"properties": {"station": "11035", "parameters": {
                    "tl_mittel": {"data": [null]}
                }}}
            ]
        }));

        let rows = rows_from_payload(&raw, &schema).unwrap();
        assert_eq!(
            rows,
            vec![
                Row::new(5904, d(2024, 3, 1), vec![Value::Integer(7), Value::Real(42.1)]),
                Row::new(11035, d(2024, 3, 1), vec![Value::Null, Value::Null]),
            ]
        );
    }

    #[test]
    fn test_one_row_per_timestamp() {
        let schema = Schema::new(["rr"]);
        let raw = payload(json!({
            "timestamps": ["2024-03-01T00:00+00:00", "2024-03-02T00:00+00:00"],
            "features": [
                {"properties": {"station": 1, "parameters": {"rr": {"data": [1.5]}}}}
            ]
        }));

        let rows = rows_from_payload(&raw, &schema).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, vec![Value::Real(1.5)]);
        assert_eq!(rows[1].date, d(2024, 3, 2));
        assert_eq!(rows[1].values, vec![Value::Null]);
    }

    #[test]
    fn test_no_features_no_rows() {
        let schema = Schema::new(["rr"]);
        let raw = payload(json!({"timestamps": ["garbage"], "features": []}));
        assert!(rows_from_payload(&raw, &schema).unwrap().is_empty());

        let raw = payload(json!({}));
        assert!(rows_from_payload(&raw, &schema).unwrap().is_empty());
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let schema = Schema::new(["rr"]);
        let raw = payload(json!({
            "timestamps": ["03/01/2024"],
            "features": [{"properties": {"station": 1, "parameters": {}}}]
        }));
        assert!(matches!(
            rows_from_payload(&raw, &schema),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_non_numeric_station_rejected() {
        let result: Result<RawPayload, _> = serde_json::from_value(json!({
            "timestamps": [],
            "features": [{"properties": {"station": "vienna", "parameters": {}}}]
        }));
        assert!(result.is_err());
    }
}
