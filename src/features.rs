// src/features.rs

//! Feature rows as produced by the external bitstream analysis.
//!
//! A raw row is a JSON object with scalar statistics at the top level and a
//! handful of nested statistic groups. Nested groups are flattened into
//! `<Group>_<key>` scalar columns according to [`FLATTEN_RULES`]; arrays
//! inside a group become per-second series under the same naming scheme.

use crate::error::{P1204Error, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const CODEC: &str = "Codec";
pub const BITRATE: &str = "Bitrate";
pub const RESOLUTION: &str = "Resolution";
pub const FRAMERATE: &str = "Framerate";
pub const BIT_DEPTH: &str = "BitDepth";

/// Mean non-intra QP over the sequence, the source of the normalized `quant`.
pub const QP_MEAN_NON_I: &str = "QPValuesStatsPerGop_mean_Av_QPBB_non-i";
/// Per-second mean QP series consumed by the temporal aggregator.
pub const PER_SECOND_QP: &str = "QPstatspersecond_mean_QP_per_second";

/// One nested statistics group and the prefix its keys receive when flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenRule {
    pub group: &'static str,
}

impl FlattenRule {
    pub fn column_name(&self, key: &str) -> String {
        format!("{}_{}", self.group, key)
    }
}

pub static FLATTEN_RULES: [FlattenRule; 5] = [
    FlattenRule { group: "QPValuesStatsPerGop" },
    FlattenRule { group: "QPstatspersecond" },
    FlattenRule { group: "BitstreamStatFeatures" },
    FlattenRule { group: "FramesizeStatsPerGop" },
    FlattenRule { group: "AvMotionStatsPerGop" },
];

fn flatten_rule(group: &str) -> Option<&'static FlattenRule> {
    FLATTEN_RULES.iter().find(|rule| rule.group == group)
}

/// A flattened feature row. `None` column values are missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    codec: Option<String>,
    columns: BTreeMap<String, Option<f64>>,
    series: BTreeMap<String, Vec<f64>>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: &str) -> Self {
        self.codec = Some(codec.to_string());
        self
    }

    pub fn with_column(mut self, name: &str, value: f64) -> Self {
        self.columns.insert(name.to_string(), Some(value));
        self
    }

    pub fn with_missing(mut self, name: &str) -> Self {
        self.columns.insert(name.to_string(), None);
        self
    }

    pub fn with_series(mut self, name: &str, values: Vec<f64>) -> Self {
        self.series.insert(name.to_string(), values);
        self
    }

    /// Flattens one raw JSON row.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| P1204Error::Input("Feature row must be a JSON object".to_string()))?;

        let mut row = FeatureRow::new();
        for (key, value) in object {
            match value {
                // the only place codec names are normalized
                Value::String(s) if key == CODEC => row.codec = Some(s.to_lowercase()),
                Value::Object(group) => match flatten_rule(key) {
                    Some(rule) => row.flatten_group(rule, group)?,
                    None => warn!("Ignoring nested group without a flattening rule: {}", key),
                },
                Value::Array(items) => {
                    let values = series_values(key, items)?;
                    row.series.insert(key.clone(), values);
                }
                other => {
                    if let Some(v) = scalar_value(key, other)? {
                        row.columns.insert(key.clone(), v);
                    }
                }
            }
        }
        debug!(
            "Flattened feature row: {} columns, {} series",
            row.columns.len(),
            row.series.len()
        );
        Ok(row)
    }

    fn flatten_group(
        &mut self,
        rule: &FlattenRule,
        group: &serde_json::Map<String, Value>,
    ) -> Result<()> {
        for (key, value) in group {
            let name = rule.column_name(key);
            match value {
                Value::Array(items) => {
                    let values = series_values(&name, items)?;
                    self.series.insert(name, values);
                }
                Value::Object(_) => warn!("Ignoring doubly nested statistic: {}", name),
                other => {
                    if let Some(v) = scalar_value(&name, other)? {
                        self.columns.insert(name, v);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn codec(&self) -> Result<&str> {
        self.codec
            .as_deref()
            .ok_or_else(|| P1204Error::MissingColumn(CODEC.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Raw column value; `Ok(None)` is a present-but-missing value.
    pub fn value(&self, name: &str) -> Result<Option<f64>> {
        self.columns
            .get(name)
            .copied()
            .ok_or_else(|| P1204Error::MissingColumn(name.to_string()))
    }

    /// Column value that must be present and finite.
    pub fn number(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: format!("value {} is not finite", v),
            }),
            None => Err(P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: "value is missing".to_string(),
            }),
        }
    }

    pub fn series(&self, name: &str) -> Result<&[f64]> {
        self.series
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| P1204Error::MissingColumn(name.to_string()))
    }

    /// Fails with the first absent column. `Codec` is checked as well.
    pub fn require(&self, columns: &[&str]) -> Result<()> {
        for column in columns {
            if *column == CODEC {
                self.codec()?;
            } else if !self.has_column(column) {
                return Err(P1204Error::MissingColumn(column.to_string()));
            }
        }
        Ok(())
    }
}

fn scalar_value(name: &str, value: &Value) -> Result<Option<Option<f64>>> {
    match value {
        Value::Null => Ok(Some(None)),
        Value::Bool(b) => Ok(Some(Some(if *b { 1.0 } else { 0.0 }))),
        Value::Number(n) => n
            .as_f64()
            .map(|v| Some(Some(v)))
            .ok_or_else(|| P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: format!("number {} is not representable as f64", n),
            }),
        Value::String(s) => {
            debug!("Skipping non-numeric column {} = {:?}", name, s);
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Per-second values. A missing second has no value to substitute, so `null`
/// entries are rejected rather than read as QP 0.
fn series_values(name: &str, items: &[Value]) -> Result<Vec<f64>> {
    items
        .iter()
        .enumerate()
        .map(|(second, item)| match item {
            Value::Null => Err(P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: format!("series entry {} is missing", second),
            }),
            Value::Number(n) => n.as_f64().ok_or_else(|| P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: format!("number {} is not representable as f64", n),
            }),
            other => Err(P1204Error::MalformedColumn {
                column: name.to_string(),
                reason: format!("series entry {} is not a number", other),
            }),
        })
        .collect()
}

/// Reads a feature table: either a single row object or an array of rows.
pub fn load_feature_table(path: &Path) -> Result<Vec<FeatureRow>> {
    info!("Loading features: {}", path.display());
    if !path.exists() {
        return Err(P1204Error::Input(format!(
            "Feature file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&content)?;
    let rows = match &raw {
        Value::Array(items) => items.iter().map(FeatureRow::from_json).collect::<Result<Vec<_>>>()?,
        Value::Object(_) => vec![FeatureRow::from_json(&raw)?],
        _ => {
            return Err(P1204Error::Input(
                "Feature file must hold a row object or an array of rows".to_string(),
            ));
        }
    };
    if rows.is_empty() {
        return Err(P1204Error::Input(format!(
            "Feature file contains no rows: {}",
            path.display()
        )));
    }
    info!("Loaded {} feature row(s)", rows.len());
    Ok(rows)
}
