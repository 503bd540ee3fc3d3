// src/residual.rs

//! Learned residual correction on top of the parametric baseline.
//!
//! The regressor was fit against a fixed, alphabetically ordered set of
//! named features. That contract is kept explicit in [`FeatureSchema`] and
//! checked against the loaded model before any row is scored.

use crate::codec::{CodecIndicators, CodecVariant, NormalizedRow};
use crate::error::{P1204Error, Result};
use crate::features::{BITRATE, FRAMERATE, RESOLUTION};
use crate::scale::{MOS_MAX, MOS_MIN, map_to_5};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const SCHEMA_VERSION: u32 = 1;
pub const BASELINE_COLUMN: &str = "predicted_mos_mode3_baseline";
pub const QUANT_COLUMN: &str = "quant";

/// Flattened statistic name -> name the regressor was trained with.
pub static RENAMES: [(&str, &str); 10] = [
    ("FramesizeStatsPerGop_1.0_quantil_FrameSize", "1.0_quantil_FrameSize"),
    ("FramesizeStatsPerGop_std_FrameSize_non-i", "std_FrameSize_non-i"),
    ("FramesizeStatsPerGop_kurtosis_FrameSize_non-i", "kurtosis_FrameSize_non-i"),
    ("QPValuesStatsPerGop_mean_Av_QPBB_non-i", "mean_Av_QPBB_non_i"),
    ("QPValuesStatsPerGop_iqr_Av_QPBB_non-i", "iqr_Av_QPBB_non-i"),
    ("QPValuesStatsPerGop_kurtosis_Av_QPBB_non-i", "kurtosis_Av_QPBB_non-i"),
    ("QPValuesStatsPerGop_iqr_min_QP", "iqr_min_QP"),
    ("QPValuesStatsPerGop_std_max_QP_non-i", "std_max_QP_non-i"),
    ("AvMotionStatsPerGop_kurtosis_Av_Motion", "kurtosis_Av_Motion"),
    ("AvMotionStatsPerGop_0.0_quantil_StdDev_MotionX_non-i", "0.0_quantil_StdDev_MotionX_non-i"),
];

const PASSTHROUGH: [&str; 3] = [BITRATE, RESOLUTION, FRAMERATE];

/// Row columns the corrector reads.
pub fn source_columns() -> Vec<&'static str> {
    PASSTHROUGH
        .into_iter()
        .chain(RENAMES.iter().map(|(source, _)| *source))
        .collect()
}

/// How absent values are filled in the final vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    Zero,
}

impl FillPolicy {
    fn fill(self, value: Option<f64>) -> f64 {
        match self {
            FillPolicy::Zero => value.filter(|v| v.is_finite()).unwrap_or(0.0),
        }
    }
}

/// Names, order and fill policy of the regressor's input vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    pub version: u32,
    pub fill: FillPolicy,
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Builds a schema; columns are deduplicated and sorted by byte order.
    pub fn new<'a>(version: u32, names: impl IntoIterator<Item = &'a str>, fill: FillPolicy) -> Self {
        let columns: BTreeSet<String> = names.into_iter().map(str::to_string).collect();
        Self {
            version,
            fill,
            columns: columns.into_iter().collect(),
        }
    }

    /// The schema of the mode-3 residual forest.
    pub fn mode3() -> Self {
        let names = PASSTHROUGH
            .into_iter()
            .chain(RENAMES.iter().map(|(_, target)| *target))
            .chain([BASELINE_COLUMN, QUANT_COLUMN])
            .chain(CodecVariant::ALL.into_iter().map(CodecVariant::name));
        Self::new(SCHEMA_VERSION, names, FillPolicy::Zero)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Checks that a model expects exactly these columns in this order.
    pub fn check_model(&self, model_columns: &[String]) -> Result<()> {
        if model_columns == self.columns.as_slice() {
            return Ok(());
        }
        let ours: BTreeSet<&str> = self.columns.iter().map(String::as_str).collect();
        let theirs: BTreeSet<&str> = model_columns.iter().map(String::as_str).collect();
        let missing: Vec<&str> = theirs.difference(&ours).copied().collect();
        let unexpected: Vec<&str> = ours.difference(&theirs).copied().collect();
        let detail = if missing.is_empty() && unexpected.is_empty() {
            "same columns in a different order".to_string()
        } else {
            format!(
                "model expects columns not built here: {:?}; built but not expected: {:?}",
                missing, unexpected
            )
        };
        Err(P1204Error::SchemaMismatch(format!(
            "feature schema v{} ({} columns) vs model ({} columns): {}",
            self.version,
            self.columns.len(),
            model_columns.len(),
            detail
        )))
    }

    /// Builds the ordered input vector for one row.
    pub fn assemble(&self, row: &NormalizedRow<'_>, baseline_mos: f64) -> Result<Vec<f64>> {
        let mut named: BTreeMap<&str, Option<f64>> = BTreeMap::new();
        for column in PASSTHROUGH {
            named.insert(column, row.row.value(column)?);
        }
        for (source, target) in RENAMES.iter() {
            named.insert(*target, row.row.value(source)?);
        }
        named.insert(QUANT_COLUMN, Some(row.quant));
        named.insert(BASELINE_COLUMN, Some(baseline_mos));

        // own indicator set, independent of the baseline's
        let indicators = CodecIndicators::one_hot(row.video_codec);
        for (variant, flag) in indicators.iter() {
            named.insert(variant.name(), Some(f64::from(flag)));
        }

        self.columns
            .iter()
            .map(|column| {
                named
                    .get(column.as_str())
                    .map(|value| self.fill.fill(*value))
                    .ok_or_else(|| {
                        P1204Error::SchemaMismatch(format!("no source for schema column '{}'", column))
                    })
            })
            .collect()
    }
}

/// Inference entry point of a trained residual regressor. The ONNX backend
/// lives in [`crate::inference`].
pub trait ResidualModel: fmt::Debug {
    /// Input names, in the order `predict` expects them.
    fn feature_names(&self) -> &[String];

    fn predict(&self, features: &[f64]) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualEstimate {
    pub residual_mos: f64,
    /// `clip(map_to_5(baseline) + residual, 1, 5)`.
    pub corrected_mos: f64,
}

#[derive(Debug)]
pub struct ResidualCorrector {
    schema: FeatureSchema,
    model: Box<dyn ResidualModel>,
}

impl ResidualCorrector {
    /// Fails if the model's inputs do not match the schema.
    pub fn new(schema: FeatureSchema, model: Box<dyn ResidualModel>) -> Result<Self> {
        schema.check_model(model.feature_names())?;
        Ok(Self { schema, model })
    }

    pub fn correct(&self, row: &NormalizedRow<'_>, baseline_mos: f64) -> Result<ResidualEstimate> {
        let features = self.schema.assemble(row, baseline_mos)?;
        let residual_mos = self.model.predict(&features)?;
        let corrected_mos = (map_to_5(baseline_mos) + residual_mos).clamp(MOS_MIN, MOS_MAX);
        debug!("Residual: {:.4} -> corrected {:.4}", residual_mos, corrected_mos);
        Ok(ResidualEstimate {
            residual_mos,
            corrected_mos,
        })
    }
}
