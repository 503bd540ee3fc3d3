// src/pipeline.rs

use crate::baseline::{self, BaselineEstimate};
use crate::codec;
use crate::config::{DeviceProfile, DeviceType, DisplaySettings, ModelConfig};
use crate::error::{P1204Error, Result};
use crate::features::FeatureRow;
use crate::inference::OnnxResidualModel;
use crate::residual::{FeatureSchema, ResidualCorrector, ResidualEstimate, ResidualModel};
use crate::scale::{MOS_MAX, MOS_MIN};
use crate::temporal::TemporalAggregator;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weight of the baseline in the final blend; the corrected score gets the rest.
pub const BASELINE_WEIGHT: f64 = 0.5;

/// Final output for one row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub per_sequence: f64,
    pub per_second: Vec<f64>,
}

/// Intermediate values of one scored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowScore {
    pub baseline: BaselineEstimate,
    pub residual: ResidualEstimate,
    pub final_score: f64,
}

/// Convex combination of the two estimates; both are already in [1,5].
pub fn blend(baseline_mos: f64, corrected_mos: f64) -> f64 {
    BASELINE_WEIGHT * baseline_mos + (1.0 - BASELINE_WEIGHT) * corrected_mos
}

/// Hybrid estimator bound to one device profile and display.
#[derive(Debug)]
pub struct QualityModel {
    profile: DeviceProfile,
    corrector: ResidualCorrector,
    display_pixels: f64,
}

impl QualityModel {
    pub fn new(profile: DeviceProfile, model: Box<dyn ResidualModel>, display_pixels: f64) -> Result<Self> {
        if !(display_pixels.is_finite() && display_pixels > 0.0) {
            return Err(P1204Error::Input(format!(
                "display pixel count must be positive, got {}",
                display_pixels
            )));
        }
        let corrector = ResidualCorrector::new(FeatureSchema::mode3(), model)?;
        Ok(Self {
            profile,
            corrector,
            display_pixels,
        })
    }

    /// Loads the configuration, selects the device profile and loads its
    /// residual model. Everything blocking happens here, before any row.
    pub fn load(config_path: &Path, device_type: DeviceType, display: &DisplaySettings) -> Result<Self> {
        let config = ModelConfig::load(config_path)?;
        let profile = config.profile(device_type)?;
        info!(
            "Using profile '{}' for device type {} on a {}x{} display",
            profile.name, device_type, display.width, display.height
        );
        let model = OnnxResidualModel::load(&profile.residual_model, profile.residual_features.as_deref())?;
        Self::new(profile, Box::new(model), display.pixels())
    }

    pub fn score_row(&self, row: &FeatureRow) -> Result<RowScore> {
        row.require(&baseline::REQUIRED_COLUMNS)?;
        row.require(&crate::residual::source_columns())?;

        let normalized = codec::normalize(row)?;
        let baseline = baseline::estimate(&normalized, &self.profile, self.display_pixels)?;
        let residual = self.corrector.correct(&normalized, baseline.predicted_mos)?;
        let final_score = blend(baseline.predicted_mos, residual.corrected_mos);
        debug!(
            "Row scored: baseline={} corrected={:.4} final={:.4}",
            baseline.predicted_mos, residual.corrected_mos, final_score
        );
        Ok(RowScore {
            baseline,
            residual,
            final_score,
        })
    }

    /// Sequence scores for every row of a table.
    pub fn score_table(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| self.score_row(row).map(|score| score.final_score))
            .collect()
    }

    /// Full prediction: sequence score plus per-second trajectory per row.
    pub fn predict(&self, rows: &[FeatureRow], aggregator: &dyn TemporalAggregator) -> Result<Vec<PredictionResult>> {
        info!("Scoring {} row(s)...", rows.len());
        let scores = self.score_table(rows)?;
        let results = scores
            .into_iter()
            .zip(rows)
            .map(|(per_sequence, row)| {
                let per_second = aggregator.per_second(per_sequence, row)?;
                Ok(PredictionResult {
                    per_sequence,
                    per_second,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for result in &results {
            validate_result(result)?;
        }
        info!("Scoring complete.");
        Ok(results)
    }
}

/// Checks that every score is finite and on the MOS scale.
pub fn validate_result(result: &PredictionResult) -> Result<()> {
    let in_range = |v: f64| v.is_finite() && (MOS_MIN..=MOS_MAX).contains(&v);
    if !in_range(result.per_sequence) {
        return Err(P1204Error::Validation(format!(
            "Sequence score {} is outside [{}, {}]",
            result.per_sequence, MOS_MIN, MOS_MAX
        )));
    }
    if let Some((i, v)) = result.per_second.iter().enumerate().find(|(_, v)| !in_range(**v)) {
        return Err(P1204Error::Validation(format!(
            "Per-second score {} at second {} is outside [{}, {}]",
            v, i, MOS_MIN, MOS_MAX
        )));
    }
    if result.per_second.is_empty() {
        warn!("Per-second trajectory is empty.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecVariant;
    use crate::config::{CurveCoefficients, DEFAULT_DISPLAY_PIXELS, DisplayCoefficients};
    use crate::features::{BIT_DEPTH, BITRATE, FRAMERATE, PER_SECOND_QP, QP_MEAN_NON_I, RESOLUTION};
    use crate::residual::RENAMES;
    use crate::temporal::QpDeviationAggregator;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[derive(Debug)]
    struct Neutral {
        names: Vec<String>,
    }

    impl ResidualModel for Neutral {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict(&self, _features: &[f64]) -> Result<f64> {
            Ok(0.0)
        }
    }

    fn neutral() -> Box<dyn ResidualModel> {
        Box::new(Neutral {
            names: FeatureSchema::mode3().columns().to_vec(),
        })
    }

    fn profile() -> DeviceProfile {
        let curve = CurveCoefficients { a: 4.6, b: -3.6, c: 4.0, d: -2.5 };
        let curves: BTreeMap<_, _> = CodecVariant::ALL.into_iter().map(|v| (v, curve)).collect();
        DeviceProfile {
            name: "pc".to_string(),
            curves,
            display: DisplayCoefficients { x: -12.0, y: 1.0, z: -9.0, k: 1.0 },
            residual_model: PathBuf::from("unused.onnx"),
            residual_features: None,
        }
    }

    fn row(codec: &str, qp: f64) -> FeatureRow {
        let mut row = FeatureRow::new()
            .with_codec(codec)
            .with_column(BIT_DEPTH, 8.0)
            .with_column(BITRATE, 6000.0)
            .with_column(RESOLUTION, 3840.0 * 2160.0)
            .with_column(FRAMERATE, 60.0)
            .with_series(PER_SECOND_QP, vec![qp; 5]);
        for (source, _) in RENAMES.iter() {
            row = row.with_column(source, 1.0);
        }
        row.with_column(QP_MEAN_NON_I, qp)
    }

    #[test]
    fn blend_is_an_even_mix() {
        assert_eq!(blend(3.0, 4.0), 3.5);
        assert_eq!(blend(2.0, 2.0), 2.0);
    }

    #[test]
    fn neutral_residual_leaves_the_baseline_unchanged() {
        let model = QualityModel::new(profile(), neutral(), DEFAULT_DISPLAY_PIXELS).unwrap();
        for qp in [5.0, 20.0, 35.0, 50.0] {
            let score = model.score_row(&row("h264", qp)).unwrap();
            assert_eq!(score.residual.residual_mos, 0.0);
            assert_eq!(score.final_score, score.baseline.predicted_mos);
        }
    }

    #[test]
    fn predict_produces_bounded_results_per_row() {
        let model = QualityModel::new(profile(), neutral(), DEFAULT_DISPLAY_PIXELS).unwrap();
        let rows = vec![row("h264", 22.0), row("vp9", 200.0)];
        let results = model.predict(&rows, &QpDeviationAggregator::default()).unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.per_second.len(), 5);
            assert!(result.per_second.iter().all(|s| (s - result.per_sequence).abs() < 1e-9));
        }
    }

    #[test]
    fn missing_columns_abort_the_row() {
        let model = QualityModel::new(profile(), neutral(), DEFAULT_DISPLAY_PIXELS).unwrap();
        let bare = FeatureRow::new().with_codec("h264").with_column(BIT_DEPTH, 8.0);
        assert!(matches!(model.score_row(&bare), Err(P1204Error::MissingColumn(_))));
    }

    #[test]
    fn invalid_display_is_rejected() {
        assert!(matches!(
            QualityModel::new(profile(), neutral(), 0.0),
            Err(P1204Error::Input(_))
        ));
    }

    #[test]
    fn results_outside_the_scale_fail_validation() {
        let good = PredictionResult { per_sequence: 3.2, per_second: vec![3.0, 3.4] };
        assert!(validate_result(&good).is_ok());
        let bad_sequence = PredictionResult { per_sequence: 5.5, per_second: vec![] };
        assert!(validate_result(&bad_sequence).is_err());
        let bad_second = PredictionResult { per_sequence: 3.0, per_second: vec![3.0, f64::NAN] };
        assert!(validate_result(&bad_second).is_err());
    }
}
