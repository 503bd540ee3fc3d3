// src/temporal.rs

//! Per-second trajectories derived from a sequence score.

use crate::codec::CodecVariant;
use crate::error::Result;
use crate::features::{FeatureRow, PER_SECOND_QP};
use crate::scale::{MOS_MAX, MOS_MIN};
use log::debug;

/// Turns a sequence-level score into one score per second of the row.
pub trait TemporalAggregator {
    fn per_second(&self, sequence_score: f64, row: &FeatureRow) -> Result<Vec<f64>>;
}

pub const DEFAULT_QP_SENSITIVITY: f64 = 4.0;

/// Shifts the sequence score by how far each second's normalized QP sits
/// from the sequence average. Coarser seconds score lower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QpDeviationAggregator {
    pub sensitivity: f64,
}

impl Default for QpDeviationAggregator {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_QP_SENSITIVITY,
        }
    }
}

impl TemporalAggregator for QpDeviationAggregator {
    fn per_second(&self, sequence_score: f64, row: &FeatureRow) -> Result<Vec<f64>> {
        let qp = row.series(PER_SECOND_QP)?;
        if qp.is_empty() {
            debug!("No per-second QP values, trajectory is empty");
            return Ok(Vec::new());
        }
        let variant = CodecVariant::from_row(row)?;
        let quant: Vec<f64> = qp.iter().map(|&v| variant.normalize_qp(v)).collect();
        let mean = quant.iter().sum::<f64>() / quant.len() as f64;

        Ok(quant
            .iter()
            .map(|q| (sequence_score - self.sensitivity * (q - mean)).clamp(MOS_MIN, MOS_MAX))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::P1204Error;
    use crate::features::BIT_DEPTH;

    fn row(qp: Vec<f64>) -> FeatureRow {
        FeatureRow::new()
            .with_codec("h264")
            .with_column(BIT_DEPTH, 8.0)
            .with_series(PER_SECOND_QP, qp)
    }

    #[test]
    fn constant_qp_keeps_the_sequence_score() {
        let per_second = QpDeviationAggregator::default()
            .per_second(3.5, &row(vec![30.0; 8]))
            .unwrap();
        assert_eq!(per_second.len(), 8);
        assert!(per_second.iter().all(|s| (s - 3.5).abs() < 1e-12));
    }

    #[test]
    fn coarser_seconds_score_lower_and_stay_in_range() {
        let per_second = QpDeviationAggregator::default()
            .per_second(4.8, &row(vec![20.0, 25.5, 51.0, 0.0]))
            .unwrap();
        assert_eq!(per_second.len(), 4);
        assert!(per_second[2] < per_second[1]);
        assert!(per_second.iter().all(|s| (1.0..=5.0).contains(s)));
        assert_eq!(per_second[3], 5.0);
    }

    #[test]
    fn missing_series_is_an_error_and_empty_series_is_empty() {
        let bare = FeatureRow::new().with_codec("h264").with_column(BIT_DEPTH, 8.0);
        assert!(matches!(
            QpDeviationAggregator::default().per_second(3.0, &bare),
            Err(P1204Error::MissingColumn(_))
        ));
        assert!(QpDeviationAggregator::default()
            .per_second(3.0, &row(Vec::new()))
            .unwrap()
            .is_empty());
    }
}
