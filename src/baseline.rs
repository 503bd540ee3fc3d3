// src/baseline.rs

//! Parametric baseline: an exponential coding-degradation curve per codec
//! variant plus logarithmic resolution and frame-rate degradations, combined
//! on the R-scale and mapped back to a quantized MOS.
//!
//! Resolution and frame rate must be strictly positive; the logarithms are
//! not guarded.

use crate::codec::NormalizedRow;
use crate::config::{CurveCoefficients, DeviceProfile, DisplayCoefficients};
use crate::error::Result;
use crate::features::{BIT_DEPTH, CODEC, FRAMERATE, QP_MEAN_NON_I, RESOLUTION};
use crate::scale::{MOS_MAX, MOS_MIN, R_MAX, R_MIN, map_to_5, mos_from_r, r_from_mos};
use log::debug;

/// Columns the baseline reads from a row.
pub const REQUIRED_COLUMNS: [&str; 5] = [CODEC, BIT_DEPTH, QP_MEAN_NON_I, RESOLUTION, FRAMERATE];

const REFERENCE_FRAMERATE: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineEstimate {
    pub coding_degradation: f64,
    pub resolution_degradation: f64,
    pub framerate_degradation: f64,
    /// Unquantized MOS, clipped to [1,5].
    pub mos: f64,
    /// `map_to_5(mos)`, the baseline prediction.
    pub predicted_mos: f64,
}

pub fn coding_degradation(quant: f64, curve: &CurveCoefficients) -> f64 {
    let mos_q = (curve.a + curve.b * (curve.c * quant + curve.d).exp()).clamp(MOS_MIN, MOS_MAX);
    (100.0 - r_from_mos(mos_q)).clamp(R_MIN, R_MAX)
}

pub fn resolution_degradation(resolution: f64, display_pixels: f64, coeffs: &DisplayCoefficients) -> f64 {
    (coeffs.x * (coeffs.y * (resolution / display_pixels)).ln()).clamp(R_MIN, R_MAX)
}

pub fn framerate_degradation(framerate: f64, coeffs: &DisplayCoefficients) -> f64 {
    (coeffs.z * (coeffs.k * framerate / REFERENCE_FRAMERATE).ln()).clamp(R_MIN, R_MAX)
}

/// Total coding degradation as the indicator-weighted sum over variants.
/// Only the active variant has a non-zero weight, so only its curve is needed.
fn weighted_coding_degradation(row: &NormalizedRow<'_>, profile: &DeviceProfile) -> Result<f64> {
    let mut total = 0.0;
    for (variant, weight) in row.indicators.iter() {
        if weight == 0 {
            continue;
        }
        total += f64::from(weight) * coding_degradation(row.quant, profile.curve(variant)?);
    }
    Ok(total)
}

pub fn estimate(row: &NormalizedRow<'_>, profile: &DeviceProfile, display_pixels: f64) -> Result<BaselineEstimate> {
    let resolution = row.row.number(RESOLUTION)?;
    let framerate = row.row.number(FRAMERATE)?;

    let coding = weighted_coding_degradation(row, profile)?;
    let res_deg = resolution_degradation(resolution, display_pixels, &profile.display);
    let fps_deg = framerate_degradation(framerate, &profile.display);

    let r_total = 100.0 - (coding + res_deg + fps_deg);
    let mos = mos_from_r(r_total).clamp(MOS_MIN, MOS_MAX);
    let predicted_mos = map_to_5(mos);

    debug!(
        "Baseline: coding={:.3} resolution={:.3} framerate={:.3} R={:.3} mos={:.4} -> {}",
        coding, res_deg, fps_deg, r_total, mos, predicted_mos
    );
    Ok(BaselineEstimate {
        coding_degradation: coding,
        resolution_degradation: res_deg,
        framerate_degradation: fps_deg,
        mos,
        predicted_mos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecVariant, normalize};
    use crate::config::DEFAULT_DISPLAY_PIXELS;
    use crate::error::P1204Error;
    use crate::features::FeatureRow;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    const NEUTRAL_DISPLAY: DisplayCoefficients = DisplayCoefficients { x: -10.0, y: 1.0, z: -8.0, k: 1.0 };

    fn profile(curve: CurveCoefficients) -> DeviceProfile {
        let mut curves = BTreeMap::new();
        curves.insert(CodecVariant::H264, curve);
        DeviceProfile {
            name: "pc".to_string(),
            curves,
            display: NEUTRAL_DISPLAY,
            residual_model: PathBuf::from("rf.onnx"),
            residual_features: None,
        }
    }

    fn h264_row(qp: f64, resolution: f64, framerate: f64) -> FeatureRow {
        FeatureRow::new()
            .with_codec("h264")
            .with_column(BIT_DEPTH, 8.0)
            .with_column(QP_MEAN_NON_I, qp)
            .with_column(RESOLUTION, resolution)
            .with_column(FRAMERATE, framerate)
    }

    #[test]
    fn degenerate_curve_gives_a_constant_coding_degradation() {
        let flat = CurveCoefficients { a: 1.0, b: 0.0, c: 0.0, d: 0.0 };
        let expected = (100.0 - r_from_mos(1.0)).clamp(0.0, 100.0);
        for quant in [0.0, 0.1, 0.5, 0.9, 1.0] {
            assert_eq!(coding_degradation(quant, &flat), expected);
        }
    }

    #[test]
    fn native_display_and_reference_framerate_add_no_degradation() {
        assert_eq!(resolution_degradation(3840.0 * 2160.0, DEFAULT_DISPLAY_PIXELS, &NEUTRAL_DISPLAY), 0.0);
        assert_eq!(framerate_degradation(60.0, &NEUTRAL_DISPLAY), 0.0);
    }

    #[test]
    fn lower_resolution_and_framerate_degrade() {
        assert!(resolution_degradation(1920.0 * 1080.0, DEFAULT_DISPLAY_PIXELS, &NEUTRAL_DISPLAY) > 0.0);
        assert!(framerate_degradation(24.0, &NEUTRAL_DISPLAY) > 0.0);
        // upscaled sources never count as a gain
        assert_eq!(resolution_degradation(7680.0 * 4320.0, DEFAULT_DISPLAY_PIXELS, &NEUTRAL_DISPLAY), 0.0);
    }

    #[test]
    fn estimate_is_quantized_and_monotone_in_qp() {
        let curve = CurveCoefficients { a: 4.6, b: -3.6, c: 4.0, d: -2.5 };
        let profile = profile(curve);
        let mut previous = f64::INFINITY;
        for qp in [10.0, 20.0, 30.0, 40.0, 50.0] {
            let row = h264_row(qp, 3840.0 * 2160.0, 60.0);
            let normalized = normalize(&row).unwrap();
            let est = estimate(&normalized, &profile, DEFAULT_DISPLAY_PIXELS).unwrap();
            assert_eq!(est.resolution_degradation, 0.0);
            assert_eq!(est.framerate_degradation, 0.0);
            assert_eq!(est.predicted_mos, map_to_5(est.mos));
            assert!((1.0..=5.0).contains(&est.predicted_mos));
            assert!(est.mos <= previous);
            previous = est.mos;
        }
    }

    #[test]
    fn variant_without_coefficients_is_a_config_error() {
        let profile = profile(CurveCoefficients { a: 1.0, b: 0.0, c: 0.0, d: 0.0 });
        let row = FeatureRow::new()
            .with_codec("vp9")
            .with_column(BIT_DEPTH, 8.0)
            .with_column(QP_MEAN_NON_I, 100.0)
            .with_column(RESOLUTION, 1920.0 * 1080.0)
            .with_column(FRAMERATE, 30.0);
        let normalized = normalize(&row).unwrap();
        assert!(matches!(
            estimate(&normalized, &profile, DEFAULT_DISPLAY_PIXELS),
            Err(P1204Error::Config(_))
        ));
    }
}
