// src/codec.rs

//! Codec classification and QP normalization.
//!
//! Every supported `(Codec, BitDepth)` pair maps to exactly one
//! [`CodecVariant`]; the variant is the single lookup key for the QP
//! normalization divisor here and for the curve coefficients in the model
//! configuration.

use crate::error::{P1204Error, Result};
use crate::features::{BIT_DEPTH, FeatureRow, QP_MEAN_NON_I};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CodecVariant {
    #[serde(rename = "h264")]
    H264,
    #[serde(rename = "h264_10bit")]
    H264TenBit,
    #[serde(rename = "hevc")]
    Hevc,
    #[serde(rename = "hevc_10bit")]
    HevcTenBit,
    #[serde(rename = "vp9")]
    Vp9,
}

impl CodecVariant {
    pub const ALL: [CodecVariant; 5] = [
        CodecVariant::H264,
        CodecVariant::H264TenBit,
        CodecVariant::Hevc,
        CodecVariant::HevcTenBit,
        CodecVariant::Vp9,
    ];

    /// Derives the variant from the stream's codec name and bit depth.
    /// Only h264 and hevc distinguish a 10-bit variant. The name is compared
    /// as given; rows are lowercased once when they are read.
    pub fn from_stream(codec: &str, bit_depth: u32) -> Result<Self> {
        match (codec, bit_depth) {
            ("h264", 10) => Ok(CodecVariant::H264TenBit),
            ("hevc", 10) => Ok(CodecVariant::HevcTenBit),
            ("h264", _) => Ok(CodecVariant::H264),
            ("hevc", _) => Ok(CodecVariant::Hevc),
            ("vp9", _) => Ok(CodecVariant::Vp9),
            _ => Err(P1204Error::UnsupportedCodec {
                codec: codec.to_string(),
                bit_depth,
            }),
        }
    }

    pub fn from_row(row: &FeatureRow) -> Result<Self> {
        let depth = row.number(BIT_DEPTH)?;
        if depth < 0.0 || depth.fract() != 0.0 {
            return Err(P1204Error::MalformedColumn {
                column: BIT_DEPTH.to_string(),
                reason: format!("{} is not a bit depth", depth),
            });
        }
        Self::from_stream(row.codec()?, depth as u32)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecVariant::H264 => "h264",
            CodecVariant::H264TenBit => "h264_10bit",
            CodecVariant::Hevc => "hevc",
            CodecVariant::HevcTenBit => "hevc_10bit",
            CodecVariant::Vp9 => "vp9",
        }
    }

    /// Largest representable quantization step for the variant.
    pub fn max_qp(self) -> f64 {
        match self {
            CodecVariant::H264 | CodecVariant::Hevc => 51.0,
            CodecVariant::H264TenBit | CodecVariant::HevcTenBit => 63.0,
            CodecVariant::Vp9 => 255.0,
        }
    }

    pub fn normalize_qp(self, qp: f64) -> f64 {
        qp / self.max_qp()
    }

    fn index(self) -> usize {
        match self {
            CodecVariant::H264 => 0,
            CodecVariant::H264TenBit => 1,
            CodecVariant::Hevc => 2,
            CodecVariant::HevcTenBit => 3,
            CodecVariant::Vp9 => 4,
        }
    }
}

impl fmt::Display for CodecVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One-hot codec indicator set, one slot per [`CodecVariant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecIndicators([u8; 5]);

impl CodecIndicators {
    pub fn one_hot(active: CodecVariant) -> Self {
        let mut slots = [0u8; 5];
        slots[active.index()] = 1;
        CodecIndicators(slots)
    }

    pub fn get(&self, variant: CodecVariant) -> u8 {
        self.0[variant.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CodecVariant, u8)> + '_ {
        CodecVariant::ALL.into_iter().map(move |v| (v, self.get(v)))
    }
}

/// A feature row augmented with its codec variant, normalized QP and indicators.
#[derive(Debug, Clone)]
pub struct NormalizedRow<'a> {
    pub row: &'a FeatureRow,
    pub video_codec: CodecVariant,
    pub quant: f64,
    pub indicators: CodecIndicators,
}

pub fn normalize(row: &FeatureRow) -> Result<NormalizedRow<'_>> {
    let video_codec = CodecVariant::from_row(row)?;
    let qp_mean = row.number(QP_MEAN_NON_I)?;
    let quant = video_codec.normalize_qp(qp_mean);
    debug!("video_codec={} qp_mean={:.3} quant={:.4}", video_codec, qp_mean, quant);
    Ok(NormalizedRow {
        row,
        video_codec,
        quant,
        indicators: CodecIndicators::one_hot(video_codec),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{BIT_DEPTH, QP_MEAN_NON_I};

    fn row(codec: &str, depth: f64, qp: f64) -> FeatureRow {
        FeatureRow::new()
            .with_codec(codec)
            .with_column(BIT_DEPTH, depth)
            .with_column(QP_MEAN_NON_I, qp)
    }

    #[test]
    fn variants_follow_codec_and_bit_depth() {
        assert_eq!(CodecVariant::from_stream("h264", 8).unwrap(), CodecVariant::H264);
        assert_eq!(CodecVariant::from_stream("h264", 10).unwrap(), CodecVariant::H264TenBit);
        assert_eq!(CodecVariant::from_stream("hevc", 10).unwrap(), CodecVariant::HevcTenBit);
        assert_eq!(CodecVariant::from_stream("hevc", 8).unwrap(), CodecVariant::Hevc);
        assert_eq!(CodecVariant::from_stream("vp9", 10).unwrap(), CodecVariant::Vp9);
        assert!(matches!(
            CodecVariant::from_stream("av1", 8),
            Err(P1204Error::UnsupportedCodec { .. })
        ));
    }

    #[test]
    fn codec_names_are_matched_exactly() {
        assert!(matches!(
            CodecVariant::from_stream("HEVC", 8),
            Err(P1204Error::UnsupportedCodec { .. })
        ));

        // normalization happens once, when the row is read
        let raw = serde_json::json!({
            "Codec": "HEVC",
            "BitDepth": 10,
            "QPValuesStatsPerGop": { "mean_Av_QPBB_non-i": 31.5 }
        });
        let row = FeatureRow::from_json(&raw).unwrap();
        assert_eq!(row.codec().unwrap(), "hevc");
        assert_eq!(normalize(&row).unwrap().video_codec, CodecVariant::HevcTenBit);
    }

    #[test]
    fn names_round_trip() {
        for variant in CodecVariant::ALL {
            assert_eq!(CodecVariant::from_name(variant.name()), Some(variant));
        }
        assert_eq!(CodecVariant::from_name("av1"), None);
    }

    #[test]
    fn quant_is_normalized_by_the_variant_range() {
        let vp9_row = row("vp9", 8.0, 127.5);
        let vp9 = normalize(&vp9_row).unwrap();
        assert_eq!(vp9.quant, 0.5);

        let h264_row = row("h264", 8.0, 25.5);
        let h264 = normalize(&h264_row).unwrap();
        assert_eq!(h264.quant, 0.5);

        let hevc10_row = row("hevc", 10.0, 31.5);
        let hevc10 = normalize(&hevc10_row).unwrap();
        assert_eq!(hevc10.video_codec, CodecVariant::HevcTenBit);
        assert_eq!(hevc10.quant, 0.5);
    }

    #[test]
    fn indicators_are_one_hot() {
        for variant in CodecVariant::ALL {
            let indicators = CodecIndicators::one_hot(variant);
            assert_eq!(indicators.iter().map(|(_, v)| u32::from(v)).sum::<u32>(), 1);
            assert_eq!(indicators.get(variant), 1);
            assert_eq!(indicators.iter().filter(|(_, v)| *v == 1).count(), 1);
        }
    }

    #[test]
    fn unsupported_codecs_fail_instead_of_flowing_downstream() {
        assert!(matches!(
            normalize(&row("mpeg2", 8.0, 10.0)),
            Err(P1204Error::UnsupportedCodec { .. })
        ));
        assert!(matches!(
            normalize(&row("h264", 9.5, 10.0)),
            Err(P1204Error::MalformedColumn { .. })
        ));
    }
}
