// src/config.rs

//! Model configuration and device/display parameters.
//!
//! The configuration file is JSON keyed by device profile:
//!
//! ```json
//! { "pc":     { "params": { "h264_a": 4.3, ..., "x": -12.8, "y": 1.0, "z": -10.5, "k": 1.0 },
//!               "rf": "p1204_3_rf_pc.onnx",
//!               "rf_features": ["0.0_quantil_StdDev_MotionX_non-i", ..., "vp9"] },
//!   "mobile": { ... } }
//! ```
//!
//! Curve coefficients are stored flat as `<variant>_a` .. `<variant>_d`.
//! The `rf` path is resolved relative to the configuration file. The optional
//! `rf_features` list names the ONNX model's input columns in order; without
//! it the names are read from the model's `feature_names` metadata.
//!
//! Only the profile selected for the run is parsed and validated.

use crate::codec::CodecVariant;
use crate::error::{P1204Error, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEVICE_TYPES: [&str; 3] = ["pc", "tv", "mobile"];
pub const DEVICE_RESOLUTIONS: [&str; 4] = ["3840x2160", "2560x1440", "1920x1080", "1280x720"];
pub const VIEWING_DISTANCES: [&str; 3] = ["1.5xH", "4xH", "6xH"];
pub const DISPLAY_SIZES: [f64; 9] = [10.0, 32.0, 37.0, 5.1, 5.5, 5.8, 55.0, 65.0, 75.0];

pub const DEFAULT_DEVICE_RESOLUTION: &str = "3840x2160";
pub const DEFAULT_VIEWING_DISTANCE: &str = "1.5xH";
pub const DEFAULT_DISPLAY_SIZE: f64 = 55.0;
pub const DEFAULT_DISPLAY_PIXELS: f64 = 3840.0 * 2160.0;

static RESOLUTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<w>[0-9]+)\s*x\s*(?P<h>[0-9]+)\s*$").expect("Invalid resolution Regex")
});

/// Parses a `WIDTHxHEIGHT` string.
pub fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    let caps = RESOLUTION_REGEX
        .captures(s)
        .ok_or_else(|| P1204Error::Input(format!("Invalid resolution '{}', expected WIDTHxHEIGHT", s)))?;
    let dim = |name: &str| -> Result<u32> {
        let text = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
        text.parse::<u32>()
            .map_err(|_| P1204Error::Input(format!("Invalid resolution dimension: {}", text)))
    };
    let (w, h) = (dim("w")?, dim("h")?);
    if w == 0 || h == 0 {
        return Err(P1204Error::Input(format!("Resolution must be non-zero: {}", s)));
    }
    Ok((w, h))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Pc,
    Tv,
    Mobile,
}

impl DeviceType {
    /// pc and tv share one parameter set.
    pub fn profile_key(self) -> &'static str {
        match self {
            DeviceType::Pc | DeviceType::Tv => "pc",
            DeviceType::Mobile => "mobile",
        }
    }
}

impl FromStr for DeviceType {
    type Err = P1204Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pc" => Ok(DeviceType::Pc),
            "tv" => Ok(DeviceType::Tv),
            "mobile" => Ok(DeviceType::Mobile),
            _ => Err(P1204Error::Input(format!(
                "specified device_type '{}' is not supported, only {:?} possible",
                s, DEVICE_TYPES
            ))),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Pc => "pc",
            DeviceType::Tv => "tv",
            DeviceType::Mobile => "mobile",
        };
        f.write_str(name)
    }
}

/// Target display. Only its pixel count enters the model.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    pub viewing_distance: String,
    pub display_size: f64,
}

impl DisplaySettings {
    pub fn new(resolution: &str, viewing_distance: &str, display_size: f64) -> Result<Self> {
        if !DEVICE_RESOLUTIONS.contains(&resolution) {
            return Err(P1204Error::Input(format!(
                "specified device_resolution '{}' is not supported, only {:?} possible",
                resolution, DEVICE_RESOLUTIONS
            )));
        }
        if !VIEWING_DISTANCES.contains(&viewing_distance) {
            return Err(P1204Error::Input(format!(
                "specified viewing_distance '{}' is not supported, only {:?} possible",
                viewing_distance, VIEWING_DISTANCES
            )));
        }
        if !DISPLAY_SIZES.iter().any(|&s| (s - display_size).abs() < 1e-9) {
            return Err(P1204Error::Input(format!(
                "specified display_size '{}' is not supported, only {:?} possible",
                display_size, DISPLAY_SIZES
            )));
        }
        let (width, height) = parse_resolution(resolution)?;
        Ok(Self {
            width,
            height,
            viewing_distance: viewing_distance.to_string(),
            display_size,
        })
    }

    pub fn pixels(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            viewing_distance: DEFAULT_VIEWING_DISTANCE.to_string(),
            display_size: DEFAULT_DISPLAY_SIZE,
        }
    }
}

/// Coefficients of the exponential coding-degradation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

/// Coefficients of the resolution (`x`, `y`) and frame-rate (`z`, `k`) terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayCoefficients {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: String,
    pub curves: BTreeMap<CodecVariant, CurveCoefficients>,
    pub display: DisplayCoefficients,
    pub residual_model: PathBuf,
    pub residual_features: Option<Vec<String>>,
}

impl DeviceProfile {
    pub fn curve(&self, variant: CodecVariant) -> Result<&CurveCoefficients> {
        self.curves.get(&variant).ok_or_else(|| {
            P1204Error::Config(format!(
                "profile '{}' has no curve coefficients for {}",
                self.name, variant
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    params: BTreeMap<String, f64>,
    rf: String,
    #[serde(default)]
    rf_features: Option<Vec<String>>,
}

fn parse_profile(name: &str, raw: RawProfile, base_dir: &Path) -> Result<DeviceProfile> {
    let global = |key: &str| -> Result<f64> {
        raw.params.get(key).copied().ok_or_else(|| {
            P1204Error::Config(format!("profile '{}' is missing coefficient '{}'", name, key))
        })
    };
    let display = DisplayCoefficients {
        x: global("x")?,
        y: global("y")?,
        z: global("z")?,
        k: global("k")?,
    };

    let mut curves = BTreeMap::new();
    for variant in CodecVariant::ALL {
        let found: Vec<Option<f64>> = ["a", "b", "c", "d"]
            .iter()
            .map(|suffix| raw.params.get(&format!("{}_{}", variant.name(), suffix)).copied())
            .collect();
        match found.as_slice() {
            [Some(a), Some(b), Some(c), Some(d)] => {
                curves.insert(variant, CurveCoefficients { a: *a, b: *b, c: *c, d: *d });
            }
            [None, None, None, None] => debug!("Profile '{}' has no curve for {}", name, variant),
            _ => {
                return Err(P1204Error::Config(format!(
                    "profile '{}' has an incomplete coefficient set for {}",
                    name, variant
                )));
            }
        }
    }
    if curves.is_empty() {
        return Err(P1204Error::Config(format!(
            "profile '{}' defines no codec curves",
            name
        )));
    }

    Ok(DeviceProfile {
        name: name.to_string(),
        curves,
        display,
        residual_model: base_dir.join(&raw.rf),
        residual_features: raw.rf_features,
    })
}

/// The device profiles of one configuration file, kept unparsed until one
/// is selected.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    base_dir: PathBuf,
    profiles: BTreeMap<String, Value>,
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading model configuration: {}", path.display());
        if !path.is_file() {
            return Err(P1204Error::Input(format!(
                "{} does not exist, please check",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let profiles: BTreeMap<String, Value> = serde_json::from_str(&content)?;
        debug!("Configuration lists profiles {:?}", profiles.keys().collect::<Vec<_>>());
        Ok(Self {
            path: path.to_path_buf(),
            base_dir: path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
            profiles,
        })
    }

    /// Parses and validates the profile for a device type (pc and tv fold
    /// together). Other profiles in the file are never looked at.
    pub fn profile(&self, device_type: DeviceType) -> Result<DeviceProfile> {
        let key = device_type.profile_key();
        let raw = self.profiles.get(key).ok_or_else(|| {
            P1204Error::Config(format!(
                "{} has no '{}' profile (needed for device type {})",
                self.path.display(),
                key,
                device_type
            ))
        })?;
        let raw: RawProfile = serde_json::from_value(raw.clone())
            .map_err(|e| P1204Error::Config(format!("profile '{}' is malformed: {}", key, e)))?;
        let profile = parse_profile(key, raw, &self.base_dir)?;
        debug!(
            "Profile '{}': {} curve(s), residual model {}",
            key,
            profile.curves.len(),
            profile.residual_model.display()
        );
        Ok(profile)
    }
}
