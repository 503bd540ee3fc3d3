// src/scale.rs

//! Conversions between the MOS scale [1,5] and the impairment R-scale [0,100].
//!
//! The forward transform is the usual quality-of-experience curve
//! `MOS(R) = MOS_MIN + (MOS_MAX - MOS_MIN)/100 * R + R(R-60)(100-R) * 7e-6`.
//! It dips marginally below `MOS_MIN` for very small R, so the inverse is
//! solved on the monotone branch only.

pub const MOS_MIN: f64 = 1.0;
pub const MOS_MAX: f64 = 5.0;
pub const R_MIN: f64 = 0.0;
pub const R_MAX: f64 = 100.0;

const CUBIC_WEIGHT: f64 = 7.0e-6;
const INVERSE_TOLERANCE: f64 = 1e-12;
const INVERSE_MAX_ITERATIONS: usize = 200;

/// Grid used by `map_to_5`.
const GRID_5: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];
/// Grid used by `map_to_45`: five points evenly spanning [1, 4.5].
const GRID_45: [f64; 5] = [1.0, 1.875, 2.75, 3.625, 4.5];

fn transform(r: f64) -> f64 {
    MOS_MIN + (MOS_MAX - MOS_MIN) / 100.0 * r + r * (r - 60.0) * (100.0 - r) * CUBIC_WEIGHT
}

/// Lower end of the monotone branch of `transform` (its local minimum).
fn monotone_floor() -> f64 {
    let slope = (MOS_MAX - MOS_MIN) / 100.0;
    // d/dR transform = slope + 7e-6 * (-3R^2 + 320R - 6000)
    let c = 6000.0 - slope / CUBIC_WEIGHT;
    let disc = 320.0 * 320.0 - 12.0 * c;
    ((320.0 - disc.sqrt()) / 6.0).clamp(R_MIN, R_MAX)
}

/// Maps an R value onto MOS. Input is clipped to [0,100], output to [1,5].
pub fn mos_from_r(r: f64) -> f64 {
    let q = r.clamp(R_MIN, R_MAX);
    transform(q).clamp(MOS_MIN, MOS_MAX)
}

/// Inverse of [`mos_from_r`]. Input is clipped to [1,5], output to [0,100].
pub fn r_from_mos(mos: f64) -> f64 {
    if mos.is_nan() {
        return f64::NAN;
    }
    let target = mos.clamp(MOS_MIN, MOS_MAX);
    let mut lo = monotone_floor();
    let mut hi = R_MAX;
    for _ in 0..INVERSE_MAX_ITERATIONS {
        if hi - lo < INVERSE_TOLERANCE {
            break;
        }
        let mid = 0.5 * (lo + hi);
        if transform(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (0.5 * (lo + hi)).clamp(R_MIN, R_MAX)
}

fn snap_to_grid(mos: f64, grid: &[f64]) -> f64 {
    if mos.is_nan() {
        return f64::NAN;
    }
    let mut best = grid[0];
    for &point in grid {
        // ties resolve upwards, like rounding half away from zero
        if (mos - point).abs() <= (mos - best).abs() {
            best = point;
        }
    }
    best
}

/// Quantizes MOS to the nearest point of the 5-point grid {1,2,3,4,5}.
pub fn map_to_5(mos: f64) -> f64 {
    snap_to_grid(mos, &GRID_5)
}

/// Quantizes MOS to the nearest point of the 5-point grid spanning [1,4.5].
pub fn map_to_45(mos: f64) -> f64 {
    snap_to_grid(mos, &GRID_45)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn mos_round_trip_holds_over_the_scale() {
        let mut m = 1.0;
        while m <= 5.0 {
            let back = mos_from_r(r_from_mos(m));
            assert!((back - m).abs() < EPS, "m={m} came back as {back}");
            m += 0.05;
        }
    }

    #[test]
    fn r_round_trip_holds_away_from_the_lower_clip() {
        // below R ~ 1.8 the transform is clipped at MOS_MIN
        let mut r = 2.0;
        while r <= 100.0 {
            let back = r_from_mos(mos_from_r(r));
            assert!((back - r).abs() < 1e-4, "r={r} came back as {back}");
            r += 0.5;
        }
    }

    #[test]
    fn conversions_clip_their_domains() {
        assert_eq!(mos_from_r(-20.0), mos_from_r(0.0));
        assert_eq!(mos_from_r(250.0), MOS_MAX);
        assert!((r_from_mos(7.0) - R_MAX).abs() < EPS);
        assert_eq!(r_from_mos(0.0), r_from_mos(1.0));
        assert!(r_from_mos(1.0) >= R_MIN);
    }

    #[test]
    fn map_to_5_rounds_and_is_idempotent() {
        assert_eq!(map_to_5(3.4), 3.0);
        assert_eq!(map_to_5(3.5), 4.0);
        assert_eq!(map_to_5(0.2), 1.0);
        assert_eq!(map_to_5(6.0), 5.0);
        for i in 0..=60 {
            let x = 0.5 + i as f64 * 0.1;
            assert_eq!(map_to_5(map_to_5(x)), map_to_5(x));
        }
    }

    #[test]
    fn map_to_45_uses_its_own_grid() {
        assert_eq!(map_to_45(5.0), 4.5);
        assert_eq!(map_to_45(2.8), 2.75);
        for i in 0..=60 {
            let x = 0.5 + i as f64 * 0.1;
            assert_eq!(map_to_45(map_to_45(x)), map_to_45(x));
        }
    }
}
