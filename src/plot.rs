// src/plot.rs

use crate::error::{P1204Error, Result};
use crate::pipeline::PredictionResult;
use crate::scale::{MOS_MAX, MOS_MIN};
use plotters::prelude::*;
use plotters::style::full_palette::{GREEN, ORANGE};
use std::path::Path;
use log::{error, info};
use quantiles::ckms::CKMS;

/// Trajectory summary drawn as horizontal lines on the plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub perc_1: f64,
    pub perc_25: f64,
    pub perc_75: f64,
}

pub fn trajectory_stats(scores: &[f64]) -> Option<TrajectoryStats> {
    if scores.is_empty() {
        return None;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // CKMS gives the rank; the value comes from the sorted copy
    let mut ckms = CKMS::<f64>::new(0.001);
    for score in &sorted {
        ckms.insert(*score);
    }
    let percentile = |q: f64| -> f64 {
        ckms.query(q)
            .map(|(rank, _)| {
                let index = rank.min(sorted.len().saturating_sub(1));
                sorted.get(index).copied().unwrap_or(f64::NAN)
            })
            .unwrap_or(f64::NAN)
    };

    Some(TrajectoryStats {
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        perc_1: percentile(0.01),
        perc_25: percentile(0.25),
        perc_75: percentile(0.75),
    })
}

/// Draws the per-second MOS trajectory with the sequence score and percentile lines.
pub fn generate_plot(result: &PredictionResult, output_path: &Path) -> Result<()> {
    info!("Generating MOS plot: {}", output_path.display());

    let stats = match trajectory_stats(&result.per_second) {
        Some(stats) => stats,
        None => {
            error!("No per-second scores to plot for {}", output_path.display());
            return Err(P1204Error::Plot("No per-second scores to plot".to_string()));
        }
    };
    let seconds = result.per_second.len() as u32;
    let x_max = seconds.saturating_sub(1).max(1);

    let root = BitMapBackend::new(output_path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| P1204Error::Plot(format!("Failed to fill plot background: {}", e)))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Per-second MOS ({} s, sequence {:.2})", seconds, result.per_sequence),
            ("sans-serif", 24).into_font(),
        )
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0u32..x_max, (MOS_MIN - 0.1)..(MOS_MAX + 0.1))
        .map_err(|e| P1204Error::Plot(format!("Failed to build chart: {}", e)))?;

    let y_label_format = |y: &f64| format!("{:.1}", y);
    chart
        .configure_mesh()
        .x_desc("Second")
        .y_desc("MOS")
        .y_label_formatter(&y_label_format)
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .y_labels(9)
        .draw()
        .map_err(|e| P1204Error::Plot(format!("Failed to draw mesh: {:?}", e)))?;

    chart
        .draw_series(LineSeries::new(
            result.per_second.iter().enumerate().map(|(i, s)| (i as u32, *s)),
            BLUE.mix(0.8).stroke_width(2),
        ))
        .map_err(|e| P1204Error::Plot(format!("Failed to draw main series: {:?}", e)))?
        .label("Per-second MOS")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.filled()));

    let lines = [
        (format!("Sequence: {:.2}", result.per_sequence), result.per_sequence, BLACK),
        (format!("Mean: {:.2}", stats.mean), stats.mean, MAGENTA),
        (format!("1%:   {:.2}", stats.perc_1), stats.perc_1, RED),
        (format!("25%: {:.2}", stats.perc_25), stats.perc_25, ORANGE),
        (format!("75%: {:.2}", stats.perc_75), stats.perc_75, GREEN),
    ];
    for (label, value, color) in lines {
        chart
            .draw_series(LineSeries::new(vec![(0, value), (x_max, value)], stat_line_style(color)))
            .map_err(|e| P1204Error::Plot(format!("Failed to draw '{}' line: {:?}", label, e)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], stat_line_style(color)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerMiddle)
        .margin(10)
        .label_font(("sans-serif", 12))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| P1204Error::Plot(format!("Failed to draw legend: {:?}", e)))?;

    root.present().map_err(|e| P1204Error::Plot(format!("Failed to save plot: {:?}", e)))?;
    info!("Successfully generated MOS plot: {}", output_path.display());
    Ok(())
}

fn stat_line_style(color: RGBColor) -> ShapeStyle {
    ShapeStyle {
        color: color.to_rgba(),
        filled: false,
        stroke_width: 1,
    }
}
