//! Quasi-causal checks recorded alongside an evaluation
//!
//! None of these change the verdict; they are stored in the evaluation
//! details so a reader can judge how robust the verdict is.

use serde::{Deserialize, Serialize};

use crate::signal::{DailySeries, DateWindow};
use crate::stats;

/// Slope of each window and their difference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DidResult {
    pub baseline_trend: f64,
    pub intervention_trend: f64,
    pub diff_in_diff: f64,
}

/// Level and slope change at the intervention start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItsResult {
    pub level_change: f64,
    pub slope_change: f64,
}

/// How often the sign of the mean difference flips when the start moves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub stable: bool,
    pub flips: u32,
    /// Shifts attempted, including those skipped for lack of data
    pub tested_windows: u32,
    /// Shifts that had enough data in both windows
    pub evaluated_windows: u32,
}

fn slope(values: &[f64]) -> f64 {
    if values.len() < 3 {
        0.0
    } else {
        stats::ols_slope(values)
    }
}

pub fn difference_in_differences(baseline: &[f64], intervention: &[f64]) -> DidResult {
    let baseline_trend = slope(baseline);
    let intervention_trend = slope(intervention);
    DidResult {
        baseline_trend,
        intervention_trend,
        diff_in_diff: intervention_trend - baseline_trend,
    }
}

pub fn interrupted_time_series(baseline: &[f64], intervention: &[f64]) -> ItsResult {
    ItsResult {
        level_change: stats::mean(intervention) - stats::mean(baseline),
        slope_change: difference_in_differences(baseline, intervention).diff_in_diff,
    }
}

/// Shift both windows by `-max_shift..=max_shift` days and count direction flips
///
/// The first shift with enough data sets the reference direction. A window
/// pair is stable with at most one flip.
pub fn window_shift_sensitivity(
    series: &DailySeries,
    baseline: &DateWindow,
    intervention: &DateWindow,
    max_shift: u32,
    min_points: usize,
) -> SensitivityResult {
    let max_shift = i64::from(max_shift);
    let mut reference: Option<bool> = None;
    let mut flips = 0;
    let mut tested = 0;
    let mut evaluated = 0;

    for shift in -max_shift..=max_shift {
        tested += 1;
        let before = series.values_in(&baseline.shift(shift));
        let after = series.values_in(&intervention.shift(shift));
        if before.len() < min_points || after.len() < min_points {
            continue;
        }
        evaluated += 1;

        let up = stats::mean(&after) - stats::mean(&before) > 0.0;
        match reference {
            None => reference = Some(up),
            Some(r) if r != up => flips += 1,
            Some(_) => {}
        }
    }

    SensitivityResult {
        stable: flips <= 1,
        flips,
        tested_windows: tested,
        evaluated_windows: evaluated,
    }
}
