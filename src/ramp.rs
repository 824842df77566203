//! Ramp timing for the gain DAC's function generator
//!
//! The DAC walks its output between two margin codes in fixed code steps,
//! waiting one slew interval per step. Neither table is continuous, so the
//! duration of a ramp can only be approximated; [`solve`] picks the closest
//! combination.

use std::fmt;

/// 12-bit DAC
pub const DAC_CODES: u32 = 4096;

/// External reference the DAC output is scaled against
pub const DAC_REF_VOLTS: f64 = 1.25;

/// Time per step for each slew-rate setting, in microseconds
pub const SLEW_TIMES_US: [f64; 16] = [
    0.0, 4.0, 8.0, 12.0, 18.0, 27.04, 40.48, 60.72, 91.12, 136.72, 239.2, 418.64, 732.56, 1282.0,
    2563.96, 5127.92,
];

/// Codes moved per step for each code-step setting
pub const CODE_STEPS: [u16; 8] = [1, 2, 3, 4, 6, 8, 16, 32];

/// Error above which a plan is reported as an approximation
pub const DEFAULT_WARN_PERCENT: f64 = 5.0;

/// Convert a voltage to a DAC code, clamping to the output range
pub fn voltage_to_code(volts: f64) -> u16 {
    let volts = volts.clamp(0.0, DAC_REF_VOLTS);
    let code = (volts / DAC_REF_VOLTS * DAC_CODES as f64) as u32;
    code.min(DAC_CODES - 1) as u16
}

/// Number of codes a ramp over `voltage_span` volts traverses
pub fn code_range(voltage_span: f64) -> u16 {
    let span = voltage_to_code(voltage_span.abs()) - voltage_to_code(0.0);
    span.max(1)
}

/// Chosen slew/step settings and what they will actually produce
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampPlan {
    /// Index into [`SLEW_TIMES_US`]
    pub rate_index: u8,
    /// Index into [`CODE_STEPS`]
    pub step_index: u8,
    pub code_range: u16,
    pub num_steps: u32,
    pub predicted_duration_us: f64,
    pub target_duration_us: u32,
    pub error_percent: f64,
}

impl RampPlan {
    pub fn step_time_us(&self) -> f64 {
        SLEW_TIMES_US[self.rate_index as usize]
    }

    pub fn code_step(&self) -> u16 {
        CODE_STEPS[self.step_index as usize]
    }

    /// Warn when the best match is still further than `threshold_percent` off
    pub fn approximation(&self, threshold_percent: f64) -> Option<TimingApproximation> {
        (self.error_percent > threshold_percent).then(|| TimingApproximation {
            target_duration_us: self.target_duration_us,
            predicted_duration_us: self.predicted_duration_us,
            error_percent: self.error_percent,
        })
    }
}

impl fmt::Display for RampPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slew {} ({} us/step), step {} ({} codes/step), {} steps, {:.0} us for {} us target ({:.2}% off)",
            self.rate_index,
            self.step_time_us(),
            self.step_index,
            self.code_step(),
            self.num_steps,
            self.predicted_duration_us,
            self.target_duration_us,
            self.error_percent
        )
    }
}

/// A ramp that can't hit its target closely; progress is never blocked on it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingApproximation {
    pub target_duration_us: u32,
    pub predicted_duration_us: f64,
    pub error_percent: f64,
}

fn relative_error_percent(predicted: f64, target: u32) -> f64 {
    let diff = (predicted - target as f64).abs();
    if target == 0 {
        if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        diff / target as f64 * 100.0
    }
}

/// Find the slew/step pair whose ramp over `voltage_span` lasts closest to `target_duration_us`
///
/// Every combination is tried. Over- and undershoot count the same, and on a
/// tie the lower slew index wins, then the lower step index.
pub fn solve(target_duration_us: u32, voltage_span: f64) -> RampPlan {
    let code_range = code_range(voltage_span);
    let plan_for = |rate_index: usize, step_index: usize| {
        let step = CODE_STEPS[step_index] as u32;
        let num_steps = (code_range as u32).div_ceil(step).max(1);
        let predicted = num_steps as f64 * SLEW_TIMES_US[rate_index];
        RampPlan {
            rate_index: rate_index as u8,
            step_index: step_index as u8,
            code_range,
            num_steps,
            predicted_duration_us: predicted,
            target_duration_us,
            error_percent: relative_error_percent(predicted, target_duration_us),
        }
    };

    let mut best = plan_for(0, 0);
    for rate_index in 0..SLEW_TIMES_US.len() {
        for step_index in 0..CODE_STEPS.len() {
            let candidate = plan_for(rate_index, step_index);
            if candidate.error_percent < best.error_percent {
                best = candidate;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_ms_over_one_volt() {
        let plan = solve(60_000, 1.0);
        assert_eq!(plan.code_range, 3276);
        assert_eq!(plan.rate_index, 4);
        assert_eq!(plan.step_index, 0);
        assert_eq!(plan.num_steps, 3276);
        assert!((plan.predicted_duration_us - 58_968.0).abs() < 1e-6);
        assert!((plan.error_percent - 1.72).abs() < 1e-6);
        assert_eq!(plan.approximation(DEFAULT_WARN_PERCENT), None);
    }

    #[test]
    fn matches_brute_force_over_all_combinations() {
        for &(target, span) in &[(60_000u32, 1.0f64), (250_000, 0.48), (1_000, 0.6), (3_333_333, 0.25)] {
            let plan = solve(target, span);
            let range = code_range(span) as f64;
            for &t in SLEW_TIMES_US.iter() {
                for &s in CODE_STEPS.iter() {
                    let predicted = (range / s as f64).ceil() * t;
                    let distance = (predicted - target as f64).abs();
                    assert!(
                        (plan.predicted_duration_us - target as f64).abs() <= distance + 1e-9,
                        "{t} us x {s} beats the plan for {target} us"
                    );
                }
            }
        }
    }

    #[test]
    fn ties_go_to_lowest_indices() {
        // One code to move: every step size takes a single step
        let plan = solve(4, 0.0);
        assert_eq!(plan.code_range, 1);
        assert_eq!((plan.rate_index, plan.step_index), (1, 0));
        assert_eq!(plan.error_percent, 0.0);
    }

    #[test]
    fn overshoot_and_undershoot_weigh_equally() {
        assert_eq!(relative_error_percent(110.0, 100), relative_error_percent(90.0, 100));
    }

    #[test]
    fn zero_target_picks_immediate_slew() {
        let plan = solve(0, 1.0);
        assert_eq!(plan.rate_index, 0);
        assert_eq!(plan.predicted_duration_us, 0.0);
        assert_eq!(plan.error_percent, 0.0);
    }

    #[test]
    fn long_targets_report_approximation() {
        // The slowest setting tops out near 21 s for a full-scale ramp
        let plan = solve(17_000_000, 0.48);
        assert_eq!(plan.rate_index, 15);
        let warning = plan.approximation(DEFAULT_WARN_PERCENT).unwrap();
        assert!(warning.error_percent > 40.0);
    }

    #[test]
    fn codes_clamp_to_the_dac_range() {
        assert_eq!(voltage_to_code(-1.0), 0);
        assert_eq!(voltage_to_code(1.25), 4095);
        assert_eq!(voltage_to_code(5.0), 4095);
        assert_eq!(voltage_to_code(0.625), 2048);
    }
}
