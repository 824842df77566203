//! Receive gain: the VGA's control-voltage curve and requested gain profiles

use crate::{error::ConfigError, ramp::voltage_to_code};

pub const GAIN_MAX_DB: u8 = 80;

/// Control voltage range of the VGA; gain falls as voltage rises
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VgaModel {
    /// Control voltage giving minimum gain (0 dB)
    pub volts_at_min_gain: f64,
    /// Control voltage giving maximum gain (80 dB)
    pub volts_at_max_gain: f64,
    pub r_feedback_ohms: f64,
    pub r_input_ohms: f64,
}

impl Default for VgaModel {
    fn default() -> Self {
        Self {
            volts_at_min_gain: 1.1,
            volts_at_max_gain: 0.1,
            r_feedback_ohms: 20_000.0,
            r_input_ohms: 1_000.0,
        }
    }
}

impl VgaModel {
    /// Gain offset the resistor network adds over the nominal curve, in dB
    pub fn gain_offset_db(&self) -> f64 {
        20.0 * (self.r_feedback_ohms / self.r_input_ohms).log10() - 26.0
    }

    fn span(&self) -> f64 {
        self.volts_at_min_gain - self.volts_at_max_gain
    }

    pub fn gain_to_voltage(&self, gain_db: u8) -> f64 {
        let gain = gain_db.min(GAIN_MAX_DB) as f64;
        let volts = self.volts_at_min_gain
            - (gain - self.gain_offset_db()) / GAIN_MAX_DB as f64 * self.span();
        volts.clamp(self.volts_at_max_gain, self.volts_at_min_gain)
    }

    pub fn voltage_to_gain(&self, volts: f64) -> u8 {
        let volts = volts.clamp(self.volts_at_max_gain, self.volts_at_min_gain);
        let gain = (self.volts_at_min_gain - volts) / self.span() * GAIN_MAX_DB as f64
            + self.gain_offset_db();
        gain.clamp(0.0, GAIN_MAX_DB as f64) as u8
    }
}

/// Accepted ramp durations for a particular entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampLimits {
    pub min_us: u32,
    pub max_us: u32,
}

impl RampLimits {
    /// Combined transmit/receive sessions
    pub const TRANSCEIVE: RampLimits = RampLimits {
        min_us: 1_000,
        max_us: 250_000,
    };
    /// Receive-only sessions
    pub const RECEIVE_ONLY: RampLimits = RampLimits {
        min_us: 6_000,
        max_us: 17_000_000,
    };

    pub fn check(&self, duration_us: u32) -> Result<(), ConfigError> {
        if (self.min_us..=self.max_us).contains(&duration_us) {
            Ok(())
        } else {
            Err(ConfigError::RampDuration {
                value: duration_us,
                min: self.min_us,
                max: self.max_us,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Hold one voltage for the whole receive window
    Fixed,
    /// Sweep from start to end gain over the ramp duration
    Ramp,
}

/// Requested receive gain profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainSpec {
    pub start_gain_db: u8,
    pub end_gain_db: u8,
    pub ramp_duration_us: u32,
}

impl GainSpec {
    pub fn new(start_gain_db: u8, end_gain_db: u8, ramp_duration_us: u32) -> Self {
        Self {
            start_gain_db,
            end_gain_db,
            ramp_duration_us,
        }
    }

    pub fn mode(&self) -> GainMode {
        if self.start_gain_db == self.end_gain_db {
            GainMode::Fixed
        } else {
            GainMode::Ramp
        }
    }

    pub fn validate(&self, limits: RampLimits) -> Result<GainMode, ConfigError> {
        for gain in [self.start_gain_db, self.end_gain_db] {
            if gain > GAIN_MAX_DB {
                return Err(ConfigError::Gain(gain));
            }
        }
        if self.start_gain_db > self.end_gain_db {
            return Err(ConfigError::DescendingRamp {
                start: self.start_gain_db,
                end: self.end_gain_db,
            });
        }
        limits.check(self.ramp_duration_us)?;
        Ok(self.mode())
    }
}

/// Voltages the gain DAC should walk between for a ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampVoltages {
    /// Low-gain end, where the ramp starts
    pub high_volts: f64,
    /// High-gain end, where the ramp finishes
    pub low_volts: f64,
}

impl RampVoltages {
    pub fn for_spec(model: &VgaModel, spec: &GainSpec) -> Self {
        Self {
            high_volts: model.gain_to_voltage(spec.start_gain_db),
            low_volts: model.gain_to_voltage(spec.end_gain_db),
        }
    }

    pub fn span(&self) -> f64 {
        (self.high_volts - self.low_volts).abs()
    }

    /// DAC codes at the two margins
    pub fn codes(&self) -> (u16, u16) {
        (voltage_to_code(self.low_volts), voltage_to_code(self.high_volts))
    }
}
