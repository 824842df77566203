//! Transmit sweep parameters and the transmit-only sweep task

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    devices::SweepGenerator,
    error::{device_failure, Collaborator, ConfigError, Error, Result},
    session::SessionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

impl Waveform {
    /// Parse the bench's numeric waveform code (0 sine, 1 triangle, 2 square)
    pub fn from_code(code: u8) -> std::result::Result<Self, ConfigError> {
        match code {
            0 => Ok(Waveform::Sine),
            1 => Ok(Waveform::Triangle),
            2 => Ok(Waveform::Square),
            other => Err(ConfigError::Waveform(other)),
        }
    }
}

/// Multiplier applied to the DDS master clock when timing each increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMultiplier {
    X1,
    X5,
    X100,
    X500,
}

impl ClockMultiplier {
    pub fn from_factor(factor: u16) -> std::result::Result<Self, ConfigError> {
        match factor {
            1 => Ok(ClockMultiplier::X1),
            5 => Ok(ClockMultiplier::X5),
            100 => Ok(ClockMultiplier::X100),
            500 => Ok(ClockMultiplier::X500),
            other => Err(ConfigError::ClockMultiplier(other)),
        }
    }

    pub fn factor(self) -> u16 {
        match self {
            ClockMultiplier::X1 => 1,
            ClockMultiplier::X5 => 5,
            ClockMultiplier::X100 => 100,
            ClockMultiplier::X500 => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDirection {
    Up,
    Down,
}

pub const INCREMENT_RANGE: std::ops::RangeInclusive<u16> = 2..=4095;
pub const DWELL_RANGE: std::ops::RangeInclusive<u16> = 2..=2047;

/// Master clock feeding the sweep generator
pub const DDS_MCLK_HZ: f64 = 50e6;

/// Slack added on top of a sweep's expected run time before giving up on it
pub const SWEEP_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub start_frequency_hz: u32,
    /// Step between frequencies; zero holds the start frequency
    pub delta_frequency_hz: u32,
    pub increment_count: u16,
    pub waveform: Waveform,
    pub clock_multiplier: ClockMultiplier,
    /// Cycles spent on each frequency
    pub dwell: u16,
    pub direction: SweepDirection,
}

impl SweepConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !INCREMENT_RANGE.contains(&self.increment_count) {
            return Err(ConfigError::IncrementCount(self.increment_count));
        }
        if !DWELL_RANGE.contains(&self.dwell) {
            return Err(ConfigError::Dwell(self.dwell));
        }
        Ok(())
    }

    /// Frequency the sweep ends on
    pub fn final_frequency_hz(&self) -> i64 {
        let span = self.delta_frequency_hz as i64 * self.increment_count as i64;
        match self.direction {
            SweepDirection::Up => self.start_frequency_hz as i64 + span,
            SweepDirection::Down => self.start_frequency_hz as i64 - span,
        }
    }

    pub fn frequency_points(&self) -> u32 {
        self.increment_count as u32 + 1
    }

    /// How long the generator spends on the whole sweep at [`DDS_MCLK_HZ`]
    pub fn expected_duration(&self) -> Duration {
        let cycles = self.frequency_points() as f64
            * self.dwell as f64
            * self.clock_multiplier.factor() as f64;
        Duration::from_secs_f64(cycles / DDS_MCLK_HZ)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_frequency_hz: 500_000,
            delta_frequency_hz: 50_000,
            increment_count: 2,
            waveform: Waveform::Square,
            clock_multiplier: ClockMultiplier::X1,
            dwell: 2,
            direction: SweepDirection::Up,
        }
    }
}

impl fmt::Display for SweepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz -> {} Hz in {} points, {:?}, x{} clock, dwell {}",
            self.start_frequency_hz,
            self.final_frequency_hz(),
            self.frequency_points(),
            self.waveform,
            self.clock_multiplier.factor(),
            self.dwell
        )
    }
}

/// How completion of a triggered sweep is watched
#[derive(Debug, Clone, Copy)]
pub struct SweepTiming {
    pub poll_interval: Duration,
    /// Give up if the sweep has not finished after this long; `None` derives
    /// the limit from the sweep being run
    pub timeout: Option<Duration>,
}

impl SweepTiming {
    /// The wait limit for `config`: the fixed timeout if one is set, otherwise
    /// one and a half times the expected run time plus [`SWEEP_TIMEOUT_MARGIN`]
    pub fn timeout_for(&self, config: &SweepConfig) -> Duration {
        self.timeout.unwrap_or_else(|| {
            let expected = config.expected_duration();
            expected + expected / 2 + SWEEP_TIMEOUT_MARGIN
        })
    }
}

impl Default for SweepTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(10),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed,
    Cancelled,
}

/// Poll `sweep` running `config` until it reports completion, `cancel` is
/// raised or the timeout passes
pub(crate) fn poll_until_complete<S: SweepGenerator>(
    sweep: &mut S,
    config: &SweepConfig,
    timing: &SweepTiming,
    cancel: Option<&AtomicBool>,
    state: SessionState,
) -> Result<SweepOutcome> {
    let timeout = timing.timeout_for(config);
    let deadline = Instant::now() + timeout;
    loop {
        if sweep
            .is_complete()
            .map_err(device_failure(Collaborator::Sweep, state))?
        {
            return Ok(SweepOutcome::Completed);
        }
        if cancel.map_or(false, |c| c.load(Ordering::Acquire)) {
            return Ok(SweepOutcome::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(Error::SweepTimeout(timeout));
        }
        thread::sleep(timing.poll_interval);
    }
}

/// The sweep device and how its run ended
pub struct FinishedSweep<S> {
    pub device: S,
    pub outcome: Result<SweepOutcome>,
}

/// A transmit-only sweep running on its own thread
///
/// Dropping the task detaches it; the sweep still runs to completion.
pub struct SweepTask<S> {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<FinishedSweep<S>>,
}

impl<S> SweepTask<S> {
    /// Ask the task to stop waiting; the device is still reset on the way out
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the task ends and take the device back
    pub fn wait(self) -> Result<FinishedSweep<S>> {
        self.handle.join().map_err(|_| Error::TaskPanicked)
    }
}

/// Run one sweep on a background thread without a paired receive session
pub fn spawn_sweep<S>(sweep: S, config: SweepConfig, timing: SweepTiming) -> Result<SweepTask<S>>
where
    S: SweepGenerator + Send + 'static,
{
    config.validate()?;
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let handle = thread::Builder::new()
        .name("sweep".to_string())
        .spawn(move || run_sweep(sweep, config, timing, flag))
        .map_err(Error::TaskSpawn)?;
    Ok(SweepTask { cancel, handle })
}

fn run_sweep<S: SweepGenerator>(
    mut sweep: S,
    config: SweepConfig,
    timing: SweepTiming,
    cancel: Arc<AtomicBool>,
) -> FinishedSweep<S> {
    info!(%config, "Starting transmit-only sweep");
    let outcome = drive_sweep(&mut sweep, &config, &timing, &cancel);
    // Always park the DDS, whatever happened above
    if let Err(e) = sweep.reset().and_then(|_| sweep.standby(true)) {
        warn!("Failed to return sweep generator to standby: {}", e);
    }
    match &outcome {
        Ok(done) => debug!(?done, "Transmit-only sweep finished"),
        Err(e) => warn!("Transmit-only sweep failed: {}", e),
    }
    FinishedSweep {
        device: sweep,
        outcome,
    }
}

fn drive_sweep<S: SweepGenerator>(
    sweep: &mut S,
    config: &SweepConfig,
    timing: &SweepTiming,
    cancel: &AtomicBool,
) -> Result<SweepOutcome> {
    let configuring = device_failure(Collaborator::Sweep, SessionState::Configuring);
    sweep
        .standby(false)
        .and_then(|_| sweep.reset())
        .and_then(|_| sweep.configure(config))
        .map_err(configuring)?;
    sweep
        .trigger()
        .map_err(device_failure(Collaborator::Sweep, SessionState::Transmitting))?;
    poll_until_complete(sweep, config, timing, Some(cancel), SessionState::Transmitting)
}
