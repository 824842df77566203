//! Error types for the capture layer, the device collaborators and sessions

use std::{fmt, io, time::Duration};

use thiserror::Error;

use crate::session::SessionState;

/// Result type for bench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while bringing up a link capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not open a link capture on {interface}: {reason}")]
    Open { interface: String, reason: String },

    #[error("pcap: {0}")]
    Pcap(#[from] pcap::Error),

    #[error("could not allocate a {capacity} byte capture cache")]
    CacheAllocation { capacity: usize },

    #[error("failed to spawn the capture worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Failures reported by a device collaborator (sweep generator, gain control, front-end)
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device did not answer or identified itself wrongly
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The device refused a parameter or a register write did not read back
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("bus error: {0}")]
    Bus(#[from] io::Error),
}

/// A parameter was outside what the hardware accepts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("increment count {0} outside 2..=4095")]
    IncrementCount(u16),

    #[error("dwell value {0} outside 2..=2047")]
    Dwell(u16),

    #[error("clock multiplier {0} is not one of 1, 5, 100, 500")]
    ClockMultiplier(u16),

    #[error("waveform code {0} is not one of 0 (sine), 1 (triangle), 2 (square)")]
    Waveform(u8),

    #[error("gain {0} dB outside 0..=80")]
    Gain(u8),

    #[error("gain ramps must ascend, got {start} dB -> {end} dB")]
    DescendingRamp { start: u8, end: u8 },

    #[error("ramp duration {value} us outside {min}..={max} us")]
    RampDuration { value: u32, min: u32, max: u32 },
}

/// Which collaborator a [`DeviceError`] came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collaborator {
    Sweep,
    Gain,
    FrontEnd,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Sweep => "sweep generator",
            Collaborator::Gain => "gain control",
            Collaborator::FrontEnd => "acquisition front-end",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Capture open, cache allocation or worker spawn failed
    #[error("capture engine failed to start on {interface}: {source}")]
    EngineStart {
        interface: String,
        #[source]
        source: CaptureError,
    },

    #[error("{device} failed while {state}: {source}")]
    Device {
        device: Collaborator,
        state: SessionState,
        #[source]
        source: DeviceError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("sweep did not complete within {0:?}")]
    SweepTimeout(Duration),

    #[error("failed to spawn the sweep task: {0}")]
    TaskSpawn(#[source] io::Error),

    #[error("sweep task panicked")]
    TaskPanicked,
}

/// Coarse classification used by callers deciding whether to retry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Something could not be opened or did not answer
    Init,
    /// A parameter was rejected while configuring
    Config,
    /// A fault after the session was running
    Runtime,
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::EngineStart { .. } | Error::TaskSpawn(_) => FailureClass::Init,
            Error::Device {
                source: DeviceError::Handshake(_),
                ..
            } => FailureClass::Init,
            Error::Device {
                state: SessionState::Configuring,
                ..
            } => FailureClass::Config,
            Error::Config(_) => FailureClass::Config,
            Error::Device { .. } | Error::SweepTimeout(_) | Error::TaskPanicked => {
                FailureClass::Runtime
            }
        }
    }
}

/// Wrap a collaborator failure with where it happened
pub(crate) fn device_failure(
    device: Collaborator,
    state: SessionState,
) -> impl FnOnce(DeviceError) -> Error {
    move |source| Error::Device {
        device,
        state,
        source,
    }
}
