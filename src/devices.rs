//! Interfaces to the bench hardware
//!
//! Register layouts and bus transport live behind these traits. A session only
//! needs the operations below; [`crate::sim`] provides software stand-ins.

use crate::{error::DeviceError, ramp::RampPlan, sweep::SweepConfig};

/// Result type for collaborator calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// The DDS that produces the transmit frequency sweep
pub trait SweepGenerator {
    /// Load the sweep parameters; the sweep does not start until [`trigger`](Self::trigger)
    fn configure(&mut self, config: &SweepConfig) -> DeviceResult<()>;

    fn trigger(&mut self) -> DeviceResult<()>;

    /// Whether the last triggered sweep has finished
    fn is_complete(&mut self) -> DeviceResult<bool>;

    fn reset(&mut self) -> DeviceResult<()>;

    /// Enter (`true`) or leave (`false`) low-power standby
    fn standby(&mut self, enable: bool) -> DeviceResult<()>;
}

/// The DAC that drives the receive VGA's gain-control voltage
pub trait GainControl {
    /// Hold a constant output voltage
    fn configure_fixed(&mut self, volts: f64) -> DeviceResult<()>;

    /// Prepare a ramp from `max_volts` down to `min_volts` with the planned slew and step
    fn configure_ramp(&mut self, min_volts: f64, max_volts: f64, plan: &RampPlan)
        -> DeviceResult<()>;

    /// Let the sweep-complete line start the ramp without host involvement
    fn enable_hw_trigger(&mut self) -> DeviceResult<()>;

    fn start(&mut self) -> DeviceResult<()>;

    fn stop(&mut self) -> DeviceResult<()>;

    /// Give up the bus handle; the device must be reconfigured before reuse
    fn release(&mut self);
}

/// The acquisition block that streams samples as datagrams while enabled
pub trait FrontEnd {
    fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()>;
}

/// The three collaborators a session drives
pub struct Bench<S, G, F> {
    pub sweep: S,
    pub gain: G,
    pub front_end: F,
}

impl<S, G, F> Bench<S, G, F>
where
    S: SweepGenerator,
    G: GainControl,
    F: FrontEnd,
{
    pub fn new(sweep: S, gain: G, front_end: F) -> Self {
        Self {
            sweep,
            gain,
            front_end,
        }
    }
}
