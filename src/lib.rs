use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cache;
pub mod capture;
pub mod datagram;
pub mod devices;
pub mod error;
pub mod ramp;
pub mod session;
pub mod sim;
pub mod sweep;
pub mod vga;

pub use cache::{CacheSnapshot, CacheStats, CaptureCache};
pub use capture::{EngineConfig, PacketCaptureEngine, StartOutcome, StopOutcome};
pub use devices::{Bench, FrontEnd, GainControl, SweepGenerator};
pub use error::{Error, Result};
pub use ramp::{solve, RampPlan};
pub use session::{AcquisitionSession, CaptureRequest, SessionPlan, SessionReport, SessionTiming};
pub use sweep::{spawn_sweep, SweepConfig, SweepTask};
pub use vga::GainSpec;

/// UDP port the acquisition front-end sends to
pub const ACQUISITION_PORT: u16 = 5030;
/// Typical acquisition frame on the wire, used to size a cache's packet index
pub const NOMINAL_FRAME_BYTES: usize = 1066;
/// Fewest frames any cache admits
pub const PACKET_FLOOR: usize = 1024;
pub const DEFAULT_CACHE_BYTES: usize = 500 * 1024 * 1024;

/// Lock a mutex, carrying on with the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
