//! Software stand-ins for the bench hardware
//!
//! Every simulated collaborator appends to one shared [`BenchLog`], so the
//! relative order of calls across devices (and the capture link) can be
//! checked after a run.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use etherparse::{PacketBuilder, WriteError};
use tracing::trace;

use crate::{
    capture::{EngineConfig, LinkOpener, LinkSource},
    devices::{DeviceResult, FrontEnd, GainControl, SweepGenerator},
    error::{CaptureError, DeviceError},
    ramp::RampPlan,
    sweep::SweepConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub enum BenchEvent {
    SweepConfigured(SweepConfig),
    SweepTriggered,
    SweepReset,
    SweepStandby(bool),
    GainFixed { volts: f64 },
    GainRamp { min_volts: f64, max_volts: f64, rate_index: u8, step_index: u8 },
    HwTriggerEnabled,
    GainStarted,
    GainStopped,
    GainReleased,
    FrontEnd(bool),
    LinkOpened(String),
    LinkClosed(String),
}

/// Ordered, timestamped record of everything the simulated bench was asked to do
#[derive(Debug, Clone, Default)]
pub struct BenchLog {
    inner: Arc<Mutex<Vec<(Instant, BenchEvent)>>>,
}

impl BenchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: BenchEvent) {
        trace!(?event, "bench");
        crate::lock(&self.inner).push((Instant::now(), event));
    }

    pub fn events(&self) -> Vec<BenchEvent> {
        crate::lock(&self.inner)
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// When the first event matching `pred` was recorded
    pub fn first_time(&self, pred: impl Fn(&BenchEvent) -> bool) -> Option<Instant> {
        crate::lock(&self.inner)
            .iter()
            .find(|(_, e)| pred(e))
            .map(|(t, _)| *t)
    }

    pub fn count(&self, pred: impl Fn(&BenchEvent) -> bool) -> usize {
        crate::lock(&self.inner).iter().filter(|(_, e)| pred(e)).count()
    }

    /// Position of the first matching event
    pub fn position(&self, pred: impl Fn(&BenchEvent) -> bool) -> Option<usize> {
        crate::lock(&self.inner).iter().position(|(_, e)| pred(e))
    }
}

/// A call to make fail, for exercising error paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Configure,
    Trigger,
    Poll,
    Start,
    Enable,
    Handshake,
}

fn injected(fault: Option<Fault>, at: Fault) -> DeviceResult<()> {
    match fault {
        Some(Fault::Handshake) => Err(DeviceError::Handshake("no response".into())),
        Some(f) if f == at => Err(DeviceError::Rejected(format!("injected {f:?} fault"))),
        _ => Ok(()),
    }
}

/// DDS that finishes a fixed time after being triggered
#[derive(Debug)]
pub struct SimulatedSweep {
    log: BenchLog,
    run_time: Duration,
    triggered_at: Option<Instant>,
    fault: Option<Fault>,
}

impl SimulatedSweep {
    pub fn new(log: BenchLog, run_time: Duration) -> Self {
        Self {
            log,
            run_time,
            triggered_at: None,
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl SweepGenerator for SimulatedSweep {
    fn configure(&mut self, config: &SweepConfig) -> DeviceResult<()> {
        injected(self.fault, Fault::Configure)?;
        self.log.record(BenchEvent::SweepConfigured(*config));
        Ok(())
    }

    fn trigger(&mut self) -> DeviceResult<()> {
        injected(self.fault, Fault::Trigger)?;
        self.triggered_at = Some(Instant::now());
        self.log.record(BenchEvent::SweepTriggered);
        Ok(())
    }

    fn is_complete(&mut self) -> DeviceResult<bool> {
        injected(self.fault, Fault::Poll)?;
        Ok(self
            .triggered_at
            .map_or(false, |t| t.elapsed() >= self.run_time))
    }

    fn reset(&mut self) -> DeviceResult<()> {
        self.triggered_at = None;
        self.log.record(BenchEvent::SweepReset);
        Ok(())
    }

    fn standby(&mut self, enable: bool) -> DeviceResult<()> {
        self.log.record(BenchEvent::SweepStandby(enable));
        Ok(())
    }
}

/// Gain DAC that only records what it was told
#[derive(Debug)]
pub struct SimulatedGain {
    log: BenchLog,
    fault: Option<Fault>,
}

impl SimulatedGain {
    pub fn new(log: BenchLog) -> Self {
        Self { log, fault: None }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl GainControl for SimulatedGain {
    fn configure_fixed(&mut self, volts: f64) -> DeviceResult<()> {
        injected(self.fault, Fault::Configure)?;
        self.log.record(BenchEvent::GainFixed { volts });
        Ok(())
    }

    fn configure_ramp(
        &mut self,
        min_volts: f64,
        max_volts: f64,
        plan: &RampPlan,
    ) -> DeviceResult<()> {
        injected(self.fault, Fault::Configure)?;
        self.log.record(BenchEvent::GainRamp {
            min_volts,
            max_volts,
            rate_index: plan.rate_index,
            step_index: plan.step_index,
        });
        Ok(())
    }

    fn enable_hw_trigger(&mut self) -> DeviceResult<()> {
        self.log.record(BenchEvent::HwTriggerEnabled);
        Ok(())
    }

    fn start(&mut self) -> DeviceResult<()> {
        injected(self.fault, Fault::Start)?;
        self.log.record(BenchEvent::GainStarted);
        Ok(())
    }

    fn stop(&mut self) -> DeviceResult<()> {
        self.log.record(BenchEvent::GainStopped);
        Ok(())
    }

    fn release(&mut self) {
        self.log.record(BenchEvent::GainReleased);
    }
}

/// Acquisition block that pushes a burst of frames onto a link when enabled
#[derive(Debug)]
pub struct SimulatedFrontEnd {
    log: BenchLog,
    link: Option<Sender<Vec<u8>>>,
    burst: Vec<Vec<u8>>,
    fault: Option<Fault>,
}

impl SimulatedFrontEnd {
    pub fn new(log: BenchLog) -> Self {
        Self {
            log,
            link: None,
            burst: Vec::new(),
            fault: None,
        }
    }

    /// Frames sent to `link` every time the front-end is enabled
    pub fn streaming(mut self, link: Sender<Vec<u8>>, burst: Vec<Vec<u8>>) -> Self {
        self.link = Some(link);
        self.burst = burst;
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }
}

impl FrontEnd for SimulatedFrontEnd {
    fn set_enabled(&mut self, enabled: bool) -> DeviceResult<()> {
        if enabled {
            injected(self.fault, Fault::Enable)?;
        }
        self.log.record(BenchEvent::FrontEnd(enabled));
        if let (true, Some(link)) = (enabled, &self.link) {
            for frame in &self.burst {
                // Nobody listening is the same as nobody capturing
                let _ = link.send(frame.clone());
            }
        }
        Ok(())
    }
}

/// Ethernet/IPv4/UDP frames addressed the way the front-end addresses its datagrams
pub fn acquisition_frames(
    count: usize,
    payload_len: usize,
    port: u16,
) -> Result<Vec<Vec<u8>>, WriteError> {
    (0..count)
        .map(|i| {
            let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 0x30], [0xff; 6])
                .ipv4([192, 168, 0, 30], [192, 168, 0, 1], 64)
                .udp(port, port);
            let payload = vec![i as u8; payload_len];
            let mut frame = Vec::with_capacity(builder.size(payload_len));
            builder.write(&mut frame, &payload)?;
            Ok(frame)
        })
        .collect()
}

/// Opens in-memory links fed from one shared channel
pub struct SimulatedOpener {
    log: BenchLog,
    frames: Receiver<Vec<u8>>,
    opens: AtomicUsize,
    fail: bool,
}

impl SimulatedOpener {
    /// Returns the opener and the sender that injects frames into any link it opens
    pub fn new(log: BenchLog) -> (Self, Sender<Vec<u8>>) {
        let (tx, rx) = unbounded();
        (
            Self {
                log,
                frames: rx,
                opens: AtomicUsize::new(0),
                fail: false,
            },
            tx,
        )
    }

    /// Make every open fail as if the interface did not exist
    pub fn failing_open(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl LinkOpener for SimulatedOpener {
    fn open(
        &self,
        interface: &str,
        config: &EngineConfig,
    ) -> Result<Box<dyn LinkSource>, CaptureError> {
        if self.fail {
            return Err(CaptureError::Open {
                interface: interface.to_owned(),
                reason: "no such device".into(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.log.record(BenchEvent::LinkOpened(interface.to_owned()));
        Ok(Box::new(SimulatedLink {
            interface: interface.to_owned(),
            log: self.log.clone(),
            frames: self.frames.clone(),
            read_timeout: config.read_timeout,
            current: Vec::new(),
        }))
    }
}

struct SimulatedLink {
    interface: String,
    log: BenchLog,
    frames: Receiver<Vec<u8>>,
    read_timeout: Duration,
    current: Vec<u8>,
}

impl LinkSource for SimulatedLink {
    fn next_frame(&mut self) -> Result<Option<&[u8]>, CaptureError> {
        match self.frames.recv_timeout(self.read_timeout) {
            Ok(frame) => {
                self.current = frame;
                Ok(Some(&self.current))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Open {
                interface: self.interface.clone(),
                reason: "link went away".into(),
            }),
        }
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.log
            .record(BenchEvent::LinkClosed(std::mem::take(&mut self.interface)));
    }
}
