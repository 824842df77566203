//! One acquisition: sweep out, ramp the receive gain, capture what comes back
//!
//! The session drives the bench through a fixed sequence of states on the
//! caller's thread. Capture is armed before the front-end starts streaming and
//! only stopped after it has gone quiet. Whatever was acquired is released on
//! the way out, error or not.

use std::{
    fmt, mem, thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    cache::CacheStats,
    capture::{
        CompletionCallback, FrameCallback, LinkOpener, PacketCaptureEngine, PcapOpener,
        StartOutcome, StopOutcome,
    },
    devices::{Bench, FrontEnd, GainControl, SweepGenerator},
    error::{device_failure, Collaborator, Result},
    ramp::{self, RampPlan, TimingApproximation, DEFAULT_WARN_PERCENT},
    sweep::{poll_until_complete, SweepConfig, SweepTiming},
    vga::{GainMode, GainSpec, RampLimits, RampVoltages, VgaModel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    ArmedListening,
    Transmitting,
    Receiving,
    Draining,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::ArmedListening => "armed and listening",
            SessionState::Transmitting => "transmitting",
            SessionState::Receiving => "receiving",
            SessionState::Draining => "draining",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub sweep: SweepTiming,
    /// Extra receive time after the ramp so in-flight datagrams land
    pub drain_margin: Duration,
    /// Ramp timing error (percent) above which an approximation is reported
    pub warn_percent: f64,
    pub vga: VgaModel,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            sweep: SweepTiming::default(),
            drain_margin: Duration::from_millis(50),
            warn_percent: DEFAULT_WARN_PERCENT,
            vga: VgaModel::default(),
        }
    }
}

pub struct CacheRequest {
    pub capacity_bytes: usize,
    pub on_complete: CompletionCallback,
}

/// Where and how the session captures
pub struct CaptureRequest {
    pub interface: String,
    pub realtime: Option<FrameCallback>,
    pub cache: Option<CacheRequest>,
}

impl CaptureRequest {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            realtime: None,
            cache: None,
        }
    }

    pub fn with_realtime(mut self, handler: FrameCallback) -> Self {
        self.realtime = Some(handler);
        self
    }

    pub fn with_cache(mut self, capacity_bytes: usize, on_complete: CompletionCallback) -> Self {
        self.cache = Some(CacheRequest {
            capacity_bytes,
            on_complete,
        });
        self
    }
}

pub struct SessionPlan {
    /// `None` runs a receive-only session with a host-started ramp
    pub sweep: Option<SweepConfig>,
    pub gain: GainSpec,
    pub capture: CaptureRequest,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Every state entered, in order
    pub trace: Vec<SessionState>,
    pub mode: GainMode,
    pub plan: Option<RampPlan>,
    pub approximation: Option<TimingApproximation>,
    pub capture: Option<StopOutcome>,
    /// Final stats of the session's cache, if it had one
    pub cache: CacheStats,
    pub capture_armed_at: Option<Instant>,
    pub front_end_enabled_at: Option<Instant>,
    pub sweep_completed_at: Option<Instant>,
    pub elapsed: Duration,
}

/// What the session has switched on and must switch off again
#[derive(Debug, Default)]
struct Held {
    sweep_awake: bool,
    gain_touched: bool,
    gain_armed: bool,
    capture_owned: bool,
    /// The owned capture was started with a cache for this session
    capture_cached: bool,
    front_end_enabled: bool,
}

pub struct AcquisitionSession<'a, S, G, F, O: LinkOpener = PcapOpener> {
    bench: &'a mut Bench<S, G, F>,
    engine: &'a PacketCaptureEngine<O>,
    timing: SessionTiming,
    state: SessionState,
    trace: Vec<SessionState>,
    held: Held,
}

impl<'a, S, G, F, O> AcquisitionSession<'a, S, G, F, O>
where
    S: SweepGenerator,
    G: GainControl,
    F: FrontEnd,
    O: LinkOpener,
{
    pub fn new(
        bench: &'a mut Bench<S, G, F>,
        engine: &'a PacketCaptureEngine<O>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            bench,
            engine,
            timing,
            state: SessionState::Idle,
            trace: vec![SessionState::Idle],
            held: Held::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, state: SessionState) {
        debug!(from = %self.state, to = %state, "Session transition");
        self.state = state;
        self.trace.push(state);
    }

    /// Run the whole acquisition and tear the bench back down
    pub fn run(mut self, plan: SessionPlan) -> Result<SessionReport> {
        let started = Instant::now();
        let SessionPlan {
            sweep,
            gain,
            capture,
        } = plan;
        let interface = capture.interface.clone();
        let mut report = SessionReport {
            trace: Vec::new(),
            mode: gain.mode(),
            plan: None,
            approximation: None,
            capture: None,
            cache: CacheStats::default(),
            capture_armed_at: None,
            front_end_enabled_at: None,
            sweep_completed_at: None,
            elapsed: Duration::ZERO,
        };

        info!(
            interface = %interface,
            receive_only = sweep.is_none(),
            "Starting acquisition session"
        );
        self.enter(SessionState::Configuring);
        let outcome = self.execute(sweep, gain, capture, &mut report);
        if let Err(e) = &outcome {
            warn!(state = %self.state, "Session aborted: {}", e);
        }
        self.enter(SessionState::Stopped);
        let teardown = self.teardown(&interface, &mut report);

        report.trace = mem::take(&mut self.trace);
        report.elapsed = started.elapsed();
        outcome?;
        teardown?;
        info!(
            elapsed = ?report.elapsed,
            packets = report.cache.total_packets,
            dropped = report.cache.dropped_packets,
            "Acquisition session finished"
        );
        Ok(report)
    }

    fn execute(
        &mut self,
        sweep: Option<SweepConfig>,
        gain: GainSpec,
        capture: CaptureRequest,
        report: &mut SessionReport,
    ) -> Result<()> {
        let limits = match sweep {
            Some(_) => RampLimits::TRANSCEIVE,
            None => RampLimits::RECEIVE_ONLY,
        };
        if let Some(config) = &sweep {
            config.validate()?;
        }
        let mode = gain.validate(limits)?;
        report.mode = mode;

        if let Some(config) = &sweep {
            self.held.sweep_awake = true;
            let device = &mut self.bench.sweep;
            device
                .standby(false)
                .and_then(|_| device.reset())
                .and_then(|_| device.configure(config))
                .map_err(device_failure(Collaborator::Sweep, SessionState::Configuring))?;
            debug!(%config, "Sweep configured");
        }
        self.configure_gain(&gain, mode, sweep.is_some(), report)?;

        self.enter(SessionState::ArmedListening);
        self.arm_capture(capture)?;
        report.capture_armed_at = Some(Instant::now());

        if let Some(config) = &sweep {
            self.enter(SessionState::Transmitting);
            report.front_end_enabled_at = Some(self.enable_front_end()?);
            self.bench
                .sweep
                .trigger()
                .map_err(device_failure(Collaborator::Sweep, SessionState::Transmitting))?;

            // The sweep-complete line starts the ramp; we only watch for it
            poll_until_complete(
                &mut self.bench.sweep,
                config,
                &self.timing.sweep,
                None,
                SessionState::Transmitting,
            )?;
            report.sweep_completed_at = Some(Instant::now());
            self.enter(SessionState::Receiving);
        } else {
            self.enter(SessionState::Receiving);
            report.front_end_enabled_at = Some(self.enable_front_end()?);
            if mode == GainMode::Ramp {
                self.bench
                    .gain
                    .start()
                    .map_err(device_failure(Collaborator::Gain, SessionState::Receiving))?;
            }
        }

        self.enter(SessionState::Draining);
        let window = Duration::from_micros(gain.ramp_duration_us as u64) + self.timing.drain_margin;
        debug!(?window, "Waiting for the ramp to finish");
        thread::sleep(window);
        Ok(())
    }

    fn configure_gain(
        &mut self,
        gain: &GainSpec,
        mode: GainMode,
        hw_trigger: bool,
        report: &mut SessionReport,
    ) -> Result<()> {
        let failed = || device_failure(Collaborator::Gain, SessionState::Configuring);
        let vga = self.timing.vga;
        self.held.gain_touched = true;
        match mode {
            GainMode::Fixed => {
                let volts = vga.gain_to_voltage(gain.start_gain_db);
                self.bench.gain.configure_fixed(volts).map_err(failed())?;
                debug!(gain_db = gain.start_gain_db, volts, "Fixed gain configured");
            }
            GainMode::Ramp => {
                let volts = RampVoltages::for_spec(&vga, gain);
                let plan = ramp::solve(gain.ramp_duration_us, volts.span());
                info!(%plan, "Gain ramp planned");
                if let Some(approx) = plan.approximation(self.timing.warn_percent) {
                    warn!(
                        target_us = approx.target_duration_us,
                        predicted_us = approx.predicted_duration_us,
                        "Ramp duration is {:.1}% off the request",
                        approx.error_percent
                    );
                    report.approximation = Some(approx);
                }
                self.bench
                    .gain
                    .configure_ramp(volts.low_volts, volts.high_volts, &plan)
                    .map_err(failed())?;
                if hw_trigger {
                    self.bench.gain.enable_hw_trigger().map_err(failed())?;
                }
                report.plan = Some(plan);
            }
        }
        self.held.gain_armed = true;
        Ok(())
    }

    fn arm_capture(&mut self, capture: CaptureRequest) -> Result<()> {
        let CaptureRequest {
            interface,
            realtime,
            cache,
        } = capture;
        let cached = cache.is_some();
        let outcome = match cache {
            Some(CacheRequest {
                capacity_bytes,
                on_complete,
            }) => self
                .engine
                .start_with_cache(&interface, realtime, on_complete, capacity_bytes)?,
            None => self.engine.start(&interface, realtime)?,
        };
        match outcome {
            StartOutcome::Started => {
                self.held.capture_owned = true;
                self.held.capture_cached = cached;
            }
            StartOutcome::AlreadyRunning => warn!(
                interface = %interface,
                "Capture already running, session will leave it as it found it"
            ),
        }
        Ok(())
    }

    fn enable_front_end(&mut self) -> Result<Instant> {
        self.bench
            .front_end
            .set_enabled(true)
            .map_err(device_failure(Collaborator::FrontEnd, self.state))?;
        self.held.front_end_enabled = true;
        Ok(Instant::now())
    }

    /// Release everything in `held`, front-end first and gain control last
    fn teardown(&mut self, interface: &str, report: &mut SessionReport) -> Result<()> {
        let state = self.state;
        let mut first = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                warn!("Teardown step failed: {}", e);
                first.get_or_insert(e);
            }
        };

        if mem::take(&mut self.held.front_end_enabled) {
            note(
                self.bench
                    .front_end
                    .set_enabled(false)
                    .map_err(device_failure(Collaborator::FrontEnd, state)),
            );
        }
        if mem::take(&mut self.held.capture_owned) {
            report.capture = Some(self.engine.stop(interface));
            if mem::take(&mut self.held.capture_cached) {
                report.cache = self.engine.cache_stats();
            }
        }
        if mem::take(&mut self.held.sweep_awake) {
            let device = &mut self.bench.sweep;
            note(
                device
                    .reset()
                    .and_then(|_| device.standby(true))
                    .map_err(device_failure(Collaborator::Sweep, state)),
            );
        }
        if mem::take(&mut self.held.gain_armed) {
            note(
                self.bench
                    .gain
                    .stop()
                    .map_err(device_failure(Collaborator::Gain, state)),
            );
        }
        if mem::take(&mut self.held.gain_touched) {
            self.bench.gain.release();
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheSnapshot,
        capture::EngineConfig,
        error::{ConfigError, Error, FailureClass},
        lock,
        sweep::ClockMultiplier,
        sim::{
            BenchEvent, BenchLog, Fault, SimulatedFrontEnd, SimulatedGain, SimulatedOpener,
            SimulatedSweep,
        },
    };
    use std::sync::{Arc, Mutex};

    type SimBench = Bench<SimulatedSweep, SimulatedGain, SimulatedFrontEnd>;

    struct Rig {
        log: BenchLog,
        bench: SimBench,
        engine: PacketCaptureEngine<SimulatedOpener>,
    }

    fn rig(sweep_time: Duration, burst: usize) -> Rig {
        let log = BenchLog::new();
        let (opener, link) = SimulatedOpener::new(log.clone());
        let engine = PacketCaptureEngine::with_opener(
            opener,
            EngineConfig {
                read_timeout: Duration::from_millis(2),
                ..Default::default()
            },
        );
        let bench = Bench::new(
            SimulatedSweep::new(log.clone(), sweep_time),
            SimulatedGain::new(log.clone()),
            SimulatedFrontEnd::new(log.clone()).streaming(link, vec![vec![0xab; 100]; burst]),
        );
        Rig { log, bench, engine }
    }

    fn timing() -> SessionTiming {
        SessionTiming {
            sweep: SweepTiming {
                poll_interval: Duration::from_micros(10),
                timeout: Some(Duration::from_secs(2)),
            },
            drain_margin: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn plan(sweep: Option<SweepConfig>, gain: GainSpec) -> SessionPlan {
        SessionPlan {
            sweep,
            gain,
            capture: CaptureRequest::new("sim0"),
        }
    }

    fn is(event: BenchEvent) -> impl Fn(&BenchEvent) -> bool {
        move |e| *e == event
    }

    #[test]
    fn full_ramp_session_orders_capture_around_front_end() {
        let mut rig = rig(Duration::from_millis(5), 3);
        let delivered: Arc<Mutex<Option<CacheSnapshot>>> = Arc::new(Mutex::new(None));
        let sink = delivered.clone();
        let session_plan = SessionPlan {
            sweep: Some(SweepConfig::default()),
            gain: GainSpec::new(0, 80, 60_000),
            capture: CaptureRequest::new("sim0").with_cache(
                64 * 1024,
                Box::new(move |snapshot| *lock(&sink) = Some(snapshot)),
            ),
        };
        let report = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(session_plan)
            .unwrap();

        let log = &rig.log;
        assert_eq!(log.count(is(BenchEvent::HwTriggerEnabled)), 1);
        let opened = log.position(is(BenchEvent::LinkOpened("sim0".into()))).unwrap();
        let enabled = log.position(is(BenchEvent::FrontEnd(true))).unwrap();
        let disabled = log.position(is(BenchEvent::FrontEnd(false))).unwrap();
        let closed = log.position(is(BenchEvent::LinkClosed("sim0".into()))).unwrap();
        assert!(opened < enabled);
        assert!(enabled < log.position(is(BenchEvent::SweepTriggered)).unwrap());
        assert!(disabled < closed);
        assert!(report.capture_armed_at.unwrap() <= report.front_end_enabled_at.unwrap());
        let link_up = log.first_time(is(BenchEvent::LinkOpened("sim0".into()))).unwrap();
        let streaming = log.first_time(is(BenchEvent::FrontEnd(true))).unwrap();
        assert!(link_up <= streaming);
        assert!(report.sweep_completed_at.unwrap() >= streaming);

        let plan = report.plan.unwrap();
        assert_eq!((plan.rate_index, plan.step_index), (4, 0));
        assert!(report.approximation.is_none());
        assert_eq!(
            report.trace,
            vec![
                SessionState::Idle,
                SessionState::Configuring,
                SessionState::ArmedListening,
                SessionState::Transmitting,
                SessionState::Receiving,
                SessionState::Draining,
                SessionState::Stopped,
            ]
        );

        assert_eq!(report.capture, Some(StopOutcome::Stopped { delivered: true }));
        assert_eq!(report.cache.total_packets, 3);
        assert_eq!(lock(&delivered).as_ref().unwrap().total_bytes(), 300);

        let events = log.events();
        let tail = &events[events.len() - 4..];
        assert_eq!(
            tail,
            &[
                BenchEvent::SweepReset,
                BenchEvent::SweepStandby(true),
                BenchEvent::GainStopped,
                BenchEvent::GainReleased,
            ]
        );
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn equal_gains_skip_solver_and_trigger_line() {
        let mut rig = rig(Duration::from_millis(1), 0);
        let report = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(30, 30, 1_000)))
            .unwrap();
        assert_eq!(report.mode, GainMode::Fixed);
        assert!(report.plan.is_none());
        assert_eq!(rig.log.count(is(BenchEvent::HwTriggerEnabled)), 0);
        assert_eq!(
            rig.log
                .count(|e| matches!(e, BenchEvent::GainRamp { .. })),
            0
        );
        assert_eq!(
            rig.log
                .count(|e| matches!(e, BenchEvent::GainFixed { .. })),
            1
        );
        // No packets means nothing to deliver
        assert_eq!(report.capture, Some(StopOutcome::Stopped { delivered: false }));
    }

    #[test]
    fn descending_ramp_touches_nothing() {
        let mut rig = rig(Duration::from_millis(1), 0);
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(60, 20, 60_000)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::DescendingRamp { start: 60, end: 20 })
        ));
        assert_eq!(err.class(), FailureClass::Config);
        assert!(rig.log.events().is_empty());
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn gain_write_failure_parks_sweep_and_never_opens_link() {
        let mut rig = rig(Duration::from_millis(1), 0);
        rig.bench.gain = SimulatedGain::new(rig.log.clone()).with_fault(Fault::Configure);
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(0, 80, 60_000)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device {
                device: Collaborator::Gain,
                state: SessionState::Configuring,
                ..
            }
        ));
        assert_eq!(err.class(), FailureClass::Config);
        let events = rig.log.events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, BenchEvent::LinkOpened(_))));
        assert_eq!(
            &events[events.len() - 3..],
            &[
                BenchEvent::SweepReset,
                BenchEvent::SweepStandby(true),
                BenchEvent::GainReleased,
            ]
        );
    }

    #[test]
    fn front_end_failure_still_closes_the_capture() {
        let mut rig = rig(Duration::from_millis(1), 0);
        rig.bench.front_end = SimulatedFrontEnd::new(rig.log.clone()).with_fault(Fault::Enable);
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(0, 80, 60_000)))
            .unwrap_err();
        assert_eq!(err.class(), FailureClass::Runtime);
        assert_eq!(rig.log.count(is(BenchEvent::LinkClosed("sim0".into()))), 1);
        // It never came on, so it is not switched off
        assert_eq!(rig.log.count(is(BenchEvent::FrontEnd(false))), 0);
        assert_eq!(rig.log.count(is(BenchEvent::SweepTriggered)), 0);
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn stuck_sweep_times_out_and_tears_down() {
        let mut rig = rig(Duration::from_secs(60), 0);
        let mut timing = timing();
        timing.sweep.timeout = Some(Duration::from_millis(20));
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing)
            .run(plan(Some(SweepConfig::default()), GainSpec::new(0, 80, 60_000)))
            .unwrap_err();
        assert!(matches!(err, Error::SweepTimeout(_)));
        assert_eq!(rig.log.count(is(BenchEvent::FrontEnd(false))), 1);
        assert_eq!(rig.log.count(is(BenchEvent::SweepStandby(true))), 1);
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn sweep_poll_failure_is_reported_while_transmitting() {
        let mut rig = rig(Duration::from_millis(1), 0);
        rig.bench.sweep = SimulatedSweep::new(rig.log.clone(), Duration::from_millis(1))
            .with_fault(Fault::Poll);
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(0, 80, 60_000)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device {
                device: Collaborator::Sweep,
                state: SessionState::Transmitting,
                ..
            }
        ));
        assert_eq!(rig.log.count(is(BenchEvent::SweepTriggered)), 1);
        assert_eq!(rig.log.count(is(BenchEvent::LinkClosed("sim0".into()))), 1);
    }

    #[test]
    fn sweep_longer_than_ten_seconds_runs_to_completion() {
        let longest = SweepConfig {
            increment_count: 4095,
            dwell: 2047,
            clock_multiplier: ClockMultiplier::X500,
            ..Default::default()
        };
        let run_time = Duration::from_secs(12);
        let mut rig = rig(run_time, 0);
        let timing = SessionTiming {
            drain_margin: Duration::from_millis(5),
            ..Default::default()
        };
        assert!(timing.sweep.timeout_for(&longest) > run_time);

        let report = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing)
            .run(plan(Some(longest), GainSpec::new(20, 20, 1_000)))
            .unwrap();
        let waited = report
            .sweep_completed_at
            .unwrap()
            .saturating_duration_since(report.front_end_enabled_at.unwrap());
        assert!(waited >= run_time);
        assert!(report.trace.contains(&SessionState::Draining));
    }

    #[test]
    fn uncached_session_reports_no_stale_cache() {
        let mut rig = rig(Duration::from_millis(1), 3);
        let cached = SessionPlan {
            sweep: Some(SweepConfig::default()),
            gain: GainSpec::new(10, 10, 50_000),
            capture: CaptureRequest::new("sim0").with_cache(4096, Box::new(|_| {})),
        };
        let first = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(cached)
            .unwrap();
        assert_eq!(first.cache.total_packets, 3);
        assert_eq!(first.cache.cache_capacity, 4096);

        let second = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(10, 10, 1_000)))
            .unwrap();
        assert_eq!(second.capture, Some(StopOutcome::Stopped { delivered: false }));
        assert_eq!(second.cache, CacheStats::default());
    }

    #[test]
    fn receive_only_starts_ramp_from_host() {
        let mut rig = rig(Duration::from_millis(1), 1);
        let report = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(None, GainSpec::new(0, 40, 6_000)))
            .unwrap();
        assert_eq!(rig.log.count(is(BenchEvent::GainStarted)), 1);
        assert_eq!(rig.log.count(is(BenchEvent::HwTriggerEnabled)), 0);
        assert_eq!(
            rig.log
                .count(|e| matches!(e, BenchEvent::SweepStandby(_) | BenchEvent::SweepTriggered)),
            0
        );
        assert!(!report.trace.contains(&SessionState::Transmitting));
        assert!(report.sweep_completed_at.is_none());
    }

    #[test]
    fn receive_only_has_its_own_duration_range() {
        let mut rig = rig(Duration::from_millis(1), 0);
        let err = AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(None, GainSpec::new(0, 40, 3_000)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::RampDuration { min: 6_000, .. })
        ));
    }

    #[test]
    fn session_leaves_a_foreign_capture_running() {
        let mut rig = rig(Duration::from_millis(1), 0);
        rig.engine.start("sim0", None).unwrap();
        AcquisitionSession::new(&mut rig.bench, &rig.engine, timing())
            .run(plan(Some(SweepConfig::default()), GainSpec::new(10, 10, 1_000)))
            .unwrap();
        assert!(rig.engine.is_running());
        rig.engine.stop("sim0");
    }
}
