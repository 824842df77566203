use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use sbeam::{
    capture::frame_channel,
    datagram::DatagramCounter,
    ramp::{self, DEFAULT_WARN_PERCENT},
    session::{AcquisitionSession, CaptureRequest, SessionPlan, SessionTiming},
    sim::{self, BenchLog, SimulatedFrontEnd, SimulatedGain, SimulatedOpener, SimulatedSweep},
    sweep::{spawn_sweep, SweepTiming},
    vga::{RampVoltages, VgaModel},
    Bench, CacheSnapshot, EngineConfig, PacketCaptureEngine,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{info, warn};

mod args;
use args::{Args, CaptureArgs, Command, GainArgs, GenerateArgs, RunArgs};

const CHANNEL_DEPTH: usize = 4096;
/// Frames the simulated front-end emits per acquisition
const SIM_BURST: usize = 64;
const SIM_PAYLOAD_BYTES: usize = 1024;
const SIM_SWEEP_TIME: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args::convert_filter(args.verbose.log_level_filter()))
        .init();

    match args.command {
        Command::Run(run) => run_session(run),
        Command::Generate(generate) => run_generate(generate),
        Command::Capture(capture) => run_capture(capture),
        Command::Solve(gain) => run_solve(gain),
    }
}

/// Count datagrams off the worker thread until the capture drops its sender
fn spawn_counter(port: u16) -> Result<(sbeam::capture::FrameCallback, JoinHandle<DatagramCounter>)> {
    let (realtime, frames) = frame_channel(CHANNEL_DEPTH);
    let handle = thread::Builder::new()
        .name("counter".to_string())
        .spawn(move || {
            let mut counter = DatagramCounter::new(port);
            for frame in frames {
                counter.observe(&frame);
            }
            counter
        })?;
    Ok((realtime, handle))
}

fn summarize_cache(port: u16) -> Box<dyn FnOnce(CacheSnapshot) + Send> {
    Box::new(move |snapshot| {
        let counter = DatagramCounter::tally(port, snapshot.packets());
        info!(
            finished_at = %Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            packets = snapshot.total_packets(),
            bytes = snapshot.total_bytes(),
            dropped = snapshot.dropped_packets,
            "Cache delivered: {}",
            counter
        );
    })
}

fn run_session(run: RunArgs) -> Result<()> {
    if !run.simulate {
        bail!("No hardware backend is linked into this build, pass --simulate to use the simulated bench");
    }
    let port = run.target.port;
    let log = BenchLog::new();
    let (opener, link) = SimulatedOpener::new(log.clone());
    let burst = sim::acquisition_frames(SIM_BURST, SIM_PAYLOAD_BYTES, port)?;
    let mut bench = Bench::new(
        SimulatedSweep::new(log.clone(), SIM_SWEEP_TIME),
        SimulatedGain::new(log.clone()),
        SimulatedFrontEnd::new(log.clone()).streaming(link, burst),
    );
    let engine = PacketCaptureEngine::with_opener(opener, EngineConfig::default());

    let (realtime, counter) = spawn_counter(port)?;
    let mut capture = CaptureRequest::new(run.target.device_name.clone()).with_realtime(realtime);
    if run.target.with_cache {
        capture = capture.with_cache(run.target.cache_bytes(), summarize_cache(port));
    }
    let plan = SessionPlan {
        sweep: (!run.receive_only).then(|| run.sweep.config()),
        gain: run.gain.spec(),
        capture,
    };
    let timing = SessionTiming {
        sweep: SweepTiming {
            timeout: run.sweep_timeout_s.map(Duration::from_secs),
            ..Default::default()
        },
        drain_margin: Duration::from_millis(run.drain_ms),
        ..Default::default()
    };

    let report = AcquisitionSession::new(&mut bench, &engine, timing).run(plan)?;
    let counted = counter
        .join()
        .map_err(|_| anyhow::anyhow!("Datagram counter panicked"))?;

    if let Some(plan) = &report.plan {
        info!(%plan, "Ramp");
    }
    if let Some(approx) = &report.approximation {
        warn!(
            "Ramp runs {:.0} us for a {} us request",
            approx.predicted_duration_us, approx.target_duration_us
        );
    }
    if let (Some(armed), Some(enabled)) = (report.capture_armed_at, report.front_end_enabled_at) {
        info!(lead = ?enabled.saturating_duration_since(armed), "Capture armed ahead of front-end");
    }
    info!(
        states = ?report.trace,
        elapsed = ?report.elapsed,
        cache_utilisation_pct = report.cache.utilisation(),
        "Session complete: {}",
        counted
    );
    Ok(())
}

fn run_generate(generate: GenerateArgs) -> Result<()> {
    if !generate.simulate {
        bail!("No hardware backend is linked into this build, pass --simulate to use the simulated bench");
    }
    let config = generate.sweep.config();
    let timing = SweepTiming {
        timeout: generate.timeout_s.map(Duration::from_secs),
        ..Default::default()
    };
    info!(%config, timeout = ?timing.timeout_for(&config), "Transmitting");
    let sweep = SimulatedSweep::new(BenchLog::new(), SIM_SWEEP_TIME);
    let task = spawn_sweep(sweep, config, timing)?;
    let finished = task.wait()?;
    let outcome = finished.outcome?;
    info!(?outcome, "Sweep done");
    Ok(())
}

fn run_capture(capture: CaptureArgs) -> Result<()> {
    let target = capture.target;
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let engine = PacketCaptureEngine::new(EngineConfig::default());
    let (realtime, counter) = spawn_counter(target.port)?;
    if target.with_cache {
        engine.start_with_cache(
            &target.device_name,
            Some(realtime),
            summarize_cache(target.port),
            target.cache_bytes(),
        )?;
    } else {
        engine.start(&target.device_name, Some(realtime))?;
    }

    let deadline = capture
        .seconds
        .map(|s| Instant::now() + Duration::from_secs(s));
    let mut last_report = Instant::now();
    while !stop.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        thread::sleep(Duration::from_millis(100));
        if target.with_cache && last_report.elapsed() >= Duration::from_secs(1) {
            let stats = engine.cache_stats();
            info!(
                packets = stats.total_packets,
                dropped = stats.dropped_packets,
                "Cache {:.1}% full",
                stats.utilisation()
            );
            last_report = Instant::now();
        }
    }

    let outcome = engine.stop(&target.device_name);
    let counted = counter
        .join()
        .map_err(|_| anyhow::anyhow!("Datagram counter panicked"))?;
    info!(?outcome, "Capture finished: {}", counted);
    Ok(())
}

fn run_solve(gain: GainArgs) -> Result<()> {
    let spec = gain.spec();
    let volts = RampVoltages::for_spec(&VgaModel::default(), &spec);
    let plan = ramp::solve(spec.ramp_duration_us, volts.span());
    let (low_code, high_code) = volts.codes();
    println!("{plan}");
    println!(
        "margins {:.4} V (code {}) .. {:.4} V (code {})",
        volts.low_volts, low_code, volts.high_volts, high_code
    );
    if let Some(approx) = plan.approximation(DEFAULT_WARN_PERCENT) {
        println!(
            "warning: best match is {:.2}% off the requested {} us",
            approx.error_percent, approx.target_duration_us
        );
    }
    Ok(())
}
