//! Argument parsing for running from the command line

use clap::{Parser, Subcommand};
use sbeam::{
    sweep::{ClockMultiplier, SweepConfig, SweepDirection, Waveform},
    vga::GainSpec,
    ACQUISITION_PORT,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sweep out, ramp the receive gain and capture the returning datagrams
    Run(RunArgs),
    /// Transmit one sweep and wait for it to finish
    Generate(GenerateArgs),
    /// Capture datagrams without touching the bench
    Capture(CaptureArgs),
    /// Print the slew/step settings chosen for a gain ramp
    Solve(GainArgs),
}

#[derive(clap::Args, Debug)]
pub struct SweepArgs {
    /// Sweep start frequency in Hz
    #[clap(long, default_value_t = 500_000)]
    pub start_freq: u32,
    /// Frequency increment in Hz
    #[clap(long, default_value_t = 50_000)]
    pub delta_freq: u32,
    /// Number of frequency increments
    #[clap(long, default_value_t = 2)]
    #[clap(value_parser = clap::value_parser!(u16).range(2..=4095))]
    pub num_incr: u16,
    /// 0 = sine, 1 = triangle, 2 = square
    #[clap(long, default_value = "2", value_parser = valid_waveform)]
    pub wave_type: Waveform,
    /// Master clock multiplier (1, 5, 100 or 500)
    #[clap(long, default_value = "1", value_parser = valid_multiplier)]
    pub mclk_mult: ClockMultiplier,
    /// Cycles to dwell on each increment
    #[clap(long, default_value_t = 2)]
    #[clap(value_parser = clap::value_parser!(u16).range(2..=2047))]
    pub interval_val: u16,
    /// Sweep downwards from the start frequency
    #[clap(long)]
    pub negative_sweep: bool,
}

impl SweepArgs {
    pub fn config(&self) -> SweepConfig {
        SweepConfig {
            start_frequency_hz: self.start_freq,
            delta_frequency_hz: self.delta_freq,
            increment_count: self.num_incr,
            waveform: self.wave_type,
            clock_multiplier: self.mclk_mult,
            dwell: self.interval_val,
            direction: if self.negative_sweep {
                SweepDirection::Down
            } else {
                SweepDirection::Up
            },
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct GainArgs {
    /// Receive gain at the start of the ramp, in dB
    #[clap(long, default_value_t = 0)]
    #[clap(value_parser = clap::value_parser!(u8).range(0..=80))]
    pub start_gain: u8,
    /// Receive gain at the end of the ramp, in dB
    #[clap(long, default_value_t = 80)]
    #[clap(value_parser = clap::value_parser!(u8).range(0..=80))]
    pub end_gain: u8,
    /// Ramp duration in microseconds
    #[clap(long, default_value_t = 60_000)]
    pub duration_us: u32,
}

impl GainArgs {
    pub fn spec(&self) -> GainSpec {
        GainSpec::new(self.start_gain, self.end_gain, self.duration_us)
    }
}

#[derive(clap::Args, Debug)]
pub struct CaptureTarget {
    /// Network device to capture packets from
    #[clap(short, long, default_value = "eth0")]
    pub device_name: String,
    /// UDP port the acquisition front-end sends to
    #[clap(short, long, default_value_t = ACQUISITION_PORT)]
    #[clap(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,
    /// Keep every captured frame in memory until the capture stops
    #[clap(long)]
    pub with_cache: bool,
    /// Cache capacity in MiB
    #[clap(long, default_value_t = 500)]
    pub cache_mib: usize,
}

impl CaptureTarget {
    pub fn cache_bytes(&self) -> usize {
        self.cache_mib.saturating_mul(1024 * 1024)
    }
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[clap(flatten)]
    pub sweep: SweepArgs,
    #[clap(flatten)]
    pub gain: GainArgs,
    #[clap(flatten)]
    pub target: CaptureTarget,
    /// Skip the transmit sweep and start the ramp from the host
    #[clap(long)]
    pub receive_only: bool,
    /// Receive time after the ramp, in milliseconds
    #[clap(long, default_value_t = 50)]
    pub drain_ms: u64,
    /// Give up waiting for the sweep after this many seconds [default: derived from the sweep]
    #[clap(long)]
    pub sweep_timeout_s: Option<u64>,
    /// Drive the simulated bench instead of hardware
    #[clap(long)]
    pub simulate: bool,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    #[clap(flatten)]
    pub sweep: SweepArgs,
    /// Give up waiting for the sweep after this many seconds [default: derived from the sweep]
    #[clap(long)]
    pub timeout_s: Option<u64>,
    /// Drive the simulated bench instead of hardware
    #[clap(long)]
    pub simulate: bool,
}

#[derive(clap::Args, Debug)]
pub struct CaptureArgs {
    #[clap(flatten)]
    pub target: CaptureTarget,
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[clap(long)]
    pub seconds: Option<u64>,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn valid_waveform(s: &str) -> Result<Waveform, String> {
    let code = s.parse::<u8>().map_err(|_| "Invalid waveform code".to_string())?;
    Waveform::from_code(code).map_err(|e| e.to_string())
}

fn valid_multiplier(s: &str) -> Result<ClockMultiplier, String> {
    let factor = s
        .parse::<u16>()
        .map_err(|_| "Invalid clock multiplier".to_string())?;
    ClockMultiplier::from_factor(factor).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_build_a_valid_session() {
        let args = Args::try_parse_from(["sbeam", "run", "--simulate"]).unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        let sweep = run.sweep.config();
        assert!(sweep.validate().is_ok());
        assert_eq!(sweep.waveform, Waveform::Square);
        assert_eq!(run.gain.spec(), GainSpec::new(0, 80, 60_000));
        assert_eq!(run.target.port, ACQUISITION_PORT);
        assert_eq!(run.target.cache_bytes(), sbeam::DEFAULT_CACHE_BYTES);
        assert_eq!(run.sweep_timeout_s, None);
    }

    #[test]
    fn sweep_timeout_can_be_raised() {
        let args =
            Args::try_parse_from(["sbeam", "run", "--simulate", "--sweep-timeout-s", "120"])
                .unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.sweep_timeout_s, Some(120));

        let args = Args::try_parse_from(["sbeam", "generate", "--timeout-s", "90"]).unwrap();
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.timeout_s, Some(90));
    }

    #[test]
    fn sweep_flags_map_onto_config() {
        let args = Args::try_parse_from([
            "sbeam",
            "generate",
            "--start-freq",
            "100000",
            "--num-incr",
            "100",
            "--wave-type",
            "0",
            "--mclk-mult",
            "500",
            "--negative-sweep",
        ])
        .unwrap();
        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        let config = generate.sweep.config();
        assert_eq!(config.waveform, Waveform::Sine);
        assert_eq!(config.clock_multiplier, ClockMultiplier::X500);
        assert_eq!(config.direction, SweepDirection::Down);
        assert_eq!(config.final_frequency_hz(), 100_000 - 100 * 50_000);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(Args::try_parse_from(["sbeam", "solve", "--end-gain", "81"]).is_err());
        assert!(Args::try_parse_from(["sbeam", "generate", "--mclk-mult", "3"]).is_err());
        assert!(Args::try_parse_from(["sbeam", "generate", "--num-incr", "1"]).is_err());
    }

    #[test]
    fn filters_line_up() {
        assert_eq!(
            convert_filter(log::LevelFilter::Warn),
            tracing_subscriber::filter::LevelFilter::WARN
        );
    }
}
