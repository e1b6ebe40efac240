//! Spectrum providers: simulated generation and trace replay
//!
//! The provider is the only component touching randomness or I/O for
//! environment state. `next_observation` returns `Ok(None)` when a
//! non-looping trace is exhausted; the engine treats that as a normal end of
//! run. A broken trace source never aborts a run: the provider fails over to
//! the simulated generator and keeps going.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use specq_core::{Result, RngStream, RunConfig, RunContext, SimulationConfig, SpecqError};

/// One spectrum observation: per-channel power readings in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp_s: f64,
    pub powers_db: Vec<f64>,
}

/// Capability interface for spectrum data sources.
pub trait SpectrumProvider: Send {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Next observation in time order; `Ok(None)` means the source is
    /// exhausted and the run should end normally.
    fn next_observation(&mut self) -> Result<Option<Observation>>;
}

/// Stochastic generator: baseline noise floor with Gaussian jitter, plus
/// probabilistic Gaussian interference per channel. Fully determined by its
/// RNG, so seeded runs reproduce exactly.
pub struct SimulatedProvider {
    num_channels: usize,
    sim: SimulationConfig,
    jitter: Normal<f64>,
    interference: Normal<f64>,
    rng: StdRng,
    step: u64,
}

impl SimulatedProvider {
    pub fn new(config: &RunConfig, rng: StdRng) -> Self {
        let sim = config.simulation.clone();
        // Validated config keeps the std-devs finite and non-negative;
        // fall back to a degenerate distribution for a zero spread.
        let jitter = Normal::new(0.0, sim.idle_jitter_db.max(f64::MIN_POSITIVE))
            .unwrap_or_else(|_| Normal::new(0.0, 1.0).unwrap());
        let interference = Normal::new(sim.interference_mean_db, sim.interference_std_db.max(f64::MIN_POSITIVE))
            .unwrap_or_else(|_| Normal::new(20.0, 5.0).unwrap());
        Self {
            num_channels: config.num_channels,
            sim,
            jitter,
            interference,
            rng,
            step: 0,
        }
    }

    fn interference_probability(&self, channel: usize) -> f64 {
        self.sim
            .channel_interference
            .get(channel)
            .copied()
            .unwrap_or(self.sim.interference_probability)
    }
}

impl SpectrumProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        let mut powers_db = Vec::with_capacity(self.num_channels);
        for ch in 0..self.num_channels {
            let mut power = self.sim.noise_floor_db + self.jitter.sample(&mut self.rng);
            if self.rng.gen::<f64>() < self.interference_probability(ch) {
                power += self.interference.sample(&mut self.rng);
            }
            powers_db.push(power);
        }

        let timestamp_s = self.step as f64 * self.sim.sensing_interval_s;
        self.step += 1;
        Ok(Some(Observation {
            timestamp_s,
            powers_db,
        }))
    }
}

/// Replays power readings from a line-oriented trace file:
/// `<timestamp_seconds> <power_ch0> ... <power_ch{N-1}>`, in non-decreasing
/// timestamp order. Malformed lines are skipped with a warning. A mid-run
/// read failure switches to the embedded simulated fallback for the rest of
/// the run.
pub struct TraceProvider {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    num_channels: usize,
    loop_replay: bool,
    fallback: SimulatedProvider,
    failed_over: bool,
    produced_any: bool,
}

impl TraceProvider {
    /// Open a trace for replay. Fails if the file cannot be opened; callers
    /// (the factory) decide whether to fall back.
    pub fn open(path: &Path, config: &RunConfig, fallback_rng: StdRng) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            SpecqError::DataSource(format!("cannot open trace {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(BufReader::new(file)),
            num_channels: config.num_channels,
            loop_replay: config.trace_loop,
            fallback: SimulatedProvider::new(config, fallback_rng),
            failed_over: false,
            produced_any: false,
        })
    }

    fn parse_line(&self, line: &str) -> Option<Observation> {
        let mut fields = line.split_whitespace();
        let timestamp_s: f64 = fields.next()?.parse().ok()?;

        let mut powers_db = Vec::with_capacity(self.num_channels);
        for field in fields {
            powers_db.push(field.parse::<f64>().ok()?);
        }
        if powers_db.len() != self.num_channels {
            return None;
        }
        Some(Observation {
            timestamp_s,
            powers_db,
        })
    }

    fn fail_over(&mut self, reason: &str) {
        warn!(
            path = %self.path.display(),
            reason,
            "trace source failed, falling back to simulated spectrum"
        );
        self.reader = None;
        self.failed_over = true;
    }

    /// Pull the next well-formed line, skipping malformed ones.
    fn next_trace_line(&mut self) -> Option<Observation> {
        loop {
            let reader = self.reader.as_mut()?;
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match self.parse_line(trimmed) {
                        Some(obs) => return Some(obs),
                        None => {
                            warn!(path = %self.path.display(), line = trimmed, "skipping malformed trace line");
                        }
                    }
                }
                Err(e) => {
                    self.fail_over(&format!("read error: {e}"));
                    return None;
                }
            }
        }
    }
}

impl SpectrumProvider for TraceProvider {
    fn name(&self) -> &str {
        "trace-replay"
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        if self.failed_over {
            return self.fallback.next_observation();
        }

        if let Some(obs) = self.next_trace_line() {
            self.produced_any = true;
            return Ok(Some(obs));
        }
        if self.failed_over {
            return self.fallback.next_observation();
        }

        // EOF on a healthy reader. A trace that never yielded a single
        // usable line is a malformed source, not a finished one.
        if !self.produced_any {
            self.fail_over("no usable lines");
            return self.fallback.next_observation();
        }
        if !self.loop_replay {
            info!(path = %self.path.display(), "trace exhausted, ending run");
            return Ok(None);
        }

        match File::open(&self.path) {
            Ok(file) => {
                self.reader = Some(BufReader::new(file));
                match self.next_trace_line() {
                    Some(obs) => Ok(Some(obs)),
                    None => {
                        // Looping a trace with no usable lines would spin forever
                        self.fail_over("no usable lines");
                        self.fallback.next_observation()
                    }
                }
            }
            Err(e) => {
                self.fail_over(&format!("reopen failed: {e}"));
                self.fallback.next_observation()
            }
        }
    }
}

/// Build the provider selected by the configuration. A trace source that
/// cannot be opened falls back to the simulated generator with a warning: a
/// training run must always be able to proceed with some data.
pub fn build_provider(ctx: &RunContext) -> Box<dyn SpectrumProvider> {
    let config = ctx.config();
    let rng = ctx.rng(RngStream::SpectrumProvider);

    match (config.data_source, config.trace_path.as_deref()) {
        (specq_core::DataSource::TraceFile, Some(path)) => {
            match TraceProvider::open(path, config, rng) {
                Ok(provider) => {
                    info!(path = %path.display(), "replaying spectrum trace");
                    Box::new(provider)
                }
                Err(e) => {
                    warn!(error = %e, "trace source unavailable, using simulated spectrum");
                    Box::new(SimulatedProvider::new(config, ctx.rng(RngStream::SpectrumProvider)))
                }
            }
        }
        _ => Box::new(SimulatedProvider::new(config, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::io::Write;

    fn config() -> RunConfig {
        RunConfig {
            seed: Some(1),
            ..Default::default()
        }
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_simulated_is_deterministic_under_seed() {
        let cfg = config();
        let mut a = SimulatedProvider::new(&cfg, rng(42));
        let mut b = SimulatedProvider::new(&cfg, rng(42));

        for _ in 0..50 {
            let x = a.next_observation().unwrap().unwrap();
            let y = b.next_observation().unwrap().unwrap();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_simulated_channel_count_and_timestamps() {
        let cfg = config();
        let mut provider = SimulatedProvider::new(&cfg, rng(7));

        let first = provider.next_observation().unwrap().unwrap();
        let second = provider.next_observation().unwrap().unwrap();
        assert_eq!(first.powers_db.len(), 5);
        assert_eq!(first.timestamp_s, 0.0);
        assert!((second.timestamp_s - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_interference_stays_near_floor() {
        let cfg = RunConfig {
            simulation: SimulationConfig {
                interference_probability: 0.0,
                ..Default::default()
            },
            ..config()
        };
        let mut provider = SimulatedProvider::new(&cfg, rng(3));

        for _ in 0..200 {
            let obs = provider.next_observation().unwrap().unwrap();
            for &p in &obs.powers_db {
                // Floor -70 with sigma-2 jitter never crosses the -60 threshold
                assert!(p < -60.0, "unexpected busy reading {p}");
            }
        }
    }

    #[test]
    fn test_per_channel_interference_override() {
        let cfg = RunConfig {
            simulation: SimulationConfig {
                interference_probability: 1.0,
                channel_interference: vec![0.0, 1.0, 1.0, 1.0, 1.0],
                ..Default::default()
            },
            ..config()
        };
        let mut provider = SimulatedProvider::new(&cfg, rng(3));

        // Interference draws of N(20, 5) over the -70 floor occasionally dip
        // below the -60 threshold, so count busy readings instead of
        // requiring every draw to clear it.
        let mut ch0_busy = 0;
        let mut ch1_busy = 0;
        for _ in 0..100 {
            let obs = provider.next_observation().unwrap().unwrap();
            if obs.powers_db[0] > -60.0 {
                ch0_busy += 1;
            }
            if obs.powers_db[1] > -60.0 {
                ch1_busy += 1;
            }
        }
        assert_eq!(ch0_busy, 0, "channel 0 must stay idle");
        assert!(ch1_busy > 80, "channel 1 busy only {ch1_busy}/100 draws");
    }

    #[test]
    fn test_trace_replay_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "0.0 -70 -55 -70 -70 -70").unwrap();
        writeln!(f, "0.1 -70 -70 -50 -70 -70").unwrap();
        drop(f);

        let mut provider = TraceProvider::open(&path, &config(), rng(1)).unwrap();
        let first = provider.next_observation().unwrap().unwrap();
        assert_eq!(first.timestamp_s, 0.0);
        assert_eq!(first.powers_db[1], -55.0);

        let second = provider.next_observation().unwrap().unwrap();
        assert_eq!(second.powers_db[2], -50.0);

        // EOF without looping ends the run
        assert!(provider.next_observation().unwrap().is_none());
    }

    #[test]
    fn test_trace_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "garbage line").unwrap();
        writeln!(f, "0.0 -70 -70").unwrap(); // wrong channel count
        writeln!(f, "0.1 -70 -70 -70 -70 -50").unwrap();
        drop(f);

        let mut provider = TraceProvider::open(&path, &config(), rng(1)).unwrap();
        let obs = provider.next_observation().unwrap().unwrap();
        assert_eq!(obs.powers_db[4], -50.0);
    }

    #[test]
    fn test_trace_loops_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        std::fs::write(&path, "0.0 -70 -70 -70 -70 -70\n").unwrap();

        let cfg = RunConfig {
            trace_loop: true,
            ..config()
        };
        let mut provider = TraceProvider::open(&path, &cfg, rng(1)).unwrap();
        for _ in 0..5 {
            assert!(provider.next_observation().unwrap().is_some());
        }
    }

    #[test]
    fn test_empty_trace_falls_back_to_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        std::fs::write(&path, "not a trace at all\n").unwrap();

        let cfg = RunConfig {
            trace_loop: true,
            ..config()
        };
        let mut provider = TraceProvider::open(&path, &cfg, rng(1)).unwrap();
        // Every line is malformed; the provider must keep producing data
        let obs = provider.next_observation().unwrap().unwrap();
        assert_eq!(obs.powers_db.len(), 5);
    }

    #[test]
    fn test_unusable_trace_falls_back_without_looping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        std::fs::write(&path, "garbage\nmore garbage\n").unwrap();

        // trace_loop off: a wholly malformed trace must still keep the run
        // fed from the simulated fallback, not end it at EOF
        let mut provider = TraceProvider::open(&path, &config(), rng(1)).unwrap();
        for _ in 0..10 {
            let obs = provider.next_observation().unwrap();
            assert!(obs.is_some(), "run must not end on a malformed trace");
            assert_eq!(obs.unwrap().powers_db.len(), 5);
        }
    }

    #[test]
    fn test_builder_falls_back_on_missing_trace() {
        let cfg = RunConfig {
            data_source: specq_core::DataSource::TraceFile,
            trace_path: Some(PathBuf::from("/nonexistent/spectrum.txt")),
            ..config()
        };
        let ctx = RunContext::new(cfg).unwrap();
        let mut provider = build_provider(&ctx);
        assert_eq!(provider.name(), "simulated");
        assert!(provider.next_observation().unwrap().is_some());
    }
}
