// batch runner: concurrent session tasks, durability barrier, stop handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::vr_interface::{base_instant, random_id, LogTransport, SimClock, SimMillis};
use crate::vr_patterns::PatternConfig;
use crate::vr_population::{Population, PopulationConfig, PopulationError};
use crate::vr_session::SessionTask;
use crate::vr_sink::SinkProducer;

// ============================================================================
// Configuration
// ============================================================================

/// Main simulator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Batches to run before stopping. The stop signal can end a run
    /// earlier.
    pub batches: usize,

    /// Random seed for reproducibility. Generated and logged when absent.
    #[serde(skip)]
    pub seed: Option<[u8; 32]>,

    /// Concurrent sessions per batch, uniform in [min, max].
    pub sessions_per_batch: (usize, usize),

    /// Stagger between session starts inside a batch, uniform [min, max) ms.
    pub session_stagger_ms: (SimMillis, SimMillis),

    /// Idle between batches, uniform [min, max) ms.
    pub batch_idle_ms: (SimMillis, SimMillis),

    pub population: PopulationConfig,
    pub patterns: PatternConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            batches: 20,
            seed: None,
            sessions_per_batch: (1, 8),
            session_stagger_ms: (500, 3_000),
            batch_idle_ms: (5_000, 15_000),
            population: PopulationConfig::default(),
            patterns: PatternConfig::default(),
        }
    }
}

// ============================================================================
// Run Statistics
// ============================================================================

/// Cumulative counters for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub batches_completed: usize,
    pub sessions_run: usize,
    pub sessions_truncated: usize,
    pub events_emitted: u64,
    pub events_delivered: u64,
    pub events_failed: u64,
    pub failed_batches: usize,
    /// Simulated time consumed by the run.
    pub sim_elapsed_ms: SimMillis,
}

// ============================================================================
// Stop Signal
// ============================================================================

/// Graceful-stop flag shared with whoever supervises the run. Checked at
/// batch admission and at every session step.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Drives the whole generation side: builds the population once, then runs
/// batches of 1-8 logically concurrent sessions, cooperatively time-sliced
/// on the simulated clock, with a durability barrier after every batch.
///
/// Transient sink trouble is logged and survived; the outer loop never
/// aborts because of it.
pub struct SimulatorRunner<T: LogTransport> {
    config: SimulatorConfig,
    rng: StdRng,
    seed_used: [u8; 32],
    clock: SimClock,
    base: DateTime<Utc>,
    population: Population,
    sink: SinkProducer<T>,
    stop: StopSignal,
    stats: RunStats,
}

impl<T: LogTransport> SimulatorRunner<T> {
    /// Build the runner. The population is generated here, once, from the
    /// run's seed; a degenerate population is a fatal startup error.
    pub fn new(config: SimulatorConfig, sink: SinkProducer<T>) -> Result<Self, PopulationError> {
        let seed = config.seed.unwrap_or_else(|| {
            let mut seed = [0u8; 32];
            rand::thread_rng().fill(&mut seed);
            seed
        });
        let mut rng = StdRng::from_seed(seed);

        let population = Population::generate(&config.population, &mut rng)?;
        info!(
            "population ready: {} videos, {} users",
            population.videos().len(),
            population.users().len()
        );

        Ok(Self {
            config,
            rng,
            seed_used: seed,
            clock: SimClock::new(),
            base: base_instant(),
            population,
            sink,
            stop: StopSignal::new(),
            stats: RunStats::default(),
        })
    }

    /// Seed actually in use, for replaying this run.
    pub fn seed_used(&self) -> [u8; 32] {
        self.seed_used
    }

    /// Handle for requesting a graceful stop.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Run batches until the budget or the stop signal ends the run, then
    /// perform the final flush and release the sink.
    pub fn run(mut self) -> RunStats {
        for batch in 0..self.config.batches {
            if self.stop.is_stopped() {
                info!("stop requested, no new batches admitted");
                break;
            }

            self.run_batch();

            self.stats.batches_completed += 1;
            if self.stats.batches_completed % 5 == 0 {
                info!(
                    "stats: {} batches, {} sessions, {} events emitted, {} delivered, {} failed",
                    self.stats.batches_completed,
                    self.stats.sessions_run,
                    self.stats.events_emitted,
                    self.stats.events_delivered,
                    self.stats.events_failed
                );
            }

            // inter-batch idle models new viewer arrivals
            if batch + 1 < self.config.batches && !self.stop.is_stopped() {
                let idle = self
                    .rng
                    .gen_range(self.config.batch_idle_ms.0..self.config.batch_idle_ms.1);
                self.clock.advance(idle);
            }
        }

        // final barrier so no event survives without a durable record
        let report = self.sink.flush(&mut self.clock);
        if report.failed > 0 {
            warn!("final flush abandoned {} events", report.failed);
            self.stats.events_failed += report.failed as u64;
        }

        self.stats.sim_elapsed_ms = self.clock.now();
        let (delivered, failed) = self.sink.close();
        info!(
            "run finished: {} batches, {} delivered, {} failed, {} ms simulated",
            self.stats.batches_completed, delivered, failed, self.stats.sim_elapsed_ms
        );
        self.stats
    }

    /// One batch: admit sessions, interleave their steps on the clock,
    /// then hold the durability barrier.
    fn run_batch(&mut self) {
        let (lo, hi) = self.config.sessions_per_batch;
        let count = self.rng.gen_range(lo.max(1)..=hi.max(lo.max(1)));
        debug!("starting {} concurrent viewing sessions", count);

        let mut tasks = Vec::with_capacity(count);
        let mut start_at = self.clock.now();
        for _ in 0..count {
            tasks.push(self.admit_session(start_at));
            start_at += self
                .rng
                .gen_range(self.config.session_stagger_ms.0..self.config.session_stagger_ms.1);
        }
        self.stats.sessions_run += tasks.len();

        // cooperative time-slicing: always step the earliest-waking task
        let mut emitted = Vec::new();
        loop {
            if self.stop.is_stopped() {
                for task in tasks.iter_mut().filter(|t| !t.is_done()) {
                    task.truncate();
                    self.stats.sessions_truncated += 1;
                }
                break;
            }

            let next = tasks
                .iter_mut()
                .filter(|t| !t.is_done())
                .min_by_key(|t| t.next_wake());
            let Some(task) = next else { break };

            let wake = task.next_wake();
            self.clock.advance_to(wake);
            task.step(
                self.clock.now(),
                &mut self.rng,
                &self.config.patterns,
                self.base,
                &mut emitted,
            );

            for event in emitted.drain(..) {
                self.stats.events_emitted += 1;
                if let Err(e) = self.sink.send(&event) {
                    warn!("dropping unencodable event: {}", e);
                }
            }
        }

        // durability barrier: the batch is not complete until every event
        // is acknowledged or out of retries
        let report = self.sink.flush(&mut self.clock);
        self.stats.events_delivered += report.delivered as u64;
        if report.failed > 0 {
            self.stats.events_failed += report.failed as u64;
            self.stats.failed_batches += 1;
            warn!(
                "batch completed with {} undelivered events ({} delivered)",
                report.failed, report.delivered
            );
        } else {
            debug!("batch completed: {} events delivered", report.delivered);
        }
    }

    fn admit_session(&mut self, start_at: SimMillis) -> SessionTask {
        let video = self.population.pick_video(&mut self.rng).clone();
        let user = self.population.pick_user(&mut self.rng).clone();
        let session_id = random_id(&mut self.rng);
        let pattern = self.config.patterns.weights.choose(&mut self.rng);

        debug!(
            "user {} starts watching video {} ({}s) - pattern: {}",
            &user.id[..8],
            &video.id[..8],
            video.duration_sec,
            pattern.name()
        );

        SessionTask::new(
            &video,
            &user,
            session_id,
            pattern,
            &self.config.patterns,
            start_at,
            &mut self.rng,
        )
    }
}
