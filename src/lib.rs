//! # vrRust - Viewer Retention Simulation & Analytics
//!
//! A Rust implementation of a video-retention telemetry pipeline: a
//! synthetic session simulator produces realistic viewing events under
//! several behavioral patterns, delivers them through a retrying sink into
//! a partitioned append-only log, and a stateless aggregation engine turns
//! the log into retention curves, drop-off points and engagement summaries.
//!
//! ## Core Components
//!
//! - **Population**: immutable video/user pools generated once per run
//! - **SessionTask / SimulatorRunner**: per-session state machines batched
//!   on a discrete simulated clock
//! - **SinkProducer**: bounded-retry delivery with a per-batch durability
//!   barrier
//! - **RetentionEngine**: pure read-side queries over the event log
//!
//! ## Usage
//!
//! ```no_run
//! use vr_rust::{MemoryLog, RetentionEngine, SimulatorConfig, SimulatorRunner,
//!               SinkConfig, SinkProducer};
//!
//! let log = MemoryLog::shared(3);
//! let sink = SinkProducer::connect(log.clone(), SinkConfig::default())
//!     .expect("sink unreachable at startup");
//!
//! let runner = SimulatorRunner::new(SimulatorConfig::default(), sink)
//!     .expect("degenerate population");
//! let stats = runner.run();
//! println!("{} events delivered", stats.events_delivered);
//!
//! let engine = RetentionEngine::new(log);
//! for video in engine.list_videos().expect("log unreachable") {
//!     let curve = engine.retention_curve(&video.video_id).unwrap();
//!     println!("{}: {} viewers", video.video_id, curve.total_unique_viewers);
//! }
//! ```
//!
//! ## Determinism
//!
//! Every stochastic choice draws from one seeded RNG and every delay moves
//! a simulated clock, so a run is replayable bit-for-bit from its seed.
//! The aggregation side is pure: re-issuing a query against an unchanged
//! log returns identical results.

// Core pipeline modules
pub mod vr_interface;
pub mod vr_patterns;
pub mod vr_population;
pub mod vr_retention;
pub mod vr_session;
pub mod vr_simulator;
pub mod vr_sink;

// Storage backends
pub mod vr_memory_log;

// Re-export commonly used types
pub use vr_interface::{
    EventLog, LogError, LogTransport, SimClock, SimMillis, TransportError, ViewerEvent,
    ViewerEventKind,
};
pub use vr_memory_log::MemoryLog;
pub use vr_patterns::{PatternConfig, PatternWeights, ViewingPattern};
pub use vr_population::{Population, PopulationConfig, PopulationError, User, Video};
pub use vr_retention::{
    DropoffPoint, EngagementSummary, RetentionCurve, RetentionCurvePoint, RetentionEngine,
    RetentionError, VideoSummary,
};
pub use vr_session::SessionTask;
pub use vr_simulator::{RunStats, SimulatorConfig, SimulatorRunner, StopSignal};
pub use vr_sink::{FlushReport, SinkConfig, SinkError, SinkProducer};
