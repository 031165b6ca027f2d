// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/baseline.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/baseline.yaml --seed 0x1234...

use std::env;
use std::fs;
use std::path::Path;

use simple_logger::SimpleLogger;

use vr_rust::{
    MemoryLog, RetentionEngine, SimulatorConfig, SimulatorRunner, SinkConfig, SinkProducer,
};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    /// Simulator configuration (population, patterns, batch shape)
    #[serde(default)]
    config: SimulatorConfig,

    /// Sink delivery policy overrides
    #[serde(default)]
    sink: SinkConfig,

    /// Replicas of the in-memory log
    #[serde(default = "default_replicas")]
    replicas: usize,

    /// Transient publish failures injected after startup
    #[serde(default)]
    fail_publishes: usize,

    /// Drop-off threshold used in the analysis section
    #[serde(default = "default_threshold")]
    dropoff_threshold: f64,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

fn default_replicas() -> usize {
    3
}

fn default_threshold() -> f64 {
    10.0
}

fn main() {
    SimpleLogger::new().init().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/baseline.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/baseline.yaml --seed 0x123456...", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    // Parse optional seed
    let seed: Option<[u8; 32]> = if args.len() >= 4 && args[2] == "--seed" {
        Some(parse_seed_hex(&args[3]))
    } else {
        None
    };

    if path.is_file() {
        run_scenario_file(path, seed);
    } else if path.is_dir() {
        run_scenario_directory(path, seed);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<[u8; 32]>) {
    let mut scenarios = Vec::new();

    // Find all .yaml files
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("yaml")
                || path.extension().and_then(|s| s.to_str()) == Some("yml")
            {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        run_scenario_file(scenario_path, seed);
    }

    println!("\nAll scenarios complete.");
}

fn run_scenario_file(path: &Path, seed: Option<[u8; 32]>) {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    println!("\n========================================================");
    match &scenario.meta.name {
        Some(name) => println!("  {}", name),
        None => println!(
            "  Scenario: {}",
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("?")
        ),
    }
    println!("========================================================\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }
    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:\n  {}\n", hypothesis);
    }

    let mut config = scenario.config;
    config.seed = seed;

    println!("Configuration:");
    println!("  Batches: {}", config.batches);
    println!("  Videos: {}", config.population.num_videos);
    println!("  Users: {}", config.population.num_users);
    println!("  Sessions/batch: {:?}", config.sessions_per_batch);
    println!(
        "  Sink: {} attempts, {} ms backoff, {} replicas",
        scenario.sink.max_attempts, scenario.sink.backoff_ms, scenario.replicas
    );
    if scenario.fail_publishes > 0 {
        println!("  Injected publish failures: {}", scenario.fail_publishes);
    }
    println!("\nStarting simulation...\n");

    let log = MemoryLog::shared(scenario.replicas);
    let sink = match SinkProducer::connect(log.clone(), scenario.sink.clone()) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Fatal: sink unreachable at startup: {}", e);
            std::process::exit(1);
        }
    };
    // inject after the connect probe so only deliveries are affected
    log.borrow_mut().fail_next(scenario.fail_publishes);

    let runner = match SimulatorRunner::new(config, sink) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Fatal: {}", e);
            std::process::exit(1);
        }
    };

    println!("Seed: 0x{}", hex_string(&runner.seed_used()));
    let stats = runner.run();

    println!("\nRun summary:");
    println!("  Batches completed: {}", stats.batches_completed);
    println!(
        "  Sessions: {} ({} truncated)",
        stats.sessions_run, stats.sessions_truncated
    );
    println!(
        "  Events: {} emitted, {} delivered, {} failed",
        stats.events_emitted, stats.events_delivered, stats.events_failed
    );
    println!("  Failed batches: {}", stats.failed_batches);
    println!("  Simulated time: {:.1}s", stats.sim_elapsed_ms as f64 / 1000.0);

    print_analysis(&log, scenario.dropoff_threshold);

    println!("\nScenario complete.\n");
}

fn print_analysis(log: &std::rc::Rc<std::cell::RefCell<MemoryLog>>, threshold: f64) {
    let engine = RetentionEngine::new(log.clone());

    let videos = match engine.list_videos() {
        Ok(videos) => videos,
        Err(e) => {
            eprintln!("Analysis unavailable: {}", e);
            return;
        }
    };

    println!("\nRetention analysis (drop-off threshold {:.1}%):", threshold);
    for video in &videos {
        println!(
            "\n  video {} - {} viewers, {} starts over {}s",
            &video.video_id[..8],
            video.unique_viewers,
            video.total_events,
            video.duration_seconds
        );

        match engine.dropoffs(&video.video_id, threshold) {
            Ok(dropoffs) if dropoffs.is_empty() => {
                println!("    no significant drop-offs");
            }
            Ok(dropoffs) => {
                for point in dropoffs.iter().take(3) {
                    println!(
                        "    drop-off at {}s: {} -> {} viewers ({:.1}%)",
                        point.video_time_sec,
                        point.previous_viewers,
                        point.current_viewers,
                        point.drop_off_percentage
                    );
                }
                if dropoffs.len() > 3 {
                    println!("    ... and {} more", dropoffs.len() - 3);
                }
            }
            Err(e) => eprintln!("    drop-off query failed: {}", e),
        }

        if let Ok(summary) = engine.engagement_summary(&video.video_id) {
            if let (Some(avg), Some(viewers)) =
                (summary.average_watch_time_sec, summary.unique_viewers)
            {
                println!(
                    "    engagement: {:.1}s average watch across {} viewers",
                    avg, viewers
                );
            }
        }
    }
}

fn hex_string(seed: &[u8; 32]) -> String {
    seed.iter().map(|b| format!("{:02x}", b)).collect()
}

fn parse_seed_hex(hex: &str) -> [u8; 32] {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut seed = [0u8; 32];

    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        if i >= 32 {
            break;
        }
        let byte_str = std::str::from_utf8(chunk).unwrap_or("00");
        seed[i] = u8::from_str_radix(byte_str, 16).unwrap_or_else(|e| {
            eprintln!("Invalid hex seed: {}", e);
            std::process::exit(1);
        });
    }

    seed
}
