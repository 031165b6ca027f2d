// long-running generator: simulate viewing sessions, then report retention

use log::info;
use simple_logger::SimpleLogger;

use vr_rust::{
    MemoryLog, RetentionEngine, SimulatorConfig, SimulatorRunner, SinkConfig, SinkProducer,
};

fn main() {
    SimpleLogger::new().init().unwrap();

    info!("starting");

    let config = SimulatorConfig {
        batches: 25,
        ..Default::default()
    };

    let log = MemoryLog::shared(3);
    let sink = match SinkProducer::connect(log.clone(), SinkConfig::default()) {
        Ok(sink) => sink,
        Err(e) => {
            // unreachable sink at startup is fatal
            eprintln!("cannot reach event sink: {}", e);
            std::process::exit(1);
        }
    };

    let runner = match SimulatorRunner::new(config, sink) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("cannot build population: {}", e);
            std::process::exit(1);
        }
    };

    let seed = runner.seed_used();
    info!("let seed = {:?};", seed);

    let stats = runner.run();
    info!(
        "done. batches: {}, sessions: {} ({} truncated), events: {} emitted / {} delivered / {} failed",
        stats.batches_completed,
        stats.sessions_run,
        stats.sessions_truncated,
        stats.events_emitted,
        stats.events_delivered,
        stats.events_failed
    );

    // read-side pass over what the run produced
    let engine = RetentionEngine::new(log);
    match engine.list_videos() {
        Ok(videos) => {
            info!("top videos by distinct viewers:");
            for video in &videos {
                info!(
                    "  {}: {} viewers, {}s observed, {} segment starts",
                    &video.video_id[..8],
                    video.unique_viewers,
                    video.duration_seconds,
                    video.total_events
                );
            }

            if let Some(top) = videos.first() {
                report_video(&engine, &top.video_id);
            }
        }
        Err(e) => eprintln!("cannot query event log: {}", e),
    }
}

fn report_video<L: vr_rust::EventLog>(engine: &RetentionEngine<L>, video_id: &str) {
    let curve = match engine.retention_curve(video_id) {
        Ok(curve) => curve,
        Err(e) => {
            eprintln!("retention query failed: {}", e);
            return;
        }
    };
    info!(
        "video {}: {} unique viewers, {} curve points",
        &video_id[..8],
        curve.total_unique_viewers,
        curve.points.len()
    );

    if let Ok(dropoffs) = engine.dropoffs(video_id, 10.0) {
        for point in dropoffs.iter().take(5) {
            info!(
                "  drop-off at {}s: {} -> {} ({:.1}%)",
                point.video_time_sec,
                point.previous_viewers,
                point.current_viewers,
                point.drop_off_percentage
            );
        }
    }

    if let Ok(summary) = engine.engagement_summary(video_id) {
        if let (Some(avg), Some(viewers)) = (summary.average_watch_time_sec, summary.unique_viewers)
        {
            info!(
                "  engagement: {:.1}s average watch time across {} viewers",
                avg, viewers
            );
        }
    }
}
