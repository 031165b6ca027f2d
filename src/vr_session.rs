// one viewing session as a steppable state machine on the simulated clock

use chrono::{DateTime, Utc};
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;

use crate::vr_interface::{
    random_id, wire_timestamp, SessionId, SimMillis, ViewerEvent, ViewerEventKind,
};
use crate::vr_patterns::{
    dropout_probability, sample_seek_positions, sample_watch_window, PatternConfig,
    ViewingPattern,
};
use crate::vr_population::{User, Video};

/// Where a session is in its traversal. Each step runs exactly one phase
/// and schedules the next wake, so a batch of tasks can be interleaved on
/// one clock without any task busy-waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Continuous: dropout check, then SEGMENT_START (and maybe PAUSE).
    NextSecond,
    /// Continuous: emit PLAY after a pause hold.
    Resume,
    /// Continuous: emit SEGMENT_END after the pacing delay.
    EmitEnd,
    /// Skipper: emit SEEK for the next position, or finish.
    SeekNext,
    /// Skipper: emit SEGMENT_START for the current burst second.
    BurstStart,
    /// Skipper: emit SEGMENT_END, then maybe abort the burst.
    BurstEnd,
    Done,
}

/// A single session's event generator.
///
/// Within one traversal a SEGMENT_START at offset t always precedes its
/// SEGMENT_END at the same t, and a SEEK precedes its burst. Offsets never
/// reach the video duration.
pub struct SessionTask {
    video_id: String,
    user_id: String,
    session_id: SessionId,
    duration_sec: u32,
    pattern: ViewingPattern,

    phase: Phase,
    next_wake: SimMillis,

    // continuous traversal
    current_sec: u32,
    end_sec: u32,

    // skipper traversal
    seeks: Vec<u32>,
    seek_idx: usize,
    burst_sec: u32,
    burst_end_sec: u32,

    truncated: bool,
}

impl SessionTask {
    /// Create a task that wakes for the first time at `start_at`.
    pub fn new(
        video: &Video,
        user: &User,
        session_id: SessionId,
        pattern: ViewingPattern,
        config: &PatternConfig,
        start_at: SimMillis,
        rng: &mut StdRng,
    ) -> Self {
        let (phase, current_sec, end_sec, seeks) = match pattern {
            ViewingPattern::Skipper => {
                let seeks = sample_seek_positions(video.duration_sec, config.max_seeks, rng);
                (Phase::SeekNext, 0, 0, seeks)
            }
            _ => {
                let window = sample_watch_window(pattern, video.duration_sec, rng);
                let end = (window.start_sec + window.len_sec).min(video.duration_sec);
                (Phase::NextSecond, window.start_sec, end, Vec::new())
            }
        };

        Self {
            video_id: video.id.clone(),
            user_id: user.id.clone(),
            session_id,
            duration_sec: video.duration_sec,
            pattern,
            phase,
            next_wake: start_at,
            current_sec,
            end_sec,
            seeks,
            seek_idx: 0,
            burst_sec: 0,
            burst_end_sec: 0,
            truncated: false,
        }
    }

    pub fn next_wake(&self) -> SimMillis {
        self.next_wake
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn pattern(&self) -> ViewingPattern {
        self.pattern
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Graceful-stop: end the session immediately. A START without its END
    /// may remain in the log; that gap is accepted, not corruption.
    pub fn truncate(&mut self) {
        if self.phase != Phase::Done {
            self.truncated = true;
            self.phase = Phase::Done;
        }
    }

    /// Run one phase at simulated instant `now`, appending any emitted
    /// events to `out` and scheduling the next wake.
    pub fn step(
        &mut self,
        now: SimMillis,
        rng: &mut StdRng,
        config: &PatternConfig,
        base: DateTime<Utc>,
        out: &mut Vec<ViewerEvent>,
    ) {
        match self.phase {
            Phase::NextSecond => self.step_next_second(now, rng, config, base, out),
            Phase::Resume => {
                self.emit(ViewerEventKind::Play, self.current_sec, now, rng, base, out);
                self.phase = Phase::EmitEnd;
                self.next_wake = now + rng.gen_range(config.pacing_ms.0..config.pacing_ms.1);
            }
            Phase::EmitEnd => {
                self.emit(
                    ViewerEventKind::SegmentEnd,
                    self.current_sec,
                    now,
                    rng,
                    base,
                    out,
                );
                self.current_sec += 1;
                self.phase = Phase::NextSecond;
                self.next_wake = now;
            }
            Phase::SeekNext => self.step_seek_next(now, rng, config, base, out),
            Phase::BurstStart => {
                if self.burst_sec >= self.burst_end_sec {
                    self.seek_idx += 1;
                    self.phase = Phase::SeekNext;
                    self.next_wake = now;
                    return;
                }
                self.emit(
                    ViewerEventKind::SegmentStart,
                    self.burst_sec,
                    now,
                    rng,
                    base,
                    out,
                );
                self.phase = Phase::BurstEnd;
                self.next_wake = now + config.burst_gap_ms;
            }
            Phase::BurstEnd => {
                self.emit(
                    ViewerEventKind::SegmentEnd,
                    self.burst_sec,
                    now,
                    rng,
                    base,
                    out,
                );
                self.burst_sec += 1;
                if rng.gen_bool(config.skip_abort_probability) {
                    self.seek_idx += 1;
                    self.phase = Phase::SeekNext;
                } else {
                    self.phase = Phase::BurstStart;
                }
                self.next_wake = now;
            }
            Phase::Done => {}
        }
    }

    fn step_next_second(
        &mut self,
        now: SimMillis,
        rng: &mut StdRng,
        config: &PatternConfig,
        base: DateTime<Utc>,
        out: &mut Vec<ViewerEvent>,
    ) {
        if self.current_sec >= self.end_sec || self.current_sec >= self.duration_sec {
            self.phase = Phase::Done;
            return;
        }

        let p = dropout_probability(self.current_sec, self.duration_sec);
        if rng.gen_bool(p) {
            debug!(
                "user {} drops out of video {} at {}s",
                &self.user_id[..8],
                &self.video_id[..8],
                self.current_sec
            );
            self.phase = Phase::Done;
            return;
        }

        self.emit(
            ViewerEventKind::SegmentStart,
            self.current_sec,
            now,
            rng,
            base,
            out,
        );

        if rng.gen_bool(config.pause_probability) {
            self.emit(ViewerEventKind::Pause, self.current_sec, now, rng, base, out);
            self.phase = Phase::Resume;
            self.next_wake = now + rng.gen_range(config.pause_hold_ms.0..config.pause_hold_ms.1);
        } else {
            self.phase = Phase::EmitEnd;
            self.next_wake = now + rng.gen_range(config.pacing_ms.0..config.pacing_ms.1);
        }
    }

    fn step_seek_next(
        &mut self,
        now: SimMillis,
        rng: &mut StdRng,
        config: &PatternConfig,
        base: DateTime<Utc>,
        out: &mut Vec<ViewerEvent>,
    ) {
        if self.seek_idx >= self.seeks.len() {
            self.phase = Phase::Done;
            return;
        }

        let pos = self.seeks[self.seek_idx];
        self.emit(ViewerEventKind::Seek, pos, now, rng, base, out);

        let burst_len = rng.gen_range(config.burst_len_range.0..=config.burst_len_range.1);
        self.burst_sec = pos;
        self.burst_end_sec = (pos + burst_len).min(self.duration_sec);
        self.phase = Phase::BurstStart;
        self.next_wake = now;
    }

    fn emit(
        &self,
        kind: ViewerEventKind,
        video_time_sec: u32,
        now: SimMillis,
        rng: &mut StdRng,
        base: DateTime<Utc>,
        out: &mut Vec<ViewerEvent>,
    ) {
        out.push(ViewerEvent {
            event_id: random_id(rng),
            video_id: self.video_id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            event_timestamp: wire_timestamp(base, now),
            event_type: kind,
            video_time_sec,
            delta_viewers: kind.viewer_delta(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr_interface::base_instant;
    use rand::SeedableRng;

    fn video(duration_sec: u32) -> Video {
        Video {
            id: "0011223344556677".repeat(2),
            duration_sec,
            popularity: 0.5,
        }
    }

    fn user() -> User {
        User {
            id: "8899aabbccddeeff".repeat(2),
        }
    }

    /// Drive one task to completion and return everything it emitted.
    fn run_to_end(mut task: SessionTask, rng: &mut StdRng) -> Vec<ViewerEvent> {
        let config = PatternConfig::default();
        let base = base_instant();
        let mut out = Vec::new();
        let mut guard = 0;
        while !task.is_done() {
            let now = task.next_wake();
            task.step(now, rng, &config, base, &mut out);
            guard += 1;
            assert!(guard < 100_000, "session did not terminate");
        }
        out
    }

    fn task_for(pattern: ViewingPattern, duration_sec: u32, rng: &mut StdRng) -> SessionTask {
        SessionTask::new(
            &video(duration_sec),
            &user(),
            "s".repeat(32),
            pattern,
            &PatternConfig::default(),
            0,
            rng,
        )
    }

    #[test]
    fn test_offsets_stay_below_duration() {
        let mut rng = StdRng::from_seed([1u8; 32]);
        for pattern in [
            ViewingPattern::BingeWatcher,
            ViewingPattern::CasualViewer,
            ViewingPattern::Skipper,
            ViewingPattern::Completer,
        ] {
            for _ in 0..20 {
                let events = run_to_end(task_for(pattern, 60, &mut rng), &mut rng);
                for event in &events {
                    assert!(event.video_time_sec < 60, "{:?}", event);
                }
            }
        }
    }

    #[test]
    fn test_start_end_pairs_share_offset() {
        let mut rng = StdRng::from_seed([2u8; 32]);
        for _ in 0..30 {
            let events = run_to_end(task_for(ViewingPattern::BingeWatcher, 90, &mut rng), &mut rng);
            let mut open: Option<u32> = None;
            for event in &events {
                match event.event_type {
                    ViewerEventKind::SegmentStart => {
                        assert!(open.is_none(), "nested START");
                        open = Some(event.video_time_sec);
                    }
                    ViewerEventKind::SegmentEnd => {
                        assert_eq!(open.take(), Some(event.video_time_sec));
                    }
                    _ => {}
                }
            }
            // a trailing START without END only happens on truncation
            assert!(open.is_none());
        }
    }

    #[test]
    fn test_timestamps_monotone_within_session() {
        let mut rng = StdRng::from_seed([3u8; 32]);
        let events = run_to_end(task_for(ViewingPattern::Completer, 120, &mut rng), &mut rng);
        let stamps: Vec<&String> = events.iter().map(|e| &e.event_timestamp).collect();
        // RFC 3339 with fixed offset compares correctly as a string
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_skipper_seek_precedes_burst_and_bounds_hold() {
        let mut rng = StdRng::from_seed([4u8; 32]);
        for _ in 0..30 {
            let events = run_to_end(task_for(ViewingPattern::Skipper, 50, &mut rng), &mut rng);
            let mut burst_start: Option<u32> = None;
            let mut burst_len = 0u32;
            for event in &events {
                match event.event_type {
                    ViewerEventKind::Seek => {
                        assert!(event.video_time_sec <= 49);
                        if burst_start.is_some() {
                            assert!(burst_len <= 15);
                        }
                        burst_start = Some(event.video_time_sec);
                        burst_len = 0;
                    }
                    ViewerEventKind::SegmentStart => {
                        // every burst second belongs to the preceding seek
                        let seek = burst_start.expect("START before any SEEK");
                        assert!(event.video_time_sec >= seek);
                        burst_len += 1;
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_pause_is_followed_by_play_at_same_offset() {
        let mut rng = StdRng::from_seed([5u8; 32]);
        let mut saw_pause = false;
        for _ in 0..200 {
            let events = run_to_end(task_for(ViewingPattern::Completer, 200, &mut rng), &mut rng);
            for pair in events.windows(2) {
                if pair[0].event_type == ViewerEventKind::Pause {
                    saw_pause = true;
                    assert_eq!(pair[1].event_type, ViewerEventKind::Play);
                    assert_eq!(pair[0].video_time_sec, pair[1].video_time_sec);
                    assert!(pair[0].event_timestamp < pair[1].event_timestamp);
                }
            }
            if saw_pause {
                break;
            }
        }
        assert!(saw_pause, "no pause in 200 completer sessions");
    }

    #[test]
    fn test_truncate_stops_emission() {
        let mut rng = StdRng::from_seed([6u8; 32]);
        let mut task = task_for(ViewingPattern::Completer, 300, &mut rng);
        let config = PatternConfig::default();
        let base = base_instant();
        let mut out = Vec::new();

        task.step(task.next_wake(), &mut rng, &config, base, &mut out);
        task.truncate();
        assert!(task.is_done());
        assert!(task.was_truncated());

        let before = out.len();
        task.step(task.next_wake(), &mut rng, &config, base, &mut out);
        assert_eq!(out.len(), before);
    }
}
