// behavioral patterns: how a simulated session samples its watch window

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;

use crate::vr_interface::SimMillis;

// ============================================================================
// Patterns
// ============================================================================

/// The four stochastic viewing templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewingPattern {
    /// Long watch from the start.
    BingeWatcher,
    /// Short watch from a random offset.
    CasualViewer,
    /// Seeks around and watches short bursts.
    Skipper,
    /// Watches (nearly) the whole video from the start.
    Completer,
}

impl ViewingPattern {
    pub fn name(&self) -> &'static str {
        match self {
            ViewingPattern::BingeWatcher => "binge_watcher",
            ViewingPattern::CasualViewer => "casual_viewer",
            ViewingPattern::Skipper => "skipper",
            ViewingPattern::Completer => "completer",
        }
    }
}

/// Fixed selection weights. Engine configuration, not derived from data;
/// must sum to 1.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternWeights {
    pub binge_watcher: f64,
    pub casual_viewer: f64,
    pub skipper: f64,
    pub completer: f64,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            binge_watcher: 0.15,
            casual_viewer: 0.50,
            skipper: 0.25,
            completer: 0.10,
        }
    }
}

impl PatternWeights {
    pub fn choose(&self, rng: &mut StdRng) -> ViewingPattern {
        const PATTERNS: [ViewingPattern; 4] = [
            ViewingPattern::BingeWatcher,
            ViewingPattern::CasualViewer,
            ViewingPattern::Skipper,
            ViewingPattern::Completer,
        ];
        let weights = [
            self.binge_watcher,
            self.casual_viewer,
            self.skipper,
            self.completer,
        ];
        match WeightedIndex::new(weights) {
            Ok(dist) => PATTERNS[dist.sample(rng)],
            // unreachable with the fixed defaults; fall back to the mode
            Err(_) => ViewingPattern::CasualViewer,
        }
    }
}

// ============================================================================
// Tunables
// ============================================================================

/// Behavioral tunables of the session generator. The pause and skip-abort
/// probabilities are undocumented constants of the modeled system, kept as
/// configuration defaults rather than literals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub weights: PatternWeights,

    /// Chance per watched second of a PAUSE/PLAY excursion.
    pub pause_probability: f64,

    /// Pause hold, uniform in [min, max) simulated ms.
    pub pause_hold_ms: (SimMillis, SimMillis),

    /// Per-second pacing, uniform in [min, max) simulated ms.
    pub pacing_ms: (SimMillis, SimMillis),

    /// Chance per burst second that a skipper abandons the burst.
    pub skip_abort_probability: f64,

    /// Burst length, uniform in [min, max] whole seconds.
    pub burst_len_range: (u32, u32),

    /// Gap between a burst second's START and END, simulated ms.
    pub burst_gap_ms: SimMillis,

    /// Cap on seek positions per skipper session.
    pub max_seeks: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            weights: PatternWeights::default(),
            pause_probability: 0.03,
            pause_hold_ms: (1_000, 8_000),
            pacing_ms: (800, 1_200),
            skip_abort_probability: 0.20,
            burst_len_range: (3, 15),
            burst_gap_ms: 100,
            max_seeks: 5,
        }
    }
}

// ============================================================================
// Dropout & Watch Windows
// ============================================================================

/// Per-second chance of quitting, as a piecewise function of progress.
/// Viewers bail early, settle in, then taper off near the end.
pub fn dropout_probability(video_time_sec: u32, duration_sec: u32) -> f64 {
    let progress = f64::from(video_time_sec) / f64::from(duration_sec.max(1));
    if progress < 0.10 {
        0.15
    } else if progress < 0.50 {
        0.05
    } else if progress >= 0.80 {
        0.12
    } else {
        0.08
    }
}

/// Watch window of a continuous-viewing session: start offset and length
/// in whole seconds. Skipper sessions sample seeks instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchWindow {
    pub start_sec: u32,
    pub len_sec: u32,
}

/// Sample the watch window for a continuous pattern.
///
/// Casual viewers take a short slice starting anywhere; binge watchers and
/// completers take a long slice anchored at 0.
pub fn sample_watch_window(
    pattern: ViewingPattern,
    duration_sec: u32,
    rng: &mut StdRng,
) -> WatchWindow {
    match pattern {
        ViewingPattern::CasualViewer => {
            let hi = (duration_sec * 3 / 10).max(5);
            let len = rng.gen_range(5..=hi).min(duration_sec);
            let start_max = duration_sec.saturating_sub(len).max(1);
            WatchWindow {
                start_sec: rng.gen_range(0..=start_max).min(duration_sec - 1),
                len_sec: len,
            }
        }
        ViewingPattern::BingeWatcher => WatchWindow {
            start_sec: 0,
            len_sec: rng.gen_range((duration_sec * 6 / 10).max(1)..=duration_sec),
        },
        ViewingPattern::Completer => WatchWindow {
            start_sec: 0,
            len_sec: rng.gen_range((duration_sec * 8 / 10).max(1)..=duration_sec),
        },
        // skippers have no contiguous window
        ViewingPattern::Skipper => WatchWindow {
            start_sec: 0,
            len_sec: 0,
        },
    }
}

/// Sample sorted, distinct seek positions for a skipper session.
pub fn sample_seek_positions(duration_sec: u32, max_seeks: usize, rng: &mut StdRng) -> Vec<u32> {
    let count = max_seeks.min((duration_sec / 10) as usize);
    if count == 0 || duration_sec == 0 {
        return Vec::new();
    }
    let mut positions: Vec<u32> = rand::seq::index::sample(rng, duration_sec as usize, count)
        .into_iter()
        .map(|p| p as u32)
        .collect();
    positions.sort_unstable();
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::from_seed([9u8; 32])
    }

    #[test]
    fn test_dropout_curve_bands() {
        // 100 s video: bands are [0,10), [10,50), [50,80), [80,100)
        assert_eq!(dropout_probability(0, 100), 0.15);
        assert_eq!(dropout_probability(9, 100), 0.15);
        assert_eq!(dropout_probability(10, 100), 0.05);
        assert_eq!(dropout_probability(49, 100), 0.05);
        assert_eq!(dropout_probability(50, 100), 0.08);
        assert_eq!(dropout_probability(79, 100), 0.08);
        assert_eq!(dropout_probability(80, 100), 0.12);
        assert_eq!(dropout_probability(99, 100), 0.12);
    }

    #[test]
    fn test_pattern_weights_cover_all_patterns() {
        let weights = PatternWeights::default();
        let mut r = rng();
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            match weights.choose(&mut r) {
                ViewingPattern::BingeWatcher => counts[0] += 1,
                ViewingPattern::CasualViewer => counts[1] += 1,
                ViewingPattern::Skipper => counts[2] += 1,
                ViewingPattern::Completer => counts[3] += 1,
            }
        }
        // casual carries half the weight, completer a tenth
        assert!(counts[1] > counts[0]);
        assert!(counts[1] > counts[2]);
        assert!(counts[1] > counts[3]);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn test_watch_windows_stay_in_bounds() {
        let mut r = rng();
        for _ in 0..500 {
            for pattern in [
                ViewingPattern::CasualViewer,
                ViewingPattern::BingeWatcher,
                ViewingPattern::Completer,
            ] {
                let window = sample_watch_window(pattern, 30, &mut r);
                assert!(window.start_sec < 30);
                assert!(window.len_sec <= 30);
                if pattern != ViewingPattern::CasualViewer {
                    assert_eq!(window.start_sec, 0);
                }
            }
        }
    }

    #[test]
    fn test_seek_positions_sorted_distinct_capped() {
        let mut r = rng();
        for _ in 0..200 {
            let positions = sample_seek_positions(50, 5, &mut r);
            assert!(positions.len() <= 5);
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            assert!(positions.iter().all(|&p| p <= 49));
        }

        // short videos yield fewer seeks: min(5, duration / 10)
        let positions = sample_seek_positions(35, 5, &mut r);
        assert!(positions.len() <= 3);
    }
}
