// population model: the immutable video/user pools a run draws from

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::vr_interface::{random_id, UserId, VideoId};

// ============================================================================
// Entities
// ============================================================================

/// A video in the catalog. Immutable after generation.
#[derive(Debug, Clone)]
pub struct Video {
    pub id: VideoId,
    /// Whole seconds, always > 0.
    pub duration_sec: u32,
    /// Sampling weight, 0 < popularity <= 1.
    pub popularity: f64,
}

/// A viewer. Immutable after generation.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
}

// ============================================================================
// Configuration
// ============================================================================

/// Pool sizes and value ranges for population generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub num_videos: usize,
    pub num_users: usize,

    /// Inclusive range for video duration in seconds.
    pub duration_range: (u32, u32),

    /// Inclusive range for the popularity weight.
    pub popularity_range: (f64, f64),
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            num_videos: 10,
            num_users: 100,
            duration_range: (30, 1800),
            popularity_range: (0.1, 1.0),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A population the simulator cannot run against. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationError {
    NoVideos,
    NoUsers,
    /// Popularity weights that cannot form a sampling distribution.
    BadWeights,
}

impl std::fmt::Display for PopulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PopulationError::NoVideos => write!(f, "population has zero videos"),
            PopulationError::NoUsers => write!(f, "population has zero users"),
            PopulationError::BadWeights => write!(f, "video popularity weights are degenerate"),
        }
    }
}

impl std::error::Error for PopulationError {}

// ============================================================================
// Population
// ============================================================================

/// The video and user pools for one run. Generated once at process start
/// from the run's seeded RNG, read-only afterwards.
pub struct Population {
    videos: Vec<Video>,
    users: Vec<User>,
    video_weights: WeightedIndex<f64>,
}

impl Population {
    /// Generate pools from `config`. A degenerate population is an error,
    /// never a silently empty run.
    pub fn generate(config: &PopulationConfig, rng: &mut StdRng) -> Result<Self, PopulationError> {
        if config.num_videos == 0 {
            return Err(PopulationError::NoVideos);
        }
        if config.num_users == 0 {
            return Err(PopulationError::NoUsers);
        }

        // durations must stay > 0 whatever the configured range says
        let dur_lo = config.duration_range.0.max(1);
        let dur_hi = config.duration_range.1.max(dur_lo);
        let (pop_min, pop_max) = config.popularity_range;

        let videos: Vec<Video> = (0..config.num_videos)
            .map(|_| Video {
                id: random_id(rng),
                duration_sec: rng.gen_range(dur_lo..=dur_hi),
                popularity: rng.gen_range(pop_min..=pop_max),
            })
            .collect();

        let users: Vec<User> = (0..config.num_users)
            .map(|_| User { id: random_id(rng) })
            .collect();

        let video_weights = WeightedIndex::new(videos.iter().map(|v| v.popularity))
            .map_err(|_| PopulationError::BadWeights)?;

        Ok(Self {
            videos,
            users,
            video_weights,
        })
    }

    /// Weighted pick: more popular videos are chosen more often.
    pub fn pick_video(&self, rng: &mut StdRng) -> &Video {
        &self.videos[self.video_weights.sample(rng)]
    }

    /// Uniform pick over the user pool.
    pub fn pick_user(&self, rng: &mut StdRng) -> &User {
        // pool is never empty once generation succeeded
        self.users
            .choose(rng)
            .unwrap_or(&self.users[0])
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::from_seed([3u8; 32])
    }

    #[test]
    fn test_generate_respects_ranges() {
        let config = PopulationConfig::default();
        let pop = Population::generate(&config, &mut rng()).unwrap();

        assert_eq!(pop.videos().len(), 10);
        assert_eq!(pop.users().len(), 100);
        for video in pop.videos() {
            assert!(video.duration_sec >= 30 && video.duration_sec <= 1800);
            assert!(video.popularity > 0.0 && video.popularity <= 1.0);
        }
    }

    #[test]
    fn test_degenerate_population_is_fatal() {
        let no_videos = PopulationConfig {
            num_videos: 0,
            ..Default::default()
        };
        assert_eq!(
            Population::generate(&no_videos, &mut rng()).err(),
            Some(PopulationError::NoVideos)
        );

        let no_users = PopulationConfig {
            num_users: 0,
            ..Default::default()
        };
        assert_eq!(
            Population::generate(&no_users, &mut rng()).err(),
            Some(PopulationError::NoUsers)
        );
    }

    #[test]
    fn test_weighted_pick_prefers_popular_videos() {
        let config = PopulationConfig {
            num_videos: 2,
            popularity_range: (0.1, 1.0),
            ..Default::default()
        };
        let mut r = rng();
        let mut pop = Population::generate(&config, &mut r).unwrap();

        // force a lopsided distribution
        pop.videos[0].popularity = 0.95;
        pop.videos[1].popularity = 0.05;
        pop.video_weights =
            WeightedIndex::new(pop.videos.iter().map(|v| v.popularity)).unwrap();

        let heavy_id = pop.videos[0].id.clone();
        let hits = (0..1000)
            .filter(|_| pop.pick_video(&mut r).id == heavy_id)
            .count();
        assert!(hits > 800, "expected ~950 hits, got {}", hits);
    }

    #[test]
    fn test_generation_is_seed_stable() {
        let config = PopulationConfig::default();
        let a = Population::generate(&config, &mut rng()).unwrap();
        let b = Population::generate(&config, &mut rng()).unwrap();

        let ids_a: Vec<_> = a.videos().iter().map(|v| v.id.clone()).collect();
        let ids_b: Vec<_> = b.videos().iter().map(|v| v.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
