// retention aggregation engine: pure read-side transforms over the log

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};

use crate::vr_interface::{EventLog, LogError, VideoId, ViewerEvent, ViewerEventKind};

// ============================================================================
// Result Types
// ============================================================================

/// One point of a retention curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionCurvePoint {
    pub video_time_sec: u32,
    pub current_viewers: usize,
    pub retention_percentage: f64,
}

/// Distinct-viewer retention per video-time offset, plus the total the
/// percentages are relative to.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionCurve {
    pub points: Vec<RetentionCurvePoint>,
    pub total_unique_viewers: usize,
}

/// An offset where retention fell past the caller's threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct DropoffPoint {
    pub video_time_sec: u32,
    pub current_viewers: usize,
    pub previous_viewers: usize,
    pub drop_off_count: i64,
    pub drop_off_percentage: f64,
}

/// Per-video engagement. Both fields are absent (not zero) when the video
/// has no session data at all.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSummary {
    pub video_id: VideoId,
    pub average_watch_time_sec: Option<f64>,
    pub unique_viewers: Option<usize>,
}

/// Catalog entry derived purely from observed events.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummary {
    pub video_id: VideoId,
    pub unique_viewers: usize,
    /// Span of observed offsets: max - min + 1.
    pub duration_seconds: u32,
    pub total_events: usize,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum RetentionError {
    /// The log cannot be reached for reads; the caller may retry or report
    /// degraded service. Never silently mapped to empty results.
    Unavailable(LogError),
    /// A stored record did not decode as a viewer event.
    BadRecord(serde_json::Error),
}

impl std::fmt::Display for RetentionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionError::Unavailable(e) => write!(f, "retention backend unavailable: {}", e),
            RetentionError::BadRecord(e) => write!(f, "corrupt event record: {}", e),
        }
    }
}

impl std::error::Error for RetentionError {}

impl From<LogError> for RetentionError {
    fn from(e: LogError) -> Self {
        RetentionError::Unavailable(e)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Maximum videos returned by `list_videos`.
const CATALOG_LIMIT: usize = 20;

/// Stateless query layer over an append-only event log.
///
/// Every operation is a pure function of the log's current contents:
/// the same query against an unchanged log returns identical results, and
/// nothing is cached between calls.
pub struct RetentionEngine<L: EventLog> {
    log: L,
}

impl<L: EventLog> RetentionEngine<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    /// Reachability probe for the read side.
    pub fn ping(&self) -> Result<(), RetentionError> {
        Ok(self.log.ping()?)
    }

    /// Distinct users with at least one SEGMENT_START for the video.
    /// Unknown or never-viewed videos count 0, they are not an error.
    pub fn total_unique_viewers(&self, video_id: &str) -> Result<usize, RetentionError> {
        let starts = self.start_events(video_id)?;
        let users: HashSet<&str> = starts.iter().map(|e| e.user_id.as_str()).collect();
        Ok(users.len())
    }

    /// Distinct viewers per offset, ascending by offset, with percentages
    /// relative to the video's total unique viewers. An unviewed video
    /// yields an empty curve with total 0 and no division is attempted.
    pub fn retention_curve(&self, video_id: &str) -> Result<RetentionCurve, RetentionError> {
        let starts = self.start_events(video_id)?;

        let mut total_users: HashSet<&str> = HashSet::new();
        let mut by_offset: BTreeMap<u32, HashSet<&str>> = BTreeMap::new();
        for event in &starts {
            total_users.insert(event.user_id.as_str());
            by_offset
                .entry(event.video_time_sec)
                .or_default()
                .insert(event.user_id.as_str());
        }

        let total = total_users.len();
        if total == 0 {
            return Ok(RetentionCurve {
                points: Vec::new(),
                total_unique_viewers: 0,
            });
        }

        let points = by_offset
            .into_iter()
            .map(|(offset, users)| RetentionCurvePoint {
                video_time_sec: offset,
                current_viewers: users.len(),
                retention_percentage: users.len() as f64 * 100.0 / total as f64,
            })
            .collect();

        Ok(RetentionCurve {
            points,
            total_unique_viewers: total,
        })
    }

    /// Offsets whose viewer count fell, relative to the previous offset
    /// with viewers, by strictly more than `threshold_percentage`.
    ///
    /// Explicit ordered scan with a previous-count carry rather than a
    /// window function: the first point has no predecessor (previous 0)
    /// and is excluded by the `previous > 0` guard, which also guards the
    /// division. A negative drop (viewers increased) is not special-cased;
    /// it only surfaces when the caller passes a negative threshold.
    pub fn dropoffs(
        &self,
        video_id: &str,
        threshold_percentage: f64,
    ) -> Result<Vec<DropoffPoint>, RetentionError> {
        let curve = self.retention_curve(video_id)?;

        let mut dropoffs = Vec::new();
        let mut previous = 0usize;
        for point in &curve.points {
            let current = point.current_viewers;
            if previous > 0 {
                let drop_count = previous as i64 - current as i64;
                let drop_pct = drop_count as f64 * 100.0 / previous as f64;
                if drop_pct > threshold_percentage {
                    dropoffs.push(DropoffPoint {
                        video_time_sec: point.video_time_sec,
                        current_viewers: current,
                        previous_viewers: previous,
                        drop_off_count: drop_count,
                        drop_off_percentage: drop_pct,
                    });
                }
            }
            previous = current;
        }

        Ok(dropoffs)
    }

    /// Mean distinct-seconds-watched across (session, user) pairs, and the
    /// distinct viewer count. Absent, not zero, when there is no data.
    pub fn engagement_summary(&self, video_id: &str) -> Result<EngagementSummary, RetentionError> {
        let starts = self.start_events(video_id)?;

        let mut watched: HashMap<(&str, &str), HashSet<u32>> = HashMap::new();
        let mut users: HashSet<&str> = HashSet::new();
        for event in &starts {
            watched
                .entry((event.session_id.as_str(), event.user_id.as_str()))
                .or_default()
                .insert(event.video_time_sec);
            users.insert(event.user_id.as_str());
        }

        if watched.is_empty() {
            return Ok(EngagementSummary {
                video_id: video_id.to_string(),
                average_watch_time_sec: None,
                unique_viewers: None,
            });
        }

        let total_secs: usize = watched.values().map(|offsets| offsets.len()).sum();
        Ok(EngagementSummary {
            video_id: video_id.to_string(),
            average_watch_time_sec: Some(total_secs as f64 / watched.len() as f64),
            unique_viewers: Some(users.len()),
        })
    }

    /// Top videos by distinct-viewer count, at most 20, with duration
    /// derived from the observed offset span.
    pub fn list_videos(&self) -> Result<Vec<VideoSummary>, RetentionError> {
        let mut summaries = Vec::new();

        for key in self.log.partition_keys()? {
            let starts = self.start_events(&key)?;
            if starts.is_empty() {
                continue;
            }

            let users: HashSet<&str> = starts.iter().map(|e| e.user_id.as_str()).collect();
            let min = starts.iter().map(|e| e.video_time_sec).min().unwrap_or(0);
            let max = starts.iter().map(|e| e.video_time_sec).max().unwrap_or(0);

            summaries.push(VideoSummary {
                video_id: key,
                unique_viewers: users.len(),
                duration_seconds: max - min + 1,
                total_events: starts.len(),
            });
        }

        // stable sort keeps partition order as the tie-break
        summaries.sort_by(|a, b| b.unique_viewers.cmp(&a.unique_viewers));
        summaries.truncate(CATALOG_LIMIT);
        Ok(summaries)
    }

    /// All SEGMENT_START events of one video, decoded from the log.
    fn start_events(&self, video_id: &str) -> Result<Vec<ViewerEvent>, RetentionError> {
        let records = self.log.scan_partition(video_id)?;
        let mut events = Vec::with_capacity(records.len());
        for record in &records {
            let event: ViewerEvent =
                serde_json::from_str(record).map_err(RetentionError::BadRecord)?;
            if event.event_type == ViewerEventKind::SegmentStart {
                events.push(event);
            }
        }
        Ok(events)
    }
}
