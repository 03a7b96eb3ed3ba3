//! Live progress tracking from discrete, possibly noisy position fixes.
//!
//! [`LiveTracker`] is a pure reducer: it holds one record per competitor id
//! and folds fix events into it. It never reads a clock (the caller resolves
//! missing timestamps) and never reports a logical regression: along-track
//! distance is monotonically floored per competitor and the finished flag is
//! sticky.

use crate::errors::RaceError;
use crate::geodesy;
use crate::models::{CompetitorSnapshot, RaceSnapshot, TrackPoint};

/// Radius around the start vertex inside which a competitor's very first
/// fix is pinned to distance zero. On a closed loop the start and finish
/// share a vertex; the first observation there means "race start".
const NEAR_START_M: f64 = 5.0;

/// Finish-line tolerance: once a competitor with history gets this close to
/// the end, along-distance snaps to the exact track length.
const FINISH_EPS_M: f64 = 5.0;

/// A decoded position report for one competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct FixEvent {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub timestamp_ms: u64,
    pub fix_quality: Option<u8>,
    pub sequence: Option<u64>,
}

#[derive(Debug, Clone)]
struct TrackedCompetitor {
    id: String,
    lat: f64,
    lon: f64,
    distance: f64,
    progress: f64,
    speed_mps: f64,
    finished: bool,
    last_ts: u64,
    fix_quality: Option<u8>,
    sequence: Option<u64>,
}

/// Folds fix events into per-competitor progress along a fixed track.
pub struct LiveTracker {
    track: Vec<TrackPoint>,
    cumulative: Vec<f64>,
    track_length: f64,
    expected: Option<usize>,
    competitors: Vec<TrackedCompetitor>,
}

impl LiveTracker {
    pub fn new(track: Vec<TrackPoint>, expected: Option<usize>) -> Result<Self, RaceError> {
        let cumulative = geodesy::build_cumulative(&track)?;
        let track_length = cumulative[cumulative.len() - 1];

        Ok(Self {
            track,
            cumulative,
            track_length,
            expected: expected.filter(|&n| n > 0),
            competitors: Vec::new(),
        })
    }

    pub fn track_length(&self) -> f64 {
        self.track_length
    }

    pub fn finished_count(&self) -> usize {
        self.competitors.iter().filter(|c| c.finished).count()
    }

    /// True once a declared expected total has been reached.
    pub fn is_complete(&self) -> bool {
        self.expected
            .is_some_and(|expected| self.finished_count() >= expected)
    }

    /// Applies one fix. Fixes for the same id must arrive in delivery order;
    /// out-of-order or duplicate fixes cannot regress state, they only yield
    /// a no-op distance update and keep the previous speed estimate.
    pub fn ingest(&mut self, fix: &FixEvent) -> Result<(), RaceError> {
        if fix.id.is_empty() {
            return Err(RaceError::InvalidFix("missing competitor id"));
        }
        if !fix.lat.is_finite() || !fix.lon.is_finite() {
            return Err(RaceError::InvalidFix("coordinates must be finite"));
        }

        let point = TrackPoint {
            lat: fix.lat,
            lon: fix.lon,
        };
        let projection = geodesy::project_to_track(&self.track, &self.cumulative, &point)?;

        let index = self.competitors.iter().position(|c| c.id == fix.id);
        let previous = index.map(|i| &self.competitors[i]);

        let mut raw = projection.along.clamp(0.0, self.track_length);
        if previous.is_none() && geodesy::distance(&point, &self.track[0]) <= NEAR_START_M {
            raw = 0.0;
        }

        let mut new_distance = raw.max(previous.map_or(0.0, |c| c.distance));
        if previous.is_some() {
            let projected = TrackPoint {
                lat: projection.lat,
                lon: projection.lon,
            };
            let last_vertex = self.track[self.track.len() - 1];
            if self.track_length - new_distance <= FINISH_EPS_M
                || geodesy::distance(&projected, &last_vertex) <= FINISH_EPS_M
            {
                new_distance = self.track_length;
            }
        }

        let mut speed_mps = previous.map_or(0.0, |c| c.speed_mps);
        if let Some(c) = previous
            && !c.finished
            && fix.timestamp_ms > c.last_ts
        {
            let dt = (fix.timestamp_ms - c.last_ts) as f64 / 1000.0;
            speed_mps = (new_distance - c.distance) / dt;
        }

        let updated = TrackedCompetitor {
            id: fix.id.clone(),
            lat: fix.lat,
            lon: fix.lon,
            distance: new_distance,
            progress: if self.track_length == 0.0 {
                1.0
            } else {
                new_distance / self.track_length
            },
            speed_mps,
            finished: previous.is_some_and(|c| c.finished) || new_distance >= self.track_length,
            last_ts: fix.timestamp_ms,
            fix_quality: fix.fix_quality.or(previous.and_then(|c| c.fix_quality)),
            sequence: fix.sequence.or(previous.and_then(|c| c.sequence)),
        };

        match index {
            Some(i) => self.competitors[i] = updated,
            None => self.competitors.push(updated),
        }
        Ok(())
    }

    /// Builds a snapshot of every tracked competitor, in first-observed order.
    pub fn snapshot(&self, elapsed_ms: u64) -> RaceSnapshot {
        let competitors: Vec<CompetitorSnapshot> = self
            .competitors
            .iter()
            .map(|c| CompetitorSnapshot {
                id: c.id.clone(),
                lat: c.lat,
                lon: c.lon,
                distance: c.distance,
                progress: c.progress,
                speed_mps: c.speed_mps,
                finished: c.finished,
                fix_quality: c.fix_quality,
                sequence: c.sequence,
            })
            .collect();
        let finished_count = competitors.iter().filter(|c| c.finished).count();
        let total = self.expected.unwrap_or(0).max(competitors.len());

        RaceSnapshot {
            elapsed_ms,
            tick_ms: None,
            competitors,
            finished_count,
            total,
        }
    }
}
