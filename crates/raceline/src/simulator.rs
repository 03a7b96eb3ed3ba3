//! Synthetic multi-competitor race generation.
//!
//! [`RaceSimulator`] owns the whole field and is advanced one tick at a time;
//! it has no timer of its own (the session layer drives it) and draws all of
//! its randomness from a caller-supplied [`Rng`] so tests can run seeded.

use rand::Rng;

use crate::errors::RaceError;
use crate::geodesy;
use crate::models::{CompetitorSnapshot, RaceSnapshot, TrackPoint};

/// Simulated race parameters.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub competitors: usize,
    /// Target average finish time; must be positive.
    pub avg_duration_ms: f64,
    pub tick_ms: u64,
    /// Width of the band competitors wander in laterally, meters.
    pub lateral_spread_m: f64,
    pub id_prefix: String,
}

impl SimulatorConfig {
    pub fn new(avg_duration_ms: f64) -> Self {
        Self {
            competitors: 5,
            avg_duration_ms,
            tick_ms: 250,
            lateral_spread_m: 6.0,
            id_prefix: "C".to_string(),
        }
    }

    pub fn with_competitors(mut self, count: usize) -> Self {
        self.competitors = count;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_lateral_spread(mut self, meters: f64) -> Self {
        self.lateral_spread_m = meters;
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone)]
struct CompetitorState {
    id: String,
    distance: f64,
    finished: bool,
    base_speed_mps: f64,
    /// Dynamic multiplier that drifts over time, mean-reverting toward 1.
    speed_factor: f64,
    target_offset: f64,
    current_offset: f64,
    /// Ticks until the next lateral target re-draw.
    offset_cooldown: u32,
    lat: f64,
    lon: f64,
    progress: f64,
    speed_mps: f64,
}

/// Advances a field of simulated competitors along a track.
pub struct RaceSimulator {
    track: Vec<TrackPoint>,
    cumulative: Vec<f64>,
    track_length: f64,
    tick_ms: u64,
    lateral_spread: f64,
    elapsed_ms: u64,
    competitors: Vec<CompetitorState>,
}

impl RaceSimulator {
    pub fn new(
        track: Vec<TrackPoint>,
        config: &SimulatorConfig,
        rng: &mut impl Rng,
    ) -> Result<Self, RaceError> {
        if !(config.avg_duration_ms > 0.0) {
            return Err(RaceError::InvalidDuration);
        }
        let cumulative = geodesy::build_cumulative(&track)?;
        let track_length = cumulative[cumulative.len() - 1];

        let base_mps = track_length / (config.avg_duration_ms / 1000.0);
        let competitors = (0..config.competitors)
            .map(|i| {
                // Per-competitor variation of +-15% around the field average.
                let base_speed = base_mps * (1.0 + rng.gen_range(-0.15..0.15));
                // Small head-start jitter so nobody overlaps exactly at t=0.
                let head_start = base_speed * rng.gen_range(0.0..0.5);
                let target_offset = rng.gen_range(-0.5..0.5) * config.lateral_spread_m;

                CompetitorState {
                    id: format!("{}{}", config.id_prefix, i + 1),
                    distance: head_start,
                    finished: false,
                    base_speed_mps: base_speed,
                    speed_factor: 1.0,
                    target_offset,
                    current_offset: target_offset * 0.6,
                    offset_cooldown: rng.gen_range(10..30),
                    lat: track[0].lat,
                    lon: track[0].lon,
                    progress: 0.0,
                    speed_mps: 0.0,
                }
            })
            .collect();

        Ok(Self {
            track,
            cumulative,
            track_length,
            // A zero period would starve the interval driving the session.
            tick_ms: config.tick_ms.max(1),
            lateral_spread: config.lateral_spread_m,
            elapsed_ms: 0,
            competitors,
        })
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn track_length(&self) -> f64 {
        self.track_length
    }

    pub fn all_finished(&self) -> bool {
        self.competitors.iter().all(|c| c.finished)
    }

    /// Advances every non-finished competitor by `dt_ms` and returns the
    /// post-update snapshot. Finished competitors are left untouched.
    pub fn tick(&mut self, dt_ms: u64, rng: &mut impl Rng) -> RaceSnapshot {
        self.elapsed_ms += dt_ms;
        let dt = dt_ms as f64 / 1000.0;

        for c in self.competitors.iter_mut() {
            if c.finished {
                continue;
            }

            // Mean-reverting random walk of the speed factor.
            let drift = rng.gen_range(-0.04..0.04);
            let pull = (1.0 - c.speed_factor) * 0.05;
            c.speed_factor = (c.speed_factor + drift + pull).clamp(0.7, 1.3);

            // Occasional lateral target change, eased toward each tick.
            c.offset_cooldown = c.offset_cooldown.saturating_sub(1);
            if c.offset_cooldown == 0 {
                c.target_offset = rng.gen_range(-0.5..0.5) * self.lateral_spread;
                c.offset_cooldown = rng.gen_range(12..36);
            }
            c.current_offset += (c.target_offset - c.current_offset) * 0.15;

            c.speed_mps = c.base_speed_mps * c.speed_factor;
            c.distance += c.speed_mps * dt;
            if c.distance >= self.track_length {
                c.distance = self.track_length;
                c.finished = true;
            }

            let along = geodesy::interpolate_along(&self.track, &self.cumulative, c.distance);
            let (lat, lon) =
                geodesy::apply_lateral_offset(along.lat, along.lon, along.bearing, c.current_offset);
            c.lat = lat;
            c.lon = lon;
            c.progress = if self.track_length == 0.0 {
                1.0
            } else {
                c.distance / self.track_length
            };
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
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
                fix_quality: None,
                sequence: None,
            })
            .collect();
        let finished_count = competitors.iter().filter(|c| c.finished).count();

        RaceSnapshot {
            elapsed_ms: self.elapsed_ms,
            tick_ms: Some(self.tick_ms),
            competitors,
            finished_count,
            total: self.competitors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn straight_track() -> Vec<TrackPoint> {
        vec![
            TrackPoint { lat: 0.0, lon: 0.0 },
            TrackPoint {
                lat: 0.0,
                lon: 0.001,
            },
        ]
    }

    #[test]
    fn rejects_short_track() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = RaceSimulator::new(
            vec![TrackPoint { lat: 0.0, lon: 0.0 }],
            &SimulatorConfig::new(5_000.0),
            &mut rng,
        );
        assert!(matches!(result, Err(RaceError::InvalidTrack)));
    }

    #[test]
    fn rejects_non_positive_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        for bad in [0.0, -100.0, f64::NAN] {
            let result =
                RaceSimulator::new(straight_track(), &SimulatorConfig::new(bad), &mut rng);
            assert!(matches!(result, Err(RaceError::InvalidDuration)));
        }
    }

    #[test]
    fn head_start_jitter_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = SimulatorConfig::new(5_000.0).with_competitors(8);
        let sim = RaceSimulator::new(straight_track(), &config, &mut rng).unwrap();
        let length = sim.track_length();

        // At most half a second of head start at +15% pace.
        let max_head_start = length / 5.0 * 1.15 * 0.5;
        for c in &sim.snapshot().competitors {
            assert!(c.distance >= 0.0);
            assert!(c.distance <= max_head_start);
            assert_eq!(c.progress, 0.0);
            assert!(!c.finished);
        }
    }

    #[test]
    fn race_converges_without_overshooting() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = SimulatorConfig::new(5_000.0)
            .with_competitors(4)
            .with_tick_ms(250);
        let mut sim = RaceSimulator::new(straight_track(), &config, &mut rng).unwrap();
        let length = sim.track_length();

        let mut ticks = 0u64;
        while !sim.all_finished() {
            let snapshot = sim.tick(250, &mut rng);
            ticks += 1;
            assert!(ticks <= 400, "field should finish in bounded time");
            for c in &snapshot.competitors {
                assert!(c.distance <= length);
                assert!(c.progress <= 1.0);
            }
        }

        let last = sim.snapshot();
        assert_eq!(last.finished_count, 4);
        assert_eq!(last.total, 4);
        assert!(last.competitors.iter().all(|c| c.progress == 1.0));
        assert_eq!(last.elapsed_ms, ticks * 250);
    }

    #[test]
    fn speeds_stay_inside_the_drift_envelope() {
        let mut rng = StdRng::seed_from_u64(9);
        let config = SimulatorConfig::new(600_000.0).with_competitors(6);
        let mut sim = RaceSimulator::new(straight_track(), &config, &mut rng).unwrap();
        let nominal = sim.track_length() / 600.0;

        for _ in 0..200 {
            let snapshot = sim.tick(250, &mut rng);
            for c in &snapshot.competitors {
                assert!(c.speed_mps >= nominal * 0.85 * 0.7 - 1e-9);
                assert!(c.speed_mps <= nominal * 1.15 * 1.3 + 1e-9);
            }
        }
    }

    #[test]
    fn zero_length_track_finishes_immediately() {
        let mut rng = StdRng::seed_from_u64(3);
        let track = vec![TrackPoint { lat: 0.0, lon: 0.0 }, TrackPoint { lat: 0.0, lon: 0.0 }];
        let config = SimulatorConfig::new(5_000.0).with_competitors(2);
        let mut sim = RaceSimulator::new(track, &config, &mut rng).unwrap();

        let snapshot = sim.tick(0, &mut rng);
        assert!(sim.all_finished());
        assert!(snapshot.competitors.iter().all(|c| c.finished));
        assert!(snapshot.competitors.iter().all(|c| c.progress == 1.0));
    }
}
