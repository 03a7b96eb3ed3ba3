//! Noisy timed fix streams for live-session testing.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use raceline::errors::RaceError;
use raceline::geodesy;
use raceline::models::TrackPoint;
use raceline::tracker::FixEvent;

use crate::riders::Rider;

/// Configuration for a synthetic fix feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Target average finish time across riders.
    pub avg_duration_ms: u64,
    /// Wall-clock spacing between reports per rider.
    pub report_interval_ms: u64,
    /// Standard deviation of the position noise, meters.
    pub gps_jitter_m: f64,
    /// Width of the band riders wander in laterally, meters.
    pub lateral_spread_m: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            avg_duration_ms: 60_000,
            report_interval_ms: 1_000,
            gps_jitter_m: 1.5,
            lateral_spread_m: 4.0,
        }
    }
}

struct FeedRider {
    rider: Rider,
    distance: f64,
    speed_mps: f64,
    lateral_m: f64,
    sequence: u64,
    done: bool,
}

/// Walks every rider down a course, emitting one batch of fixes per report
/// interval. Deterministic for a given rng seed.
pub struct FixFeed {
    track: Vec<TrackPoint>,
    cumulative: Vec<f64>,
    track_length: f64,
    config: FeedConfig,
    riders: Vec<FeedRider>,
    clock_ms: u64,
    jitter: Normal<f64>,
}

impl FixFeed {
    pub fn new(
        track: Vec<TrackPoint>,
        riders: Vec<Rider>,
        config: FeedConfig,
        start_ms: u64,
        rng: &mut impl Rng,
    ) -> Result<Self, RaceError> {
        let cumulative = geodesy::build_cumulative(&track)?;
        let track_length = cumulative[cumulative.len() - 1];
        let base_mps = track_length / (config.avg_duration_ms.max(1) as f64 / 1000.0);

        let riders = riders
            .into_iter()
            .map(|rider| FeedRider {
                rider,
                distance: 0.0,
                speed_mps: base_mps * rng.gen_range(0.85..1.15),
                lateral_m: rng.gen_range(-0.5..0.5) * config.lateral_spread_m,
                sequence: 0,
                done: false,
            })
            .collect();

        // Jitter is sampled in degrees, like the raw receiver noise it mimics.
        let jitter = Normal::new(0.0, config.gps_jitter_m / 111_000.0).unwrap();

        Ok(Self {
            track,
            cumulative,
            track_length,
            config,
            riders,
            clock_ms: start_ms,
            jitter,
        })
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    pub fn rider_count(&self) -> usize {
        self.riders.len()
    }

    pub fn all_finished(&self) -> bool {
        self.riders.iter().all(|r| r.done)
    }

    /// Advances the clock one report interval and returns a fix for every
    /// rider still on course. Riders that cross the finish emit one final
    /// fix and then go quiet.
    pub fn next_batch(&mut self, rng: &mut impl Rng) -> Vec<FixEvent> {
        self.clock_ms += self.config.report_interval_ms;
        let dt = self.config.report_interval_ms as f64 / 1000.0;
        let half_spread = self.config.lateral_spread_m / 2.0;

        let mut batch = Vec::new();
        for rider in self.riders.iter_mut().filter(|r| !r.done) {
            rider.distance = (rider.distance + rider.speed_mps * dt).min(self.track_length);
            if rider.distance >= self.track_length {
                rider.done = true;
            }

            rider.lateral_m =
                (rider.lateral_m + rng.gen_range(-0.3..0.3)).clamp(-half_spread, half_spread);

            let along = geodesy::interpolate_along(&self.track, &self.cumulative, rider.distance);
            let (lat, lon) =
                geodesy::apply_lateral_offset(along.lat, along.lon, along.bearing, rider.lateral_m);

            rider.sequence += 1;
            batch.push(FixEvent {
                id: rider.rider.device_id.clone(),
                lat: lat + self.jitter.sample(rng),
                lon: lon + self.jitter.sample(rng),
                timestamp_ms: self.clock_ms,
                fix_quality: Some(sample_fix_quality(rng)),
                sequence: Some(rider.sequence),
            });
        }
        batch
    }
}

/// Mostly RTK-fixed (4), occasionally RTK-float (5) or plain GPS (1).
fn sample_fix_quality(rng: &mut impl Rng) -> u8 {
    let roll: f64 = rng.r#gen();
    if roll < 0.90 {
        4
    } else if roll < 0.98 {
        5
    } else {
        1
    }
}

/// Renders a fix as a checksummed GGA sentence for the `/nmea` endpoint.
pub fn to_gga_sentence(fix: &FixEvent) -> String {
    let t = time::OffsetDateTime::from_unix_timestamp_nanos(fix.timestamp_ms as i128 * 1_000_000)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let (lat_field, ns) = to_deg_min(fix.lat, true);
    let (lon_field, ew) = to_deg_min(fix.lon, false);

    let body = format!(
        "GPGGA,{:02}{:02}{:02}.{:02},{lat_field},{ns},{lon_field},{ew},{},08,1.0,0.0,M,0.0,M,,",
        t.hour(),
        t.minute(),
        t.second(),
        t.millisecond() / 10,
        fix.fix_quality.unwrap_or(1),
    );
    let checksum = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${body}*{checksum:02X}")
}

fn to_deg_min(value: f64, is_lat: bool) -> (String, char) {
    let hemisphere = if is_lat {
        if value < 0.0 { 'S' } else { 'N' }
    } else if value < 0.0 {
        'W'
    } else {
        'E'
    };

    let abs = value.abs();
    let degrees = abs.trunc() as u32;
    let minutes = (abs - abs.trunc()) * 60.0;
    let field = if is_lat {
        format!("{degrees:02}{minutes:09.6}")
    } else {
        format!("{degrees:03}{minutes:09.6}")
    };
    (field, hemisphere)
}
