//! Spherical-earth geodesy for polyline tracks.
//!
//! Distances are meters, angles are radians unless a name says otherwise.
//! Everything here is a pure function over a track (`&[TrackPoint]`) and its
//! cumulative-distance table; build the table once per session with
//! [`build_cumulative`] and treat both as immutable afterwards.

use std::f64::consts::FRAC_PI_2;

use crate::errors::RaceError;
use crate::models::TrackPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, haversine formula.
pub fn distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in (-pi, pi]; 0 = north, clockwise positive.
pub fn bearing(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    y.atan2(x)
}

/// Builds the per-vertex cumulative distance table for a track.
///
/// `cum[0] = 0`, `cum[i] = cum[i - 1] + distance(p[i - 1], p[i])`; the last
/// entry is the track length. Consecutive duplicate vertices contribute
/// zero-length segments and are tolerated.
pub fn build_cumulative(track: &[TrackPoint]) -> Result<Vec<f64>, RaceError> {
    if track.len() < 2 {
        return Err(RaceError::InvalidTrack);
    }

    let mut cumulative = Vec::with_capacity(track.len());
    cumulative.push(0.0);
    for window in track.windows(2) {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + distance(&window[0], &window[1]));
    }

    Ok(cumulative)
}

/// A point interpolated along a track at a given distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlongPoint {
    pub lat: f64,
    pub lon: f64,
    /// Index of the segment the point falls on.
    pub segment: usize,
    /// Bearing of that segment.
    pub bearing: f64,
}

/// Interpolates a position and heading at along-track distance `d`.
///
/// `d` is clamped to `[0, track_length]`. A `d` exactly on a vertex
/// breakpoint is attributed to the segment beginning there (except at the
/// final vertex). Latitude and longitude are lerped within the segment,
/// which is fine at the segment lengths tracks use here.
///
/// Expects a track/table pair produced by [`build_cumulative`] (at least two
/// vertices, matching lengths).
pub fn interpolate_along(track: &[TrackPoint], cumulative: &[f64], d: f64) -> AlongPoint {
    let total = cumulative[cumulative.len() - 1];
    let last = track.len() - 1;

    if d <= 0.0 {
        return AlongPoint {
            lat: track[0].lat,
            lon: track[0].lon,
            segment: 0,
            bearing: bearing(&track[0], &track[1]),
        };
    }
    if d >= total {
        return AlongPoint {
            lat: track[last].lat,
            lon: track[last].lon,
            segment: last - 1,
            bearing: bearing(&track[last - 1], &track[last]),
        };
    }

    // Binary search for the last breakpoint at or before d. Zero-length
    // segments collapse onto their breakpoint and are skipped over.
    let i = cumulative.partition_point(|&c| c <= d) - 1;
    let segment_len = cumulative[i + 1] - cumulative[i];
    let fraction = if segment_len > 0.0 {
        (d - cumulative[i]) / segment_len
    } else {
        0.0
    };

    let a = &track[i];
    let b = &track[i + 1];
    AlongPoint {
        lat: a.lat + (b.lat - a.lat) * fraction,
        lon: a.lon + (b.lon - a.lon) * fraction,
        segment: i,
        bearing: bearing(a, b),
    }
}

/// Result of projecting an arbitrary point onto a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Along-track distance of the projected point, meters.
    pub along: f64,
    pub lat: f64,
    pub lon: f64,
    pub segment: usize,
    pub bearing: f64,
    /// Perpendicular distance from the input point to the track, meters.
    pub lateral: f64,
}

/// Projects `point` onto the closest segment of the track.
///
/// Each segment is treated in a local equirectangular frame centered at its
/// start vertex (valid while segments are short relative to the Earth's
/// radius) and the projection parameter is clamped to the closed segment.
/// Candidates within 1e-6 m of lateral distance tie-break toward the larger
/// along-distance, so a closed loop's shared start/end vertex never snaps a
/// late fix back to distance zero.
pub fn project_to_track(
    track: &[TrackPoint],
    cumulative: &[f64],
    point: &TrackPoint,
) -> Result<Projection, RaceError> {
    if track.len() < 2 {
        return Err(RaceError::InvalidTrack);
    }

    const TIE_EPS_M: f64 = 1e-6;
    let meters_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    let mut best: Option<Projection> = None;
    for i in 0..track.len() - 1 {
        let a = &track[i];
        let b = &track[i + 1];
        let cos_lat = a.lat.to_radians().cos();

        let we = (point.lon - a.lon) * cos_lat * meters_per_degree;
        let wn = (point.lat - a.lat) * meters_per_degree;
        let ve = (b.lon - a.lon) * cos_lat * meters_per_degree;
        let vn = (b.lat - a.lat) * meters_per_degree;

        let len2 = ve * ve + vn * vn;
        if len2 == 0.0 {
            continue;
        }

        let t = ((we * ve + wn * vn) / len2).clamp(0.0, 1.0);
        let pe = t * ve;
        let pn = t * vn;
        let lateral = (we - pe).hypot(wn - pn);
        let along = cumulative[i] + t * (cumulative[i + 1] - cumulative[i]);

        let better = match &best {
            None => true,
            Some(current) => {
                lateral < current.lateral - TIE_EPS_M
                    || ((lateral - current.lateral).abs() <= TIE_EPS_M && along > current.along)
            }
        };
        if better {
            let (lat, lon) = displace(a.lat, a.lon, pe, pn);
            best = Some(Projection {
                along,
                lat,
                lon,
                segment: i,
                bearing: bearing(a, b),
                lateral,
            });
        }
    }

    // Every segment degenerate: collapse onto the first vertex.
    Ok(best.unwrap_or(Projection {
        along: 0.0,
        lat: track[0].lat,
        lon: track[0].lon,
        segment: 0,
        bearing: bearing(&track[0], &track[1]),
        lateral: 0.0,
    }))
}

/// Displaces a point by local east/north offsets in meters.
pub fn displace(lat: f64, lon: f64, east: f64, north: f64) -> (f64, f64) {
    let d_lat = (north / EARTH_RADIUS_M).to_degrees();
    let d_lon = (east / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (lat + d_lat, lon + d_lon)
}

/// Displaces a point perpendicular to a bearing; positive is right of travel.
pub fn apply_lateral_offset(lat: f64, lon: f64, bearing: f64, offset_m: f64) -> (f64, f64) {
    let perpendicular = bearing + FRAC_PI_2;
    displace(
        lat,
        lon,
        offset_m * perpendicular.sin(),
        offset_m * perpendicular.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn pt(lat: f64, lon: f64) -> TrackPoint {
        TrackPoint { lat, lon }
    }

    /// ~111 m per 0.001 degree of latitude, two-segment dogleg.
    fn dogleg() -> Vec<TrackPoint> {
        vec![pt(0.0, 0.0), pt(0.001, 0.0), pt(0.001, 0.001)]
    }

    /// Closed square loop, first vertex repeated at the end.
    fn square_loop() -> Vec<TrackPoint> {
        vec![
            pt(0.0, 0.0),
            pt(0.0, 0.001),
            pt(0.001, 0.001),
            pt(0.001, 0.0),
            pt(0.0, 0.0),
        ]
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Known distance: ~111km for 1 degree of latitude
        let d = distance(&pt(0.0, 0.0), &pt(1.0, 0.0));
        assert!((d - 111_000.0).abs() < 1_000.0);
    }

    #[test]
    fn bearing_covers_cardinal_directions() {
        let origin = pt(0.0, 0.0);
        assert!(bearing(&origin, &pt(1.0, 0.0)).abs() < 1e-9);
        assert!((bearing(&origin, &pt(0.0, 1.0)) - FRAC_PI_2).abs() < 1e-9);
        assert!((bearing(&origin, &pt(-1.0, 0.0)) - PI).abs() < 1e-9);
        assert!((bearing(&origin, &pt(0.0, -1.0)) + FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn cumulative_table_is_monotonic_from_zero() {
        let track = dogleg();
        let cumulative = build_cumulative(&track).unwrap();
        assert_eq!(cumulative[0], 0.0);
        assert_eq!(cumulative.len(), track.len());
        for window in cumulative.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[test]
    fn cumulative_table_rejects_short_tracks() {
        assert_eq!(build_cumulative(&[]), Err(RaceError::InvalidTrack));
        assert_eq!(
            build_cumulative(&[pt(0.0, 0.0)]),
            Err(RaceError::InvalidTrack)
        );
    }

    #[test]
    fn cumulative_table_tolerates_duplicate_vertices() {
        let track = vec![pt(0.0, 0.0), pt(0.0, 0.0), pt(0.0, 0.001)];
        let cumulative = build_cumulative(&track).unwrap();
        assert_eq!(cumulative[1], 0.0);
        assert!(cumulative[2] > 0.0);
    }

    #[test]
    fn interpolation_hits_both_endpoints() {
        let track = dogleg();
        let cumulative = build_cumulative(&track).unwrap();
        let total = cumulative[cumulative.len() - 1];

        let start = interpolate_along(&track, &cumulative, 0.0);
        assert_eq!((start.lat, start.lon), (0.0, 0.0));

        let end = interpolate_along(&track, &cumulative, total);
        assert_eq!((end.lat, end.lon), (0.001, 0.001));

        // Clamped on both sides.
        let before = interpolate_along(&track, &cumulative, -10.0);
        assert_eq!((before.lat, before.lon), (0.0, 0.0));
        let after = interpolate_along(&track, &cumulative, total + 10.0);
        assert_eq!((after.lat, after.lon), (0.001, 0.001));
    }

    #[test]
    fn interpolation_stays_within_segment_bounds() {
        let track = dogleg();
        let cumulative = build_cumulative(&track).unwrap();
        let p = interpolate_along(&track, &cumulative, 50.0);
        assert_eq!(p.segment, 0);
        assert!(p.lat > 0.0 && p.lat < 0.001);
        assert_eq!(p.lon, 0.0);
    }

    #[test]
    fn breakpoint_attributes_to_following_segment() {
        let track = dogleg();
        let cumulative = build_cumulative(&track).unwrap();
        let p = interpolate_along(&track, &cumulative, cumulative[1]);
        assert_eq!(p.segment, 1);
    }

    #[test]
    fn interpolation_skips_zero_length_segments() {
        let track = vec![pt(0.0, 0.0), pt(0.0, 0.0), pt(0.0, 0.001)];
        let cumulative = build_cumulative(&track).unwrap();
        let p = interpolate_along(&track, &cumulative, 50.0);
        assert_eq!(p.segment, 1);
        assert!(p.lon > 0.0);
    }

    #[test]
    fn projection_round_trips_interpolation() {
        let track = dogleg();
        let cumulative = build_cumulative(&track).unwrap();
        let total = cumulative[cumulative.len() - 1];

        for d in [10.0, 55.0, 120.0, total - 10.0] {
            let p = interpolate_along(&track, &cumulative, d);
            let on_track = pt(p.lat, p.lon);
            let projection = project_to_track(&track, &cumulative, &on_track).unwrap();
            assert!(
                (projection.along - d).abs() < 0.05,
                "round trip at {d}: got {}",
                projection.along
            );
            assert!(projection.lateral < 0.05);
        }
    }

    #[test]
    fn projection_clamps_to_segment_ends() {
        let track = vec![pt(0.0, 0.0), pt(0.0, 0.001)];
        let cumulative = build_cumulative(&track).unwrap();
        let total = cumulative[1];

        // Beyond the finish line: parameter clamps to the end vertex.
        let past = pt(0.0, 0.0015);
        let projection = project_to_track(&track, &cumulative, &past).unwrap();
        assert!((projection.along - total).abs() < 1e-6);
        assert!(projection.lateral > 0.0);
    }

    #[test]
    fn shared_loop_vertex_prefers_larger_distance() {
        let track = square_loop();
        let cumulative = build_cumulative(&track).unwrap();
        let total = cumulative[cumulative.len() - 1];

        let projection = project_to_track(&track, &cumulative, &pt(0.0, 0.0)).unwrap();
        assert!((projection.along - total).abs() < 1e-6);
        assert_eq!(projection.segment, track.len() - 2);
    }

    #[test]
    fn projection_rejects_short_tracks() {
        assert_eq!(
            project_to_track(&[pt(0.0, 0.0)], &[0.0], &pt(0.0, 0.0)),
            Err(RaceError::InvalidTrack)
        );
    }

    #[test]
    fn degenerate_track_falls_back_to_first_vertex() {
        let track = vec![pt(1.0, 1.0), pt(1.0, 1.0)];
        let cumulative = build_cumulative(&track).unwrap();
        let projection = project_to_track(&track, &cumulative, &pt(1.0005, 1.0)).unwrap();
        assert_eq!(projection.along, 0.0);
        assert_eq!((projection.lat, projection.lon), (1.0, 1.0));
    }

    #[test]
    fn lateral_offset_displaces_to_the_right() {
        // Heading north at the equator, a positive offset moves east.
        let (lat, lon) = apply_lateral_offset(0.0, 0.0, 0.0, 5.0);
        assert!(lon > 0.0);
        assert!(lat.abs() < 1e-9);
        let displaced = distance(&pt(0.0, 0.0), &pt(lat, lon));
        assert!((displaced - 5.0).abs() < 0.01);
    }
}
