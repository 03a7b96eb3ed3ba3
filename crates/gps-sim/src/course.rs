//! Course sources: generated ovals, GPX files, and resampling helpers.

use std::path::Path;

use gpx::{Gpx, read};
use thiserror::Error;

use raceline::geodesy::{self, displace};
use raceline::models::TrackPoint;

#[derive(Debug, Error)]
pub enum CourseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPX parse error: {0}")]
    Parse(#[from] gpx::errors::GpxError),

    #[error("no track points found")]
    Empty,

    #[error("resampling needs at least 2 steps")]
    TooFewSteps,
}

/// Oval course description in a local east/north frame around a center.
#[derive(Debug, Clone)]
pub struct Oval {
    pub center_lat: f64,
    pub center_lon: f64,
    /// Semi-major axis (east-west before rotation), meters.
    pub semi_major_m: f64,
    /// Semi-minor axis (north-south before rotation), meters.
    pub semi_minor_m: f64,
    pub vertices: usize,
    /// Clockwise rotation of the major axis, degrees.
    pub rotation_deg: f64,
}

impl Oval {
    pub fn new(center_lat: f64, center_lon: f64) -> Self {
        Self {
            center_lat,
            center_lon,
            semi_major_m: 600.0,
            semi_minor_m: 350.0,
            vertices: 80,
            rotation_deg: 0.0,
        }
    }

    pub fn with_semi_axes(mut self, major_m: f64, minor_m: f64) -> Self {
        self.semi_major_m = major_m;
        self.semi_minor_m = minor_m;
        self
    }

    pub fn with_vertices(mut self, count: usize) -> Self {
        self.vertices = count;
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_deg = degrees;
        self
    }

    /// Generates the closed loop, repeating the first vertex at the end.
    pub fn generate(&self) -> Vec<TrackPoint> {
        let rotation = self.rotation_deg.to_radians();
        let mut points = Vec::with_capacity(self.vertices + 1);

        for i in 0..self.vertices {
            let t = i as f64 / self.vertices as f64 * std::f64::consts::TAU;
            let ex = self.semi_major_m * t.cos();
            let ny = self.semi_minor_m * t.sin();
            // Rotate clockwise-positive around the center.
            let east = ex * rotation.cos() + ny * rotation.sin();
            let north = -ex * rotation.sin() + ny * rotation.cos();
            let (lat, lon) = displace(self.center_lat, self.center_lon, east, north);
            points.push(TrackPoint {
                lat: round6(lat),
                lon: round6(lon),
            });
        }

        if let Some(&first) = points.first() {
            points.push(first);
        }
        points
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Loads a course from a GPX file, flattening all tracks and segments.
pub fn load_gpx(path: impl AsRef<Path>) -> Result<Vec<TrackPoint>, CourseError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let gpx: Gpx = read(reader)?;

    let mut points = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let point = waypoint.point();
                points.push(TrackPoint {
                    lat: point.y(),
                    lon: point.x(),
                });
            }
        }
    }

    if points.is_empty() {
        return Err(CourseError::Empty);
    }
    Ok(points)
}

/// Writes a course to a GPX file for inspection in mapping tools.
pub fn save_gpx(
    path: impl AsRef<Path>,
    course: &[TrackPoint],
    name: Option<&str>,
) -> Result<(), CourseError> {
    use geo::Point;
    use gpx::{GpxVersion, Track, TrackSegment, Waypoint, write};

    let segment = TrackSegment {
        points: course
            .iter()
            .map(|p| Waypoint::new(Point::new(p.lon, p.lat)))
            .collect(),
    };
    let track = Track {
        name: name.map(str::to_string),
        segments: vec![segment],
        ..Default::default()
    };
    let gpx = Gpx {
        version: GpxVersion::Gpx11,
        tracks: vec![track],
        ..Default::default()
    };

    let file = std::fs::File::create(path)?;
    write(&gpx, std::io::BufWriter::new(file))?;
    Ok(())
}

/// Resamples a course to `steps` points spaced uniformly along its length.
///
/// A closing vertex that repeats the start (within 1 m) is dropped first so
/// the resampled path does not wrap back to distance zero. A course with no
/// length is returned unchanged.
pub fn resample(course: &[TrackPoint], steps: usize) -> Result<Vec<TrackPoint>, CourseError> {
    if steps < 2 {
        return Err(CourseError::TooFewSteps);
    }
    if course.len() < 2 {
        return Err(CourseError::Empty);
    }

    let closed = course.len() > 2
        && geodesy::distance(&course[0], &course[course.len() - 1]) <= 1.0;
    let open: &[TrackPoint] = if closed {
        &course[..course.len() - 1]
    } else {
        course
    };

    let cumulative = geodesy::build_cumulative(open).map_err(|_| CourseError::Empty)?;
    let total = cumulative[cumulative.len() - 1];
    if total <= 0.0 {
        return Ok(course.to_vec());
    }

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        let d = i as f64 * total / (steps as f64 - 1.0);
        let p = geodesy::interpolate_along(open, &cumulative, d);
        out.push(TrackPoint { lat: p.lat, lon: p.lon });
    }
    Ok(out)
}

/// Extends a path past its finish by `steps` equal strides continuing along
/// the final bearing, for exercising overshoot handling at the finish line.
pub fn overshoot(path: &[TrackPoint], steps: usize, stride_m: f64) -> Vec<TrackPoint> {
    let mut out = path.to_vec();
    let Some([a, b]) = path.last_chunk::<2>() else {
        return out;
    };
    let end_bearing = geodesy::bearing(a, b);

    for j in 1..=steps {
        let along = stride_m * j as f64;
        let (lat, lon) = displace(
            b.lat,
            b.lon,
            along * end_bearing.sin(),
            along * end_bearing.cos(),
        );
        out.push(TrackPoint { lat, lon });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oval_is_a_closed_loop() {
        let course = Oval::new(40.0, -105.35).with_vertices(64).generate();
        assert_eq!(course.len(), 65);
        assert_eq!(course[0], course[64]);
    }

    #[test]
    fn oval_stays_within_its_semi_axes() {
        let oval = Oval::new(40.0, -105.35).with_semi_axes(400.0, 250.0);
        let center = TrackPoint {
            lat: 40.0,
            lon: -105.35,
        };
        for p in oval.generate() {
            let d = geodesy::distance(&center, &p);
            assert!(d <= 400.0 + 1.0, "vertex {d} m from center");
        }
    }

    #[test]
    fn rotated_oval_keeps_its_size() {
        let plain = Oval::new(40.0, -105.35).generate();
        let rotated = Oval::new(40.0, -105.35).with_rotation(45.0).generate();
        let len = |course: &[TrackPoint]| {
            let cumulative = geodesy::build_cumulative(course).unwrap();
            cumulative[cumulative.len() - 1]
        };
        assert!((len(&plain) - len(&rotated)).abs() / len(&plain) < 0.01);
    }

    #[test]
    fn resample_spans_the_whole_course() {
        let course = Oval::new(0.0, 0.0).with_semi_axes(200.0, 120.0).generate();
        let cumulative = geodesy::build_cumulative(&course[..course.len() - 1]).unwrap();
        let total = cumulative[cumulative.len() - 1];

        let steps = resample(&course, 40).unwrap();
        assert_eq!(steps.len(), 40);
        // First resampled point is the start, last is the far end of the
        // opened loop.
        assert!((steps[0].lat - course[0].lat).abs() < 1e-9);
        let resampled = geodesy::build_cumulative(&steps).unwrap();
        let resampled_total = resampled[resampled.len() - 1];
        assert!((resampled_total - total).abs() / total < 0.05);
    }

    #[test]
    fn resample_rejects_bad_input() {
        let course = Oval::new(0.0, 0.0).generate();
        assert!(matches!(
            resample(&course, 1),
            Err(CourseError::TooFewSteps)
        ));
        assert!(matches!(
            resample(&course[..1], 10),
            Err(CourseError::Empty)
        ));
    }

    #[test]
    fn overshoot_continues_along_the_final_bearing() {
        // Heading east; overshoot keeps going east.
        let path = vec![
            TrackPoint { lat: 0.0, lon: 0.0 },
            TrackPoint {
                lat: 0.0,
                lon: 0.001,
            },
        ];
        let extended = overshoot(&path, 3, 10.0);
        assert_eq!(extended.len(), 5);
        for window in extended.windows(2) {
            assert!(window[1].lon > window[0].lon);
            assert!(window[1].lat.abs() < 1e-6);
        }
    }
}
