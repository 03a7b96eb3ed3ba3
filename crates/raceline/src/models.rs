use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single vertex of a race track polyline, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Public per-competitor fields included in every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorSnapshot {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Along-track distance from the start, in meters.
    pub distance: f64,
    /// `distance / track_length`; 1.0 on a zero-length track.
    pub progress: f64,
    pub speed_mps: f64,
    pub finished: bool,
    /// GNSS fix quality as reported by the receiver (GGA field).
    #[serde(rename = "fix", skip_serializing_if = "Option::is_none", default)]
    pub fix_quality: Option<u8>,
    /// Receiver-side message counter, when the feed provides one.
    #[serde(rename = "nm", skip_serializing_if = "Option::is_none", default)]
    pub sequence: Option<u64>,
}

/// Point-in-time summary of the whole field, emitted on every tick or fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSnapshot {
    pub elapsed_ms: u64,
    /// Tick period for simulated races; `None` for live sessions.
    pub tick_ms: Option<u64>,
    pub competitors: Vec<CompetitorSnapshot>,
    pub finished_count: usize,
    pub total: usize,
}

/// Commands accepted on the control WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Start a simulated race on the given track.
    Start {
        #[serde(default)]
        track: Vec<TrackPoint>,
        competitors: Option<usize>,
        avg_duration_ms: Option<f64>,
        tick_ms: Option<u64>,
        lateral_spread_meters: Option<f64>,
    },
    /// Start a live session fed by external fixes.
    StartLive {
        #[serde(default)]
        track: Vec<TrackPoint>,
        competitors: Option<usize>,
    },
    /// A position fix for one competitor.
    Fix {
        id: Option<String>,
        lat: Option<f64>,
        lon: Option<f64>,
        ts: Option<u64>,
        #[serde(rename = "fix")]
        fix_quality: Option<u8>,
        #[serde(rename = "nm")]
        sequence: Option<u64>,
    },
    /// Halt whatever session is active.
    Stop,
}

/// Messages sent to control-socket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Hello,
    Started { session: Uuid },
    StartedLive { session: Uuid },
    Tick { snapshot: RaceSnapshot },
    End,
    Error { error: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>) -> Self {
        ServerMessage::Error { error: code.into() }
    }
}
