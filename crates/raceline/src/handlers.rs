//! HTTP and WebSocket surfaces.
//!
//! Two socket flavors exist: the control socket (`/ws`) speaks the tagged
//! JSON protocol and receives the broadcast snapshot stream, while the
//! device socket (`/nmea`) accepts raw NMEA sentences from a single
//! receiver. `POST /api/gps` injects one fix over plain HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{
        ConnectInfo, Query,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    errors::RaceError,
    models::{ClientMessage, ServerMessage},
    nmea,
    session::{SessionManager, now_unix_ms},
    simulator::SimulatorConfig,
    tracker::FixEvent,
};

pub async fn health_check() -> &'static str {
    "ok"
}

/// Upgrades a control connection.
pub async fn race_ws(
    ws: WebSocketUpgrade,
    Extension(sessions): Extension<Arc<SessionManager>>,
) -> Response {
    ws.on_upgrade(move |socket| control_session(socket, sessions))
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_message(sink: &mut WsSink, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn control_session(socket: WebSocket, sessions: Arc<SessionManager>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = sessions.subscribe();

    if !send_message(&mut sink, &ServerMessage::Hello).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_message(&mut sink, &event.into_message()).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "client fell behind the snapshot stream");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_command(&sessions, text.as_str())
                        && !send_message(&mut sink, &reply).await
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

/// Dispatches one control command. `None` means no direct reply: successful
/// fixes and stops are answered by the broadcast stream instead.
fn handle_command(sessions: &Arc<SessionManager>, text: &str) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => return Some(ServerMessage::error("invalid_json")),
    };

    match message {
        ClientMessage::Start {
            track,
            competitors,
            avg_duration_ms,
            tick_ms,
            lateral_spread_meters,
        } => {
            let mut config = SimulatorConfig::new(avg_duration_ms.unwrap_or(0.0));
            if let Some(count) = competitors {
                config = config.with_competitors(count);
            }
            if let Some(tick) = tick_ms {
                config = config.with_tick_ms(tick);
            }
            if let Some(spread) = lateral_spread_meters {
                config = config.with_lateral_spread(spread);
            }
            Some(match sessions.start_simulated(track, config) {
                Ok(session) => ServerMessage::Started { session },
                Err(error) => ServerMessage::error(error.code()),
            })
        }
        ClientMessage::StartLive { track, competitors } => {
            Some(match sessions.start_live(track, competitors) {
                Ok(session) => ServerMessage::StartedLive { session },
                Err(error) => ServerMessage::error(error.code()),
            })
        }
        ClientMessage::Fix {
            id,
            lat,
            lon,
            ts,
            fix_quality,
            sequence,
        } => match sessions.ingest_fix(fix_event(id, lat, lon, ts, fix_quality, sequence)) {
            // The snapshot reaches every subscriber via the broadcast stream.
            Ok(_) => None,
            Err(error) => Some(ServerMessage::error(error.code())),
        },
        ClientMessage::Stop => {
            sessions.stop();
            // The stop command implies an end signal for every viewer.
            sessions.announce_end();
            None
        }
    }
}

fn fix_event(
    id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    ts: Option<u64>,
    fix_quality: Option<u8>,
    sequence: Option<u64>,
) -> FixEvent {
    FixEvent {
        id: id.unwrap_or_default(),
        // Missing coordinates funnel through the finite-number check.
        lat: lat.unwrap_or(f64::NAN),
        lon: lon.unwrap_or(f64::NAN),
        timestamp_ms: ts.filter(|&t| t > 0).unwrap_or_else(now_unix_ms),
        fix_quality,
        sequence,
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub id: Option<String>,
}

/// Upgrades a device connection; the competitor id comes from the query
/// string, falling back to the peer address.
pub async fn nmea_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<DeviceQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Extension(sessions): Extension<Arc<SessionManager>>,
) -> Response {
    let device = query
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| peer.ip().to_string());
    ws.on_upgrade(move |socket| device_session(socket, sessions, device))
}

async fn device_session(mut socket: WebSocket, sessions: Arc<SessionManager>, device: String) {
    debug!(%device, "NMEA device connected");
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => handle_sentence(&sessions, &device, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    debug!(%device, "NMEA device disconnected");
}

fn handle_sentence(sessions: &Arc<SessionManager>, device: &str, raw: &str) {
    match nmea::parse_sentence(raw) {
        Ok(decoded) => {
            let event = FixEvent {
                id: device.to_string(),
                lat: decoded.lat,
                lon: decoded.lon,
                timestamp_ms: now_unix_ms(),
                fix_quality: decoded.fix_quality,
                sequence: None,
            };
            match sessions.ingest_fix(event) {
                Ok(snapshot) => {
                    debug!(device, finished = snapshot.finished_count, "fix ingested");
                }
                Err(error) => warn!(device, %error, "fix rejected"),
            }
        }
        // Decode failures stay at this edge; the tracker never sees them.
        Err(error) => warn!(device, raw = raw.trim(), %error, "undecodable sentence"),
    }
}

/// One fix over plain HTTP, for devices that cannot hold a socket open.
#[derive(Debug, Deserialize)]
pub struct GpsPayload {
    pub id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub ts: Option<u64>,
    #[serde(rename = "fix")]
    pub fix_quality: Option<u8>,
    #[serde(rename = "nm")]
    pub sequence: Option<u64>,
}

pub async fn ingest_gps(
    Extension(sessions): Extension<Arc<SessionManager>>,
    Json(payload): Json<GpsPayload>,
) -> Result<Json<serde_json::Value>, RaceError> {
    sessions.ingest_fix(fix_event(
        payload.id,
        payload.lat,
        payload.lon,
        payload.ts,
        payload.fix_quality,
        payload.sequence,
    ))?;
    Ok(Json(json!({ "ok": true })))
}
