//! Drives a running raceline server with a synthetic live race.
//!
//! ```
//! cargo run -p gps-sim -- ws://localhost:3030/ws
//! ```
//!
//! Environment: `RIDERS` (default 4), `AVG_DURATION_MS` (default 60000),
//! `REPORT_INTERVAL_MS` (default 1000).

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing_subscriber::EnvFilter;

use gps_sim::course::Oval;
use gps_sim::feed::{FeedConfig, FixFeed};
use gps_sim::riders;
use raceline::session::now_unix_ms;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:3030/ws".to_string());
    let rider_count: usize = env_or("RIDERS", 4);
    let avg_duration_ms: u64 = env_or("AVG_DURATION_MS", 60_000);
    let report_interval_ms: u64 = env_or("REPORT_INTERVAL_MS", 1_000);

    let mut rng = StdRng::from_entropy();
    let course = Oval::new(40.0, -105.35)
        .with_semi_axes(400.0, 250.0)
        .with_vertices(64)
        .generate();
    let riders = riders::generate("R", rider_count, &mut rng);
    for rider in &riders {
        tracing::info!(id = %rider.device_id, name = %rider.name, "rider ready");
    }

    let config = FeedConfig {
        avg_duration_ms,
        report_interval_ms,
        ..Default::default()
    };
    let mut feed = FixFeed::new(course.clone(), riders, config, now_unix_ms(), &mut rng)?;

    let (socket, _) = connect_async(url.as_str())
        .await
        .context("connecting to raceline server")?;
    let (mut sink, mut stream) = socket.split();
    tracing::info!(%url, "connected");

    let start = json!({
        "type": "start_live",
        "track": course,
        "competitors": rider_count,
    });
    sink.send(Message::Text(start.to_string())).await?;

    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(report_interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for fix in feed.next_batch(&mut rng) {
                    let message = json!({
                        "type": "fix",
                        "id": fix.id,
                        "lat": fix.lat,
                        "lon": fix.lon,
                        "ts": fix.timestamp_ms,
                        "fix": fix.fix_quality,
                        "nm": fix.sequence,
                    });
                    sink.send(Message::Text(message.to_string())).await?;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if handle_server_message(&text) {
                        tracing::info!("race complete");
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error.into()),
                None => {
                    tracing::warn!("server closed the connection");
                    return Ok(());
                }
            }
        }
    }
}

/// Logs server traffic; returns true when the race has ended.
fn handle_server_message(text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return false;
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("tick") => {
            if let (Some(finished), Some(total)) = (
                value.pointer("/snapshot/finishedCount").and_then(|v| v.as_u64()),
                value.pointer("/snapshot/total").and_then(|v| v.as_u64()),
            ) {
                tracing::info!(finished, total, "snapshot");
            }
            false
        }
        Some("end") => true,
        Some("error") => {
            tracing::warn!(message = %text, "server error");
            false
        }
        _ => false,
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
