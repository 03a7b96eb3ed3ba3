//! Race session lifecycle.
//!
//! A [`SessionManager`] owns at most one active session at a time, simulated
//! or live, and fans every snapshot out to subscribers over a broadcast
//! channel. Simulated sessions run as a periodic tokio task whose ticks are
//! strictly sequential; live sessions are advanced synchronously by
//! [`SessionManager::ingest_fix`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::RaceError;
use crate::models::{RaceSnapshot, ServerMessage, TrackPoint};
use crate::simulator::{RaceSimulator, SimulatorConfig};
use crate::tracker::{FixEvent, LiveTracker};

/// Events fanned out to every subscriber.
#[derive(Debug, Clone)]
pub enum RaceEvent {
    Tick(RaceSnapshot),
    End,
}

impl RaceEvent {
    pub fn into_message(self) -> ServerMessage {
        match self {
            RaceEvent::Tick(snapshot) => ServerMessage::Tick { snapshot },
            RaceEvent::End => ServerMessage::End,
        }
    }
}

enum Slot {
    Idle,
    Simulated {
        id: Uuid,
        task: JoinHandle<()>,
    },
    Live {
        id: Uuid,
        tracker: LiveTracker,
        started: Instant,
    },
}

/// Owns the single active race session of either kind.
pub struct SessionManager {
    slot: Mutex<Slot>,
    events: broadcast::Sender<RaceEvent>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            slot: Mutex::new(Slot::Idle),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaceEvent> {
        self.events.subscribe()
    }

    /// Starts a simulated race, stopping whatever session was active.
    ///
    /// Validation happens before anything is stopped, so a bad request
    /// leaves a running session untouched.
    pub fn start_simulated(
        self: &Arc<Self>,
        track: Vec<TrackPoint>,
        config: SimulatorConfig,
    ) -> Result<Uuid, RaceError> {
        let mut rng = StdRng::from_entropy();
        let simulator = RaceSimulator::new(track, &config, &mut rng)?;
        let id = Uuid::new_v4();

        let mut slot = self.slot.lock().unwrap();
        Self::halt(&mut slot);
        let task = tokio::spawn(run_simulation(simulator, rng, id, Arc::clone(self)));
        *slot = Slot::Simulated { id, task };
        Ok(id)
    }

    /// Starts a live session, stopping whatever session was active.
    pub fn start_live(
        &self,
        track: Vec<TrackPoint>,
        expected_competitors: Option<usize>,
    ) -> Result<Uuid, RaceError> {
        let tracker = LiveTracker::new(track, expected_competitors)?;
        let id = Uuid::new_v4();

        let mut slot = self.slot.lock().unwrap();
        Self::halt(&mut slot);
        *slot = Slot::Live {
            id,
            tracker,
            started: Instant::now(),
        };
        Ok(id)
    }

    /// Applies one fix to the live session and broadcasts the snapshot.
    ///
    /// When a declared expected total is reached, the final snapshot is
    /// followed by exactly one end event and the session state is discarded.
    pub fn ingest_fix(&self, fix: FixEvent) -> Result<RaceSnapshot, RaceError> {
        let mut slot = self.slot.lock().unwrap();
        let Slot::Live {
            tracker, started, ..
        } = &mut *slot
        else {
            return Err(RaceError::SessionNotStarted);
        };

        tracker.ingest(&fix)?;
        let snapshot = tracker.snapshot(started.elapsed().as_millis() as u64);
        let complete = tracker.is_complete();

        let _ = self.events.send(RaceEvent::Tick(snapshot.clone()));
        if complete {
            let _ = self.events.send(RaceEvent::End);
            *slot = Slot::Idle;
        }
        Ok(snapshot)
    }

    /// Halts whatever session is active. Returns whether one was running.
    ///
    /// Stopping does not broadcast an end event by itself; the transport
    /// decides whether the halt should be announced.
    pub fn stop(&self) -> bool {
        let mut slot = self.slot.lock().unwrap();
        Self::halt(&mut slot)
    }

    /// Broadcasts an end event to every subscriber.
    pub fn announce_end(&self) {
        let _ = self.events.send(RaceEvent::End);
    }

    fn halt(slot: &mut Slot) -> bool {
        match std::mem::replace(slot, Slot::Idle) {
            Slot::Idle => false,
            Slot::Simulated { task, .. } => {
                // Aborting parks the task at its next interval await, so a
                // tick in flight always completes its mutation and emission.
                task.abort();
                true
            }
            Slot::Live { .. } => true,
        }
    }

    /// Clears the slot if `id` is still the active session. The simulation
    /// task calls this when the race ends on its own; a newer session that
    /// already replaced the slot is left alone.
    fn release(&self, id: Uuid) {
        let mut slot = self.slot.lock().unwrap();
        let is_active = matches!(
            &*slot,
            Slot::Simulated { id: active, .. } | Slot::Live { id: active, .. } if *active == id
        );
        if is_active {
            *slot = Slot::Idle;
        }
    }
}

async fn run_simulation(
    mut simulator: RaceSimulator,
    mut rng: StdRng,
    id: Uuid,
    manager: Arc<SessionManager>,
) {
    let dt_ms = simulator.tick_ms();
    let mut interval = tokio::time::interval(Duration::from_millis(dt_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick completes immediately; the initial emission is
    // a zero-dt update so subscribers see the starting field.
    interval.tick().await;

    let mut snapshot = simulator.tick(0, &mut rng);
    loop {
        let done = simulator.all_finished();
        let _ = manager.events.send(RaceEvent::Tick(snapshot));
        if done {
            let _ = manager.events.send(RaceEvent::End);
            manager.release(id);
            return;
        }

        interval.tick().await;
        snapshot = simulator.tick(dt_ms, &mut rng);
    }
}

/// Current wall-clock time as unix milliseconds; used to default missing fix
/// timestamps at the transport edge.
pub fn now_unix_ms() -> u64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as u64
}
