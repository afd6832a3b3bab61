mod calendar;
mod catalog;
mod error;
mod mutations;
mod queries;
mod rows;
mod search;
mod snapshot;

pub use error::LedgerError;
pub use search::{HotelPriceResult, Page, SearchRequest};

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::LedgerConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::pricing::PricingEngine;
use crate::wal::Wal;

use rows::RangeGuard;

/// One room-night row. Each row has its own lock so that a transaction locks
/// exactly the nights it touches.
pub type SharedRecord = Arc<Mutex<InventoryRecord>>;
pub type SharedRoomState = Arc<RoomState>;
pub type SharedHold = Arc<Mutex<HoldRecord>>;

/// Per-day rows of one room, ordered by date.
pub struct Calendar {
    /// Bumped whenever every row is dropped, so holds placed on the old rows
    /// never touch rows created afterwards.
    pub generation: u64,
    pub days: BTreeMap<NaiveDate, SharedRecord>,
}

pub struct RoomState {
    pub room: Room,
    /// Range transactions take this for read; calendar reshaping
    /// (initialize, delete, retire) takes it for write.
    pub calendar: RwLock<Calendar>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            calendar: RwLock::new(Calendar {
                generation: 0,
                days: BTreeMap::new(),
            }),
        }
    }
}

pub(super) struct HotelState {
    pub active: bool,
    pub rooms: Vec<Ulid>,
}

/// Bookkeeping that lets a hold be reversed exactly once.
#[derive(Debug, Clone)]
pub struct HoldRecord {
    pub hold: Hold,
    pub state: HoldState,
    /// Calendar generation the held units were added to.
    pub generation: u64,
    pub settled_at: Option<Ms>,
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Waits for one append, drains whatever else is already queued,
/// then does a single fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The availability ledger: hotels, rooms, per-day inventory rows and holds.
pub struct Ledger {
    pub(super) hotels: DashMap<Ulid, HotelState>,
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) holds: DashMap<Ulid, SharedHold>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) pricing: PricingEngine,
    pub(super) config: LedgerConfig,
    replayed_events: usize,
}

impl Ledger {
    /// Replay the WAL under `config.data_dir` and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn open(config: LedgerConfig, notify: Arc<NotifyHub>) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.wal_path();
        let replay = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path, replay.valid_len)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let ledger = Self {
            hotels: DashMap::new(),
            rooms: DashMap::new(),
            holds: DashMap::new(),
            wal_tx,
            notify,
            pricing: PricingEngine::new(config.pricing.clone()),
            config,
            replayed_events: replay.events.len(),
        };

        // Sole owner during replay: every try_lock/try_write succeeds immediately.
        // Never block here, open() may run on a runtime worker.
        let settled_at = now_ms();
        for event in &replay.events {
            ledger.replay_event(event, settled_at);
        }
        metrics::gauge!(crate::observability::HOLDS_LIVE).set(ledger.live_hold_count() as f64);
        tracing::info!(
            "ledger replayed {} events: {} hotels, {} rooms, {} holds",
            ledger.replayed_events,
            ledger.hotels.len(),
            ledger.rooms.len(),
            ledger.holds.len()
        );
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Events read from disk when the ledger was opened.
    pub fn replayed_events(&self) -> usize {
        self.replayed_events
    }

    pub(super) fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_hold_cell(&self, id: &Ulid) -> Option<SharedHold> {
        self.holds.get(id).map(|e| e.value().clone())
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    fn replay_event(&self, event: &Event, settled_at: Ms) {
        match event {
            Event::HotelRegistered { id } => {
                self.hotels.insert(
                    *id,
                    HotelState {
                        active: false,
                        rooms: Vec::new(),
                    },
                );
            }
            Event::HotelActivationChanged { id, active } => {
                if let Some(mut hotel) = self.hotels.get_mut(id) {
                    hotel.active = *active;
                }
            }
            Event::RoomRegistered { room } => {
                if let Some(mut hotel) = self.hotels.get_mut(&room.hotel_id) {
                    hotel.rooms.push(room.id);
                }
                self.rooms
                    .insert(room.id, Arc::new(RoomState::new(room.clone())));
            }
            Event::RoomRemoved { id } => {
                if let Some((_, rs)) = self.rooms.remove(id)
                    && let Some(mut hotel) = self.hotels.get_mut(&rs.room.hotel_id)
                {
                    hotel.rooms.retain(|r| r != id);
                }
            }
            Event::InventoryInitialized {
                room_id,
                start,
                days,
                total_units,
                base_price,
            } => {
                self.with_calendar_mut(room_id, |cal| {
                    calendar::fill_missing(cal, *start, *days, *total_units, *base_price);
                });
            }
            Event::InventoryDeleted { room_id } => {
                self.with_calendar_mut(room_id, calendar::clear);
            }
            Event::InventoryRetired { room_id, before } => {
                self.with_calendar_mut(room_id, |cal| {
                    calendar::retire(cal, *before);
                });
            }
            Event::InventoryUpdated {
                room_id,
                range,
                patch,
            } => {
                self.with_rows(room_id, range, |mut rows| rows.apply_patch(patch));
            }
            Event::InventorySnapshot { room_id, records } => {
                self.with_calendar_mut(room_id, |cal| {
                    for record in records {
                        cal.days
                            .insert(record.date, Arc::new(Mutex::new(record.clone())));
                    }
                });
            }
            Event::HoldPlaced { hold } => {
                let generation = self
                    .with_rows(&hold.room_id, &hold.range, |mut rows| {
                        rows.add_held(hold.units);
                    })
                    .unwrap_or(u64::MAX);
                self.insert_hold(HoldRecord {
                    hold: hold.clone(),
                    state: HoldState::Issued,
                    generation,
                    settled_at: None,
                });
            }
            Event::HoldRestored {
                hold,
                state,
                detached,
            } => {
                let generation = match self.get_room_state(&hold.room_id) {
                    Some(rs) if !detached => {
                        rs.calendar.try_read().expect("replay: uncontended read").generation
                    }
                    _ => u64::MAX,
                };
                self.insert_hold(HoldRecord {
                    hold: hold.clone(),
                    state: *state,
                    generation,
                    settled_at: state.is_final().then_some(settled_at),
                });
            }
            Event::HoldConfirmed { id, .. } => {
                self.replay_transition(id, HoldState::Confirmed, settled_at, |rows, units| {
                    rows.settle_held(units)
                });
            }
            Event::HoldReleased { id, reason, .. } => {
                let state = match reason {
                    ReleaseReason::Explicit => HoldState::Released,
                    ReleaseReason::Expired => HoldState::Expired,
                };
                self.replay_transition(id, state, settled_at, |rows, units| {
                    rows.release_held(units)
                });
            }
            Event::BookingCancelled { id, .. } => {
                self.replay_transition(id, HoldState::Cancelled, settled_at, |rows, units| {
                    rows.release_booked(units)
                });
            }
        }
    }

    fn insert_hold(&self, record: HoldRecord) {
        self.holds
            .insert(record.hold.id, Arc::new(Mutex::new(record)));
    }

    fn with_calendar_mut(&self, room_id: &Ulid, f: impl FnOnce(&mut Calendar)) {
        if let Some(rs) = self.get_room_state(room_id) {
            let mut cal = rs.calendar.try_write().expect("replay: uncontended write");
            f(&mut cal);
        }
    }

    /// Run `f` over the present rows of `range`. Returns the calendar generation.
    fn with_rows(
        &self,
        room_id: &Ulid,
        range: &DateRange,
        f: impl FnOnce(RangeGuard<'_>),
    ) -> Option<u64> {
        let rs = self.get_room_state(room_id)?;
        let cal = rs.calendar.try_read().expect("replay: uncontended read");
        f(rows::try_lock_present(&cal, *room_id, range));
        Some(cal.generation)
    }

    fn replay_transition(
        &self,
        id: &Ulid,
        to: HoldState,
        settled_at: Ms,
        f: impl FnOnce(&mut RangeGuard<'_>, u32),
    ) {
        let Some(cell) = self.get_hold_cell(id) else {
            return;
        };
        let mut rec = cell.try_lock().expect("replay: uncontended hold");
        if let Some(rs) = self.get_room_state(&rec.hold.room_id) {
            let cal = rs.calendar.try_read().expect("replay: uncontended read");
            if cal.generation == rec.generation {
                let mut rows = rows::try_lock_present(&cal, rec.hold.room_id, &rec.hold.range);
                f(&mut rows, rec.hold.units);
            }
        }
        rec.state = to;
        if to != HoldState::Confirmed {
            rec.settled_at = Some(settled_at);
        }
    }
}

/// Wall clock in unix ms.
pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}
