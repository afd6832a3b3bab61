use tokio::sync::oneshot;

use crate::model::*;

use super::{Ledger, LedgerError, WalCommand};

impl Ledger {
    /// Rewrite the WAL as the smallest event list that rebuilds current state.
    ///
    /// Only call this while no mutation is in flight (at startup before serving,
    /// or at shutdown once background tasks are stopped). A busy row, calendar or
    /// hold makes it bail out instead of waiting.
    pub async fn compact_wal(&self) -> Result<usize, LedgerError> {
        let events = self.snapshot_events()?;
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| LedgerError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| LedgerError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| LedgerError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(count)
    }

    fn snapshot_events(&self) -> Result<Vec<Event>, LedgerError> {
        const BUSY: LedgerError = LedgerError::InvalidRequest("ledger busy, cannot compact");

        let mut hotels: Vec<_> = self
            .hotels
            .iter()
            .map(|h| (*h.key(), h.active, h.rooms.clone()))
            .collect();
        hotels.sort_by_key(|(id, _, _)| *id);

        let mut events = Vec::new();
        for (id, active, room_ids) in hotels {
            events.push(Event::HotelRegistered { id });
            if active {
                events.push(Event::HotelActivationChanged { id, active });
            }
            for room_id in room_ids {
                let Some(rs) = self.get_room_state(&room_id) else {
                    continue;
                };
                events.push(Event::RoomRegistered {
                    room: rs.room.clone(),
                });
                let cal = rs.calendar.try_read().map_err(|_| BUSY)?;
                let mut records = Vec::with_capacity(cal.days.len());
                for cell in cal.days.values() {
                    records.push(cell.try_lock().map_err(|_| BUSY)?.clone());
                }
                if !records.is_empty() {
                    events.push(Event::InventorySnapshot { room_id, records });
                }
            }
        }

        let mut holds = Vec::with_capacity(self.holds.len());
        for entry in self.holds.iter() {
            let rec = entry.value().try_lock().map_err(|_| BUSY)?;
            let attached = match self.get_room_state(&rec.hold.room_id) {
                Some(rs) => rs.calendar.try_read().map_err(|_| BUSY)?.generation == rec.generation,
                None => false,
            };
            let event = Event::HoldRestored {
                hold: rec.hold.clone(),
                state: rec.state,
                detached: !attached,
            };
            holds.push((rec.hold.id, event));
        }
        // ULIDs sort by creation time
        holds.sort_by_key(|(id, _)| *id);
        events.extend(holds.into_iter().map(|(_, event)| event));
        Ok(events)
    }
}
