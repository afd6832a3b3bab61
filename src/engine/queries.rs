use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::mutations::validate_stay;
use super::{Calendar, Ledger, LedgerError};

/// Copy every night of `range`, locking one row at a time. `None` when a night has no row.
pub(super) async fn read_range(cal: &Calendar, range: &DateRange) -> Option<Vec<InventoryRecord>> {
    let mut out = Vec::with_capacity(range.nights() as usize);
    for date in range.dates() {
        let cell = cal.days.get(&date)?;
        out.push(cell.lock().await.clone());
    }
    Some(out)
}

impl Ledger {
    /// Whether every night of `range` can take `units` more units right now.
    /// A night without a row is unavailable.
    pub async fn check_availability(
        &self,
        room_id: Ulid,
        range: DateRange,
        units: u32,
    ) -> Result<bool, LedgerError> {
        validate_stay(&range)?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        for date in range.dates() {
            let Some(cell) = cal.days.get(&date) else {
                return Ok(false);
            };
            if !cell.lock().await.can_hold(units) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// All rows of a room, ascending by date.
    pub async fn get_all_inventory_by_room(
        &self,
        room_id: Ulid,
    ) -> Result<Vec<InventoryRecord>, LedgerError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        let mut out = Vec::with_capacity(cal.days.len());
        for cell in cal.days.values() {
            out.push(cell.lock().await.clone());
        }
        Ok(out)
    }

    pub async fn get_inventory(
        &self,
        room_id: Ulid,
        date: NaiveDate,
    ) -> Result<InventoryRecord, LedgerError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        let cell = cal
            .days
            .get(&date)
            .ok_or(LedgerError::InventoryMissing { room_id, date })?;
        let record = cell.lock().await.clone();
        Ok(record)
    }

    /// Final price of one night as seen on `as_of`.
    pub async fn price_night(
        &self,
        room_id: Ulid,
        date: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<Price, LedgerError> {
        let record = self.get_inventory(room_id, date).await?;
        Ok(self.pricing.quote(&record, as_of))
    }

    pub fn get_room(&self, room_id: &Ulid) -> Option<Room> {
        self.rooms.get(room_id).map(|rs| rs.room.clone())
    }

    pub async fn get_hold(&self, hold_id: &Ulid) -> Option<HoldInfo> {
        let cell = self.get_hold_cell(hold_id)?;
        let rec = cell.lock().await;
        Some(HoldInfo {
            hold: rec.hold.clone(),
            state: rec.state,
        })
    }

    pub fn get_hotel(&self, hotel_id: &Ulid) -> Option<HotelInfo> {
        self.hotels.get(hotel_id).map(|h| HotelInfo {
            id: *hotel_id,
            active: h.active,
            room_ids: h.rooms.clone(),
        })
    }

    /// Every hotel, ascending by id.
    pub fn list_hotels(&self) -> Vec<HotelInfo> {
        let mut out: Vec<HotelInfo> = self
            .hotels
            .iter()
            .map(|e| HotelInfo {
                id: *e.key(),
                active: e.active,
                room_ids: e.rooms.clone(),
            })
            .collect();
        out.sort_by_key(|h| h.id);
        out
    }

    /// Live holds past their expiry. Holds busy in another operation are skipped
    /// and picked up on the next pass.
    pub fn collect_expired_holds(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        self.holds
            .iter()
            .filter_map(|e| {
                let rec = e.value().try_lock().ok()?;
                (rec.state.is_live() && rec.hold.is_expired(now))
                    .then_some((rec.hold.id, rec.hold.room_id))
            })
            .collect()
    }

    /// Holds in the `Issued` state. Busy holds are counted as live.
    pub fn live_hold_count(&self) -> usize {
        self.holds
            .iter()
            .filter(|e| e.value().try_lock().map_or(true, |rec| rec.state.is_live()))
            .count()
    }
}
