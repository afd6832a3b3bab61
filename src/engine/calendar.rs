//! Calendar initializer: materializes, deletes and retires a room's per-day rows.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Calendar, Ledger, LedgerError};

/// Nights in `[start, start + days)` that have no row yet.
fn missing_dates(cal: &Calendar, start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take(days as usize)
        .filter(|d| !cal.days.contains_key(d))
        .collect()
}

/// Create a fresh row for every missing night. Existing rows are left alone.
pub(super) fn fill_missing(
    cal: &mut Calendar,
    start: NaiveDate,
    days: u32,
    total_units: u32,
    base_price: Price,
) -> usize {
    let missing = missing_dates(cal, start, days);
    for date in &missing {
        let record = InventoryRecord::fresh(*date, total_units, base_price);
        cal.days.insert(*date, Arc::new(Mutex::new(record)));
    }
    missing.len()
}

pub(super) fn clear(cal: &mut Calendar) {
    cal.days.clear();
    cal.generation += 1;
}

/// Drop rows dated before `before`. Returns how many went.
pub(super) fn retire(cal: &mut Calendar, before: NaiveDate) -> usize {
    let kept = cal.days.split_off(&before);
    let removed = cal.days.len();
    cal.days = kept;
    removed
}

impl Ledger {
    /// Create one row per night for `days` nights from `start`. Nights that already
    /// have a row are skipped and keep their edits. Returns rows created.
    pub async fn initialize_room(
        &self,
        room_id: Ulid,
        start: NaiveDate,
        days: u32,
    ) -> Result<usize, LedgerError> {
        if days == 0 {
            return Err(LedgerError::InvalidRequest("horizon must be at least one day"));
        }
        if days > MAX_HORIZON_DAYS {
            return Err(LedgerError::LimitExceeded("horizon too long"));
        }
        if start.checked_add_days(Days::new(days as u64)).is_none() {
            return Err(LedgerError::InvalidRequest("date out of range"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let mut cal = rs.calendar.write().await;
        // removed while waiting for the lock
        if !self.rooms.contains_key(&room_id) {
            return Err(LedgerError::RoomNotFound(room_id));
        }
        if missing_dates(&cal, start, days).is_empty() {
            return Ok(0);
        }

        let event = Event::InventoryInitialized {
            room_id,
            start,
            days,
            total_units: rs.room.capacity,
            base_price: rs.room.base_price,
        };
        self.wal_append(&event).await?;
        let created = fill_missing(&mut cal, start, days, rs.room.capacity, rs.room.base_price);
        drop(cal);
        self.notify.publish(&event, DateRange::starting(start, days).ok());
        tracing::info!("initialized {created} nights for room {room_id} from {start}");
        Ok(created)
    }

    /// `initialize_room` over the configured horizon starting `today`.
    pub async fn initialize_room_for_a_year(
        &self,
        room_id: Ulid,
        today: NaiveDate,
    ) -> Result<usize, LedgerError> {
        self.initialize_room(room_id, today, self.config.horizon_days)
            .await
    }

    /// Remove every row of the room. Holds still open on those rows become
    /// detached: releasing them later touches nothing.
    pub async fn delete_all_inventories(&self, room_id: Ulid) -> Result<usize, LedgerError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let mut cal = rs.calendar.write().await;
        let removed = cal.days.len();
        if removed == 0 {
            return Ok(0);
        }
        let event = Event::InventoryDeleted { room_id };
        self.wal_append(&event).await?;
        clear(&mut cal);
        drop(cal);
        self.notify.publish(&event, None);
        tracing::info!("deleted {removed} nights for room {room_id}");
        Ok(removed)
    }

    /// Drop every row dated before `cutoff`, room by room.
    pub async fn retire_inventory_before(&self, cutoff: NaiveDate) -> Result<usize, LedgerError> {
        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        let mut total = 0;
        for room_id in room_ids {
            let Some(rs) = self.get_room_state(&room_id) else {
                continue;
            };
            let mut cal = rs.calendar.write().await;
            let stale = cal.days.range(..cutoff).count();
            if stale == 0 {
                continue;
            }
            let event = Event::InventoryRetired {
                room_id,
                before: cutoff,
            };
            self.wal_append(&event).await?;
            total += retire(&mut cal, cutoff);
            drop(cal);
            self.notify.publish(&event, None);
        }
        if total > 0 {
            tracing::info!("retired {total} nights dated before {cutoff}");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn empty() -> Calendar {
        Calendar {
            generation: 0,
            days: BTreeMap::new(),
        }
    }

    #[test]
    fn fill_missing_skips_existing() {
        let mut cal = empty();
        assert_eq!(fill_missing(&mut cal, d(1, 1), 10, 4, Decimal::ONE_HUNDRED), 10);
        cal.days[&d(1, 5)].try_lock().unwrap().closed = true;

        // overlapping second pass only adds the tail
        assert_eq!(fill_missing(&mut cal, d(1, 5), 10, 9, Decimal::TEN), 4);
        assert_eq!(cal.days.len(), 14);
        let edited = cal.days[&d(1, 5)].try_lock().unwrap().clone();
        assert!(edited.closed);
        assert_eq!(edited.total_units, 4);
        let tail = cal.days[&d(1, 14)].try_lock().unwrap().clone();
        assert_eq!(tail.total_units, 9);
    }

    #[test]
    fn retire_drops_only_older_rows() {
        let mut cal = empty();
        fill_missing(&mut cal, d(1, 30), 5, 1, Decimal::ONE);
        assert_eq!(retire(&mut cal, d(2, 2)), 3);
        let left: Vec<_> = cal.days.keys().copied().collect();
        assert_eq!(left, vec![d(2, 2), d(2, 3)]);
        assert_eq!(retire(&mut cal, d(1, 1)), 0);
    }

    #[test]
    fn clear_bumps_generation() {
        let mut cal = empty();
        fill_missing(&mut cal, d(3, 1), 3, 1, Decimal::ONE);
        clear(&mut cal);
        assert!(cal.days.is_empty());
        assert_eq!(cal.generation, 1);
    }
}
