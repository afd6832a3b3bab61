//! Date-range transactions over a room's per-day rows.
//!
//! A `RangeGuard` holds the locks of every row in a range at once. Rows are
//! always locked in ascending date order, so two overlapping transactions on
//! the same room can never wait on each other in a cycle. Validation runs over
//! the whole guard before any row changes, which makes every mutation
//! all-or-nothing across the range.

use tokio::sync::MutexGuard;
use ulid::Ulid;

use crate::model::*;

use super::{Calendar, LedgerError};

pub(crate) struct RangeGuard<'a> {
    room_id: Ulid,
    rows: Vec<MutexGuard<'a, InventoryRecord>>,
}

/// Lock every night of `range`. Fails before locking anything if a night has no row.
pub(super) async fn lock_range<'a>(
    cal: &'a Calendar,
    room_id: Ulid,
    range: &DateRange,
) -> Result<RangeGuard<'a>, LedgerError> {
    let mut cells = Vec::with_capacity(range.nights() as usize);
    for date in range.dates() {
        let cell = cal
            .days
            .get(&date)
            .ok_or(LedgerError::InventoryMissing { room_id, date })?;
        cells.push(cell);
    }
    let mut rows = Vec::with_capacity(cells.len());
    for cell in cells {
        rows.push(cell.lock().await);
    }
    Ok(RangeGuard { room_id, rows })
}

/// Lock whichever nights of `range` still have rows (retired nights are skipped).
pub(super) async fn lock_present<'a>(
    cal: &'a Calendar,
    room_id: Ulid,
    range: &DateRange,
) -> RangeGuard<'a> {
    let mut rows = Vec::with_capacity(range.nights() as usize);
    for (_, cell) in cal.days.range(range.check_in()..range.check_out()) {
        rows.push(cell.lock().await);
    }
    RangeGuard { room_id, rows }
}

/// Replay-only variant of `lock_present`: nothing else can hold the rows yet.
pub(super) fn try_lock_present<'a>(
    cal: &'a Calendar,
    room_id: Ulid,
    range: &DateRange,
) -> RangeGuard<'a> {
    let rows = cal
        .days
        .range(range.check_in()..range.check_out())
        .map(|(_, cell)| cell.try_lock().expect("replay: uncontended row"))
        .collect();
    RangeGuard { room_id, rows }
}

impl RangeGuard<'_> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn check_can_hold(&self, units: u32) -> Result<(), LedgerError> {
        match self.rows.iter().find(|r| !r.can_hold(units)) {
            Some(row) => Err(LedgerError::InsufficientAvailability {
                room_id: self.room_id,
                date: row.date,
            }),
            None => Ok(()),
        }
    }

    pub fn check_patch(&self, patch: &InventoryPatch) -> Result<(), LedgerError> {
        let Some(requested) = patch.total_units else {
            return Ok(());
        };
        match self.rows.iter().find(|r| requested < r.committed()) {
            Some(row) => Err(LedgerError::CapacityBelowBooked {
                room_id: self.room_id,
                date: row.date,
                requested,
                committed: row.committed(),
            }),
            None => Ok(()),
        }
    }

    pub fn add_held(&mut self, units: u32) {
        for row in &mut self.rows {
            row.held_units += units;
            debug_assert!(row.committed() <= row.total_units);
        }
    }

    /// Move `units` from held to booked.
    pub fn settle_held(&mut self, units: u32) {
        for row in &mut self.rows {
            row.held_units = row.held_units.saturating_sub(units);
            row.booked_units += units;
        }
    }

    pub fn release_held(&mut self, units: u32) {
        for row in &mut self.rows {
            row.held_units = row.held_units.saturating_sub(units);
        }
    }

    pub fn release_booked(&mut self, units: u32) {
        for row in &mut self.rows {
            row.booked_units = row.booked_units.saturating_sub(units);
        }
    }

    pub fn apply_patch(&mut self, patch: &InventoryPatch) {
        for row in &mut self.rows {
            patch.apply(row);
        }
    }
}
