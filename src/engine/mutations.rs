use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::rows::{lock_present, lock_range};
use super::{HoldRecord, Ledger, LedgerError, now_ms};

pub(super) fn validate_stay(range: &DateRange) -> Result<(), LedgerError> {
    if range.check_in() >= range.check_out() {
        return Err(LedgerError::InvalidDateRange {
            check_in: range.check_in(),
            check_out: range.check_out(),
        });
    }
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(LedgerError::LimitExceeded("stay too long"));
    }
    Ok(())
}

fn validate_patch(patch: &InventoryPatch) -> Result<(), LedgerError> {
    if patch.is_empty() {
        return Err(LedgerError::InvalidRequest("empty inventory patch"));
    }
    if patch.base_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(LedgerError::InvalidRequest("base price must not be negative"));
    }
    if patch.base_price.is_some_and(|p| p > Decimal::from(MAX_BASE_PRICE)) {
        return Err(LedgerError::LimitExceeded("base price too large"));
    }
    if let Some(surge) = patch.surge_multiplier {
        if surge <= Decimal::ZERO {
            return Err(LedgerError::InvalidRequest("surge multiplier must be positive"));
        }
        if surge > Decimal::from(MAX_SURGE_MULTIPLIER) {
            return Err(LedgerError::LimitExceeded("surge multiplier too large"));
        }
    }
    Ok(())
}

fn hold_outcome(outcome: &'static str) {
    metrics::counter!(observability::HOLDS_TOTAL, "outcome" => outcome).increment(1);
}

impl Ledger {
    /// Claim `units` on every night of `range`, expiring after the configured TTL.
    pub async fn hold(
        &self,
        room_id: Ulid,
        range: DateRange,
        units: u32,
    ) -> Result<Hold, LedgerError> {
        let ttl = self.config.hold_ttl.as_millis() as Ms;
        self.place_hold(room_id, range, units, now_ms() + ttl).await
    }

    /// Claim `units` on every night of `range` or on none of them.
    pub async fn place_hold(
        &self,
        room_id: Ulid,
        range: DateRange,
        units: u32,
        expires_at: Ms,
    ) -> Result<Hold, LedgerError> {
        validate_stay(&range)?;
        if units == 0 {
            return Err(LedgerError::InvalidRequest("units must be positive"));
        }
        if units > MAX_UNITS_PER_HOLD {
            return Err(LedgerError::LimitExceeded("too many units in one hold"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        let mut rows = match lock_range(&cal, room_id, &range).await {
            Ok(rows) => rows,
            Err(LedgerError::InventoryMissing { room_id, date }) => {
                hold_outcome("rejected");
                return Err(LedgerError::InsufficientAvailability { room_id, date });
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = rows.check_can_hold(units) {
            hold_outcome("rejected");
            return Err(e);
        }

        let hold = Hold {
            id: Ulid::new(),
            room_id,
            range,
            units,
            expires_at,
        };
        let event = Event::HoldPlaced { hold: hold.clone() };
        self.wal_append(&event).await?;
        rows.add_held(units);
        self.holds.insert(
            hold.id,
            Arc::new(Mutex::new(HoldRecord {
                hold: hold.clone(),
                state: HoldState::Issued,
                generation: cal.generation,
                settled_at: None,
            })),
        );
        drop(rows);
        drop(cal);

        self.notify.publish(&event, Some(range));
        hold_outcome("placed");
        metrics::gauge!(observability::HOLDS_LIVE).increment(1.0);
        Ok(hold)
    }

    /// Turn a live hold into a booking: held units move to booked on every night.
    pub async fn confirm(&self, hold_id: Ulid) -> Result<(), LedgerError> {
        let cell = self
            .get_hold_cell(&hold_id)
            .ok_or(LedgerError::HoldNotFound(hold_id))?;
        let mut rec = cell.lock().await;
        match rec.state {
            HoldState::Issued => {}
            HoldState::Confirmed | HoldState::Cancelled => {
                return Err(LedgerError::HoldAlreadyConfirmed(hold_id));
            }
            HoldState::Released | HoldState::Expired => {
                return Err(LedgerError::HoldExpired(hold_id));
            }
        }
        let now = now_ms();
        if rec.hold.is_expired(now) {
            // the reaper hasn't got to it yet
            self.release_locked(&mut rec, ReleaseReason::Expired, now).await?;
            return Err(LedgerError::HoldExpired(hold_id));
        }

        let room_id = rec.hold.room_id;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        if cal.generation != rec.generation {
            return Err(LedgerError::InventoryMissing {
                room_id,
                date: rec.hold.range.check_in(),
            });
        }
        let mut rows = lock_range(&cal, room_id, &rec.hold.range).await?;

        let event = Event::HoldConfirmed { id: hold_id, room_id };
        self.wal_append(&event).await?;
        rows.settle_held(rec.hold.units);
        rec.state = HoldState::Confirmed;
        drop(rows);
        drop(cal);

        self.notify.publish(&event, Some(rec.hold.range));
        hold_outcome("confirmed");
        metrics::gauge!(observability::HOLDS_LIVE).decrement(1.0);
        Ok(())
    }

    /// Give a hold's units back. Releasing a hold that already settled (released,
    /// expired or confirmed) is a no-op, so explicit cancellation can race the reaper.
    pub async fn release(&self, hold_id: Ulid) -> Result<(), LedgerError> {
        let cell = self
            .get_hold_cell(&hold_id)
            .ok_or(LedgerError::HoldNotFound(hold_id))?;
        let mut rec = cell.lock().await;
        if !rec.state.is_live() {
            tracing::debug!("release of settled hold {hold_id} ({:?}) ignored", rec.state);
            return Ok(());
        }
        self.release_locked(&mut rec, ReleaseReason::Explicit, now_ms())
            .await
    }

    /// Release `hold_id` if it is still live and expired at `now`. Returns whether it was released.
    pub async fn release_expired(&self, hold_id: Ulid, now: Ms) -> Result<bool, LedgerError> {
        let cell = self
            .get_hold_cell(&hold_id)
            .ok_or(LedgerError::HoldNotFound(hold_id))?;
        let mut rec = cell.lock().await;
        if !rec.state.is_live() || !rec.hold.is_expired(now) {
            return Ok(false);
        }
        self.release_locked(&mut rec, ReleaseReason::Expired, now)
            .await?;
        Ok(true)
    }

    /// Caller holds the hold's lock and has checked it is live.
    async fn release_locked(
        &self,
        rec: &mut HoldRecord,
        reason: ReleaseReason,
        now: Ms,
    ) -> Result<(), LedgerError> {
        let room_id = rec.hold.room_id;
        let event = Event::HoldReleased {
            id: rec.hold.id,
            room_id,
            reason,
        };
        match self.get_room_state(&room_id) {
            Some(rs) => {
                let cal = rs.calendar.read().await;
                if cal.generation == rec.generation {
                    let mut rows = lock_present(&cal, room_id, &rec.hold.range).await;
                    self.wal_append(&event).await?;
                    rows.release_held(rec.hold.units);
                } else {
                    self.wal_append(&event).await?;
                }
            }
            None => self.wal_append(&event).await?,
        }
        rec.state = match reason {
            ReleaseReason::Explicit => HoldState::Released,
            ReleaseReason::Expired => HoldState::Expired,
        };
        rec.settled_at = Some(now);

        self.notify.publish(&event, Some(rec.hold.range));
        hold_outcome(match reason {
            ReleaseReason::Explicit => "released",
            ReleaseReason::Expired => "expired",
        });
        metrics::gauge!(observability::HOLDS_LIVE).decrement(1.0);
        Ok(())
    }

    /// Return a confirmed booking's units to availability. No refund logic.
    pub async fn cancel_booking(&self, hold_id: Ulid) -> Result<(), LedgerError> {
        let cell = self
            .get_hold_cell(&hold_id)
            .ok_or(LedgerError::HoldNotFound(hold_id))?;
        let mut rec = cell.lock().await;
        match rec.state {
            HoldState::Confirmed => {}
            HoldState::Cancelled => return Ok(()),
            HoldState::Issued => {
                return Err(LedgerError::InvalidRequest("hold is not confirmed; release it instead"));
            }
            HoldState::Released | HoldState::Expired => {
                return Err(LedgerError::HoldExpired(hold_id));
            }
        }

        let room_id = rec.hold.room_id;
        let event = Event::BookingCancelled { id: hold_id, room_id };
        match self.get_room_state(&room_id) {
            Some(rs) => {
                let cal = rs.calendar.read().await;
                if cal.generation == rec.generation {
                    let mut rows = lock_present(&cal, room_id, &rec.hold.range).await;
                    self.wal_append(&event).await?;
                    rows.release_booked(rec.hold.units);
                } else {
                    self.wal_append(&event).await?;
                }
            }
            None => self.wal_append(&event).await?,
        }
        rec.state = HoldState::Cancelled;
        rec.settled_at = Some(now_ms());

        self.notify.publish(&event, Some(rec.hold.range));
        hold_outcome("cancelled");
        Ok(())
    }

    /// Operator bulk edit of `range`. Either every night takes the patch or none does.
    pub async fn update_inventory(
        &self,
        room_id: Ulid,
        range: DateRange,
        patch: InventoryPatch,
    ) -> Result<(), LedgerError> {
        validate_patch(&patch)?;
        if range.nights() > MAX_UPDATE_DAYS {
            return Err(LedgerError::LimitExceeded("update window too long"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let cal = rs.calendar.read().await;
        let mut rows = lock_range(&cal, room_id, &range).await?;
        rows.check_patch(&patch)?;

        let event = Event::InventoryUpdated {
            room_id,
            range,
            patch: patch.clone(),
        };
        self.wal_append(&event).await?;
        rows.apply_patch(&patch);
        let nights = rows.len();
        drop(rows);
        drop(cal);

        self.notify.publish(&event, Some(range));
        tracing::info!("updated {nights} nights of room {room_id} from {}", range.check_in());
        Ok(())
    }

    /// Forget released/expired/cancelled holds settled before `cutoff`, and
    /// confirmed ones whose stay ended before `cutoff`'s date.
    pub fn purge_settled_holds(&self, cutoff: Ms) -> usize {
        let cutoff_date = chrono::DateTime::from_timestamp_millis(cutoff).map(|t| t.date_naive());
        let mut purged = 0;
        self.holds.retain(|_, cell| {
            // busy holds are in use, keep them for the next pass
            let Ok(rec) = cell.try_lock() else {
                return true;
            };
            let keep = match rec.state {
                HoldState::Issued => true,
                HoldState::Confirmed => {
                    cutoff_date.is_none_or(|d| rec.hold.range.check_out() >= d)
                }
                _ => rec.settled_at.is_none_or(|t| t >= cutoff),
            };
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }
}
