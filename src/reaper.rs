use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::engine::Ledger;
use crate::model::Ms;
use crate::observability;

/// Release every live hold expired at `now`. Returns how many were released.
pub async fn reap_once(ledger: &Ledger, now: Ms) -> usize {
    let mut reaped = 0;
    for (hold_id, room_id) in ledger.collect_expired_holds(now) {
        match ledger.release_expired(hold_id, now).await {
            Ok(true) => {
                info!("reaped expired hold {hold_id} on room {room_id}");
                reaped += 1;
            }
            // confirmed or released between collection and now
            Ok(false) => {}
            Err(e) => tracing::debug!("reaper skip {hold_id}: {e}"),
        }
    }
    if reaped > 0 {
        metrics::counter!(observability::HOLDS_REAPED_TOTAL).increment(reaped as u64);
    }
    reaped
}

/// Background task: expire holds and forget settled ones on every tick.
pub async fn run_reaper(ledger: Arc<Ledger>) {
    let retention = ledger.config().settled_hold_retention.as_millis() as Ms;
    let mut interval = tokio::time::interval(ledger.config().reaper_interval);
    loop {
        interval.tick().await;
        let now = Utc::now().timestamp_millis();
        reap_once(&ledger, now).await;

        let purged = ledger.purge_settled_holds(now - retention);
        if purged > 0 {
            tracing::debug!("purged {purged} settled holds");
            metrics::counter!(observability::HOLDS_PURGED_TOTAL).increment(purged as u64);
        }
    }
}

/// Background task: once a day, drop rows for nights that have passed.
pub async fn run_retention(ledger: Arc<Ledger>) {
    let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
    loop {
        interval.tick().await;
        let today = Utc::now().date_naive();
        match ledger.retire_inventory_before(today).await {
            Ok(n) => {
                metrics::counter!(observability::NIGHTS_RETIRED_TOTAL).increment(n as u64);
            }
            Err(e) => tracing::warn!("retention pass failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomledger_test_reaper").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    async fn ledger_with_room(name: &str) -> (Ledger, Ulid) {
        let config = LedgerConfig {
            data_dir: test_data_dir(name),
            ..Default::default()
        };
        let ledger = Ledger::open(config, Arc::new(NotifyHub::new())).unwrap();
        let hotel = Ulid::new();
        let room = Ulid::new();
        ledger.register_hotel(hotel).await.unwrap();
        ledger
            .register_room(Room {
                id: room,
                hotel_id: hotel,
                capacity: 2,
                base_price: Decimal::ONE_HUNDRED,
                max_occupancy: 2,
            })
            .await
            .unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        ledger.initialize_room(room, start, 10).await.unwrap();
        (ledger, room)
    }

    fn stay() -> DateRange {
        DateRange::starting(NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(), 3).unwrap()
    }

    #[tokio::test]
    async fn reaper_releases_expired_holds() {
        let (ledger, room) = ledger_with_room("reap_expired").await;
        let now = Utc::now().timestamp_millis();

        let expired = ledger.place_hold(room, stay(), 2, now - 1000).await.unwrap();
        let fresh = ledger.place_hold(room, stay(), 1, now + 60_000).await;
        // capacity 2 is fully held by the expired hold
        assert!(fresh.is_err());

        assert_eq!(ledger.collect_expired_holds(now).len(), 1);
        assert_eq!(reap_once(&ledger, now).await, 1);
        assert!(ledger.collect_expired_holds(now).is_empty());

        let info = ledger.get_hold(&expired.id).await.unwrap();
        assert_eq!(info.state, HoldState::Expired);
        assert!(ledger.check_availability(room, stay(), 2).await.unwrap());

        // second pass finds nothing
        assert_eq!(reap_once(&ledger, now).await, 0);
    }

    #[tokio::test]
    async fn reaper_leaves_confirmed_holds() {
        let (ledger, room) = ledger_with_room("reap_confirmed").await;
        let hold = ledger.hold(room, stay(), 1).await.unwrap();
        ledger.confirm(hold.id).await.unwrap();

        // far in the future: the hold is past expiry but already confirmed
        let later = hold.expires_at + 1;
        assert_eq!(reap_once(&ledger, later).await, 0);
        let rec = ledger.get_inventory(room, stay().check_in()).await.unwrap();
        assert_eq!((rec.booked_units, rec.held_units), (1, 0));
    }

    #[tokio::test]
    async fn purge_forgets_settled_holds() {
        let (ledger, room) = ledger_with_room("purge").await;
        let released = ledger.hold(room, stay(), 1).await.unwrap();
        ledger.release(released.id).await.unwrap();
        let live = ledger.hold(room, stay(), 1).await.unwrap();

        // cutoff in the past keeps everything
        assert_eq!(ledger.purge_settled_holds(0), 0);

        let cutoff = Utc::now().timestamp_millis() + 1;
        assert_eq!(ledger.purge_settled_holds(cutoff), 1);
        assert!(ledger.get_hold(&released.id).await.is_none());
        assert!(ledger.get_hold(&live.id).await.is_some());
    }
}
