//! Change feed: committed ledger events fanned out per room.
//!
//! Every change names the nights it touched, so a subscriber caching one stay
//! window can ignore edits elsewhere on the calendar.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use ulid::Ulid;

use crate::model::{DateRange, Event};

const CHANNEL_CAPACITY: usize = 256;

/// One committed change to a room's calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChange {
    pub room_id: Ulid,
    /// Nights whose rows changed. `None` means the calendar itself was
    /// reshaped (created, deleted, retired or the room removed).
    pub nights: Option<DateRange>,
    pub event: Arc<Event>,
}

impl RoomChange {
    pub fn touches(&self, range: &DateRange) -> bool {
        self.nights.is_none_or(|nights| nights.overlaps(range))
    }
}

/// Receiver that only yields changes overlapping one stay window.
pub struct NightWatch {
    rx: broadcast::Receiver<RoomChange>,
    range: DateRange,
}

impl NightWatch {
    /// Next change touching the watched nights. `Lagged` means changes were
    /// dropped and the caller should re-read the window.
    pub async fn recv(&mut self) -> Result<RoomChange, RecvError> {
        loop {
            let change = self.rx.recv().await?;
            if change.touches(&self.range) {
                return Ok(change);
            }
        }
    }
}

/// Per-room broadcast of committed ledger events.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<RoomChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Every change to a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<RoomChange> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Changes to a room that touch `range`.
    pub fn watch(&self, room_id: Ulid, range: DateRange) -> NightWatch {
        NightWatch {
            rx: self.subscribe(room_id),
            range,
        }
    }

    /// Publish a committed event on its room's channel. Hotel-level events and
    /// rooms nobody listens to are skipped.
    pub fn publish(&self, event: &Event, nights: Option<DateRange>) {
        let Some(room_id) = event.room_id() else {
            return;
        };
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(RoomChange {
                room_id,
                nights,
                event: Arc::new(event.clone()),
            });
        }
    }

    /// Drop a room's channel; open receivers see it closed.
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn nights(day: u32, n: u32) -> DateRange {
        DateRange::starting(NaiveDate::from_ymd_opt(2026, 7, day).unwrap(), n).unwrap()
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        let event = Event::InventoryDeleted { room_id: rid };
        hub.publish(&event, None);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.room_id, rid);
        assert_eq!(*received.event, event);
        assert!(received.touches(&nights(1, 1)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        hub.publish(&Event::RoomRemoved { id: rid }, None);
    }

    #[tokio::test]
    async fn hotel_events_have_no_room_channel() {
        let hub = NotifyHub::new();
        let hotel = Ulid::new();
        let mut rx = hub.subscribe(hotel);
        hub.publish(&Event::HotelRegistered { id: hotel }, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn watch_skips_changes_outside_the_window() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut watch = hub.watch(rid, nights(10, 3));

        let elsewhere = Event::InventoryUpdated {
            room_id: rid,
            range: nights(1, 5),
            patch: Default::default(),
        };
        hub.publish(&elsewhere, Some(nights(1, 5)));
        // check-out day of the earlier range is not a night of it
        hub.publish(&elsewhere, Some(nights(5, 5)));
        let overlapping = Event::InventoryUpdated {
            room_id: rid,
            range: nights(12, 4),
            patch: Default::default(),
        };
        hub.publish(&overlapping, Some(nights(12, 4)));

        let change = watch.recv().await.unwrap();
        assert_eq!(*change.event, overlapping);
        assert_eq!(change.nights, Some(nights(12, 4)));
    }

    #[tokio::test]
    async fn remove_closes_channel() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);
        hub.remove(&rid);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }
}
