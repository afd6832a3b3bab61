use std::sync::Arc;

use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::calendar::clear;
use super::{HotelState, Ledger, LedgerError, RoomState};

impl Ledger {
    /// Hotels start inactive and stay out of search until activated.
    pub async fn register_hotel(&self, id: Ulid) -> Result<(), LedgerError> {
        if self.hotels.len() >= MAX_HOTELS {
            return Err(LedgerError::LimitExceeded("too many hotels"));
        }
        if self.hotels.contains_key(&id) {
            return Err(LedgerError::AlreadyExists(id));
        }
        let event = Event::HotelRegistered { id };
        self.wal_append(&event).await?;
        self.hotels.insert(
            id,
            HotelState {
                active: false,
                rooms: Vec::new(),
            },
        );
        Ok(())
    }

    pub async fn set_hotel_active(&self, id: Ulid, active: bool) -> Result<(), LedgerError> {
        let current = self
            .hotels
            .get(&id)
            .map(|h| h.active)
            .ok_or(LedgerError::HotelNotFound(id))?;
        if current == active {
            return Ok(());
        }
        let event = Event::HotelActivationChanged { id, active };
        self.wal_append(&event).await?;
        if let Some(mut hotel) = self.hotels.get_mut(&id) {
            hotel.active = active;
        }
        tracing::info!("hotel {id} {}", if active { "activated" } else { "deactivated" });
        Ok(())
    }

    pub async fn activate_hotel(&self, id: Ulid) -> Result<(), LedgerError> {
        self.set_hotel_active(id, true).await
    }

    pub async fn deactivate_hotel(&self, id: Ulid) -> Result<(), LedgerError> {
        self.set_hotel_active(id, false).await
    }

    /// Record a room's capacity and pricing facts. Rows are created separately
    /// by the calendar initializer.
    pub async fn register_room(&self, room: Room) -> Result<(), LedgerError> {
        if room.max_occupancy == 0 {
            return Err(LedgerError::InvalidRequest("max occupancy must be positive"));
        }
        if room.base_price < Decimal::ZERO {
            return Err(LedgerError::InvalidRequest("base price must not be negative"));
        }
        if room.base_price > Decimal::from(MAX_BASE_PRICE) {
            return Err(LedgerError::LimitExceeded("base price too large"));
        }
        let room_count = self
            .hotels
            .get(&room.hotel_id)
            .map(|h| h.rooms.len())
            .ok_or(LedgerError::HotelNotFound(room.hotel_id))?;
        if room_count >= MAX_ROOMS_PER_HOTEL {
            return Err(LedgerError::LimitExceeded("too many rooms in hotel"));
        }
        if self.rooms.contains_key(&room.id) {
            return Err(LedgerError::AlreadyExists(room.id));
        }

        let event = Event::RoomRegistered { room: room.clone() };
        self.wal_append(&event).await?;
        if let Some(mut hotel) = self.hotels.get_mut(&room.hotel_id) {
            hotel.rooms.push(room.id);
        }
        let id = room.id;
        self.rooms.insert(id, Arc::new(RoomState::new(room)));
        self.notify.publish(&event, None);
        Ok(())
    }

    /// Delete a room and, with it, every row it owns. One event covers both, and
    /// the calendar stays write-locked until the room is out of the map.
    pub async fn remove_room(&self, id: Ulid) -> Result<(), LedgerError> {
        let rs = self.get_room_state(&id).ok_or(LedgerError::RoomNotFound(id))?;
        let mut cal = rs.calendar.write().await;
        // a concurrent removal won the lock first
        if !self.rooms.contains_key(&id) {
            return Err(LedgerError::RoomNotFound(id));
        }

        let event = Event::RoomRemoved { id };
        self.wal_append(&event).await?;
        let nights = cal.days.len();
        clear(&mut cal);
        self.rooms.remove(&id);
        if let Some(mut hotel) = self.hotels.get_mut(&rs.room.hotel_id) {
            hotel.rooms.retain(|r| *r != id);
        }
        drop(cal);

        self.notify.publish(&event, None);
        self.notify.remove(&id);
        tracing::info!("removed room {id} with {nights} nights");
        Ok(())
    }
}
