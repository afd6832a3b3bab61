use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::LedgerError;

/// Unix milliseconds, used for hold expiry.
pub type Ms = i64;

/// Single-currency money amount.
pub type Price = Decimal;

/// Stay window `[check_in, check_out)`. One element per night.
/// Always at least one night long; decoding goes through `new` as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange", into = "RawDateRange")]
pub struct DateRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Serialize, Deserialize)]
struct RawDateRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = LedgerError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.check_in, raw.check_out)
    }
}

impl From<DateRange> for RawDateRange {
    fn from(range: DateRange) -> Self {
        Self {
            check_in: range.check_in,
            check_out: range.check_out,
        }
    }
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, LedgerError> {
        if check_in >= check_out {
            return Err(LedgerError::InvalidDateRange { check_in, check_out });
        }
        Ok(Self { check_in, check_out })
    }

    /// Range of `nights` nights starting at `check_in`.
    pub fn starting(check_in: NaiveDate, nights: u32) -> Result<Self, LedgerError> {
        let check_out = check_in
            .checked_add_days(Days::new(nights as u64))
            .ok_or(LedgerError::InvalidRequest("date out of range"))?;
        Self::new(check_in, check_out)
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days() as u32
    }

    /// Every night of the stay, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let check_out = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < check_out)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// The facts about a room type the ledger needs. Descriptive metadata lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub hotel_id: Ulid,
    /// Units of this type sold per night.
    pub capacity: u32,
    pub base_price: Price,
    /// Guests one unit can sleep.
    pub max_occupancy: u32,
}

/// One room, one night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub date: NaiveDate,
    pub total_units: u32,
    pub booked_units: u32,
    pub held_units: u32,
    pub base_price: Price,
    pub surge_multiplier: Decimal,
    /// Operator override: no new holds while set.
    pub closed: bool,
}

impl InventoryRecord {
    pub fn fresh(date: NaiveDate, total_units: u32, base_price: Price) -> Self {
        Self {
            date,
            total_units,
            booked_units: 0,
            held_units: 0,
            base_price,
            surge_multiplier: Decimal::ONE,
            closed: false,
        }
    }

    /// Booked plus held.
    pub fn committed(&self) -> u32 {
        self.booked_units + self.held_units
    }

    pub fn available(&self) -> u32 {
        self.total_units.saturating_sub(self.committed())
    }

    pub fn can_hold(&self, units: u32) -> bool {
        !self.closed && self.available() >= units
    }

    /// booked / total. A night with no units counts as full.
    pub fn occupancy(&self) -> Decimal {
        if self.total_units == 0 {
            return Decimal::ONE;
        }
        Decimal::from(self.booked_units) / Decimal::from(self.total_units)
    }
}

/// Operator bulk edit. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPatch {
    pub total_units: Option<u32>,
    pub base_price: Option<Price>,
    pub surge_multiplier: Option<Decimal>,
    pub closed: Option<bool>,
}

impl InventoryPatch {
    pub fn is_empty(&self) -> bool {
        self.total_units.is_none()
            && self.base_price.is_none()
            && self.surge_multiplier.is_none()
            && self.closed.is_none()
    }

    pub fn apply(&self, record: &mut InventoryRecord) {
        if let Some(total) = self.total_units {
            record.total_units = total;
        }
        if let Some(price) = self.base_price {
            record.base_price = price;
        }
        if let Some(surge) = self.surge_multiplier {
            record.surge_multiplier = surge;
        }
        if let Some(closed) = self.closed {
            record.closed = closed;
        }
    }
}

/// Claim on `units` units of a room for every night of `range`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: Ulid,
    pub room_id: Ulid,
    pub range: DateRange,
    pub units: u32,
    pub expires_at: Ms,
}

impl Hold {
    pub fn is_expired(&self, now: Ms) -> bool {
        self.expires_at <= now
    }
}

/// Hold lifecycle: `Issued → Confirmed | Released | Expired`, then `Confirmed → Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldState {
    Issued,
    Confirmed,
    Released,
    Expired,
    Cancelled,
}

impl HoldState {
    /// Still counted in `held_units`.
    pub fn is_live(&self) -> bool {
        matches!(self, HoldState::Issued)
    }

    /// No further transition possible.
    pub fn is_final(&self) -> bool {
        matches!(self, HoldState::Released | HoldState::Expired | HoldState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    Explicit,
    Expired,
}

/// The WAL record format. Every mutation of the ledger is exactly one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelRegistered {
        id: Ulid,
    },
    HotelActivationChanged {
        id: Ulid,
        active: bool,
    },
    RoomRegistered {
        room: Room,
    },
    RoomRemoved {
        id: Ulid,
    },
    InventoryInitialized {
        room_id: Ulid,
        start: NaiveDate,
        days: u32,
        total_units: u32,
        base_price: Price,
    },
    InventoryDeleted {
        room_id: Ulid,
    },
    InventoryRetired {
        room_id: Ulid,
        before: NaiveDate,
    },
    InventoryUpdated {
        room_id: Ulid,
        range: DateRange,
        patch: InventoryPatch,
    },
    /// Written by compaction only: the rows exactly as they were, counters included.
    InventorySnapshot {
        room_id: Ulid,
        records: Vec<InventoryRecord>,
    },
    HoldPlaced {
        hold: Hold,
    },
    /// Written by compaction only: hold bookkeeping without touching any row.
    /// `detached` marks holds whose rows were deleted after placement.
    HoldRestored {
        hold: Hold,
        state: HoldState,
        detached: bool,
    },
    HoldConfirmed {
        id: Ulid,
        room_id: Ulid,
    },
    HoldReleased {
        id: Ulid,
        room_id: Ulid,
        reason: ReleaseReason,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
}

impl Event {
    /// The room whose change feed receives this event.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomRegistered { room } => Some(room.id),
            Event::RoomRemoved { id } => Some(*id),
            Event::InventoryInitialized { room_id, .. }
            | Event::InventoryDeleted { room_id }
            | Event::InventoryRetired { room_id, .. }
            | Event::InventoryUpdated { room_id, .. }
            | Event::InventorySnapshot { room_id, .. }
            | Event::HoldConfirmed { room_id, .. }
            | Event::HoldReleased { room_id, .. }
            | Event::BookingCancelled { room_id, .. } => Some(*room_id),
            Event::HoldPlaced { hold } | Event::HoldRestored { hold, .. } => Some(hold.room_id),
            Event::HotelRegistered { .. } | Event::HotelActivationChanged { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelInfo {
    pub id: Ulid,
    pub active: bool,
    pub room_ids: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldInfo {
    pub hold: Hold,
    pub state: HoldState,
}

/// One room of a hotel priced for a stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomQuote {
    pub room_id: Ulid,
    pub max_occupancy: u32,
    pub available: bool,
    /// Final price of each night, in date order. Empty when any night is missing.
    pub nightly: Vec<Price>,
    pub total: Option<Price>,
}
