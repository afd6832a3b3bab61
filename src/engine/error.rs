use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid date range: check-in {check_in} is not before check-out {check_out}")]
    InvalidDateRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("insufficient availability for room {room_id} on {date}")]
    InsufficientAvailability { room_id: Ulid, date: NaiveDate },
    #[error("hold not found: {0}")]
    HoldNotFound(Ulid),
    #[error("hold expired or released: {0}")]
    HoldExpired(Ulid),
    #[error("hold already confirmed: {0}")]
    HoldAlreadyConfirmed(Ulid),
    #[error("room {room_id} on {date}: cannot set total units to {requested}, {committed} already committed")]
    CapacityBelowBooked {
        room_id: Ulid,
        date: NaiveDate,
        requested: u32,
        committed: u32,
    },
    #[error("room {room_id} has no inventory on {date}")]
    InventoryMissing { room_id: Ulid, date: NaiveDate },
    #[error("room not found: {0}")]
    RoomNotFound(Ulid),
    #[error("hotel not found: {0}")]
    HotelNotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl LedgerError {
    /// Whether the same call may succeed later without the caller changing anything
    /// but timing (capacity freed by a release, a flaky disk).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientAvailability { .. } | LedgerError::WalError(_)
        )
    }
}
