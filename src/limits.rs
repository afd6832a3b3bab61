/// Longest calendar a room can be initialized with in one call.
pub const MAX_HORIZON_DAYS: u32 = 3 * 366;

/// Longest stay a hold, check or search may span.
pub const MAX_STAY_NIGHTS: u32 = 90;

/// Largest unit count a single hold may claim.
pub const MAX_UNITS_PER_HOLD: u32 = 1_000;

/// Largest admin edit window.
pub const MAX_UPDATE_DAYS: u32 = MAX_HORIZON_DAYS;

pub const MAX_HOTELS: usize = 100_000;
pub const MAX_ROOMS_PER_HOTEL: usize = 1_000;

pub const MAX_PAGE_SIZE: usize = 100;

/// Upper bound for an operator-set surge multiplier.
pub const MAX_SURGE_MULTIPLIER: i64 = 100;

/// Largest base price a room or an admin edit may set.
pub const MAX_BASE_PRICE: i64 = 1_000_000;
