//! Search aggregator: cheapest available room per active hotel for a stay.

use std::cmp::Ordering;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::mutations::validate_stay;
use super::queries::read_range;
use super::{Ledger, LedgerError, SharedRoomState};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub range: DateRange,
    pub guests: u32,
    /// Inclusive bounds on the summed stay price.
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    /// Zero-based.
    pub page: usize,
    pub size: usize,
    /// The day the search is made; drives lead-time pricing.
    pub as_of: NaiveDate,
}

impl SearchRequest {
    pub fn new(range: DateRange, guests: u32, as_of: NaiveDate) -> Self {
        Self {
            range,
            guests,
            min_price: None,
            max_price: None,
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            as_of,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_stay(&self.range)?;
        if self.guests == 0 {
            return Err(LedgerError::InvalidRequest("guests must be positive"));
        }
        if self.size == 0 {
            return Err(LedgerError::InvalidRequest("page size must be positive"));
        }
        if self.size > MAX_PAGE_SIZE {
            return Err(LedgerError::LimitExceeded("page size too large"));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(LedgerError::InvalidRequest("min price above max price"));
        }
        Ok(())
    }

    fn in_bounds(&self, total: Price) -> bool {
        self.min_price.is_none_or(|min| total >= min) && self.max_price.is_none_or(|max| total <= max)
    }
}

/// A hotel's cheapest matching room for the stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelPriceResult {
    pub hotel_id: Ulid,
    pub room_id: Ulid,
    pub total_price: Price,
    pub nightly_prices: Vec<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }
}

fn stay_total(nightly: &[Price]) -> Price {
    nightly.iter().copied().fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Price and availability of one room for a stay, read night by night.
struct Priced {
    available: bool,
    nightly: Vec<Price>,
}

impl Ledger {
    async fn price_stay(&self, rs: &SharedRoomState, range: &DateRange, as_of: NaiveDate) -> Option<Priced> {
        let cal = rs.calendar.read().await;
        let records = read_range(&cal, range).await?;
        drop(cal);
        Some(Priced {
            available: records.iter().all(|r| r.can_hold(1)),
            nightly: records.iter().map(|r| self.pricing.quote(r, as_of)).collect(),
        })
    }

    /// Active hotels with at least one room that sleeps `guests`, is open with a
    /// free unit every night, and whose summed price falls within the bounds.
    /// Each hotel appears once with its cheapest such room; results are ordered
    /// by price, then hotel id.
    pub async fn search_hotels(
        &self,
        request: &SearchRequest,
    ) -> Result<Page<HotelPriceResult>, LedgerError> {
        request.validate()?;
        let started = Instant::now();

        let candidates: Vec<(Ulid, Vec<Ulid>)> = self
            .hotels
            .iter()
            .filter(|h| h.active)
            .map(|h| (*h.key(), h.rooms.clone()))
            .collect();

        let mut results = Vec::new();
        for (hotel_id, room_ids) in candidates {
            let mut best: Option<HotelPriceResult> = None;
            for room_id in room_ids {
                let Some(rs) = self.get_room_state(&room_id) else {
                    continue;
                };
                if rs.room.max_occupancy < request.guests {
                    continue;
                }
                let Some(priced) = self.price_stay(&rs, &request.range, request.as_of).await else {
                    continue;
                };
                if !priced.available {
                    continue;
                }
                let total = stay_total(&priced.nightly);
                if !request.in_bounds(total) {
                    continue;
                }
                let better = best
                    .as_ref()
                    .is_none_or(|b| (total, room_id) < (b.total_price, b.room_id));
                if better {
                    best = Some(HotelPriceResult {
                        hotel_id,
                        room_id,
                        total_price: total,
                        nightly_prices: priced.nightly,
                    });
                }
            }
            results.extend(best);
        }

        results.sort_by(|a, b| match a.total_price.cmp(&b.total_price) {
            Ordering::Equal => a.hotel_id.cmp(&b.hotel_id),
            other => other,
        });
        let total_items = results.len();
        let items = results
            .into_iter()
            .skip(request.page.saturating_mul(request.size))
            .take(request.size)
            .collect();

        metrics::counter!(observability::SEARCHES_TOTAL).increment(1);
        metrics::histogram!(observability::SEARCH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(Page {
            items,
            page: request.page,
            size: request.size,
            total_items,
        })
    }

    /// Every room of one hotel priced for the stay, active or not.
    pub async fn hotel_quotes(
        &self,
        hotel_id: Ulid,
        range: DateRange,
        as_of: NaiveDate,
    ) -> Result<Vec<RoomQuote>, LedgerError> {
        validate_stay(&range)?;
        let room_ids = self
            .hotels
            .get(&hotel_id)
            .map(|h| h.rooms.clone())
            .ok_or(LedgerError::HotelNotFound(hotel_id))?;

        let mut quotes = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            let Some(rs) = self.get_room_state(&room_id) else {
                continue;
            };
            let quote = match self.price_stay(&rs, &range, as_of).await {
                Some(priced) => RoomQuote {
                    room_id,
                    max_occupancy: rs.room.max_occupancy,
                    available: priced.available,
                    total: Some(stay_total(&priced.nightly)),
                    nightly: priced.nightly,
                },
                None => RoomQuote {
                    room_id,
                    max_occupancy: rs.room.max_occupancy,
                    available: false,
                    nightly: Vec::new(),
                    total: None,
                },
            };
            quotes.push(quote);
        }
        Ok(quotes)
    }
}
