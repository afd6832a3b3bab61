//! Nightly price computation.
//!
//! A price is the result of folding an ordered list of stages over the night's
//! base price. Each stage is a plain function of `(running price, context)`.
//! Stages saturate rather than overflow. Rounding happens once, after the last
//! stage.

use chrono::NaiveDate;
use rust_decimal::prelude::*;

use crate::model::{InventoryRecord, Price};

/// Prices are quoted to the cent, half-up.
const DECIMAL_PLACES: u32 = 2;

/// Read-only snapshot a stage prices against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingContext {
    pub date: NaiveDate,
    /// Whole days from `as_of` until the night. Negative for past nights.
    pub lead_time_days: i64,
    /// booked / total for this room and night.
    pub occupancy: Decimal,
    pub surge_multiplier: Decimal,
}

impl PricingContext {
    pub fn for_record(record: &InventoryRecord, as_of: NaiveDate) -> Self {
        Self {
            date: record.date,
            lead_time_days: (record.date - as_of).num_days(),
            occupancy: record.occupancy(),
            surge_multiplier: record.surge_multiplier,
        }
    }
}

/// Thresholds and multipliers used by the demand stages.
///
/// | condition                        | multiplier |
/// |----------------------------------|------------|
/// | occupancy ≥ 0.8                  | × 1.20     |
/// | occupancy ≤ 0.2 and lead > 7     | × 0.90     |
/// | lead ≤ 1                         | × 1.15     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingRules {
    pub high_occupancy_threshold: Decimal,
    pub high_occupancy_multiplier: Decimal,
    pub low_occupancy_threshold: Decimal,
    pub low_occupancy_min_lead_days: i64,
    pub low_occupancy_multiplier: Decimal,
    pub urgency_max_lead_days: i64,
    pub urgency_multiplier: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            high_occupancy_threshold: Decimal::new(8, 1),
            high_occupancy_multiplier: Decimal::new(12, 1),
            low_occupancy_threshold: Decimal::new(2, 1),
            low_occupancy_min_lead_days: 7,
            low_occupancy_multiplier: Decimal::new(9, 1),
            urgency_max_lead_days: 1,
            urgency_multiplier: Decimal::new(115, 2),
        }
    }
}

pub type Adjust = fn(Price, &PricingContext, &PricingRules) -> Price;

#[derive(Clone, Copy)]
pub struct PricingStage {
    pub name: &'static str,
    pub adjust: Adjust,
}

impl std::fmt::Debug for PricingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PricingStage").field(&self.name).finish()
    }
}

/// Seeds the chain: base price times the operator surge.
pub const BASE: PricingStage = PricingStage {
    name: "base",
    adjust: |price, ctx, _| price.saturating_mul(ctx.surge_multiplier),
};

pub const OCCUPANCY: PricingStage = PricingStage {
    name: "occupancy",
    adjust: |price, ctx, rules| {
        if ctx.occupancy >= rules.high_occupancy_threshold {
            price.saturating_mul(rules.high_occupancy_multiplier)
        } else if ctx.occupancy <= rules.low_occupancy_threshold
            && ctx.lead_time_days > rules.low_occupancy_min_lead_days
        {
            price.saturating_mul(rules.low_occupancy_multiplier)
        } else {
            price
        }
    },
};

/// Last-minute premium.
pub const URGENCY: PricingStage = PricingStage {
    name: "urgency",
    adjust: |price, ctx, rules| {
        if ctx.lead_time_days <= rules.urgency_max_lead_days {
            price.saturating_mul(rules.urgency_multiplier)
        } else {
            price
        }
    },
};

/// Manual surges are already folded into `BASE`; this is the hook for holiday
/// and campaign rules.
pub const OVERRIDE: PricingStage = PricingStage {
    name: "override",
    adjust: |price, _, _| price,
};

pub const DEFAULT_CHAIN: [PricingStage; 4] = [BASE, OCCUPANCY, URGENCY, OVERRIDE];

#[derive(Debug, Clone)]
pub struct PricingEngine {
    rules: PricingRules,
    stages: Vec<PricingStage>,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingRules::default())
    }
}

impl PricingEngine {
    pub fn new(rules: PricingRules) -> Self {
        Self {
            rules,
            stages: DEFAULT_CHAIN.to_vec(),
        }
    }

    /// Append a stage after the existing chain.
    pub fn with_stage(mut self, stage: PricingStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Final price of one night, rounded to the cent.
    pub fn calculate_price(&self, record: &InventoryRecord, ctx: &PricingContext) -> Price {
        let raw = self
            .stages
            .iter()
            .fold(record.base_price, |price, stage| (stage.adjust)(price, ctx, &self.rules));
        raw.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Price a night as seen on `as_of`.
    pub fn quote(&self, record: &InventoryRecord, as_of: NaiveDate) -> Price {
        self.calculate_price(record, &PricingContext::for_record(record, as_of))
    }

    /// Sum of the final nightly prices of a stay.
    pub fn total_price<'a>(
        &self,
        records: impl IntoIterator<Item = &'a InventoryRecord>,
        as_of: NaiveDate,
    ) -> Price {
        records
            .into_iter()
            .map(|record| self.quote(record, as_of))
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(base: Decimal) -> InventoryRecord {
        InventoryRecord::fresh(d(2026, 6, 15), 100, base)
    }

    fn ctx(occupancy: Decimal, lead: i64) -> PricingContext {
        PricingContext {
            date: d(2026, 6, 15),
            lead_time_days: lead,
            occupancy,
            surge_multiplier: Decimal::ONE,
        }
    }

    #[test]
    fn high_occupancy_premium() {
        let engine = PricingEngine::default();
        let price = engine.calculate_price(&record(Decimal::ONE_HUNDRED), &ctx(Decimal::new(85, 2), 10));
        assert_eq!(price, Decimal::new(12000, 2));
    }

    #[test]
    fn low_occupancy_discount_needs_lead_time() {
        let engine = PricingEngine::default();
        let rec = record(Decimal::ONE_HUNDRED);
        assert_eq!(
            engine.calculate_price(&rec, &ctx(Decimal::new(1, 1), 10)),
            Decimal::new(9000, 2)
        );
        // 0.2 is inclusive
        assert_eq!(
            engine.calculate_price(&rec, &ctx(Decimal::new(2, 1), 8)),
            Decimal::new(9000, 2)
        );
        // exactly 7 days out is not "more than 7"
        assert_eq!(
            engine.calculate_price(&rec, &ctx(Decimal::new(1, 1), 7)),
            Decimal::new(10000, 2)
        );
    }

    #[test]
    fn mid_occupancy_is_untouched() {
        let engine = PricingEngine::default();
        let price = engine.calculate_price(&record(Decimal::ONE_HUNDRED), &ctx(Decimal::new(5, 1), 30));
        assert_eq!(price, Decimal::new(10000, 2));
    }

    #[test]
    fn urgency_premium_stacks_with_occupancy() {
        let engine = PricingEngine::default();
        let rec = record(Decimal::ONE_HUNDRED);
        assert_eq!(
            engine.calculate_price(&rec, &ctx(Decimal::new(5, 1), 1)),
            Decimal::new(11500, 2)
        );
        assert_eq!(
            engine.calculate_price(&rec, &ctx(Decimal::new(9, 1), 0)),
            Decimal::new(13800, 2)
        );
    }

    #[test]
    fn surge_folds_into_base() {
        let engine = PricingEngine::default();
        let mut rec = record(Decimal::ONE_HUNDRED);
        rec.surge_multiplier = Decimal::new(15, 1);
        let c = PricingContext::for_record(&rec, d(2026, 6, 1));
        assert_eq!(c.lead_time_days, 14);
        assert_eq!(c.occupancy, Decimal::ZERO);
        // 100 × 1.5, low occupancy with 14 days lead → × 0.9
        assert_eq!(engine.calculate_price(&rec, &c), Decimal::new(13500, 2));
    }

    #[test]
    fn extreme_inputs_saturate() {
        let engine = PricingEngine::default();
        let mut rec = record(Decimal::MAX);
        rec.surge_multiplier = Decimal::TEN;
        let c = PricingContext {
            surge_multiplier: Decimal::TEN,
            ..ctx(Decimal::ONE, 0)
        };
        assert_eq!(engine.calculate_price(&rec, &c), Decimal::MAX);
        assert_eq!(engine.total_price([&rec, &rec], rec.date), Decimal::MAX);
    }

    #[test]
    fn rounds_only_at_the_end() {
        let engine = PricingEngine::default();
        // 1.12 × 1.2 × 1.15 = 1.5456 → 1.55. Rounding after each stage would give 1.54.
        let price = engine.calculate_price(&record(Decimal::new(112, 2)), &ctx(Decimal::new(9, 1), 0));
        assert_eq!(price, Decimal::new(155, 2));
    }

    #[test]
    fn rounds_half_up() {
        let engine = PricingEngine::default();
        let price = engine.calculate_price(&record(Decimal::new(10005, 3)), &ctx(Decimal::new(5, 1), 3));
        assert_eq!(price, Decimal::new(1001, 2));
    }

    #[test]
    fn deterministic() {
        let engine = PricingEngine::default();
        let rec = record(Decimal::new(8999, 2));
        let c = ctx(Decimal::new(83, 2), 1);
        assert_eq!(engine.calculate_price(&rec, &c), engine.calculate_price(&rec, &c));
    }

    #[test]
    fn custom_rules_and_extra_stage() {
        let rules = PricingRules {
            urgency_multiplier: Decimal::TWO,
            ..PricingRules::default()
        };
        let weekend = PricingStage {
            name: "flat_fee",
            adjust: |price, _, _| price + Decimal::TEN,
        };
        let engine = PricingEngine::new(rules).with_stage(weekend);
        assert_eq!(
            engine.stage_names(),
            vec!["base", "occupancy", "urgency", "override", "flat_fee"]
        );
        let price = engine.calculate_price(&record(Decimal::ONE_HUNDRED), &ctx(Decimal::new(5, 1), 0));
        assert_eq!(price, Decimal::new(21000, 2));
    }

    #[test]
    fn total_sums_rounded_nights() {
        let engine = PricingEngine::default();
        let as_of = d(2026, 1, 1);
        let nights: Vec<InventoryRecord> = (0..3)
            .map(|i| {
                let mut r = InventoryRecord::fresh(d(2026, 3, 1 + i), 10, Decimal::new(5000, 2));
                r.booked_units = 5;
                r
            })
            .collect();
        assert_eq!(engine.total_price(&nights, as_of), Decimal::new(15000, 2));
    }
}
