use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::pricing::PricingRules;

/// Runtime settings. `Default` gives the production values; `from_env` overlays
/// `ROOMLEDGER_*` variables on top.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    /// Nights materialized per room by the calendar initializer.
    pub horizon_days: u32,
    pub hold_ttl: Duration,
    pub reaper_interval: Duration,
    /// How long confirmed/released hold bookkeeping is kept after settling.
    pub settled_hold_retention: Duration,
    /// Compact the WAL at startup once this many events have been replayed.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub pricing: PricingRules,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            horizon_days: 365,
            hold_ttl: Duration::from_secs(10 * 60),
            reaper_interval: Duration::from_secs(5),
            settled_hold_retention: Duration::from_secs(60 * 60),
            compact_threshold: 10_000,
            metrics_port: None,
            pricing: PricingRules::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let decimal = |key: &str, fallback: Decimal| {
            lookup(key)
                .and_then(|s| Decimal::from_str(s.trim()).ok())
                .unwrap_or(fallback)
        };

        let p = defaults.pricing;
        let pricing = PricingRules {
            high_occupancy_threshold: decimal(
                "ROOMLEDGER_HIGH_OCCUPANCY_THRESHOLD",
                p.high_occupancy_threshold,
            ),
            high_occupancy_multiplier: decimal(
                "ROOMLEDGER_HIGH_OCCUPANCY_MULTIPLIER",
                p.high_occupancy_multiplier,
            ),
            low_occupancy_threshold: decimal(
                "ROOMLEDGER_LOW_OCCUPANCY_THRESHOLD",
                p.low_occupancy_threshold,
            ),
            low_occupancy_min_lead_days: parse("ROOMLEDGER_LOW_OCCUPANCY_MIN_LEAD_DAYS")
                .map(|v| v as i64)
                .unwrap_or(p.low_occupancy_min_lead_days),
            low_occupancy_multiplier: decimal(
                "ROOMLEDGER_LOW_OCCUPANCY_MULTIPLIER",
                p.low_occupancy_multiplier,
            ),
            urgency_max_lead_days: parse("ROOMLEDGER_URGENCY_MAX_LEAD_DAYS")
                .map(|v| v as i64)
                .unwrap_or(p.urgency_max_lead_days),
            urgency_multiplier: decimal("ROOMLEDGER_URGENCY_MULTIPLIER", p.urgency_multiplier),
        };

        Self {
            data_dir: lookup("ROOMLEDGER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            horizon_days: parse("ROOMLEDGER_HORIZON_DAYS")
                .map(|v| v as u32)
                .unwrap_or(defaults.horizon_days),
            hold_ttl: parse("ROOMLEDGER_HOLD_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.hold_ttl),
            reaper_interval: parse("ROOMLEDGER_REAPER_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reaper_interval),
            settled_hold_retention: parse("ROOMLEDGER_SETTLED_HOLD_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.settled_hold_retention),
            compact_threshold: parse("ROOMLEDGER_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse("ROOMLEDGER_METRICS_PORT").and_then(|v| u16::try_from(v).ok()),
            pricing,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = LedgerConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.horizon_days, 365);
        assert_eq!(cfg.hold_ttl, Duration::from_secs(600));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.pricing, PricingRules::default());
    }

    #[test]
    fn overrides_from_lookup() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("ROOMLEDGER_DATA_DIR", "/var/lib/roomledger"),
            ("ROOMLEDGER_HORIZON_DAYS", "30"),
            ("ROOMLEDGER_HOLD_TTL_SECS", "120"),
            ("ROOMLEDGER_METRICS_PORT", "9100"),
            ("ROOMLEDGER_URGENCY_MULTIPLIER", "1.5"),
        ]));
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/roomledger/ledger.wal"));
        assert_eq!(cfg.horizon_days, 30);
        assert_eq!(cfg.hold_ttl, Duration::from_secs(120));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.pricing.urgency_multiplier, Decimal::new(15, 1));
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("ROOMLEDGER_HORIZON_DAYS", "a year"),
            ("ROOMLEDGER_METRICS_PORT", "70000"),
            ("ROOMLEDGER_HIGH_OCCUPANCY_MULTIPLIER", "lots"),
        ]));
        assert_eq!(cfg.horizon_days, 365);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(
            cfg.pricing.high_occupancy_multiplier,
            PricingRules::default().high_occupancy_multiplier
        );
    }
}
