//! Read governor for the metered backend
//!
//! Every visitor-triggered backend read has to pass [`ReadGovernor::admit`]
//! first. The governor enforces a hard daily ceiling and a minimum interval
//! between reads, and keeps the cache from growing without bound. A denial
//! is never an error for the visitor: the caller serves stale cache or
//! reports the site as unavailable.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::config::SafetyConfig;

/// Share of the cache dropped when it is full
pub const EVICTION_FRACTION: f64 = 0.2;

/// Why a read was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The daily ceiling has been reached
    DailyLimit,
    /// The previous read was too recent
    Throttled,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::DailyLimit => write!(f, "daily read limit reached"),
            Denial::Throttled => write!(f, "minimum read interval not elapsed"),
        }
    }
}

/// How close today's reads are to the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    Normal,
    Caution,
    Warning,
}

impl UsageLevel {
    /// Classifies `daily_reads` against the dashboard thresholds
    pub fn classify(daily_reads: u32, max_daily_reads: u32, caution: f64, warning: f64) -> Self {
        let reads = f64::from(daily_reads);
        let max = f64::from(max_daily_reads);
        if reads >= max * warning {
            UsageLevel::Warning
        } else if reads >= max * caution {
            UsageLevel::Caution
        } else {
            UsageLevel::Normal
        }
    }
}

/// Read-only snapshot for the cost dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernorStats {
    pub daily_reads: u32,
    pub max_daily_reads: u32,
    pub cache_size: usize,
    pub max_cache_size: usize,
    pub level: UsageLevel,
}

impl GovernorStats {
    /// Fraction of the daily ceiling used, in `0.0..=1.0`
    pub fn usage_ratio(&self) -> f64 {
        if self.max_daily_reads == 0 {
            return 1.0;
        }
        (f64::from(self.daily_reads) / f64::from(self.max_daily_reads)).min(1.0)
    }
}

/// Backend spend if every allowed read is used, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub daily: f64,
    pub monthly: f64,
    pub yearly: f64,
}

impl CostEstimate {
    pub fn at_ceiling(config: &SafetyConfig) -> Self {
        let daily = f64::from(config.max_daily_reads) * config.cost_per_100k_reads / 100_000.0;
        Self {
            daily,
            monthly: daily * 30.0,
            yearly: daily * 365.0,
        }
    }
}

/// Gate in front of every visitor-triggered backend read
///
/// `admit` and `record_read` are separate steps around an awaited fetch, so a
/// burst of concurrent requests can all be admitted before any of them
/// records its read.
pub struct ReadGovernor {
    max_daily_reads: u32,
    max_cache_size: usize,
    min_read_interval: Duration,
    caution_threshold: f64,
    warning_threshold: f64,
    daily_count: u32,
    day_stamp: NaiveDate,
    last_read_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl ReadGovernor {
    pub fn new(config: &SafetyConfig, clock: Arc<dyn Clock>) -> Self {
        let day_stamp = clock.now().date_naive();
        Self {
            max_daily_reads: config.max_daily_reads,
            max_cache_size: config.max_cache_size,
            min_read_interval: Duration::from_std(config.min_read_interval)
                .unwrap_or(Duration::MAX),
            caution_threshold: config.caution_threshold,
            warning_threshold: config.warning_threshold,
            daily_count: 0,
            day_stamp,
            last_read_at: None,
            clock,
        }
    }

    /// Resets the counter when the calendar day has changed
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day_stamp {
            tracing::info!(
                previous_day = %self.day_stamp,
                reads = self.daily_count,
                "New day, resetting read counter"
            );
            self.daily_count = 0;
            self.day_stamp = today;
        }
    }

    /// Decides whether a backend read may start, with the reason if not
    pub fn check(&mut self) -> Result<(), Denial> {
        let now = self.clock.now();
        self.roll_day(now);

        if self.daily_count >= self.max_daily_reads {
            return Err(Denial::DailyLimit);
        }
        if let Some(last) = self.last_read_at {
            if now - last < self.min_read_interval {
                return Err(Denial::Throttled);
            }
        }
        Ok(())
    }

    /// Decides whether a backend read may start
    pub fn admit(&mut self) -> bool {
        self.check().is_ok()
    }

    /// Counts a backend read that completed successfully
    pub fn record_read(&mut self) {
        let now = self.clock.now();
        self.roll_day(now);
        self.daily_count = self.daily_count.saturating_add(1);
        self.last_read_at = Some(now);
    }

    /// Makes room in a full cache before an insertion
    ///
    /// Returns the number of evicted entries.
    pub fn maybe_evict(&self, cache: &mut CacheStore) -> usize {
        if cache.len() < self.max_cache_size {
            return 0;
        }
        let evicted = cache.evict_oldest(EVICTION_FRACTION);
        tracing::info!(
            evicted,
            remaining = cache.len(),
            capacity = self.max_cache_size,
            "Cache full, evicted oldest entries"
        );
        evicted
    }

    /// Reads today's count without side effects
    ///
    /// If the day has changed since the last admission, today's count is 0
    /// even though the stored counter has not been reset yet.
    pub fn daily_reads(&self) -> u32 {
        if self.clock.now().date_naive() == self.day_stamp {
            self.daily_count
        } else {
            0
        }
    }

    pub fn stats(&self, cache_size: usize) -> GovernorStats {
        let daily_reads = self.daily_reads();
        GovernorStats {
            daily_reads,
            max_daily_reads: self.max_daily_reads,
            cache_size,
            max_cache_size: self.max_cache_size,
            level: UsageLevel::classify(
                daily_reads,
                self.max_daily_reads,
                self.caution_threshold,
                self.warning_threshold,
            ),
        }
    }
}

impl std::fmt::Debug for ReadGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadGovernor")
            .field("daily_count", &self.daily_count)
            .field("max_daily_reads", &self.max_daily_reads)
            .field("day_stamp", &self.day_stamp)
            .field("last_read_at", &self.last_read_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::{BusinessRecord, WebsitePayload};
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn config(max_daily_reads: u32, min_interval_ms: u64) -> SafetyConfig {
        SafetyConfig {
            max_daily_reads,
            max_cache_size: 5,
            min_read_interval: StdDuration::from_millis(min_interval_ms),
            ..Default::default()
        }
    }

    fn governor(config: &SafetyConfig) -> (ReadGovernor, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 10, 23, 0, 0).unwrap());
        (ReadGovernor::new(config, Arc::new(clock.clone())), clock)
    }

    fn payload(slug: &str) -> WebsitePayload {
        WebsitePayload {
            business: BusinessRecord {
                id: slug.to_string(),
                name: slug.to_string(),
                town: String::new(),
                description: None,
                swish_number: None,
                instagram: None,
                facebook: None,
                tiktok: None,
                owners: Vec::new(),
                slug: slug.to_string(),
                old_slugs: Vec::new(),
            },
            items: Vec::new(),
        }
    }

    #[test]
    fn test_admits_until_daily_ceiling() {
        let (mut gov, _clock) = governor(&config(3, 0));

        for _ in 0..3 {
            assert!(gov.admit());
            gov.record_read();
            assert!(gov.daily_reads() <= 3);
        }

        assert_eq!(gov.check(), Err(Denial::DailyLimit));
        assert_eq!(gov.daily_reads(), 3);
    }

    #[test]
    fn test_admit_does_not_count_reads() {
        let (mut gov, _clock) = governor(&config(1, 0));
        assert!(gov.admit());
        assert!(gov.admit());
        assert_eq!(gov.daily_reads(), 0);
    }

    #[test]
    fn test_throttle_between_reads() {
        let (mut gov, clock) = governor(&config(100, 1000));

        assert!(gov.admit(), "First read has no predecessor");
        gov.record_read();

        clock.advance(Duration::milliseconds(999));
        assert_eq!(gov.check(), Err(Denial::Throttled));

        clock.advance(Duration::milliseconds(1));
        assert!(gov.admit());
    }

    #[test]
    fn test_ceiling_is_checked_before_throttle() {
        let (mut gov, _clock) = governor(&config(1, 60_000));
        gov.record_read();
        assert_eq!(gov.check(), Err(Denial::DailyLimit));
    }

    #[test]
    fn test_day_rollover_resets_counter() {
        let (mut gov, clock) = governor(&config(2, 0));
        gov.record_read();
        gov.record_read();
        assert!(!gov.admit());

        // 23:00 -> 00:30 next day
        clock.advance(Duration::minutes(90));

        assert_eq!(gov.daily_reads(), 0, "Stats see the new day before any admit");
        assert!(gov.admit());
    }

    #[test]
    fn test_maybe_evict_only_when_full() {
        let conf = config(10, 0);
        let (gov, clock) = governor(&conf);
        let mut cache = CacheStore::new(StdDuration::from_secs(600), Arc::new(clock.clone()));

        for slug in ["a", "b", "c", "d"] {
            cache.put(slug, payload(slug));
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(gov.maybe_evict(&mut cache), 0);

        cache.put("e", payload("e"));
        assert_eq!(gov.maybe_evict(&mut cache), 1);
        assert_eq!(cache.len(), 4);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_stats_levels() {
        let conf = SafetyConfig {
            max_daily_reads: 10,
            min_read_interval: StdDuration::ZERO,
            ..Default::default()
        };
        let (mut gov, _clock) = governor(&conf);

        assert_eq!(gov.stats(0).level, UsageLevel::Normal);
        for _ in 0..6 {
            gov.record_read();
        }
        assert_eq!(gov.stats(0).level, UsageLevel::Caution);
        for _ in 0..2 {
            gov.record_read();
        }
        let stats = gov.stats(3);
        assert_eq!(stats.level, UsageLevel::Warning);
        assert_eq!(stats.daily_reads, 8);
        assert_eq!(stats.cache_size, 3);
        assert!((stats.usage_ratio() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_usage_level_with_zero_ceiling_is_warning() {
        assert_eq!(UsageLevel::classify(0, 0, 0.6, 0.8), UsageLevel::Warning);
    }

    #[test]
    fn test_cost_estimate_at_default_ceiling() {
        let cost = CostEstimate::at_ceiling(&SafetyConfig::default());
        assert!((cost.daily - 0.0006).abs() < 1e-12);
        assert!((cost.monthly - 0.018).abs() < 1e-12);
        assert!((cost.yearly - 0.219).abs() < 1e-12);
    }
}
