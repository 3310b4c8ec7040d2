use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::models::{StudentAggregate, StudentId};

/// One week.
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        CachePolicy { ttl }
    }

    pub fn from_secs(secs: u64) -> Result<Self, ConfigError> {
        match secs {
            0 => Err(ConfigError::ZeroTtl),
            1..=MAX_TTL_SECS => Ok(CachePolicy::new(Duration::seconds(secs as i64))),
            _ => Err(ConfigError::TtlTooLarge {
                secs,
                max: MAX_TTL_SECS,
            }),
        }
    }

    /// Entries are fresh strictly before `cached_at + ttl`.
    pub fn is_fresh(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= cached_at && now - cached_at < self.ttl
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::new(Duration::minutes(5))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAggregate {
    pub aggregate: StudentAggregate,
    pub cached_at: DateTime<Utc>,
}

impl CachedAggregate {
    /// Decodes a stored JSON payload. Payloads written with an older layout
    /// fail here and should be treated as a cache miss.
    pub fn decode(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload)
    }
}

pub trait AggregateRepository {
    fn get(&mut self, student_id: StudentId) -> Option<CachedAggregate>;
    fn put(&mut self, student_id: StudentId, aggregate: StudentAggregate, policy: CachePolicy);
    fn invalidate(&mut self, student_id: StudentId);
}

struct Entry {
    cached: CachedAggregate,
    policy: CachePolicy,
}

/// In-process cache with expiry checked on read.
pub struct MemoryAggregateCache<C = SystemClock> {
    clock: C,
    entries: HashMap<StudentId, Entry>,
}

impl MemoryAggregateCache<SystemClock> {
    pub fn new() -> Self {
        MemoryAggregateCache::with_clock(SystemClock)
    }
}

impl Default for MemoryAggregateCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryAggregateCache<C> {
    pub fn with_clock(clock: C) -> Self {
        MemoryAggregateCache {
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Clock> AggregateRepository for MemoryAggregateCache<C> {
    fn get(&mut self, student_id: StudentId) -> Option<CachedAggregate> {
        let now = self.clock.now();
        let fresh = self
            .entries
            .get(&student_id)
            .map(|entry| entry.policy.is_fresh(entry.cached.cached_at, now))?;

        if fresh {
            debug!(student_id, "aggregate cache hit");
            self.entries.get(&student_id).map(|entry| entry.cached.clone())
        } else {
            debug!(student_id, "aggregate cache entry expired");
            self.entries.remove(&student_id);
            None
        }
    }

    fn put(&mut self, student_id: StudentId, aggregate: StudentAggregate, policy: CachePolicy) {
        let cached = CachedAggregate {
            aggregate,
            cached_at: self.clock.now(),
        };
        self.entries.insert(student_id, Entry { cached, policy });
    }

    fn invalidate(&mut self, student_id: StudentId) {
        self.entries.remove(&student_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use crate::models::Trend;

    #[derive(Clone)]
    struct FixedClock(Rc<Cell<DateTime<Utc>>>);

    impl FixedClock {
        fn advance(&self, secs: i64) {
            self.0.set(self.0.get() + Duration::seconds(secs));
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    fn sample(student_id: StudentId) -> StudentAggregate {
        StudentAggregate {
            student_id,
            subject_averages: BTreeMap::new(),
            overall_average: 81.0,
            trend: Trend::Stable,
            record_count: 4,
            skipped: 0,
        }
    }

    fn clock() -> FixedClock {
        FixedClock(Rc::new(Cell::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        )))
    }

    #[test]
    fn freshness_window_is_half_open() {
        let policy = CachePolicy::default();
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        assert!(policy.is_fresh(at, at));
        assert!(policy.is_fresh(at, at + Duration::seconds(299)));
        assert!(!policy.is_fresh(at, at + Duration::seconds(300)));
        assert!(!policy.is_fresh(at, at - Duration::seconds(1)));
    }

    #[test]
    fn ttl_seconds_are_bounded() {
        assert_eq!(
            CachePolicy::from_secs(300).unwrap(),
            CachePolicy::default()
        );
        assert!(CachePolicy::from_secs(MAX_TTL_SECS).is_ok());
        assert!(matches!(
            CachePolicy::from_secs(0),
            Err(ConfigError::ZeroTtl)
        ));
        assert!(matches!(
            CachePolicy::from_secs(MAX_TTL_SECS + 1),
            Err(ConfigError::TtlTooLarge { .. })
        ));
        assert!(matches!(
            CachePolicy::from_secs(u64::MAX / 2),
            Err(ConfigError::TtlTooLarge { secs, .. }) if secs == u64::MAX / 2
        ));
    }

    #[test]
    fn entries_expire_on_read() {
        let clock = clock();
        let mut cache = MemoryAggregateCache::with_clock(clock.clone());
        cache.put(9, sample(9), CachePolicy::default());

        clock.advance(120);
        let hit = cache.get(9).unwrap();
        assert_eq!(hit.aggregate.overall_average, 81.0);

        clock.advance(200);
        assert!(cache.get(9).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_is_per_entry() {
        let clock = clock();
        let mut cache = MemoryAggregateCache::with_clock(clock.clone());
        cache.put(1, sample(1), CachePolicy::new(Duration::seconds(10)));
        cache.put(2, sample(2), CachePolicy::new(Duration::seconds(600)));

        clock.advance(60);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn decode_accepts_current_payload_and_rejects_stale_ones() {
        let cached = CachedAggregate {
            aggregate: sample(4),
            cached_at: Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        };
        let payload = serde_json::to_value(&cached).unwrap();
        assert_eq!(CachedAggregate::decode(payload).unwrap(), cached);

        let stale = serde_json::json!({
            "aggregate": { "student_id": 4, "average": 81.0 },
            "cached_at": "2026-05-01T08:00:00Z"
        });
        assert!(CachedAggregate::decode(stale).is_err());
        assert!(CachedAggregate::decode(serde_json::json!("not an object")).is_err());
    }

    #[test]
    fn invalidate_drops_entry() {
        let mut cache = MemoryAggregateCache::with_clock(clock());
        cache.put(3, sample(3), CachePolicy::default());
        cache.invalidate(3);
        assert!(cache.get(3).is_none());
        assert_eq!(cache.len(), 0);
    }
}
