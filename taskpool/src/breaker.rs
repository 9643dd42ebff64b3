use chrono::{DateTime, Utc};
use garimpo_lib::Source;
use redis::RedisResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::{impl_display_using_json, impl_redis_value, PoolResult, TaskStore};

/// Stored per source under `cb:{source}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl_redis_value!(BreakerState);

impl BreakerState {
    fn is_open(&self, threshold: u32, recovery_window: Duration, now: DateTime<Utc>) -> bool {
        if self.consecutive_failures < threshold {
            return false;
        }
        match self.opened_at {
            Some(opened_at) => {
                let elapsed = (now - opened_at).to_std().unwrap_or(Duration::ZERO);
                elapsed < recovery_window
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BreakerSnapshot {
    pub source: Source,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub is_open: bool,
}

impl_display_using_json!(BreakerSnapshot);

/// Per-source failure counter gating new admissions.
///
/// Once `threshold` consecutive failures accumulate the breaker reports open
/// for `recovery_window`; after the window it simply reports closed again and
/// the next recorded outcome decides the new state. There is no separate
/// half-open tally.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    store: TaskStore,
    threshold: u32,
    recovery_window: Duration,
}

impl BreakerRegistry {
    pub fn new(store: TaskStore, threshold: u32, recovery_window: Duration) -> Self {
        Self {
            store,
            threshold,
            recovery_window,
        }
    }

    fn key(source: Source) -> String {
        format!("cb:{source}")
    }

    fn load(&mut self, source: Source) -> PoolResult<BreakerState> {
        let result: RedisResult<BreakerState> = self.store.conn()?.get(&Self::key(source));
        match result {
            Ok(state) => Ok(state),
            Err(e) if e.kind() == redis::ErrorKind::TypeError => Ok(BreakerState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, source: Source, state: &BreakerState) -> PoolResult<()> {
        let ttl = self.store.ttl();
        self.store
            .conn()?
            .set_ex(Self::key(source), state.clone(), ttl)?;
        Ok(())
    }

    /// A successful probe closes the breaker outright.
    pub fn record_success(&mut self, source: Source) -> PoolResult<()> {
        let _: usize = self.store.conn()?.del(Self::key(source))?;
        Ok(())
    }

    /// Record one failure; returns the new consecutive count and whether this
    /// failure opened the breaker (first crossing, or a re-open after the
    /// recovery window lapsed).
    pub fn record_failure(&mut self, source: Source) -> PoolResult<(u32, bool)> {
        let now = Utc::now();
        let mut state = self.load(source)?;
        let was_open = state.is_open(self.threshold, self.recovery_window, now);

        state.consecutive_failures += 1;
        let mut just_opened = false;
        if state.consecutive_failures >= self.threshold && !was_open {
            state.opened_at = Some(now);
            just_opened = true;
            tracing::warn!(
                "BreakerRegistry: circuit opened for {source} after {} consecutive failures",
                state.consecutive_failures
            );
        }

        self.save(source, &state)?;
        Ok((state.consecutive_failures, just_opened))
    }

    pub fn is_open(&mut self, source: Source) -> PoolResult<bool> {
        let state = self.load(source)?;
        Ok(state.is_open(self.threshold, self.recovery_window, Utc::now()))
    }

    pub fn snapshot(&mut self, source: Source) -> PoolResult<BreakerSnapshot> {
        let state = self.load(source)?;
        let is_open = state.is_open(self.threshold, self.recovery_window, Utc::now());
        Ok(BreakerSnapshot {
            source,
            consecutive_failures: state.consecutive_failures,
            threshold: self.threshold,
            opened_at: state.opened_at,
            is_open,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store;

    fn registry(id: &str, threshold: u32, window: Duration) -> BreakerRegistry {
        BreakerRegistry::new(memory_store(id), threshold, window)
    }

    #[test]
    fn test_opens_on_threshold_exactly_once() {
        let mut breaker = registry(
            "test_opens_on_threshold_exactly_once",
            3,
            Duration::from_secs(60),
        );

        assert_eq!(
            breaker.record_failure(Source::Receita).unwrap(),
            (1, false)
        );
        assert_eq!(
            breaker.record_failure(Source::Receita).unwrap(),
            (2, false)
        );
        assert_eq!(breaker.record_failure(Source::Receita).unwrap(), (3, true));
        assert!(breaker.is_open(Source::Receita).unwrap());

        // Further failures while open do not re-announce.
        assert_eq!(breaker.record_failure(Source::Receita).unwrap(), (4, false));
    }

    #[test]
    fn test_success_closes() {
        let mut breaker = registry("test_success_closes", 2, Duration::from_secs(60));

        breaker.record_failure(Source::Car).unwrap();
        breaker.record_failure(Source::Car).unwrap();
        assert!(breaker.is_open(Source::Car).unwrap());

        breaker.record_success(Source::Car).unwrap();
        assert!(!breaker.is_open(Source::Car).unwrap());
        assert_eq!(
            breaker.snapshot(Source::Car).unwrap().consecutive_failures,
            0
        );
    }

    #[test]
    fn test_sources_are_independent() {
        let mut breaker = registry("test_sources_are_independent", 1, Duration::from_secs(60));

        breaker.record_failure(Source::Incra).unwrap();
        assert!(breaker.is_open(Source::Incra).unwrap());
        assert!(!breaker.is_open(Source::Cartorios).unwrap());
    }

    #[test]
    fn test_recovery_window_elapse_reports_closed_then_reopens() {
        let mut breaker = registry(
            "test_recovery_window_elapse_reports_closed_then_reopens",
            2,
            Duration::from_millis(50),
        );

        breaker.record_failure(Source::SigefSicar).unwrap();
        let (_, just_opened) = breaker.record_failure(Source::SigefSicar).unwrap();
        assert!(just_opened);
        assert!(breaker.is_open(Source::SigefSicar).unwrap());

        std::thread::sleep(Duration::from_millis(70));
        // Window elapsed: breaker reports closed, next attempt decides.
        assert!(!breaker.is_open(Source::SigefSicar).unwrap());

        // The next failure re-opens with a fresh window.
        let (failures, just_opened) = breaker.record_failure(Source::SigefSicar).unwrap();
        assert_eq!(failures, 3);
        assert!(just_opened);
        assert!(breaker.is_open(Source::SigefSicar).unwrap());
    }
}
