use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::source::Source;

fn default_retention_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_retry_base_delay_secs() -> u64 {
    5
}

fn default_retry_max_delay_secs() -> u64 {
    300
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_recovery_window_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_worker_idle_delay_ms() -> u64 {
    1000
}

fn default_retry_pump_interval_secs() -> u64 {
    10
}

fn default_worker_timeouts() -> HashMap<Source, u64> {
    HashMap::from([
        (Source::Car, 120),
        (Source::Incra, 120),
        (Source::Receita, 60),
        (Source::DiarioOficial, 180),
        (Source::Cartorios, 150),
        (Source::SigefSicar, 180),
    ])
}

fn default_priority_adjustments() -> HashMap<Source, i8> {
    // Receita answers fast, bump it a band; the gazette and notary scrapers
    // are the long tail, push them down one.
    HashMap::from([
        (Source::Receita, -1),
        (Source::DiarioOficial, 1),
        (Source::Cartorios, 1),
    ])
}

/// Tuning knobs of the execution pipeline.
///
/// Every field has a production default; a config file only needs the keys
/// it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// TTL of task records and investigation progress records, in seconds.
    pub retention_ttl_secs: u64,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay_secs: u64,
    /// Clamp for the exponential retry delay.
    pub retry_max_delay_secs: u64,
    /// Consecutive failures that open a source's circuit breaker.
    pub breaker_threshold: u32,
    /// How long an open breaker refuses admissions.
    pub breaker_recovery_window_secs: u64,
    pub default_max_attempts: u32,
    /// Probe deadline per source, in seconds.
    pub worker_timeout_secs: HashMap<Source, u64>,
    /// Band offset applied per source at dispatch time.
    pub priority_adjustments: HashMap<Source, i8>,
    /// Worker sleep when its queues are empty, in milliseconds.
    pub worker_idle_delay_ms: u64,
    /// Tick of the pump that promotes due retries.
    pub retry_pump_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retention_ttl_secs: default_retention_ttl_secs(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_recovery_window_secs: default_breaker_recovery_window_secs(),
            default_max_attempts: default_max_attempts(),
            worker_timeout_secs: default_worker_timeouts(),
            priority_adjustments: default_priority_adjustments(),
            worker_idle_delay_ms: default_worker_idle_delay_ms(),
            retry_pump_interval_secs: default_retry_pump_interval_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn worker_timeout(&self, source: Source) -> Duration {
        Duration::from_secs(*self.worker_timeout_secs.get(&source).unwrap_or(&120))
    }

    pub fn priority_adjustment(&self, source: Source) -> i8 {
        *self.priority_adjustments.get(&source).unwrap_or(&0)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }

    pub fn breaker_recovery_window(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_window_secs)
    }

    pub fn worker_idle_delay(&self) -> Duration {
        Duration::from_millis(self.worker_idle_delay_ms)
    }

    pub fn retry_pump_interval(&self) -> Duration {
        Duration::from_secs(self.retry_pump_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_operator_expectations() {
        let config = PipelineConfig::default();
        assert_eq!(config.retention_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.retry_base_delay_secs, 5);
        assert_eq!(config.retry_max_delay_secs, 300);
        assert_eq!(config.breaker_threshold, 5);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.worker_timeout(Source::Receita), Duration::from_secs(60));
        assert_eq!(config.worker_timeout(Source::DiarioOficial), Duration::from_secs(180));
        assert_eq!(config.priority_adjustment(Source::Receita), -1);
        assert_eq!(config.priority_adjustment(Source::Car), 0);
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"breaker_threshold": 3, "retry_base_delay_secs": 1}"#).unwrap();
        assert_eq!(config.breaker_threshold, 3);
        assert_eq!(config.retry_base_delay_secs, 1);
        assert_eq!(config.retry_max_delay_secs, 300);
        assert_eq!(config.worker_timeout(Source::Car), Duration::from_secs(120));
    }
}
