//! Run configuration: listener timing, bus topology and environment loading.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::BusTopology;
use crate::error::{ReleasabilityError, Result};

/// Longest deadline a run may wait for, one day.
pub const MAX_DEADLINE_SECS: u64 = 86_400;

/// What to do when a check answers more than once while the run is waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The later result overwrites the earlier one.
    #[default]
    KeepLatest,
    /// The first result sticks; later ones are discarded.
    KeepFirst,
}

/// Delay between two polls of the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollBackoff {
    Fixed { interval_ms: u64 },
    /// Doubles after every empty poll, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl PollBackoff {
    /// Delay after `empty_polls` consecutive polls that recorded nothing.
    pub fn delay(&self, empty_polls: u32) -> Duration {
        match *self {
            PollBackoff::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            PollBackoff::Exponential { initial_ms, max_ms } => {
                let factor = 2u64.saturating_pow(empty_polls);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Listener timing and retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Hard wall-clock deadline for the whole listen, in seconds.
    pub deadline_secs: u64,
    pub backoff: PollBackoff,
    /// Consecutive transient receive failures tolerated before giving up.
    pub max_receive_retries: u32,
    /// Base delay for exponential backoff between receive retries (milliseconds).
    pub retry_backoff_base_ms: u64,
    pub max_messages_per_poll: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 600,
            backoff: PollBackoff::Exponential {
                initial_ms: 1_000,
                max_ms: 20_000,
            },
            max_receive_retries: 3,
            retry_backoff_base_ms: 500,
            max_messages_per_poll: 10,
            duplicate_policy: DuplicatePolicy::KeepLatest,
        }
    }
}

impl ListenerConfig {
    /// Defaults with a given deadline and a fixed poll interval.
    pub fn with_timing(deadline_secs: u64, poll_interval_secs: u64) -> Self {
        Self {
            deadline_secs,
            backoff: PollBackoff::Fixed {
                interval_ms: poll_interval_secs.saturating_mul(1_000),
            },
            ..Self::default()
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.retry_backoff_base_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.deadline_secs == 0 {
            return Err(ReleasabilityError::Config(
                "deadline must be at least one second".to_string(),
            ));
        }
        if self.deadline_secs > MAX_DEADLINE_SECS {
            return Err(ReleasabilityError::Config(format!(
                "deadline of {}s exceeds the maximum of {MAX_DEADLINE_SECS}s",
                self.deadline_secs
            )));
        }
        if self.max_messages_per_poll == 0 {
            return Err(ReleasabilityError::Config(
                "max_messages_per_poll must be positive".to_string(),
            ));
        }
        match self.backoff {
            PollBackoff::Fixed { interval_ms: 0 } => Err(ReleasabilityError::Config(
                "poll interval must be positive".to_string(),
            )),
            PollBackoff::Exponential { initial_ms, max_ms } if initial_ms == 0 || max_ms < initial_ms => {
                Err(ReleasabilityError::Config(format!(
                    "invalid exponential poll backoff: initial {initial_ms}ms, max {max_ms}ms"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Everything needed to wire an orchestrator, loadable from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasabilityConfig {
    pub listener: ListenerConfig,
    pub topology: BusTopology,
    /// Root directory of the filesystem bus.
    pub bus_dir: PathBuf,
}

impl Default for ReleasabilityConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            topology: BusTopology::default(),
            bus_dir: PathBuf::from(".releasability/bus"),
        }
    }
}

impl ReleasabilityConfig {
    /// Load from `RELEASABILITY_*` environment variables, falling back to defaults.
    ///
    /// - `RELEASABILITY_DEADLINE_SECS`
    /// - `RELEASABILITY_POLL_INTERVAL_SECS` (fixed interval)
    /// - `RELEASABILITY_MAX_POLL_INTERVAL_SECS` (switches to capped exponential)
    /// - `RELEASABILITY_RECEIVE_RETRIES`
    /// - `RELEASABILITY_TRIGGER_TOPIC`, `RELEASABILITY_RESULT_TOPIC`
    /// - `RELEASABILITY_BUS_DIR`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(deadline) = parse_var::<u64>(&lookup, "RELEASABILITY_DEADLINE_SECS")? {
            config.listener.deadline_secs = deadline;
        }

        let interval = parse_var::<u64>(&lookup, "RELEASABILITY_POLL_INTERVAL_SECS")?;
        let max_interval = parse_var::<u64>(&lookup, "RELEASABILITY_MAX_POLL_INTERVAL_SECS")?;
        config.listener.backoff = match (interval, max_interval) {
            (Some(initial), Some(max)) => PollBackoff::Exponential {
                initial_ms: initial.saturating_mul(1_000),
                max_ms: max.saturating_mul(1_000),
            },
            (Some(interval), None) => PollBackoff::Fixed {
                interval_ms: interval.saturating_mul(1_000),
            },
            (None, Some(max)) => PollBackoff::Exponential {
                initial_ms: 1_000,
                max_ms: max.saturating_mul(1_000),
            },
            (None, None) => config.listener.backoff.clone(),
        };

        if let Some(retries) = parse_var::<u32>(&lookup, "RELEASABILITY_RECEIVE_RETRIES")? {
            config.listener.max_receive_retries = retries;
        }
        if let Some(topic) = lookup("RELEASABILITY_TRIGGER_TOPIC") {
            config.topology.trigger_topic = topic;
        }
        if let Some(topic) = lookup("RELEASABILITY_RESULT_TOPIC") {
            config.topology.result_topic = topic;
        }
        if let Some(dir) = lookup("RELEASABILITY_BUS_DIR") {
            config.bus_dir = PathBuf::from(dir);
        }

        config.listener.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ReleasabilityError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ListenerConfig::default();
        assert_eq!(cfg.deadline(), Duration::from_secs(600));
        assert_eq!(cfg.max_messages_per_poll, 10);
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::KeepLatest);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = PollBackoff::Exponential {
            initial_ms: 1_000,
            max_ms: 5_000,
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(5));
        assert_eq!(backoff.delay(200), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = PollBackoff::Fixed { interval_ms: 250 };
        assert_eq!(backoff.delay(0), backoff.delay(9));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let cfg = ListenerConfig::default();
        assert_eq!(cfg.retry_delay(1), Duration::from_millis(500));
        assert_eq!(cfg.retry_delay(2), Duration::from_millis(1_000));
        assert_eq!(cfg.retry_delay(3), Duration::from_millis(2_000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = ListenerConfig::with_timing(0, 1);
        assert!(cfg.validate().is_err());

        cfg = ListenerConfig::with_timing(10, 0);
        assert!(cfg.validate().is_err());

        cfg = ListenerConfig::with_timing(MAX_DEADLINE_SECS, 1);
        assert!(cfg.validate().is_ok());
        cfg = ListenerConfig::with_timing(u64::MAX, 1);
        assert!(matches!(cfg.validate(), Err(ReleasabilityError::Config(_))));

        cfg = ListenerConfig::default();
        cfg.backoff = PollBackoff::Exponential {
            initial_ms: 5_000,
            max_ms: 1_000,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let cfg = ReleasabilityConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ReleasabilityConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let cfg = ReleasabilityConfig::from_lookup(lookup(&[
            ("RELEASABILITY_DEADLINE_SECS", "30"),
            ("RELEASABILITY_POLL_INTERVAL_SECS", "2"),
            ("RELEASABILITY_RECEIVE_RETRIES", "5"),
            ("RELEASABILITY_RESULT_TOPIC", "Results"),
            ("RELEASABILITY_BUS_DIR", "/tmp/bus"),
        ]))
        .unwrap();

        assert_eq!(cfg.listener.deadline_secs, 30);
        assert_eq!(cfg.listener.backoff, PollBackoff::Fixed { interval_ms: 2_000 });
        assert_eq!(cfg.listener.max_receive_retries, 5);
        assert_eq!(cfg.topology.result_topic, "Results");
        assert_eq!(cfg.topology.trigger_topic, "ReleasabilityTriggerTopic");
        assert_eq!(cfg.bus_dir, PathBuf::from("/tmp/bus"));
    }

    #[test]
    fn test_from_lookup_exponential() {
        let cfg = ReleasabilityConfig::from_lookup(lookup(&[
            ("RELEASABILITY_POLL_INTERVAL_SECS", "1"),
            ("RELEASABILITY_MAX_POLL_INTERVAL_SECS", "8"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.listener.backoff,
            PollBackoff::Exponential {
                initial_ms: 1_000,
                max_ms: 8_000
            }
        );
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err =
            ReleasabilityConfig::from_lookup(lookup(&[("RELEASABILITY_DEADLINE_SECS", "soon")]))
                .unwrap_err();
        assert!(err.to_string().contains("RELEASABILITY_DEADLINE_SECS"));
    }

    #[test]
    fn test_from_lookup_rejects_huge_deadline() {
        let err = ReleasabilityConfig::from_lookup(lookup(&[(
            "RELEASABILITY_DEADLINE_SECS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(err, ReleasabilityError::Config(_)));
    }
}
