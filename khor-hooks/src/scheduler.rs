//! Time triggers
//!
//! Timer names are `timer-<N>ms`, `timer-hourly`, `timer-daily`. Intervals
//! clamp to the 1 ms floor; anything finer degrades into best-effort
//! bursts, so we refuse to schedule it rather than pretend.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum safe timer interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerSpec {
    EveryMs(u64),
    Hourly,
    Daily,
}

impl TimerSpec {
    /// Parse a trigger name like `timer-500ms`
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("timer-")?;
        match rest {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => {
                let millis: u64 = rest.strip_suffix("ms")?.parse().ok()?;
                Some(Self::EveryMs(millis.max(1)))
            }
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            Self::EveryMs(ms) => Duration::from_millis(*ms).max(MIN_INTERVAL),
            Self::Hourly => Duration::from_secs(60 * 60),
            Self::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::EveryMs(ms) => format!("timer-{}ms", ms),
            Self::Hourly => "timer-hourly".to_string(),
            Self::Daily => "timer-daily".to_string(),
        }
    }

    /// How fine-grained this timer is; used when a hook names several and
    /// the finest wins
    pub fn granularity(&self) -> Duration {
        self.period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_names() {
        assert_eq!(TimerSpec::parse("timer-500ms"), Some(TimerSpec::EveryMs(500)));
        assert_eq!(TimerSpec::parse("timer-hourly"), Some(TimerSpec::Hourly));
        assert_eq!(TimerSpec::parse("timer-daily"), Some(TimerSpec::Daily));
        assert_eq!(TimerSpec::parse("cron-daily"), None);
        assert_eq!(TimerSpec::parse("timer-fast"), None);
    }

    #[test]
    fn sub_millisecond_clamps_to_floor() {
        assert_eq!(TimerSpec::parse("timer-0ms"), Some(TimerSpec::EveryMs(1)));
        assert_eq!(TimerSpec::EveryMs(1).period(), MIN_INTERVAL);
    }

    #[test]
    fn names_round_trip() {
        for spec in [TimerSpec::EveryMs(250), TimerSpec::Hourly, TimerSpec::Daily] {
            assert_eq!(TimerSpec::parse(&spec.name()), Some(spec));
        }
    }
}
