//! Scoped execution context
//!
//! Handlers receive the context as a value; nested scopes are created with
//! [`ExecutionContext::child`], which overrides selected fields and leaves
//! the parent untouched. No thread-locals are involved.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Time source carried by the execution context
#[derive(Debug, Clone)]
pub enum Clock {
    /// Wall clock
    System,
    /// Frozen instant, used by tests and dry runs
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Current time according to this clock
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::System
    }
}

/// Process-wide execution context: working directory, environment, clock
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub clock: Clock,
}

impl ExecutionContext {
    /// Derive a context from the process environment
    pub fn from_process() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: std::env::vars().collect(),
            clock: Clock::System,
        }
    }

    /// Context rooted at a specific directory with an empty environment
    pub fn rooted(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            env: BTreeMap::new(),
            clock: Clock::System,
        }
    }

    /// New context for a nested scope; override fields win, env entries merge
    pub fn child(&self, overrides: ContextOverrides) -> Self {
        let mut env = self.env.clone();
        env.extend(overrides.env);
        Self {
            cwd: overrides.cwd.unwrap_or_else(|| self.cwd.clone()),
            env,
            clock: overrides.clock.unwrap_or_else(|| self.clock.clone()),
        }
    }

    /// Look up an environment entry
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Current time from this context's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::from_process()
    }
}

/// Field overrides for a child scope
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub clock: Option<Clock>,
}

impl ContextOverrides {
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn child_overrides_cwd_and_merges_env() {
        let mut base = ExecutionContext::rooted("/work");
        base.env.insert("A".into(), "1".into());
        base.env.insert("B".into(), "2".into());

        let child = base.child(
            ContextOverrides::default()
                .cwd("/work/sub")
                .env("B", "overridden")
                .env("C", "3"),
        );

        assert_eq!(child.cwd, PathBuf::from("/work/sub"));
        assert_eq!(child.env_var("A"), Some("1"));
        assert_eq!(child.env_var("B"), Some("overridden"));
        assert_eq!(child.env_var("C"), Some("3"));
        // Parent untouched
        assert_eq!(base.env_var("B"), Some("2"));
        assert_eq!(base.cwd, PathBuf::from("/work"));
    }

    #[test]
    fn fixed_clock_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ctx = ExecutionContext::rooted("/").child(ContextOverrides::default().clock(Clock::Fixed(at)));
        assert_eq!(ctx.now(), at);
        assert_eq!(ctx.now(), at);
    }

    #[test]
    fn nested_children_override_innermost_wins() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let outer = ExecutionContext::rooted("/a");
        let mid = outer.child(ContextOverrides::default().cwd("/b"));
        let inner = mid.child(ContextOverrides::default().clock(Clock::Fixed(at)));
        assert_eq!(inner.cwd, PathBuf::from("/b"));
        assert_eq!(inner.now(), at);
    }
}
