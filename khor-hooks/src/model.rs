//! Hook model

use crate::error::{HookError, HookResult};
use crate::events::GitEventKind;
use crate::predicate::PredicateDef;
use crate::scheduler::TimerSpec;
use serde::Serialize;

/// What wakes a hook up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Trigger {
    Event(GitEventKind),
    Timer(TimerSpec),
}

impl Trigger {
    pub fn parse(name: &str) -> HookResult<Self> {
        if let Some(kind) = GitEventKind::parse(name) {
            return Ok(Trigger::Event(kind));
        }
        if let Some(spec) = TimerSpec::parse(name) {
            return Ok(Trigger::Timer(spec));
        }
        // `schedule: daily` style aliases collapse onto the timer names
        match name {
            "daily" => Ok(Trigger::Timer(TimerSpec::Daily)),
            "hourly" => Ok(Trigger::Timer(TimerSpec::Hourly)),
            other => Err(HookError::Definition(format!(
                "unknown trigger name: {}",
                other
            ))),
        }
    }
}

/// A loaded hook: predicate + ordered pipelines + triggers
#[derive(Debug, Clone, Serialize)]
pub struct Hook {
    /// Hook IRI
    pub iri: String,
    pub title: Option<String>,
    pub predicate: PredicateDef,
    /// Pipeline IRIs, in declared order
    pub pipelines: Vec<String>,
    pub on: Vec<Trigger>,
    pub disabled: bool,
}

impl Hook {
    pub fn listens_to(&self, kind: GitEventKind) -> bool {
        self.on.contains(&Trigger::Event(kind))
    }

    /// The timers this hook wants; when several are named, the finest wins
    pub fn timer(&self) -> Option<TimerSpec> {
        self.on
            .iter()
            .filter_map(|t| match t {
                Trigger::Timer(spec) => Some(*spec),
                Trigger::Event(_) => None,
            })
            .min_by_key(|spec| spec.granularity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::PredicateDef;

    fn hook_with(on: Vec<Trigger>) -> Hook {
        Hook {
            iri: "https://khor.dev/hooks#h".into(),
            title: None,
            predicate: PredicateDef::Ask {
                query: "ASK { ?s ?p ?o }".into(),
            },
            pipelines: vec![],
            on,
            disabled: false,
        }
    }

    #[test]
    fn trigger_parsing_accepts_events_timers_and_aliases() {
        assert_eq!(
            Trigger::parse("post-commit").unwrap(),
            Trigger::Event(GitEventKind::PostCommit)
        );
        assert_eq!(
            Trigger::parse("timer-100ms").unwrap(),
            Trigger::Timer(TimerSpec::EveryMs(100))
        );
        assert_eq!(Trigger::parse("daily").unwrap(), Trigger::Timer(TimerSpec::Daily));
        assert!(Trigger::parse("on-full-moon").is_err());
    }

    #[test]
    fn finest_timer_wins() {
        let hook = hook_with(vec![
            Trigger::Timer(TimerSpec::Daily),
            Trigger::Timer(TimerSpec::EveryMs(500)),
        ]);
        assert_eq!(hook.timer(), Some(TimerSpec::EveryMs(500)));
    }

    #[test]
    fn event_matching() {
        let hook = hook_with(vec![Trigger::Event(GitEventKind::PostCommit)]);
        assert!(hook.listens_to(GitEventKind::PostCommit));
        assert!(!hook.listens_to(GitEventKind::PrePush));
    }
}
