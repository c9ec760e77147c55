//! Built-in scenarios over the reference saga.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SAGA-001: start, poke, stranger, 35 minutes pass, one greeting
    EndToEnd,

    /// SAGA-002: timer cancelled and re-armed half way
    TimerReset,

    /// SAGA-003: two sagas, events reach only their own
    FanOut,

    /// SAGA-004: uncorrelated event leaves everything untouched
    NoMatch,

    /// SAGA-005: GIVEN effects stay out of THEN
    PhaseIsolation,

    /// SAGA-006: ended saga is retired, its timer fires into nothing
    SagaEnd,

    /// SAGA-007: stubbed reply triggers a second command
    StubbedReply,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::EndToEnd,
            ScenarioId::TimerReset,
            ScenarioId::FanOut,
            ScenarioId::NoMatch,
            ScenarioId::PhaseIsolation,
            ScenarioId::SagaEnd,
            ScenarioId::StubbedReply,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::EndToEnd => "end_to_end",
            ScenarioId::TimerReset => "timer_reset",
            ScenarioId::FanOut => "fan_out",
            ScenarioId::NoMatch => "no_match",
            ScenarioId::PhaseIsolation => "phase_isolation",
            ScenarioId::SagaEnd => "saga_end",
            ScenarioId::StubbedReply => "stubbed_reply",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::EndToEnd => {
                "Start A, poke A, poke unknown B, 35 minutes pass: one greeting, no timers"
            }
            ScenarioId::TimerReset => "Timer reset at +5m fires at +15m, remaining 4m at +11m",
            ScenarioId::FanOut => "Two sagas, each associated only with its own aggregate",
            ScenarioId::NoMatch => "Event for an unknown aggregate changes nothing",
            ScenarioId::PhaseIsolation => "Commands sent while priming are invisible to assertions",
            ScenarioId::SagaEnd => "Ended saga leaves the store; its orphaned timer sends nothing",
            ScenarioId::StubbedReply => "Stubbed gateway reply is sent on as a second command",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "end_to_end" | "endtoend" | "saga-001" => Ok(ScenarioId::EndToEnd),
            "timer_reset" | "timerreset" | "saga-002" => Ok(ScenarioId::TimerReset),
            "fan_out" | "fanout" | "saga-003" => Ok(ScenarioId::FanOut),
            "no_match" | "nomatch" | "saga-004" => Ok(ScenarioId::NoMatch),
            "phase_isolation" | "phaseisolation" | "saga-005" => Ok(ScenarioId::PhaseIsolation),
            "saga_end" | "sagaend" | "saga-006" => Ok(ScenarioId::SagaEnd),
            "stubbed_reply" | "stubbedreply" | "saga-007" => Ok(ScenarioId::StubbedReply),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
