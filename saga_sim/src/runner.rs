//! Scenario runner - executes the built-in saga scenarios.

use crate::error::SimResult;
use crate::expect::{ExpectationEvaluator, ExpectationFailure};
use crate::fixture::SagaTestFixture;
use crate::ids::AggregateIdProvider;
use crate::matchers::{self, any};
use crate::scenarios::ScenarioId;
use crate::stub::{
    ResetTriggerEvent, SagaWasTriggeredEvent, StubSaga, TimerTriggeredEvent,
    TriggerExistingSagaEvent, TriggerSagaEndEvent, TriggerSagaStartEvent, GREETING, IDENTIFIER,
    STUB_GATEWAY, TIMER_DELAY,
};
use crate::world::SimConfig;

use saga_env::EventMessage;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const MINUTE: Duration = Duration::from_secs(60);

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all expectations
    pub passed: bool,

    /// Virtual time elapsed since the epoch
    pub elapsed: Duration,

    /// Active saga instances at the end
    pub active_sagas: usize,

    /// Commands recorded during WHEN
    pub dispatched_commands: usize,

    /// Events recorded during WHEN
    pub published_events: usize,

    /// Every failed expectation, or the error that stopped the run
    pub failures: Vec<String>,
}

impl ScenarioResult {
    /// Returns the failures joined into one line.
    pub fn failure_reason(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

/// State observed at the end of a scenario.
#[derive(Debug)]
struct Observation {
    elapsed: Duration,
    active_sagas: usize,
    dispatched_commands: usize,
    published_events: usize,
    failures: Vec<ExpectationFailure>,
}

type Check = Result<(), ExpectationFailure>;

/// Runs saga scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut ids = AggregateIdProvider::new(self.seed);
        let outcome = match scenario {
            ScenarioId::EndToEnd => self.run_end_to_end(&mut ids),
            ScenarioId::TimerReset => self.run_timer_reset(&mut ids),
            ScenarioId::FanOut => self.run_fan_out(&mut ids),
            ScenarioId::NoMatch => self.run_no_match(&mut ids),
            ScenarioId::PhaseIsolation => self.run_phase_isolation(&mut ids),
            ScenarioId::SagaEnd => self.run_saga_end(&mut ids),
            ScenarioId::StubbedReply => self.run_stubbed_reply(&mut ids),
        };

        let result = match outcome {
            Ok(observed) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: observed.failures.is_empty(),
                elapsed: observed.elapsed,
                active_sagas: observed.active_sagas,
                dispatched_commands: observed.dispatched_commands,
                published_events: observed.published_events,
                failures: observed.failures.iter().map(ToString::to_string).collect(),
            },
            Err(e) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                elapsed: Duration::ZERO,
                active_sagas: 0,
                dispatched_commands: 0,
                published_events: 0,
                failures: vec![e.to_string()],
            },
        };

        if !result.passed {
            warn!("{} failed: {}", scenario.name(), result.failures.join("; "));
        }
        result
    }

    /// Runs every scenario.
    pub fn run_all(&self) -> Vec<ScenarioResult> {
        ScenarioId::all().into_iter().map(|s| self.run(s)).collect()
    }

    fn fixture(&self) -> SagaTestFixture<StubSaga> {
        SagaTestFixture::with_config(SimConfig {
            seed: self.seed,
            ..SimConfig::default()
        })
    }

    /// SAGA-001: the canonical end-to-end run.
    ///
    /// A starts and is poked; B was never started so its poke goes nowhere.
    /// After 35 minutes A's timer has fired once and greeted once.
    fn run_end_to_end(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let (a, b) = (ids.aggregate(0), ids.aggregate(1));
        let mut fixture = self.fixture();
        fixture.register_command_gateway(STUB_GATEWAY)?;

        fixture
            .given_aggregate(a)
            .published([
                event(TriggerSagaStartEvent::new(a))?,
                event(TriggerExistingSagaEvent::new(a))?,
            ])?
            .and_then_aggregate(b)
            .published([event(TriggerExistingSagaEvent::new(b))?])?
            .when_time_elapses(35 * MINUTE)?;

        observe(&mut fixture, |e| {
            vec![
                e.active_sagas(1),
                e.association_with(IDENTIFIER, &a.to_string()),
                e.no_association_with(IDENTIFIER, &b.to_string()),
                e.no_scheduled_events(),
                e.dispatched_commands_equal_to(&[json!(GREETING)]),
                e.published_events_matching(&matchers::exact_sequence_of(vec![
                    matchers::payload_of_type::<EventMessage, TimerTriggeredEvent>(),
                ])),
            ]
        })
    }

    /// SAGA-002: a reset half way through moves the timer.
    fn run_timer_reset(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let a = ids.aggregate(0);
        let mut fixture = self.fixture();
        fixture.register_command_gateway(STUB_GATEWAY)?;
        let start = fixture.current_time();

        fixture
            .given_aggregate(a)
            .published([event(TriggerSagaStartEvent::new(a))?])?
            .and_then_time_elapses(5 * MINUTE)?
            .and_then_aggregate(a)
            .published([event(ResetTriggerEvent::new(a))?])?
            .when_time_elapses(6 * MINUTE)?;

        debug!("Timer re-armed for {:?}", start + 5 * MINUTE + TIMER_DELAY);
        observe(&mut fixture, |e| {
            vec![
                e.active_sagas(1),
                e.scheduled_event_matching(4 * MINUTE, &any()),
                e.scheduled_event_of_type_at::<TimerTriggeredEvent>(start + 15 * MINUTE),
                e.no_dispatched_commands(),
                e.no_published_events(),
            ]
        })
    }

    /// SAGA-003: events fan out only to the saga they correlate with.
    fn run_fan_out(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let (a, b) = (ids.aggregate(0), ids.aggregate(1));
        let mut fixture = self.fixture();

        fixture
            .given_aggregate(a)
            .published([event(TriggerSagaStartEvent::new(a))?])?
            .and_then_aggregate(b)
            .published([event(TriggerSagaStartEvent::new(b))?])?
            .when_aggregate(a)
            .publishes(event(TriggerExistingSagaEvent::new(a))?)?;

        let expected = [event(SagaWasTriggeredEvent::new(a))?];
        let observed = observe(&mut fixture, |e| {
            vec![
                e.active_sagas(2),
                e.association_with(IDENTIFIER, &a.to_string()),
                e.association_with(IDENTIFIER, &b.to_string()),
                e.published_events(&expected),
            ]
        })?;

        let registry = fixture.world().registry();
        for instance in registry.instances() {
            let held = registry.associations().values_of(instance.id);
            debug!("Saga {} holds {} association(s)", instance.id, held.len());
        }
        Ok(observed)
    }

    /// SAGA-004: an event nobody correlates with is a silent no-op.
    fn run_no_match(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let (a, stranger) = (ids.aggregate(0), ids.aggregate(1));
        let mut fixture = self.fixture();

        fixture
            .given_aggregate(a)
            .published([event(TriggerSagaStartEvent::new(a))?])?
            .when_publishing_a(event(ResetTriggerEvent::new(stranger))?)?;

        let armed = event(TimerTriggeredEvent::new(a))?;
        observe(&mut fixture, |e| {
            vec![
                e.active_sagas(1),
                e.no_association_with(IDENTIFIER, &stranger.to_string()),
                e.scheduled_event(TIMER_DELAY, &armed),
                e.no_dispatched_commands(),
                e.no_published_events(),
            ]
        })
    }

    /// SAGA-005: what happens while priming never reaches the assertions.
    fn run_phase_isolation(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let a = ids.aggregate(0);
        let mut fixture = self.fixture();
        fixture.register_command_gateway(STUB_GATEWAY)?;

        fixture
            .given_aggregate(a)
            .published([event(TriggerSagaStartEvent::new(a))?])?
            .and_then_time_elapses(TIMER_DELAY)?
            .and_then_aggregate(a)
            .published([event(TriggerExistingSagaEvent::new(a))?])?
            .when_aggregate(a)
            .publishes(event(ResetTriggerEvent::new(a))?)?;

        observe(&mut fixture, |e| {
            vec![
                e.active_sagas(1),
                e.scheduled_event_of_type::<TimerTriggeredEvent>(TIMER_DELAY),
                e.no_dispatched_commands(),
                e.no_published_events(),
            ]
        })
    }

    /// SAGA-006: an ended saga is gone; its timers fire into nothing.
    fn run_saga_end(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let (a, b) = (ids.aggregate(0), ids.aggregate(1));
        let mut fixture = self.fixture();
        fixture.register_command_gateway(STUB_GATEWAY)?;

        fixture
            .given_aggregate(a)
            .published([
                event(TriggerSagaStartEvent::new(a))?,
                event(TriggerSagaEndEvent::new(a))?,
            ])?
            .and_then_aggregate(b)
            .published([event(TriggerSagaStartEvent::new(b))?])?
            .when_time_elapses(15 * MINUTE)?;

        observe(&mut fixture, |e| {
            vec![
                e.active_sagas(1),
                e.no_association_with(IDENTIFIER, &a.to_string()),
                e.association_with(IDENTIFIER, &b.to_string()),
                e.no_scheduled_events(),
                e.dispatched_commands_equal_to(&[json!(GREETING)]),
                e.published_events_matching(&matchers::list_with_all_of(vec![
                    timer_for(&a.to_string()),
                    timer_for(&b.to_string()),
                ])),
            ]
        })
    }

    /// SAGA-007: a stubbed reply becomes the saga's second command.
    fn run_stubbed_reply(&self, ids: &mut AggregateIdProvider) -> SimResult<Observation> {
        let a = ids.aggregate(0);
        let mut fixture = self.fixture();
        fixture
            .register_command_gateway(STUB_GATEWAY)?
            .stub_command(GREETING, "Hi again!")?;

        fixture
            .given_aggregate(a)
            .published([event(TriggerSagaStartEvent::new(a))?])?
            .when_time_elapses(TIMER_DELAY)?;

        let fired = [event(TimerTriggeredEvent::new(a))?];
        observe(&mut fixture, |e| {
            vec![
                e.no_scheduled_events(),
                e.dispatched_commands_equal_to(&[json!(GREETING), json!("Hi again!")]),
                e.published_events(&fired),
            ]
        })
    }
}

fn event<E: Serialize + 'static>(payload: E) -> SimResult<EventMessage> {
    Ok(EventMessage::new(payload)?)
}

/// Matches an event whose payload names aggregate `id`.
fn timer_for(id: &str) -> matchers::Matcher<EventMessage> {
    matchers::payload_equal_to::<EventMessage>(json!({ "identifier": id }))
}

/// Snapshots the world, then runs every check and keeps the mismatches.
fn observe<F>(fixture: &mut SagaTestFixture<StubSaga>, checks: F) -> SimResult<Observation>
where
    F: FnOnce(&ExpectationEvaluator<'_>) -> Vec<Check>,
{
    let world = fixture.world();
    let mut observed = Observation {
        elapsed: world.clock().elapsed(),
        active_sagas: world.registry().active_count(),
        dispatched_commands: world.commands().recorded().len(),
        published_events: world.events().events().len(),
        failures: Vec::new(),
    };

    let evaluator = fixture.then()?;
    observed.failures = checks(&evaluator).into_iter().filter_map(Result::err).collect();
    Ok(observed)
}
