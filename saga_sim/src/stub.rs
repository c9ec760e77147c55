//! Reference saga used by the fixture tests and the built-in scenarios.
//!
//! A `StubSaga` starts on [`TriggerSagaStartEvent`] and keeps a ten-minute
//! timer. When the timer fires it greets through the `stub_gateway` command
//! gateway, and greets again with whatever the first greeting returned.

use saga_env::{HandlerTable, Saga, SagaContext, SagaContextExt, ScheduleToken};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Association key every stub event correlates on.
pub const IDENTIFIER: &str = "identifier";

/// Name of the gateway the saga sends through.
pub const STUB_GATEWAY: &str = "stub_gateway";

/// The first command sent when the timer fires.
pub const GREETING: &str = "Say hi!";

/// Delay of the saga's timer.
pub const TIMER_DELAY: Duration = Duration::from_secs(10 * 60);

macro_rules! stub_event {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub identifier: String,
        }

        impl $name {
            pub fn new(identifier: impl ToString) -> Self {
                Self {
                    identifier: identifier.to_string(),
                }
            }
        }
    };
}

stub_event!(
    /// Starts a saga and arms its timer.
    TriggerSagaStartEvent
);
stub_event!(
    /// Pokes an existing saga, which answers with [`SagaWasTriggeredEvent`].
    TriggerExistingSagaEvent
);
stub_event!(
    /// Ends a saga. The timer it arms on the way out is orphaned.
    TriggerSagaEndEvent
);
stub_event!(
    /// Cancels the timer and re-arms it from now.
    ResetTriggerEvent
);
stub_event!(
    /// Payload of the saga's timer.
    TimerTriggeredEvent
);
stub_event!(
    /// Published in response to [`TriggerExistingSagaEvent`].
    SagaWasTriggeredEvent
);

#[derive(Debug, Default)]
pub struct StubSaga {
    /// Token of the armed timer
    timer: Option<ScheduleToken>,

    /// Number of times the timer fired for this instance
    pub timer_fired: u32,
}

impl StubSaga {
    fn arm(&mut self, identifier: &str, ctx: &mut dyn SagaContext) -> saga_env::SagaResult<()> {
        let token = ctx.schedule_payload_after(TIMER_DELAY, TimerTriggeredEvent::new(identifier))?;
        self.timer = Some(token);
        Ok(())
    }
}

impl Saga for StubSaga {
    fn handlers(table: &mut HandlerTable<Self>) {
        table
            .start_on(
                IDENTIFIER,
                |e: &TriggerSagaStartEvent| e.identifier.clone(),
                |saga: &mut StubSaga, e: TriggerSagaStartEvent, ctx: &mut dyn SagaContext| {
                    saga.arm(&e.identifier, ctx)
                },
            )
            .on(
                IDENTIFIER,
                |e: &TriggerExistingSagaEvent| e.identifier.clone(),
                |_saga: &mut StubSaga, e: TriggerExistingSagaEvent, ctx: &mut dyn SagaContext| {
                    ctx.publish_payload(SagaWasTriggeredEvent::new(e.identifier))
                },
            )
            .on(
                IDENTIFIER,
                |e: &TriggerSagaEndEvent| e.identifier.clone(),
                |saga: &mut StubSaga, e: TriggerSagaEndEvent, ctx: &mut dyn SagaContext| {
                    ctx.end();
                    saga.arm(&e.identifier, ctx)
                },
            )
            .on(
                IDENTIFIER,
                |e: &ResetTriggerEvent| e.identifier.clone(),
                |saga: &mut StubSaga, e: ResetTriggerEvent, ctx: &mut dyn SagaContext| {
                    if let Some(token) = saga.timer.take() {
                        ctx.cancel_schedule(token);
                    }
                    saga.arm(&e.identifier, ctx)
                },
            )
            .on(
                IDENTIFIER,
                |e: &TimerTriggeredEvent| e.identifier.clone(),
                |saga: &mut StubSaga, _e: TimerTriggeredEvent, ctx: &mut dyn SagaContext| {
                    saga.timer = None;
                    saga.timer_fired += 1;
                    let reply: Option<String> =
                        ctx.send_payload_via(STUB_GATEWAY, GREETING.to_string())?;
                    if let Some(reply) = reply {
                        ctx.send_payload_via::<_, String>(STUB_GATEWAY, reply)?;
                    }
                    Ok(())
                },
            );
    }
}
