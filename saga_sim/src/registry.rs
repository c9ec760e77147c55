//! Saga instance registry: creates instances, routes events, retires them.

use crate::association::AssociationStore;
use crate::context::{Collaborators, SimContext};
use crate::error::SimResult;

use saga_env::{AssociationValue, EventMessage, HandlerTable, Saga, SagaCreationPolicy, SagaId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// A live saga instance.
///
/// Instances are dropped from the registry as soon as they end, so every
/// instance held here is active.
pub struct SagaInstance<S> {
    pub id: SagaId,
    pub saga: S,
}

impl<S: Saga> SagaInstance<S> {
    fn new(id: SagaId) -> Self {
        Self {
            id,
            saga: S::default(),
        }
    }
}

/// Outcome of routing one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Instances the event was delivered to, in delivery order
    pub delivered: Vec<SagaId>,

    /// Instance created for this event, if any
    pub created: Option<SagaId>,

    /// Instances that ended while handling this event
    pub ended: Vec<SagaId>,
}

/// Owns every instance of one saga type.
pub struct SagaInstanceRegistry<S> {
    /// Built once when the saga type is registered
    handlers: HandlerTable<S>,

    /// Active instances; ids order by creation
    instances: BTreeMap<SagaId, SagaInstance<S>>,

    associations: AssociationStore,

    /// Seed mixed into instance ids
    seed: u64,

    /// Number of instances created so far
    created: u64,
}

impl<S: Saga> SagaInstanceRegistry<S> {
    /// Creates an empty registry for saga type `S`.
    pub fn new(seed: u64) -> Self {
        Self {
            handlers: S::handler_table(),
            instances: BTreeMap::new(),
            associations: AssociationStore::new(),
            seed,
            created: 0,
        }
    }

    /// Routes one event to the instances it correlates with.
    ///
    /// Targets are the union, over the handler's correlation keys, of the
    /// instances holding the extracted value. A creation policy may add one
    /// new instance. An event nobody handles is not an error.
    pub(crate) fn route(
        &mut self,
        event: &EventMessage,
        world: &mut Collaborators<'_>,
    ) -> SimResult<RouteOutcome> {
        let mut outcome = RouteOutcome::default();

        let Some(handler) = self.handlers.handler_for(&event.payload_type) else {
            trace!("No handler for {}", event.payload_type);
            return Ok(outcome);
        };

        let mut targets = BTreeSet::new();
        let mut creation_value = None;
        for correlation in handler.correlations() {
            let value = AssociationValue::new(correlation.key(), correlation.extract(event)?);
            targets.extend(self.associations.instances_for(&value));
            creation_value.get_or_insert(value);
        }

        let create = match handler.policy() {
            SagaCreationPolicy::Never => false,
            SagaCreationPolicy::IfNoneFound => targets.is_empty(),
            SagaCreationPolicy::Always => true,
        };

        if create {
            let id = SagaId::derive(self.seed, self.created);
            self.created += 1;
            self.instances.insert(id, SagaInstance::new(id));
            if let Some(value) = creation_value {
                self.associations.associate(id, value);
            }
            debug!("Created saga {} for {}", id, event.payload_type);
            targets.insert(id);
            outcome.created = Some(id);
        }

        if targets.is_empty() {
            trace!("No saga instance matches {}", event.payload_type);
            return Ok(outcome);
        }

        for id in targets {
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };

            let mut ctx = SimContext::new(id, &mut self.associations, world);
            handler.invoke(&mut instance.saga, event, &mut ctx)?;
            outcome.delivered.push(id);

            if ctx.ended() {
                self.instances.remove(&id);
                self.associations.remove_instance(id);
                debug!("Saga {} ended", id);
                outcome.ended.push(id);
            }
        }

        Ok(outcome)
    }

    /// Returns the number of active instances.
    pub fn active_count(&self) -> usize {
        self.instances.len()
    }

    /// Returns an active instance.
    pub fn instance(&self, id: SagaId) -> Option<&SagaInstance<S>> {
        self.instances.get(&id)
    }

    /// Iterates active instances in creation order.
    pub fn instances(&self) -> impl Iterator<Item = &SagaInstance<S>> {
        self.instances.values()
    }

    pub fn associations(&self) -> &AssociationStore {
        &self.associations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::gateway::CommandGatewayInterceptor;
    use crate::scheduler::TriggerScheduler;
    use saga_env::{SagaContext, SagaError};
    use serde::{Deserialize, Serialize};
    use std::collections::VecDeque;

    #[derive(Debug, Serialize, Deserialize)]
    struct Opened {
        id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Touched {
        id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Closed {
        id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Broadcast {
        group: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Exploded {
        id: String,
    }

    #[derive(Default)]
    struct Counter {
        touched: u32,
    }

    impl Saga for Counter {
        fn handlers(table: &mut HandlerTable<Self>) {
            table
                .start_on(
                    "id",
                    |e: &Opened| e.id.clone(),
                    |_s: &mut Counter, _e: Opened, ctx: &mut dyn SagaContext| {
                        ctx.associate_with(AssociationValue::new("group", "all"));
                        Ok(())
                    },
                )
                .on(
                    "id",
                    |e: &Touched| e.id.clone(),
                    |s: &mut Counter, _e: Touched, _ctx: &mut dyn SagaContext| {
                        s.touched += 1;
                        Ok(())
                    },
                )
                .on(
                    "id",
                    |e: &Closed| e.id.clone(),
                    |_s: &mut Counter, _e: Closed, ctx: &mut dyn SagaContext| {
                        ctx.end();
                        Ok(())
                    },
                )
                .on(
                    "group",
                    |e: &Broadcast| e.group.clone(),
                    |s: &mut Counter, _e: Broadcast, _ctx: &mut dyn SagaContext| {
                        s.touched += 10;
                        Ok(())
                    },
                )
                .on(
                    "id",
                    |e: &Exploded| e.id.clone(),
                    |_s: &mut Counter, _e: Exploded, _ctx: &mut dyn SagaContext| {
                        Err(SagaError::handler("exploded"))
                    },
                );
        }
    }

    struct Harness {
        clock: VirtualClock,
        scheduler: TriggerScheduler,
        commands: CommandGatewayInterceptor,
        outbox: VecDeque<EventMessage>,
        registry: SagaInstanceRegistry<Counter>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                clock: VirtualClock::default(),
                scheduler: TriggerScheduler::new(),
                commands: CommandGatewayInterceptor::default(),
                outbox: VecDeque::new(),
                registry: SagaInstanceRegistry::new(0),
            }
        }

        fn route<E: Serialize + 'static>(&mut self, payload: E) -> SimResult<RouteOutcome> {
            let event = EventMessage::new(payload)?;
            let mut world = Collaborators {
                clock: &self.clock,
                scheduler: &mut self.scheduler,
                commands: &mut self.commands,
                outbox: &mut self.outbox,
            };
            self.registry.route(&event, &mut world)
        }
    }

    #[test]
    fn test_creation_event_creates_one_instance() {
        let mut h = Harness::new();
        let outcome = h.route(Opened { id: "a".into() }).unwrap();
        assert!(outcome.created.is_some());
        assert_eq!(h.registry.active_count(), 1);
        assert!(h.registry.associations().contains(&AssociationValue::new("id", "a")));
    }

    #[test]
    fn test_creation_event_reuses_matching_instance() {
        let mut h = Harness::new();
        h.route(Opened { id: "a".into() }).unwrap();
        let outcome = h.route(Opened { id: "a".into() }).unwrap();
        assert!(outcome.created.is_none());
        assert_eq!(outcome.delivered.len(), 1);
        assert_eq!(h.registry.active_count(), 1);
    }

    #[test]
    fn test_routes_only_to_matching_instance() {
        let mut h = Harness::new();
        let a = h.route(Opened { id: "a".into() }).unwrap().created.unwrap();
        let b = h.route(Opened { id: "b".into() }).unwrap().created.unwrap();

        h.route(Touched { id: "a".into() }).unwrap();
        assert_eq!(h.registry.instance(a).unwrap().saga.touched, 1);
        assert_eq!(h.registry.instance(b).unwrap().saga.touched, 0);
    }

    #[test]
    fn test_shared_association_fans_out() {
        let mut h = Harness::new();
        h.route(Opened { id: "a".into() }).unwrap();
        h.route(Opened { id: "b".into() }).unwrap();

        let outcome = h.route(Broadcast { group: "all".into() }).unwrap();
        assert_eq!(outcome.delivered.len(), 2);
        assert!(h.registry.instances().all(|i| i.saga.touched == 10));
    }

    #[test]
    fn test_no_match_is_silent() {
        let mut h = Harness::new();
        h.route(Opened { id: "a".into() }).unwrap();

        let outcome = h.route(Touched { id: "zzz".into() }).unwrap();
        assert_eq!(outcome, RouteOutcome::default());
        assert_eq!(h.registry.active_count(), 1);

        let unhandled = h.route("not a saga event".to_string()).unwrap();
        assert_eq!(unhandled, RouteOutcome::default());
    }

    #[test]
    fn test_end_retires_instance() {
        let mut h = Harness::new();
        let a = h.route(Opened { id: "a".into() }).unwrap().created.unwrap();

        let outcome = h.route(Closed { id: "a".into() }).unwrap();
        assert_eq!(outcome.ended, vec![a]);
        assert_eq!(h.registry.active_count(), 0);
        assert!(h.registry.associations().all_associations().is_empty());

        // Never reactivated: the same correlation now creates a fresh instance.
        let again = h.route(Opened { id: "a".into() }).unwrap().created.unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn test_handler_error_propagates() {
        let mut h = Harness::new();
        h.route(Opened { id: "a".into() }).unwrap();

        let err = h.route(Exploded { id: "a".into() }).unwrap_err();
        assert_eq!(err.to_string(), "Saga handler failed: exploded");
    }

    #[test]
    fn test_instances_iterate_in_creation_order_near_seed_wrap() {
        let mut h = Harness::new();
        h.registry = SagaInstanceRegistry::new(u64::MAX);
        let ids: Vec<SagaId> = ["c", "a", "b"]
            .iter()
            .map(|id| h.route(Opened { id: id.to_string() }).unwrap().created.unwrap())
            .collect();

        let order: Vec<SagaId> = h.registry.instances().map(|i| i.id).collect();
        assert_eq!(order, ids);

        let outcome = h.route(Broadcast { group: "all".into() }).unwrap();
        assert_eq!(outcome.delivered, ids);
    }

    #[test]
    fn test_instance_ids_are_deterministic() {
        let mut first = Harness::new();
        let mut second = Harness::new();
        let a1 = first.route(Opened { id: "a".into() }).unwrap().created;
        let a2 = second.route(Opened { id: "a".into() }).unwrap().created;
        assert_eq!(a1, a2);
    }
}
