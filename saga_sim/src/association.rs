//! Association store: which saga instances hold which association values.

use saga_env::{AssociationValue, SagaId};
use std::collections::{BTreeMap, BTreeSet};

/// Maps association values to the instances holding them, and back.
///
/// Both directions use ordered collections so lookups iterate in a stable
/// order (instance ids order by creation).
#[derive(Debug, Default)]
pub struct AssociationStore {
    by_value: BTreeMap<AssociationValue, BTreeSet<SagaId>>,
    by_instance: BTreeMap<SagaId, BTreeSet<AssociationValue>>,
}

impl AssociationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates an instance with a value. Associating twice is harmless.
    pub fn associate(&mut self, instance: SagaId, value: AssociationValue) {
        self.by_instance
            .entry(instance)
            .or_default()
            .insert(value.clone());
        self.by_value.entry(value).or_default().insert(instance);
    }

    /// Removes a single association.
    pub fn disassociate(&mut self, instance: SagaId, value: &AssociationValue) {
        if let Some(values) = self.by_instance.get_mut(&instance) {
            values.remove(value);
            if values.is_empty() {
                self.by_instance.remove(&instance);
            }
        }
        if let Some(instances) = self.by_value.get_mut(value) {
            instances.remove(&instance);
            if instances.is_empty() {
                self.by_value.remove(value);
            }
        }
    }

    /// Drops every association of an instance.
    pub fn remove_instance(&mut self, instance: SagaId) {
        let Some(values) = self.by_instance.remove(&instance) else {
            return;
        };
        for value in values {
            if let Some(instances) = self.by_value.get_mut(&value) {
                instances.remove(&instance);
                if instances.is_empty() {
                    self.by_value.remove(&value);
                }
            }
        }
    }

    /// Returns the instances holding `value`.
    pub fn instances_for(&self, value: &AssociationValue) -> BTreeSet<SagaId> {
        self.by_value.get(value).cloned().unwrap_or_default()
    }

    /// Returns the values held by one instance.
    pub fn values_of(&self, instance: SagaId) -> BTreeSet<AssociationValue> {
        self.by_instance.get(&instance).cloned().unwrap_or_default()
    }

    /// Returns every instance with its association values.
    pub fn all_associations(&self) -> &BTreeMap<SagaId, BTreeSet<AssociationValue>> {
        &self.by_instance
    }

    /// Returns true if any instance holds `value`.
    pub fn contains(&self, value: &AssociationValue) -> bool {
        self.by_value.contains_key(value)
    }
}
