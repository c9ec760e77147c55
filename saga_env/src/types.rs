//! Common identity types shared by sagas and the harness.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a saga instance.
///
/// Ids are derived from a per-scenario counter so that two runs of the same
/// scenario hand out the same ids, and so that ordering by id is ordering by
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SagaId(pub Uuid);

impl SagaId {
    /// Creates a SagaId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic SagaId from a creation counter.
    pub fn from_seed(sequence: u64) -> Self {
        Self::derive(0, sequence)
    }

    /// Creates the id of the `sequence`-th instance of a run seeded with `seed`.
    ///
    /// The sequence occupies the leading bytes in big-endian order, so byte-wise
    /// UUID ordering follows creation order whatever the seed. The seed only
    /// fills the trailing bytes.
    pub fn derive(seed: u64, sequence: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&sequence.to_be_bytes());
        let mixed = (seed ^ sequence).wrapping_mul(0x517cc1b727220a95);
        bytes[8..16].copy_from_slice(&mixed.to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned when a trigger is scheduled.
///
/// Tokens are handed out from a strictly increasing counter and are never
/// reused, so a cancelled or fired token can never refer to a live trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScheduleToken(u64);

impl ScheduleToken {
    /// Wraps a raw counter value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScheduleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S#{}", self.0)
    }
}

/// A key/value pair correlating incoming events to saga instances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssociationValue {
    pub key: String,
    pub value: String,
}

impl AssociationValue {
    /// Creates an association value from anything printable.
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for AssociationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Free-form metadata attached to events and commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData(BTreeMap<String, Value>);

impl MetaData {
    /// Returns empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up a metadata entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
