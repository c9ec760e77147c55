//! Event and command messages.
//!
//! Payloads travel as `serde_json::Value` tagged with the static type name of
//! the Rust type they were built from. The tag is what handler tables key on,
//! so routing never needs to inspect a payload's shape.

use crate::error::{SagaError, SagaResult};
use crate::types::MetaData;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;

/// Returns the type tag used for payloads of type `T`.
pub fn type_tag<T: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<T>()
}

fn encode<T: Serialize + 'static>(payload: &T) -> SagaResult<Value> {
    serde_json::to_value(payload).map_err(|e| SagaError::Encode {
        payload_type: type_tag::<T>(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned + 'static>(payload_type: &str, payload: &Value) -> SagaResult<T> {
    serde_json::from_value(payload.clone()).map_err(|e| SagaError::Decode {
        payload_type: payload_type.to_string(),
        target: type_tag::<T>(),
        reason: e.to_string(),
    })
}

/// Read access shared by events and commands.
pub trait Message {
    /// The type tag of the payload.
    fn payload_type(&self) -> &str;

    /// The encoded payload.
    fn payload(&self) -> &Value;

    fn metadata(&self) -> &MetaData;
}

/// Origin of an event published by an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOrigin {
    /// Aggregate identifier as given by the test author
    pub aggregate_id: String,

    /// Position of the event in the aggregate's stream, starting at 0
    pub sequence_number: u64,
}

/// An event travelling over the simulated bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub payload_type: String,
    pub payload: Value,
    pub metadata: MetaData,

    /// Virtual time of publication, stamped by the bus
    pub timestamp: Option<SystemTime>,

    /// Set when the event was published by an aggregate
    pub origin: Option<AggregateOrigin>,
}

impl EventMessage {
    /// Encodes `payload` into a new event.
    pub fn new<E: Serialize + 'static>(payload: E) -> SagaResult<Self> {
        Ok(Self {
            payload_type: type_tag::<E>().to_string(),
            payload: encode(&payload)?,
            metadata: MetaData::empty(),
            timestamp: None,
            origin: None,
        })
    }

    /// Replaces the metadata.
    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_origin(mut self, aggregate_id: impl Into<String>, sequence_number: u64) -> Self {
        self.origin = Some(AggregateOrigin {
            aggregate_id: aggregate_id.into(),
            sequence_number,
        });
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns true if the payload was built from a `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.payload_type == type_tag::<T>()
    }

    /// Decodes the payload as a `T`.
    pub fn decode<T: DeserializeOwned + 'static>(&self) -> SagaResult<T> {
        decode(&self.payload_type, &self.payload)
    }

    /// Compares type tag and payload, ignoring metadata, timestamp and origin.
    pub fn same_payload(&self, other: &EventMessage) -> bool {
        self.payload_type == other.payload_type && self.payload == other.payload
    }
}

impl Message for EventMessage {
    fn payload_type(&self) -> &str {
        &self.payload_type
    }

    fn payload(&self) -> &Value {
        &self.payload
    }

    fn metadata(&self) -> &MetaData {
        &self.metadata
    }
}

/// A command handed to the dispatch transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub payload_type: String,
    pub payload: Value,
    pub metadata: MetaData,
}

impl CommandMessage {
    /// Encodes `payload` into a new command with empty metadata.
    pub fn new<C: Serialize + 'static>(payload: C) -> SagaResult<Self> {
        Ok(Self {
            payload_type: type_tag::<C>().to_string(),
            payload: encode(&payload)?,
            metadata: MetaData::empty(),
        })
    }

    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn decode<T: DeserializeOwned + 'static>(&self) -> SagaResult<T> {
        decode(&self.payload_type, &self.payload)
    }
}

impl Message for CommandMessage {
    fn payload_type(&self) -> &str {
        &self.payload_type
    }

    fn payload(&self) -> &Value {
        &self.payload
    }

    fn metadata(&self) -> &MetaData {
        &self.metadata
    }
}
