//! Recording command interceptor.
//!
//! Stands in for the real dispatch transport while a scenario runs. Every
//! command is recorded; the response comes from, in order:
//! 1. an explicit stub for the command's payload value
//! 2. the configured callback behavior
//! 3. the configured default response (`null` unless changed)

use saga_env::{CallbackBehavior, CommandBus, CommandMessage, SagaError, SagaResult};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Replaces the command transport during simulation.
pub struct CommandGatewayInterceptor {
    /// Every dispatched command, in dispatch order
    recorded: Vec<CommandMessage>,

    /// Per-payload responses, most recent configuration wins
    stubs: Vec<(Value, Value)>,

    /// General response strategy
    callback: Option<Box<dyn CallbackBehavior>>,

    /// Response when neither a stub nor a callback applies
    default_response: Value,

    /// Names of registered gateway proxies
    gateways: BTreeSet<String>,
}

impl CommandGatewayInterceptor {
    /// Creates an interceptor answering `default_response` to everything.
    pub fn new(default_response: Value) -> Self {
        Self {
            recorded: Vec::new(),
            stubs: Vec::new(),
            callback: None,
            default_response,
            gateways: BTreeSet::new(),
        }
    }

    /// Registers a named gateway proxy backed by this interceptor.
    pub fn register_gateway(&mut self, name: impl Into<String>) {
        self.gateways.insert(name.into());
    }

    pub fn has_gateway(&self, name: &str) -> bool {
        self.gateways.contains(name)
    }

    /// Answers `response` whenever a command with payload `command` is dispatched.
    pub fn stub(&mut self, command: Value, response: Value) {
        self.stubs.retain(|(payload, _)| *payload != command);
        self.stubs.push((command, response));
    }

    pub fn set_callback_behavior(&mut self, behavior: Box<dyn CallbackBehavior>) {
        self.callback = Some(behavior);
    }

    pub fn set_default_response(&mut self, response: Value) {
        self.default_response = response;
    }

    /// Dispatches through a named gateway proxy.
    pub fn dispatch_via(&mut self, gateway: &str, command: CommandMessage) -> SagaResult<Value> {
        if !self.has_gateway(gateway) {
            return Err(SagaError::GatewayNotRegistered(gateway.to_string()));
        }
        self.dispatch(command)
    }

    /// Returns recorded commands in dispatch order.
    pub fn recorded(&self) -> &[CommandMessage] {
        &self.recorded
    }

    /// Forgets everything recorded so far. Stubs and callbacks stay.
    pub fn clear(&mut self) {
        self.recorded.clear();
    }

    fn resolve(&mut self, command: &CommandMessage) -> SagaResult<Value> {
        let stubbed = self.stubs.iter().find(|(payload, _)| *payload == command.payload);
        if let Some((_, response)) = stubbed {
            return Ok(response.clone());
        }
        if let Some(callback) = self.callback.as_mut() {
            return callback.resolve(&command.payload, &command.metadata);
        }
        Ok(self.default_response.clone())
    }
}

impl Default for CommandGatewayInterceptor {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl CommandBus for CommandGatewayInterceptor {
    fn dispatch(&mut self, command: CommandMessage) -> SagaResult<Value> {
        debug!("Dispatched command {} ({})", command.payload, command.payload_type);
        self.recorded.push(command.clone());
        self.resolve(&command)
    }
}

impl std::fmt::Debug for CommandGatewayInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGatewayInterceptor")
            .field("recorded", &self.recorded.len())
            .field("stubs", &self.stubs.len())
            .field("callback", &self.callback.is_some())
            .field("gateways", &self.gateways)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_env::MetaData;

    fn command(text: &str) -> CommandMessage {
        CommandMessage::new(text.to_string()).unwrap()
    }

    #[test]
    fn test_default_response_is_null() {
        let mut gateway = CommandGatewayInterceptor::default();
        assert_eq!(gateway.dispatch(command("Say hi!")).unwrap(), Value::Null);
        assert_eq!(gateway.recorded().len(), 1);
    }

    #[test]
    fn test_stub_beats_callback() {
        let mut gateway = CommandGatewayInterceptor::default();
        gateway.stub(Value::from("Say hi!"), Value::from("Hi again!"));
        gateway.set_callback_behavior(Box::new(|_: &Value, _: &MetaData| -> SagaResult<Value> {
            Ok(Value::from("callback"))
        }));

        assert_eq!(gateway.dispatch(command("Say hi!")).unwrap(), Value::from("Hi again!"));
        assert_eq!(gateway.dispatch(command("other")).unwrap(), Value::from("callback"));
    }

    #[test]
    fn test_callback_sees_metadata() {
        let mut gateway = CommandGatewayInterceptor::default();
        gateway.set_callback_behavior(Box::new(|_: &Value, meta: &MetaData| -> SagaResult<Value> {
            Ok(meta.get("user").cloned().unwrap_or(Value::Null))
        }));

        let cmd = command("whoami").with_metadata(MetaData::empty().with("user", "alice"));
        assert_eq!(gateway.dispatch(cmd).unwrap(), Value::from("alice"));
    }

    #[test]
    fn test_configured_default_response() {
        let mut gateway = CommandGatewayInterceptor::new(Value::Bool(true));
        assert_eq!(gateway.dispatch(command("x")).unwrap(), Value::Bool(true));
        gateway.set_default_response(Value::from(0));
        assert_eq!(gateway.dispatch(command("x")).unwrap(), Value::from(0));
    }

    #[test]
    fn test_records_even_when_callback_fails() {
        let mut gateway = CommandGatewayInterceptor::default();
        gateway.set_callback_behavior(Box::new(|_: &Value, _: &MetaData| -> SagaResult<Value> {
            Err(SagaError::rejected("no"))
        }));

        assert!(gateway.dispatch(command("doomed")).is_err());
        assert_eq!(gateway.recorded().len(), 1);
    }

    #[test]
    fn test_restubbing_replaces_response() {
        let mut gateway = CommandGatewayInterceptor::default();
        gateway.stub(Value::from("a"), Value::from(1));
        gateway.stub(Value::from("a"), Value::from(2));
        assert_eq!(gateway.dispatch(command("a")).unwrap(), Value::from(2));
    }

    #[test]
    fn test_unregistered_gateway() {
        let mut gateway = CommandGatewayInterceptor::default();
        let err = gateway.dispatch_via("stub_gateway", command("x")).unwrap_err();
        assert!(matches!(err, SagaError::GatewayNotRegistered(_)));
        assert!(gateway.recorded().is_empty());

        gateway.register_gateway("stub_gateway");
        assert!(gateway.dispatch_via("stub_gateway", command("x")).is_ok());
        assert_eq!(gateway.recorded().len(), 1);
    }

    #[test]
    fn test_clear_keeps_configuration() {
        let mut gateway = CommandGatewayInterceptor::default();
        gateway.stub(Value::from("a"), Value::from("b"));
        gateway.dispatch(command("a")).unwrap();
        gateway.clear();

        assert!(gateway.recorded().is_empty());
        assert_eq!(gateway.dispatch(command("a")).unwrap(), Value::from("b"));
    }
}
