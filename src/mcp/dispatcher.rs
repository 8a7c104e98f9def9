//! Per-connection request dispatch.
//!
//! A connection starts **Uninitialized** and becomes **Initialized** once a
//! session is bound to it, either by `initialize` or by the first request
//! that needs a session and carries none. Every method except `ping` and
//! `initialize` runs against a session resolved in this order:
//!
//! 1. `params.sessionId`, which must name an existing session
//! 2. the session bound to this connection
//! 3. a fresh session, created and bound on the spot
//!
//! A supplied but unknown id is always an error; it is never silently
//! replaced by a new session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::capability::{
    ActionKind, ActionProvider, ArgumentDescriptor, CapabilityKind, Descriptor, Dice,
    ResourceKind, ResourceProvider, TemplateKind, TemplateProvider,
};
use crate::config::Config;
use crate::error::DispatchError;
use crate::generation::ContentGenerator;
use crate::mcp::protocol::{
    JsonRpcNotification, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, OutgoingMessage,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::sampling::{ClientSampler, PendingRequests};
use crate::mcp::transport::MessageSender;
use crate::notifier::{ChangeNotifier, ConnectionInterest};
use crate::session::{SessionId, SessionRegistry};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session bound yet.
    Uninitialized,
    /// A session is bound.
    Initialized,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Action-related capabilities.
    pub actions: ListCapability,
    /// Template-related capabilities.
    pub templates: ListCapability,
    /// Resource-related capabilities.
    pub resources: ResourceCapability,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            actions: ListCapability { list_changed: true },
            templates: ListCapability { list_changed: true },
            resources: ResourceCapability {
                list_changed: true,
                subscribe: true,
            },
        }
    }
}

/// Capabilities of a listable kind.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCapability {
    /// Whether the list can change during the session.
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapability {
    /// Whether the list can change during the session.
    pub list_changed: bool,
    /// Whether clients may subscribe to updates.
    pub subscribe: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    capabilities: Value,
    #[serde(default)]
    client_info: Option<ClientInfo>,
    #[serde(default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
struct NamedParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
    #[serde(default)]
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct UriParams {
    uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionDefinition {
    name: &'static str,
    title: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct TemplateDefinition {
    name: &'static str,
    title: &'static str,
    description: &'static str,
    arguments: Vec<ArgumentDescriptor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceDefinition {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
    mime_type: &'static str,
    parameters: Value,
}

impl From<&Descriptor<ActionKind>> for ActionDefinition {
    fn from(d: &Descriptor<ActionKind>) -> Self {
        Self {
            name: d.name,
            title: d.title,
            description: d.description,
            input_schema: d.params.to_json_schema(),
        }
    }
}

impl From<&Descriptor<TemplateKind>> for TemplateDefinition {
    fn from(d: &Descriptor<TemplateKind>) -> Self {
        Self {
            name: d.name,
            title: d.title,
            description: d.description,
            arguments: d.params.to_arguments(),
        }
    }
}

impl From<&Descriptor<ResourceKind>> for ResourceDefinition {
    fn from(d: &Descriptor<ResourceKind>) -> Self {
        Self {
            uri: d.name,
            name: d.title,
            description: d.description,
            mime_type: "text/plain",
            parameters: d.params.to_json_schema(),
        }
    }
}

/// Handles every message arriving on one connection.
///
/// Shared by `Arc` between the reader loop and the per-request tasks.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    actions: ActionProvider,
    templates: TemplateProvider,
    resources: ResourceProvider,
    interest: Arc<ConnectionInterest>,
    pending: Arc<PendingRequests>,
    sampler: Arc<ClientSampler>,
    sender: Arc<dyn MessageSender>,
    bound: Mutex<Option<SessionId>>,
}

impl Dispatcher {
    /// Creates the dispatcher for a new connection writing through `sender`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, config: &Config, sender: Arc<dyn MessageSender>) -> Self {
        let pending = Arc::new(PendingRequests::new());
        let sampler = Arc::new(ClientSampler::new(
            Arc::clone(&sender),
            Arc::clone(&pending),
            &config.generation,
        ));
        let generator: Arc<dyn ContentGenerator> = Arc::clone(&sampler) as _;

        Self {
            actions: ActionProvider::new(Arc::clone(&registry), config.combat.clone(), generator),
            templates: TemplateProvider::new(Arc::clone(&registry)),
            resources: ResourceProvider::new(Arc::clone(&registry)),
            registry,
            interest: Arc::new(ConnectionInterest::new()),
            pending,
            sampler,
            sender,
            bound: Mutex::new(None),
        }
    }

    /// Replaces the combat dice.
    #[must_use]
    pub fn with_dice(mut self, dice: Arc<dyn Dice>) -> Self {
        self.actions = self.actions.with_dice(dice);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.bound_session().is_some() {
            ConnectionState::Initialized
        } else {
            ConnectionState::Uninitialized
        }
    }

    /// The session bound to this connection, if any.
    #[must_use]
    pub fn bound_session(&self) -> Option<SessionId> {
        self.lock_bound().clone()
    }

    /// A notifier delivering this connection's change notifications.
    #[must_use]
    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier::new(Arc::clone(&self.interest), Arc::clone(&self.sender))
    }

    /// Handles a request and builds the message to send back.
    pub async fn respond(&self, req: JsonRpcRequest) -> OutgoingMessage {
        let id = req.id.clone();
        tracing::debug!(method = %req.method, %id, "handling request");

        match self.handle_request(&req).await {
            Ok(result) => JsonRpcResponse::success(id, result).into(),
            Err(err) => {
                tracing::debug!(method = %req.method, %id, error = %err, "request failed");
                err.into_rpc(id).into()
            }
        }
    }

    /// Routes a request to its handler.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] to report back to the client.
    pub async fn handle_request(&self, req: &JsonRpcRequest) -> Result<Value, DispatchError> {
        let params = req.params.as_ref();
        match req.method.as_str() {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "actions/list" => {
                let session = self.resolve_session(params)?;
                let actions: Vec<ActionDefinition> =
                    self.actions.list(&session)?.into_iter().map(Into::into).collect();
                Ok(json!({ "actions": actions }))
            }
            "actions/call" => {
                let session = self.resolve_session(params)?;
                let call: NamedParams = parse_params(params)?;
                let result = self
                    .actions
                    .invoke(&call.name, &session, &call.arguments)
                    .await?;
                to_value(&result)
            }
            "templates/list" => {
                let session = self.resolve_session(params)?;
                let templates: Vec<TemplateDefinition> =
                    self.templates.list(&session)?.into_iter().map(Into::into).collect();
                Ok(json!({ "templates": templates }))
            }
            "templates/get" => {
                let session = self.resolve_session(params)?;
                let get: NamedParams = parse_params(params)?;
                to_value(&self.templates.get(&get.name, &session, &get.arguments)?)
            }
            "resources/list" => {
                let session = self.resolve_session(params)?;
                let resources: Vec<ResourceDefinition> =
                    self.resources.list(&session)?.into_iter().map(Into::into).collect();
                Ok(json!({ "resources": resources }))
            }
            "resources/read" => {
                let session = self.resolve_session(params)?;
                let read: ReadParams = parse_params(params)?;
                to_value(&self.resources.read(&read.uri, &session, &read.parameters)?)
            }
            "resources/subscribe" => {
                let session = self.resolve_session(params)?;
                let UriParams { uri } = parse_params(params)?;
                if !self.resources.is_known(&uri) {
                    return Err(DispatchError::CapabilityNotFound {
                        kind: CapabilityKind::Resources.label(),
                        name: uri,
                    });
                }
                if self.interest.subscribe(&session, &uri) {
                    tracing::info!(%session, %uri, "resource subscribed");
                }
                Ok(json!({}))
            }
            "resources/unsubscribe" => {
                let session = self.resolve_session(params)?;
                let UriParams { uri } = parse_params(params)?;
                if self.interest.unsubscribe(&session, &uri) {
                    tracing::info!(%session, %uri, "resource unsubscribed");
                }
                Ok(json!({}))
            }
            method => Err(DispatchError::MethodNotFound(method.to_string())),
        }
    }

    /// Handles a notification. Failures are logged, never reported.
    pub fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("client initialised");
                let sent = self.notifier().announce_all();
                tracing::debug!(sent, "initial list notifications queued");
            }
            "notifications/cancelled" => {
                let request = notif
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .map(ToString::to_string)
                    .unwrap_or_default();
                tracing::debug!(%request, "client cancelled a request; it will still complete");
            }
            method => tracing::debug!(method, "ignoring notification"),
        }
    }

    /// Hands a client response to the request waiting on it.
    pub fn handle_reply(&self, reply: JsonRpcReply) {
        self.pending.resolve(reply);
    }

    /// Fails every outstanding request to the client. Used when the
    /// connection is closing and no more responses can arrive.
    pub fn abandon_pending(&self) {
        let waiting = self.pending.len();
        if waiting > 0 {
            tracing::debug!(waiting, "abandoning requests to client");
        }
        self.pending.clear();
    }

    fn initialize(&self, params: Option<&Value>) -> Result<Value, DispatchError> {
        let params: InitializeParams = match params {
            Some(Value::Null) | None => InitializeParams::default(),
            Some(_) => parse_params(params)?,
        };

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "client connected"
            );
        }

        let session = {
            let mut bound = self.lock_bound();
            let session = match params.session_id {
                Some(id) => {
                    self.registry
                        .session(&id)
                        .ok_or(DispatchError::SessionNotFound(id))?
                        .id
                }
                None => match bound.as_ref() {
                    Some(existing) if self.registry.session(existing).is_some() => existing.clone(),
                    _ => self.registry.create_session().id,
                },
            };
            *bound = Some(session.clone());
            session
        };
        self.interest.attach(&session);

        let sampling = params.capabilities.get("sampling").is_some();
        self.sampler.set_client_support(sampling);
        tracing::info!(%session, sampling, "connection initialised");

        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
            "session": { "id": session },
        }))
    }

    fn resolve_session(&self, params: Option<&Value>) -> Result<SessionId, DispatchError> {
        if let Some(id) = requested_session(params)? {
            if self.registry.session(&id).is_none() {
                return Err(DispatchError::SessionNotFound(id));
            }
            self.interest.attach(&id);
            return Ok(id);
        }

        let mut bound = self.lock_bound();
        if let Some(id) = bound.as_ref() {
            if self.registry.session(id).is_some() {
                return Ok(id.clone());
            }
        }

        let session = self.registry.create_session().id;
        tracing::info!(%session, "no session given, bound a default session");
        *bound = Some(session.clone());
        drop(bound);
        self.interest.attach(&session);
        Ok(session)
    }

    fn lock_bound(&self) -> MutexGuard<'_, Option<SessionId>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn requested_session(params: Option<&Value>) -> Result<Option<SessionId>, DispatchError> {
    match params.and_then(|p| p.get("sessionId")) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(SessionId::from(id.as_str()))),
        Some(_) => Err(DispatchError::InvalidParams(
            "sessionId must be a string".to_string(),
        )),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<&Value>) -> Result<T, DispatchError> {
    let params = params.ok_or_else(|| DispatchError::InvalidParams("Missing params".to_string()))?;
    T::deserialize(params).map_err(|e| DispatchError::InvalidParams(format!("Invalid params: {e}")))
}

fn to_value<T: Serialize>(result: &T) -> Result<Value, DispatchError> {
    serde_json::to_value(result).map_err(|e| {
        DispatchError::Internal(format!("failed to serialise result: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::FixedDice;
    use crate::mcp::protocol::{OutgoingMessage, RequestId};
    use crate::mcp::transport::ChannelSender;
    use crate::world::StaticWorld;
    use tokio::sync::mpsc;

    fn setup() -> (Dispatcher, Arc<SessionRegistry>, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let registry = Arc::new(SessionRegistry::new(Arc::new(StaticWorld::new())));
        let (sender, rx) = ChannelSender::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry), &Config::default(), Arc::new(sender))
            .with_dice(Arc::new(FixedDice(0.0)));
        (dispatcher, registry, rx)
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    fn names(result: &Value, key: &str, field: &str) -> Vec<String> {
        result[key]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d[field].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn initialize_binds_a_session() {
        let (dispatcher, registry, _rx) = setup();
        assert_eq!(dispatcher.state(), ConnectionState::Uninitialized);

        let result = dispatcher
            .handle_request(&request(1, "initialize", json!({ "protocolVersion": "2024-11-05" })))
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["resources"]["subscribe"], true);
        assert_eq!(result["capabilities"]["actions"]["listChanged"], true);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let id = result["session"]["id"].as_str().unwrap();
        assert_eq!(dispatcher.bound_session(), Some(SessionId::from(id)));
        assert_eq!(dispatcher.state(), ConnectionState::Initialized);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn initialize_with_existing_session_is_idempotent() {
        let (dispatcher, registry, _rx) = setup();
        let session = registry.create_session();
        let params = json!({ "sessionId": session.id });

        for id in 1..=2 {
            let result = dispatcher
                .handle_request(&request(id, "initialize", params.clone()))
                .await
                .unwrap();
            assert_eq!(result["session"]["id"], session.id.as_str());
        }
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.snapshot(&session.id).unwrap().location, "entrance");
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let (dispatcher, registry, _rx) = setup();
        let err = dispatcher
            .handle_request(&request(1, "actions/list", json!({ "sessionId": "nope" })))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SessionNotFound(_)));
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn missing_session_creates_a_default() {
        let (dispatcher, registry, _rx) = setup();
        let result = dispatcher
            .handle_request(&request(1, "actions/list", json!({})))
            .await
            .unwrap();
        assert_eq!(
            names(&result, "actions", "name"),
            ["look", "move", "pickup", "inventory"]
        );
        assert_eq!(dispatcher.state(), ConnectionState::Initialized);

        dispatcher
            .handle_request(&request(2, "templates/list", json!({})))
            .await
            .unwrap();
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let (dispatcher, _, _rx) = setup();
        let err = dispatcher
            .handle_request(&request(1, "tools/list", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MethodNotFound(m) if m == "tools/list"));
    }

    #[tokio::test]
    async fn call_requires_name() {
        let (dispatcher, _, _rx) = setup();
        let err = dispatcher
            .handle_request(&request(1, "actions/call", json!({ "arguments": {} })))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn call_hidden_action_is_capability_not_found() {
        let (dispatcher, _, _rx) = setup();
        let reply = dispatcher
            .respond(request(4, "actions/call", json!({ "name": "attack" })))
            .await;
        let OutgoingMessage::Error(error) = reply else {
            panic!("expected an error response");
        };
        assert_eq!(error.id, Some(RequestId::Number(4)));
        assert_eq!(error.error.code, crate::error::CAPABILITY_NOT_FOUND);
        assert_eq!(error.error.message, "Action not found: attack");
    }

    #[tokio::test]
    async fn resources_list_uses_uri_and_mime_type() {
        let (dispatcher, _, _rx) = setup();
        let result = dispatcher
            .handle_request(&request(1, "resources/list", json!({})))
            .await
            .unwrap();
        let first = &result["resources"][0];
        assert_eq!(first["uri"], "game://player/status");
        assert_eq!(first["mimeType"], "text/plain");
        assert_eq!(first["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn subscribe_checks_uri() {
        let (dispatcher, _, _rx) = setup();
        let ok = dispatcher
            .handle_request(&request(1, "resources/subscribe", json!({ "uri": "game://monster" })))
            .await
            .unwrap();
        assert_eq!(ok, json!({}));

        let err = dispatcher
            .handle_request(&request(2, "resources/subscribe", json!({ "uri": "game://nowhere" })))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CapabilityNotFound { .. }));

        dispatcher
            .handle_request(&request(3, "resources/unsubscribe", json!({ "uri": "game://monster" })))
            .await
            .unwrap();
    }

    #[test]
    fn initialized_notification_announces_every_kind() {
        let (dispatcher, _, mut rx) = setup();
        dispatcher.handle_notification(&JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        });
        let mut count = 0;
        while let Ok(OutgoingMessage::Notification(_)) = rx.try_recv() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn non_string_session_id_is_invalid() {
        let err = requested_session(Some(&json!({ "sessionId": 5 }))).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
        assert_eq!(requested_session(None).unwrap(), None);
    }
}
