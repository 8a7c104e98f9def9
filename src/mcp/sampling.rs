//! Content generation through the client (`sampling/createMessage`).
//!
//! The server sends a request to the client and parks a oneshot sender in
//! the [`PendingRequests`] table under the request id. When the client's
//! response arrives the reader loop resolves the entry, waking the waiting
//! task. Every wait is bounded; on timeout the entry is removed so a late
//! answer is simply discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::config::GenerationConfig;
use crate::generation::{ContentGenerator, GenerationError, GenerationRequest};
use crate::mcp::protocol::{JsonRpcReply, OutgoingRequest, RequestId};
use crate::mcp::transport::MessageSender;

/// Method used to ask the client for generated text.
pub const SAMPLING_METHOD: &str = "sampling/createMessage";

type Waiter = oneshot::Sender<JsonRpcReply>;

/// Requests the server sent and is still waiting on.
#[derive(Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<RequestId, Waiter>>,
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a request id and a receiver for its response.
    pub fn register(&self) -> (RequestId, oneshot::Receiver<JsonRpcReply>) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = RequestId::String(format!("srv-{n}"));
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id.clone(), tx);
        (id, rx)
    }

    /// Hands `reply` to whoever is waiting on its id.
    ///
    /// Returns `false` if nobody is: the id is unknown or already timed out.
    pub fn resolve(&self, reply: JsonRpcReply) -> bool {
        let Some(waiter) = self.lock().remove(&reply.id) else {
            tracing::debug!(id = %reply.id, "response to unknown or expired request");
            return false;
        };
        waiter.send(reply).is_ok()
    }

    /// Forgets the entry for `id`.
    pub fn cancel(&self, id: &RequestId) {
        self.lock().remove(id);
    }

    /// Drops every waiter; their callers see the request as undeliverable.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of requests still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`ContentGenerator`] that asks the connected client.
///
/// Available only when generation is enabled in the configuration and the
/// client advertised `capabilities.sampling` during `initialize`.
pub struct ClientSampler {
    sender: Arc<dyn MessageSender>,
    pending: Arc<PendingRequests>,
    enabled: bool,
    client_supports: AtomicBool,
    timeout: Duration,
    max_tokens: u32,
}

impl ClientSampler {
    /// Creates a sampler. It stays unavailable until the client declares
    /// support.
    #[must_use]
    pub fn new(
        sender: Arc<dyn MessageSender>,
        pending: Arc<PendingRequests>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            sender,
            pending,
            enabled: config.enabled,
            client_supports: AtomicBool::new(false),
            timeout: Duration::from_secs(config.timeout_secs),
            max_tokens: config.max_tokens,
        }
    }

    /// Records whether the client can answer sampling requests.
    pub fn set_client_support(&self, supported: bool) {
        self.client_supports.store(supported, Ordering::Relaxed);
    }

    fn params(&self, request: &GenerationRequest) -> Value {
        json!({
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": request.prompt },
            }],
            "systemPrompt": request.system,
            "maxTokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl ContentGenerator for ClientSampler {
    fn is_available(&self) -> bool {
        self.enabled && self.client_supports.load(Ordering::Relaxed)
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        if !self.is_available() {
            return Err(GenerationError::Unavailable);
        }

        let (id, rx) = self.pending.register();
        let outgoing = OutgoingRequest::new(id.clone(), SAMPLING_METHOD, self.params(&request));
        if let Err(e) = self.sender.send(outgoing.into()) {
            tracing::warn!(error = %e, "could not send sampling request");
            self.pending.cancel(&id);
            return Err(GenerationError::Undeliverable);
        }
        tracing::debug!(%id, "sampling request sent");

        let reply = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(GenerationError::Undeliverable),
            Err(_) => {
                self.pending.cancel(&id);
                return Err(GenerationError::Timeout(self.timeout));
            }
        };

        if let Some(error) = reply.error {
            return Err(GenerationError::Rejected(error.message));
        }

        reply
            .result
            .as_ref()
            .and_then(|result| result.pointer("/content/text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(GenerationError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcErrorData, OutgoingMessage};
    use crate::mcp::transport::ChannelSender;
    use tokio::sync::mpsc;

    fn sampler(
        timeout_secs: u64,
    ) -> (
        Arc<ClientSampler>,
        Arc<PendingRequests>,
        mpsc::UnboundedReceiver<OutgoingMessage>,
    ) {
        let (sender, rx) = ChannelSender::new();
        let pending = Arc::new(PendingRequests::new());
        let config = GenerationConfig {
            enabled: true,
            timeout_secs,
            max_tokens: 50,
        };
        let sampler = ClientSampler::new(Arc::new(sender), Arc::clone(&pending), &config);
        sampler.set_client_support(true);
        (Arc::new(sampler), pending, rx)
    }

    fn reply(id: RequestId, result: Option<Value>, error: Option<JsonRpcErrorData>) -> JsonRpcReply {
        JsonRpcReply {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        }
    }

    async fn next_request(rx: &mut mpsc::UnboundedReceiver<OutgoingMessage>) -> OutgoingRequest {
        match rx.recv().await {
            Some(OutgoingMessage::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn ids_are_unique() {
        let pending = PendingRequests::new();
        let (a, _ra) = pending.register();
        let (b, _rb) = pending.register();
        assert_ne!(a, b);
        assert_eq!(pending.len(), 2);
        pending.cancel(&a);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn unavailable_without_client_support() {
        let (sender, _rx) = ChannelSender::new();
        let sampler = ClientSampler::new(
            Arc::new(sender),
            Arc::new(PendingRequests::new()),
            &GenerationConfig::default(),
        );
        assert!(!sampler.is_available());
        sampler.set_client_support(true);
        assert!(sampler.is_available());
    }

    #[tokio::test]
    async fn round_trip_through_client() {
        let (sampler, pending, mut rx) = sampler(5);
        let task = {
            let sampler = Arc::clone(&sampler);
            tokio::spawn(async move {
                sampler
                    .generate(GenerationRequest::new("be brief", "a dragon"))
                    .await
            })
        };

        let request = next_request(&mut rx).await;
        assert_eq!(request.method, SAMPLING_METHOD);
        assert_eq!(request.params["maxTokens"], 50);
        assert_eq!(request.params["messages"][0]["content"]["text"], "a dragon");

        assert!(pending.resolve(reply(
            request.id,
            Some(json!({ "role": "assistant", "content": { "type": "text", "text": "Rawr." } })),
            None,
        )));
        assert_eq!(task.await.unwrap(), Ok("Rawr.".to_string()));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn client_error_is_rejection() {
        let (sampler, pending, mut rx) = sampler(5);
        let task = {
            let sampler = Arc::clone(&sampler);
            tokio::spawn(async move { sampler.generate(GenerationRequest::new("s", "p")).await })
        };

        let request = next_request(&mut rx).await;
        let error = JsonRpcErrorData {
            code: -1,
            message: "user declined".to_string(),
            data: None,
        };
        pending.resolve(reply(request.id, None, Some(error)));
        assert_eq!(
            task.await.unwrap(),
            Err(GenerationError::Rejected("user declined".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_pending_entry() {
        let (sampler, pending, _rx) = sampler(1);
        let result = sampler.generate(GenerationRequest::new("s", "p")).await;
        assert_eq!(result, Err(GenerationError::Timeout(Duration::from_secs(1))));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn clearing_wakes_waiters() {
        let (sampler, pending, mut rx) = sampler(30);
        let task = {
            let sampler = Arc::clone(&sampler);
            tokio::spawn(async move { sampler.generate(GenerationRequest::new("s", "p")).await })
        };
        next_request(&mut rx).await;
        pending.clear();
        assert_eq!(task.await.unwrap(), Err(GenerationError::Undeliverable));
    }

    #[test]
    fn late_reply_is_discarded() {
        let pending = PendingRequests::new();
        assert!(!pending.resolve(reply(RequestId::Number(99), Some(json!({})), None)));
    }
}
