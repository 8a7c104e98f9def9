//! Connection server.
//!
//! This module implements the connection lifecycle:
//!
//! 1. **Startup**: a writer task drains the outbound queue and a notifier
//!    task turns registry events into notifications
//! 2. **Operation**: each incoming line is parsed; requests run as their own
//!    task so a handler waiting on the client does not block the reader
//! 3. **Shutdown**: on EOF, SIGINT or SIGTERM the reader stops, in-flight
//!    requests finish, and the queue is flushed
//!
//! # Architecture
//!
//! ```text
//!  stdin ──▶ reader loop ──┬─▶ request task ─┐
//!                          ├─▶ request task ─┼─▶ outbound queue ──▶ writer ──▶ stdout
//!  registry events ──▶ notifier ─────────────┘
//! ```

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::{parse_message, IncomingMessage, JsonRpcError, JsonRpcRequest};
use crate::mcp::transport::{self, ChannelSender, LineReader, LineWriter, MessageSender};
use crate::session::SessionRegistry;
use crate::world::StaticWorld;

/// The adventure server.
///
/// Owns the process-wide [`SessionRegistry`]; each connection served gets
/// its own [`Dispatcher`].
pub struct McpServer {
    config: Config,
    registry: Arc<SessionRegistry>,
}

impl McpServer {
    /// Creates a server over the built-in world.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::new(StaticWorld::new())));
        Self::with_registry(config, registry)
    }

    /// Creates a server over an existing registry.
    #[must_use]
    pub const fn with_registry(config: Config, registry: Arc<SessionRegistry>) -> Self {
        Self { config, registry }
    }

    /// The registry shared by every connection.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serves stdin/stdout until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if reading stdin fails or signal handlers cannot be
    /// installed.
    #[cfg(unix)]
    pub async fn run(&self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (reader, writer) = transport::stdio();

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
                Ok(())
            }

            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                Ok(())
            }

            result = self.serve(reader, writer) => result,
        }
    }

    /// Serves stdin/stdout until EOF or Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if reading stdin fails.
    #[cfg(windows)]
    pub async fn run(&self) -> io::Result<()> {
        let (reader, writer) = transport::stdio();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                Ok(())
            }

            result = self.serve(reader, writer) => result,
        }
    }

    /// Serves one connection over an arbitrary line transport.
    ///
    /// Returns once the input reaches EOF and every in-flight request has
    /// been answered and written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the input fails.
    pub async fn serve<R, W>(&self, mut reader: LineReader<R>, writer: LineWriter<W>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, outbound) = ChannelSender::new();
        let sender: Arc<dyn MessageSender> = Arc::new(sender);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry),
            &self.config,
            Arc::clone(&sender),
        ));

        let writer_task = tokio::spawn(writer.drain(outbound));
        let notifier_task = tokio::spawn(dispatcher.notifier().run(self.registry.subscribe()));
        let mut requests = JoinSet::new();

        tracing::info!("connection open");
        let outcome = read_loop(&mut reader, &dispatcher, &sender, &mut requests).await;

        // No more responses can arrive from the client.
        dispatcher.abandon_pending();
        while requests.join_next().await.is_some() {}

        notifier_task.abort();
        let _ = notifier_task.await;
        drop(dispatcher);
        drop(sender);
        if let Err(e) = writer_task.await {
            tracing::error!(error = %e, "writer task failed");
        }

        tracing::info!("connection closed");
        outcome
    }
}

async fn read_loop<R>(
    reader: &mut LineReader<R>,
    dispatcher: &Arc<Dispatcher>,
    sender: &Arc<dyn MessageSender>,
    requests: &mut JoinSet<()>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = reader.read_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match parse_message(&line) {
            Ok(IncomingMessage::Request(req)) => {
                requests.spawn(run_request(Arc::clone(dispatcher), Arc::clone(sender), req));
            }
            Ok(IncomingMessage::Notification(notif)) => dispatcher.handle_notification(&notif),
            Ok(IncomingMessage::Response(reply)) => dispatcher.handle_reply(reply),
            Err(error) => {
                tracing::warn!(code = error.error.code, "rejecting malformed message");
                send(sender.as_ref(), error);
            }
        }

        // Reap finished tasks so the set does not grow with the connection.
        while requests.try_join_next().is_some() {}
    }

    tracing::info!("input closed");
    Ok(())
}

/// Runs one request in its own task so a panic is contained and reported as
/// an internal error carrying the request's id.
async fn run_request(dispatcher: Arc<Dispatcher>, sender: Arc<dyn MessageSender>, req: JsonRpcRequest) {
    let id = req.id.clone();
    let method = req.method.clone();
    let handler = tokio::spawn(async move { dispatcher.respond(req).await });

    let message = match handler.await {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(%method, %id, error = %e, "request handler panicked");
            JsonRpcError::internal_error(id, "Internal error").into()
        }
    };
    send(sender.as_ref(), message);
}

fn send(sender: &dyn MessageSender, message: impl Into<crate::mcp::protocol::OutgoingMessage>) {
    if let Err(e) = sender.send(message.into()) {
        tracing::warn!(error = %e, "dropping outgoing message");
    }
}
