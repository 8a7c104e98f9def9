//! Newline-delimited JSON transport.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (never protocol messages)
//!
//! # Writers
//!
//! Responses, notifications and server-initiated requests are produced by
//! many tasks at once. None of them touch the output stream: they hand
//! messages to a [`MessageSender`], and a single writer task drains the
//! queue into a [`LineWriter`]. This keeps lines from interleaving.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::mcp::protocol::OutgoingMessage;

/// Something that accepts outgoing messages for delivery.
pub trait MessageSender: Send + Sync {
    /// Queues `message` for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the message can no longer be delivered.
    fn send(&self, message: OutgoingMessage) -> Result<(), TransportError>;
}

/// A [`MessageSender`] that feeds the connection's outbound queue.
///
/// The queue is unbounded: a client that stops reading makes it grow.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl ChannelSender {
    /// Creates a sender and the receiver the writer task drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSender for ChannelSender {
    fn send(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Reads newline-delimited messages.
pub struct LineReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }
}

/// Writes newline-delimited messages.
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// Wraps a writer.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises `message` and writes it as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(message).map_err(TransportError::Serialise)?;
        self.write_raw(&json).await?;
        Ok(())
    }

    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Drains `rx` into the stream until every sender is gone.
    ///
    /// A message that fails to serialise is logged and skipped; a write
    /// failure ends the loop since the stream is unusable afterwards.
    pub async fn drain(mut self, mut rx: mpsc::UnboundedReceiver<OutgoingMessage>) {
        while let Some(message) = rx.recv().await {
            match self.write_message(&message).await {
                Ok(()) => {}
                Err(TransportError::Serialise(e)) => {
                    tracing::error!(error = %e, "dropping unserialisable message");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "output stream failed, stopping writer");
                    return;
                }
            }
        }
        tracing::debug!("outbound queue closed");
    }
}

/// The stdio transport halves.
pub type StdioReader = LineReader<BufReader<tokio::io::Stdin>>;
/// See [`StdioReader`].
pub type StdioWriter = LineWriter<tokio::io::Stdout>;

/// Opens stdin and stdout as a transport.
#[must_use]
pub fn stdio() -> (StdioReader, StdioWriter) {
    (
        LineReader::new(BufReader::new(tokio::io::stdin())),
        LineWriter::new(tokio::io::stdout()),
    )
}
