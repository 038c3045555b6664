//! Connector for one upstream service
//!
//! A [`Connector`] owns a single transport connection. While running it has
//! two tasks:
//! - a read task that owns the read half and a private [`Tokenizer`], and
//!   pushes completed lines (and, finally, the transport error) onto bounded
//!   queues
//! - the main loop, which owns the [`ServiceState`], dispatches lines as
//!   [`Message`]s, publishes them to observers, writes outbound requests,
//!   and watches for shutdown
//!
//! Lifecycle: `Unconnected -> Running -> Closed`. A connector never returns
//! to `Running` once closed.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::completion::{CompletionGuard, WaitGroup};
use crate::message::Message;
use crate::state::{ServiceSnapshot, ServiceState, format_duration};
use crate::tokenizer::{MAX_WORD_SIZE, Tokenizer};
use crate::word::Word;

/// Capacity of the queue of tokenized line batches between the read task
/// and the main loop
pub const LINE_QUEUE_CAPACITY: usize = 3;

/// Largest single read from the transport
const READ_CHUNK_SIZE: usize = 8192;

/// Capacity of the outbound request queue
pub const REQUEST_QUEUE_CAPACITY: usize = 32;

/// Suggested capacity for the observer broadcast channel
///
/// Observers that fall further behind than this lose the oldest events and
/// see `RecvError::Lagged`; publishing never blocks the connector.
pub const OBSERVER_CAPACITY: usize = 1024;

/// Connector errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connector is not connected")]
    NotConnected,

    #[error("connector is already connected")]
    AlreadyConnected,

    #[error("connector is closed")]
    Closed,

    #[error("connection closed by peer")]
    Disconnected,

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Connector lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, no transport yet
    Unconnected,
    /// Transport attached; `run` may be (or is being) called
    Running,
    /// Shut down or failed; the transport is closed
    Closed,
}

/// A message received by a named connector, as published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Name of the connector that received the message
    pub connector: String,
    /// The received message
    pub message: Message,
}

impl Response {
    /// Human-readable one-line form, prefixed with the connector name
    ///
    /// `TIME` renders as `m:ss` and `STATE` as the bare state label; anything
    /// else renders as the packed message.
    pub fn summary(&self) -> String {
        let message = &self.message;
        match message.word() {
            Word::Time => match message.arg(0).ok().and_then(|us| us.parse::<u64>().ok()) {
                Some(us) => format!(
                    "{}: {}",
                    self.connector,
                    format_duration(Duration::from_micros(us))
                ),
                None => format!("{}: {}", self.connector, message),
            },
            Word::State => match message.arg(0) {
                Ok(state) => format!("{}: {}", self.connector, state),
                Err(_) => format!("{}: {}", self.connector, message),
            },
            _ => format!("{}: {}", self.connector, message),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// JSON shape of a published response
#[derive(Serialize)]
struct ResponseEvent<'a> {
    connector: &'a str,
    word: Word,
    args: &'a [String],
    summary: String,
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResponseEvent {
            connector: &self.connector,
            word: self.message.word(),
            args: self.message.args(),
            summary: self.summary(),
        }
        .serialize(serializer)
    }
}

/// External side of a connector: requests in, state out, shutdown
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    name: String,
    requests: mpsc::Sender<Message>,
    snapshot: watch::Receiver<ServiceSnapshot>,
    cancel: CancellationToken,
}

impl ConnectorHandle {
    /// The connector name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an outbound request
    ///
    /// Fails with [`ConnectorError::Closed`] once the connector has stopped.
    pub async fn send(&self, message: Message) -> Result<(), ConnectorError> {
        self.requests
            .send(message)
            .await
            .map_err(|_| ConnectorError::Closed)
    }

    /// The latest service state
    pub fn snapshot(&self) -> ServiceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified on every state change
    pub fn subscribe_snapshots(&self) -> watch::Receiver<ServiceSnapshot> {
        self.snapshot.clone()
    }

    /// Ask the connector to shut down
    ///
    /// Cooperative: a line already being dispatched is finished first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the connector has stopped
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

/// Events the main loop waits on
enum Event {
    Lines(Vec<Vec<String>>),
    Failed(ConnectorError),
    Request(Message),
    Shutdown,
}

/// Client connector for one upstream service
pub struct Connector<T = TcpStream> {
    name: String,
    lifecycle: Lifecycle,
    transport: Option<T>,
    state: ServiceState,
    observer: broadcast::Sender<Response>,
    snapshot: watch::Sender<ServiceSnapshot>,
    requests: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    completion: Option<CompletionGuard>,
    max_word_size: usize,
}

impl<T> Connector<T> {
    /// Create an unconnected connector
    ///
    /// Accepted responses are published on `observer`. The connector holds
    /// one guard from `completion` and releases it when it closes.
    pub fn new(
        name: impl Into<String>,
        observer: broadcast::Sender<Response>,
        completion: &WaitGroup,
    ) -> (Self, ConnectorHandle) {
        let name = name.into();
        let state = ServiceState::new();
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let cancel = CancellationToken::new();

        let handle = ConnectorHandle {
            name: name.clone(),
            requests: request_tx,
            snapshot: snapshot_rx,
            cancel: cancel.clone(),
        };

        let connector = Connector {
            name,
            lifecycle: Lifecycle::Unconnected,
            transport: None,
            state,
            observer,
            snapshot: snapshot_tx,
            requests: request_rx,
            cancel,
            completion: Some(completion.add()),
            max_word_size: MAX_WORD_SIZE,
        };

        (connector, handle)
    }

    /// The connector name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The service state as last updated by the main loop
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Limit the size of a single incoming word
    ///
    /// A line holding a longer word is dropped and logged; the connector keeps
    /// running. Takes effect on the next `run`.
    pub fn set_max_word_size(&mut self, max_word_size: usize) {
        self.max_word_size = max_word_size;
    }

    /// Use an already-open transport
    pub fn attach(&mut self, transport: T) -> Result<(), ConnectorError> {
        if self.lifecycle != Lifecycle::Unconnected {
            return Err(ConnectorError::AlreadyConnected);
        }
        self.transport = Some(transport);
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Dispatch a batch of tokenized lines
    fn handle_responses(&mut self, lines: Vec<Vec<String>>) {
        for line in lines {
            let message = match Message::from_words(line) {
                Ok(message) => message,
                Err(e) => {
                    debug!(connector = %self.name, error = %e, "skipping line");
                    continue;
                }
            };

            if message.word().is_unknown() {
                debug!(connector = %self.name, line = %message, "skipping unknown message");
                continue;
            }

            self.dispatch(message);
        }
    }

    fn dispatch(&mut self, message: Message) {
        match message.word() {
            Word::Features | Word::File | Word::State | Word::Time => {
                if let Err(e) = self.state.update(&message) {
                    warn!(connector = %self.name, error = %e, "rejected state update");
                }
                self.snapshot.send_replace(self.state.snapshot());
            }
            Word::Ohai => {
                info!(connector = %self.name, greeting = %message, "service greeted us");
            }
            Word::Fail | Word::What => {
                warn!(connector = %self.name, response = %message, "service refused a request");
            }
            Word::Ok | Word::End => {}
            Word::Quit
            | Word::Play
            | Word::Stop
            | Word::Eject
            | Word::Load
            | Word::Count
            | Word::Dequeue
            | Word::Enqueue
            | Word::Select => {
                debug!(connector = %self.name, request = %message, "service sent a request word");
            }
            Word::Malformed | Word::UnknownRequest | Word::UnknownResponse => return,
        }

        let response = Response {
            connector: self.name.clone(),
            message,
        };
        if self.observer.send(response).is_err() {
            debug!(connector = %self.name, "no observers");
        }
    }

    /// Mark closed, refuse further requests, and release the completion guard
    fn close(&mut self) {
        self.lifecycle = Lifecycle::Closed;
        self.requests.close();
        if let Some(guard) = self.completion.take() {
            guard.done();
        }
    }
}

impl Connector<TcpStream> {
    /// Open a TCP connection to `address`
    ///
    /// Failure is reported to the caller; no retry is attempted.
    pub async fn connect(&mut self, address: &str) -> Result<(), ConnectorError> {
        if self.lifecycle != Lifecycle::Unconnected {
            return Err(ConnectorError::AlreadyConnected);
        }

        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| ConnectorError::Connect {
                address: address.to_string(),
                source,
            })?;
        info!(connector = %self.name, address = %address, "connected");

        self.attach(stream)
    }
}

impl<T> Connector<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Run until shutdown or a fatal transport error
    ///
    /// Returns `Ok` when shut down (via [`ConnectorHandle::shutdown`] or by
    /// dropping every handle) and the transport error otherwise. Either way
    /// the transport is closed and the completion guard released.
    pub async fn run(&mut self) -> Result<(), ConnectorError> {
        let transport = match self.lifecycle {
            Lifecycle::Unconnected => return Err(ConnectorError::NotConnected),
            Lifecycle::Closed => return Err(ConnectorError::Closed),
            Lifecycle::Running => self.transport.take().ok_or(ConnectorError::NotConnected)?,
        };

        let (reader, mut writer) = tokio::io::split(transport);
        let (line_tx, mut line_rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        let (error_tx, mut error_rx) = mpsc::channel(1);
        let read_cancel = self.cancel.child_token();
        let read_task = tokio::spawn(read_loop(
            self.name.clone(),
            reader,
            Tokenizer::with_max_word_size(self.max_word_size),
            line_tx,
            error_tx,
            read_cancel.clone(),
        ));

        info!(connector = %self.name, "connector running");

        let cancel = self.cancel.clone();
        let result = loop {
            // Lines queued before a transport error are dispatched first.
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => Event::Shutdown,
                Some(lines) = line_rx.recv() => Event::Lines(lines),
                Some(e) = error_rx.recv() => Event::Failed(e),
                request = self.requests.recv() => match request {
                    Some(message) => Event::Request(message),
                    None => Event::Shutdown,
                },
            };

            match event {
                Event::Lines(lines) => self.handle_responses(lines),
                Event::Request(message) => {
                    if let Err(e) = write_message(&mut writer, &message).await {
                        error!(connector = %self.name, error = %e, "failed to send request");
                        break Err(e);
                    }
                    debug!(connector = %self.name, request = %message, "sent request");
                }
                Event::Failed(e) => {
                    error!(connector = %self.name, error = %e, "transport failed");
                    break Err(e);
                }
                Event::Shutdown => {
                    info!(connector = %self.name, "connector shutting down");
                    break Ok(());
                }
            }
        };

        read_cancel.cancel();
        drop(line_rx);
        drop(error_rx);
        if let Err(e) = writer.shutdown().await {
            debug!(connector = %self.name, error = %e, "error closing transport");
        }
        drop(writer);
        if let Err(e) = read_task.await {
            warn!(connector = %self.name, error = %e, "read task did not finish cleanly");
        }

        self.close();
        result
    }
}

/// Tokenize one chunk, resuming past any overlong line
fn tokenize_chunk(name: &str, tokenizer: &mut Tokenizer, mut chunk: &[u8]) -> Vec<Vec<String>> {
    let mut batch = Vec::new();
    loop {
        let tokenized = tokenizer.feed(chunk);
        batch.extend(tokenized.lines);
        match tokenized.error {
            Some(e) => {
                warn!(connector = %name, error = %e, "discarding overlong line");
                // The tokenizer skips the rest of the line, so this always advances.
                chunk = &chunk[tokenized.consumed..];
            }
            None => return batch,
        }
    }
}

/// Write one request line
async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ConnectorError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.pack();
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read task: read bounded chunks, tokenize, and queue completed lines
async fn read_loop<R>(
    name: String,
    mut reader: R,
    mut tokenizer: Tokenizer,
    lines: mpsc::Sender<Vec<Vec<String>>>,
    errors: mpsc::Sender<ConnectorError>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(connector = %name, "read loop cancelled");
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        let failure = match read {
            Ok(0) => ConnectorError::Disconnected,
            Ok(n) => {
                let batch = tokenize_chunk(&name, &mut tokenizer, &buf[..n]);
                if !batch.is_empty() && lines.send(batch).await.is_err() {
                    return;
                }
                continue;
            }
            Err(e) => ConnectorError::Io(e),
        };

        // A read failing because we are shutting down is expected.
        if cancel.is_cancelled() {
            debug!(connector = %name, error = %failure, "read ended during shutdown");
        } else if errors.send(failure).await.is_err() {
            debug!(connector = %name, "main loop gone before transport error");
        }
        return;
    }
}
