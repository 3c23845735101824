//! Reconnecting event-stream subscriber.
//!
//! A [`Subscriber`] owns one logical subscription to an SSE endpoint. It
//! opens a connection through an [`EventTransport`], hands every well-formed
//! chat message to its handler, and when the connection fails or closes it
//! waits on a [`Sleeper`] for the current [`ReconnectBackoff`] delay before
//! trying again. It retries forever.
//!
//! Transport and clock are traits so the retry logic runs the same against
//! reqwest and tokio in production and against scripted fakes in tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! roomcast::subscriber::subscribe("http://127.0.0.1:8000/events", |msg| {
//!     println!("[{}] {}: {}", msg.room, msg.username, msg.message);
//! });
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectBackoff;
use crate::error::ChatError;
use crate::message::{decode_event, Message};
use crate::sse::SseEvent;
use crate::transport::HttpTransport;

/// Opens physical connections to an event-stream endpoint.
pub trait EventTransport: Send + 'static {
    type Connection: EventConnection;

    /// Open one connection. Resolves once the stream is established.
    fn open(
        &mut self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Connection, ChatError>> + Send;
}

/// One open event stream.
pub trait EventConnection: Send {
    /// Next event, or `Ok(None)` once the server closed the stream.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<SseEvent>, ChatError>> + Send;

    /// Release the connection.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Timer used to wait between reconnect attempts.
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Connection indicator published by a [`Subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }

    /// Label shown in status lines.
    pub fn as_label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One reconnecting subscription.
pub struct Subscriber<T, S, H> {
    endpoint: String,
    transport: T,
    sleeper: S,
    handler: H,
    backoff: ReconnectBackoff,
    status: watch::Sender<ConnectionStatus>,
}

impl<T, H> Subscriber<T, TokioSleeper, H>
where
    T: EventTransport,
    H: FnMut(Message) + Send + 'static,
{
    pub fn new(endpoint: impl Into<String>, transport: T, handler: H) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            endpoint: endpoint.into(),
            transport,
            sleeper: TokioSleeper,
            handler,
            backoff: ReconnectBackoff::default(),
            status,
        }
    }
}

impl<T, S, H> Subscriber<T, S, H>
where
    T: EventTransport,
    S: Sleeper,
    H: FnMut(Message) + Send + 'static,
{
    /// Replace the timer used between attempts.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Subscriber<T, S2, H> {
        Subscriber {
            endpoint: self.endpoint,
            transport: self.transport,
            sleeper,
            handler: self.handler,
            backoff: self.backoff,
            status: self.status,
        }
    }

    /// Replace the default 1 s / 64 s backoff.
    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Subscribe to connection status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The delay the next failure will schedule, in seconds.
    pub fn current_delay_secs(&self) -> u64 {
        self.backoff.current()
    }

    /// Make one connection attempt and return the delay to wait before the
    /// next one.
    ///
    /// The connection, if one opened, is closed before this returns, so a
    /// later attempt never overlaps it.
    pub async fn attempt(&mut self) -> Duration {
        match self.transport.open(&self.endpoint).await {
            Ok(mut conn) => {
                self.backoff.reset();
                self.status.send_replace(ConnectionStatus::Connected);
                info!(endpoint = %self.endpoint, "connected to event stream");

                loop {
                    match conn.next_event().await {
                        Ok(Some(event)) => self.dispatch(&event),
                        Ok(None) => {
                            debug!(endpoint = %self.endpoint, "event stream closed by server");
                            break;
                        }
                        Err(e) => {
                            debug!(endpoint = %self.endpoint, error = %e, kind = e.as_label(), "event stream failed");
                            break;
                        }
                    }
                }
                conn.close();
            }
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, kind = e.as_label(), "connection attempt failed");
            }
        }

        self.status.send_replace(ConnectionStatus::Disconnected);
        let delay = self.backoff.next_delay();
        warn!(
            endpoint = %self.endpoint,
            delay_secs = delay.as_secs(),
            "connection lost, attempting to reconnect"
        );
        delay
    }

    fn dispatch(&mut self, event: &SseEvent) {
        if !event.is_message() {
            return;
        }
        match decode_event(&event.data) {
            Some(msg) => (self.handler)(msg),
            None => debug!(endpoint = %self.endpoint, "dropping malformed event"),
        }
    }

    /// Run the subscription indefinitely.
    pub async fn run(mut self) {
        loop {
            let delay = self.attempt().await;
            self.sleeper.sleep(delay).await;
        }
    }

    /// Run the subscription on a tokio task. Abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Subscribe to `endpoint` over HTTP and forward every chat message to
/// `handler` until the process exits.
///
/// The subscription runs on the current tokio runtime. Called from outside
/// one, it logs a warning and does nothing.
pub fn subscribe<H>(endpoint: impl Into<String>, handler: H)
where
    H: FnMut(Message) + Send + 'static,
{
    let endpoint = endpoint.into();
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let subscriber = Subscriber::new(endpoint, HttpTransport::default(), handler);
            let _detached = runtime.spawn(subscriber.run());
        }
        Err(e) => warn!(%endpoint, error = %e, "subscribe called outside a tokio runtime"),
    }
}
