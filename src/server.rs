//! Chat server: form posts in, server-sent events out.
//!
//! ## Routes
//! - `POST /message`: form-encoded `room`, `username`, `message`; appended to
//!   the history file and broadcast to every open event stream.
//! - `GET /events`: infinite SSE stream of posted messages.
//! - `GET /messages.json`: the stored history.
//! - `GET /*`: static files.
//!
//! Every event stream holds its own receiver on one broadcast queue. A
//! listener that falls more than `channel_capacity` messages behind skips the
//! ones it missed and keeps going.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::http::{self, Request, EVENT_STREAM_HEAD};
use crate::message::Message;
use crate::sse;
use crate::store::MessageStore;

struct AppState {
    queue: broadcast::Sender<Message>,
    store: MessageStore,
    static_dir: PathBuf,
    heartbeat: Option<Duration>,
    shutdown: watch::Receiver<bool>,
}

/// A server bound to its listening socket but not yet accepting.
pub struct ChatServer {
    listener: TcpListener,
    config: ServerConfig,
    queue: broadcast::Sender<Message>,
}

impl ChatServer {
    /// Bind the listener described by `config`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ChatError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let (queue, _) = broadcast::channel(config.channel_capacity.max(1));
        Ok(Self {
            listener,
            config,
            queue,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChatError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves. Open event streams end
    /// when it does.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ChatError>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(AppState {
            queue: self.queue,
            store: MessageStore::new(self.config.store_path.clone()),
            static_dir: self.config.static_dir.clone(),
            heartbeat: self.config.heartbeat(),
            shutdown: stop_rx,
        });

        info!(addr = %self.listener.local_addr()?, "chat server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            debug!(%peer, error = %e, kind = e.as_label(), "connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutting down chat server");
                    let _ = stop_tx.send(true);
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) -> Result<(), ChatError> {
    let Some(request) = http::read_request(&mut stream).await? else {
        return Ok(());
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/message") => post_message(&mut stream, &state, &request).await,
        ("GET", "/events") => stream_events(&mut stream, &state).await,
        ("GET", "/messages.json") => {
            let messages = state.store.load().await;
            let body = serde_json::to_vec(&messages)?;
            stream
                .write_all(&http::response(200, "OK", "application/json", &body))
                .await?;
            Ok(())
        }
        ("GET", path) => serve_static(&mut stream, &state.static_dir, path).await,
        _ => {
            stream.write_all(&http::not_found()).await?;
            Ok(())
        }
    }
}

async fn post_message(
    stream: &mut TcpStream,
    state: &AppState,
    request: &Request,
) -> Result<(), ChatError> {
    let body = String::from_utf8_lossy(&request.body);
    let message = match Message::from_form(&body) {
        Ok(m) => m,
        Err(e) => {
            let reason = e.to_string();
            stream
                .write_all(&http::response(
                    422,
                    "Unprocessable Entity",
                    "text/plain; charset=utf-8",
                    reason.as_bytes(),
                ))
                .await?;
            return Ok(());
        }
    };

    if let Err(e) = state.store.append(&message).await {
        error!(path = %state.store.path().display(), error = %e, "failed to write message history");
    }

    // No listeners is not an error.
    let _ = state.queue.send(message);

    stream
        .write_all(&http::response(200, "OK", "text/plain; charset=utf-8", b""))
        .await?;
    Ok(())
}

async fn stream_events(stream: &mut TcpStream, state: &AppState) -> Result<(), ChatError> {
    // Subscribe before the headers go out so a client that has seen the
    // stream open cannot miss a message posted right after.
    let mut rx = state.queue.subscribe();
    let mut shutdown = state.shutdown.clone();
    stream.write_all(EVENT_STREAM_HEAD.as_bytes()).await?;

    let mut heartbeat = state.heartbeat.map(|period| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker
    });

    loop {
        let frame = tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => sse::encode_data(&serde_json::to_string(&msg)?),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
            _ = tick(&mut heartbeat) => sse::HEARTBEAT.to_string(),
        };

        if stream.write_all(frame.as_bytes()).await.is_err() {
            break;
        }
    }

    Ok(())
}

async fn tick(heartbeat: &mut Option<tokio::time::Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn serve_static(stream: &mut TcpStream, root: &Path, path: &str) -> Result<(), ChatError> {
    let Some(file) = resolve_static(root, path) else {
        stream.write_all(&http::not_found()).await?;
        return Ok(());
    };

    match tokio::fs::read(&file).await {
        Ok(body) => {
            let content_type = http::content_type_for(&file);
            stream
                .write_all(&http::response(200, "OK", content_type, &body))
                .await?;
        }
        Err(_) => stream.write_all(&http::not_found()).await?,
    }
    Ok(())
}

/// Map a request path onto `root`. `/` and directory paths resolve to
/// `index.html`; anything that would leave `root` is refused.
pub fn resolve_static(root: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let mut full = root.join(relative);
    if path.ends_with('/') || relative.as_os_str().is_empty() || full.is_dir() {
        full.push("index.html");
    }
    Some(full)
}
