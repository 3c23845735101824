//! # roomcast
//!
//! Room-based chat over server-sent events.
//!
//! - [`server`] accepts form posts, keeps a JSON history and fans messages
//!   out to every open event stream.
//! - [`subscriber`] keeps a client attached to that stream, reconnecting with
//!   capped exponential backoff whenever the connection drops.
//! - [`client`], [`rooms`] and [`chat`] make up the terminal front-end.

pub mod backoff;
pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod message;
pub mod rooms;
pub mod server;
pub mod sse;
pub mod store;
pub mod subscriber;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use client::ChatClient;
pub use config::Config;
pub use error::ChatError;
pub use message::{decode_event, Message};
pub use server::ChatServer;
pub use sse::{SseDecoder, SseEvent};
pub use subscriber::{
    subscribe, ConnectionStatus, EventConnection, EventTransport, Sleeper, Subscriber, TokioSleeper,
};
pub use transport::HttpTransport;
