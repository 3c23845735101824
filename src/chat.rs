//! Interactive terminal client.
//!
//! Reads lines from stdin and renders the live event stream. Lines starting
//! with `/` are commands:
//! - `/join <room>`: create or switch to a room
//! - `/rooms`: list rooms
//! - `/quit`: exit
//!
//! Anything else is posted to the current room, but only while the event
//! stream is connected.

use colored::*;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::backoff::ReconnectBackoff;
use crate::client::ChatClient;
use crate::error::ChatError;
use crate::message::Message;
use crate::rooms::{username_color, RoomLog};
use crate::subscriber::{ConnectionStatus, Subscriber};
use crate::transport::HttpTransport;

/// Settings for one interactive session.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub username: String,
    pub room: String,
    pub backoff: ReconnectBackoff,
    pub connect_timeout: Duration,
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Join(String),
    Rooms,
    Quit,
    Say(String),
    Empty,
}

/// Interpret one line typed by the user.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line.split_once(' ') {
        Some(("/join", room)) if !room.trim().is_empty() => Input::Join(room.trim().to_string()),
        _ => match line {
            "/rooms" => Input::Rooms,
            "/quit" | "/exit" => Input::Quit,
            _ => Input::Say(line.to_string()),
        },
    }
}

/// Format one message for the terminal.
pub fn render(username: &str, message: &str) -> String {
    format!(
        "{} {}",
        format!("{username}:").color(username_color(username)).bold(),
        message
    )
}

fn print_status(status: ConnectionStatus) {
    let line = match status {
        ConnectionStatus::Connected => format!("  [{}]", status).bright_green(),
        ConnectionStatus::Disconnected => format!("  [{}]", status).bright_red(),
    };
    eprintln!("{line}");
}

fn print_room(log: &RoomLog) {
    eprintln!("{}", format!("  -- #{} --", log.current()).bright_blue());
    for entry in log.messages(log.current()) {
        println!("{}", render(&entry.username, &entry.message));
    }
}

/// Post `msg` on its own task so the input loop keeps rendering while the
/// request is in flight. A failure is reported on `failures`.
pub fn spawn_post(
    client: ChatClient,
    msg: Message,
    failures: mpsc::UnboundedSender<ChatError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = client.post_message(&msg).await {
            let _ = failures.send(e);
        }
    })
}

/// Run the interactive client until `/quit` or end of input.
pub async fn run(client: ChatClient, options: ChatOptions) -> Result<(), ChatError> {
    let mut log = RoomLog::new();
    log.add_message(
        &Message::new("rocket", "Rocket", "This is another room. Neat, huh?"),
        true,
    );
    log.add_room(&options.room);
    log.add_message(
        &Message::new(log.current().to_string(), "System", format!("joined as {}", options.username)),
        true,
    );

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Message>();
    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<ChatError>();
    let transport = HttpTransport::new(options.connect_timeout);
    let subscriber = Subscriber::new(client.events_url(), transport, move |msg| {
        let _ = inbound_tx.send(msg);
    })
    .with_backoff(options.backoff);
    let mut status = subscriber.status();
    let subscription = subscriber.spawn();

    print_room(&log);

    // History is shown for the current room but never kept.
    match client.load_history().await {
        Ok(history) => {
            for msg in &history {
                if log.add_message(msg, false) {
                    println!("{}", render(&msg.username, &msg.message));
                }
            }
        }
        Err(e) => warn!(error = %e, "could not load message history"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(msg) = inbound_rx.recv() => {
                if log.add_message(&msg, true) {
                    println!("{}", render(&msg.username, &msg.message));
                }
            }
            Some(e) = failed_rx.recv() => {
                eprintln!("{}", format!("  send failed: {e}").bright_red());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.is_connected() != log.is_connected() {
                    log.set_connected(current.is_connected());
                    print_status(current);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Rooms => {
                        for room in log.rooms() {
                            let marker = if room == log.current() { "*" } else { " " };
                            eprintln!("  {marker} #{room}");
                        }
                    }
                    Input::Join(room) => {
                        if log.add_room(&room) {
                            log.add_message(
                                &Message::new(room.clone(), "System", format!("created #{room}")),
                                true,
                            );
                        }
                        print_room(&log);
                    }
                    Input::Say(text) => {
                        if !log.is_connected() {
                            eprintln!("{}", "  not connected; message not sent".bright_red());
                            continue;
                        }
                        let msg = Message::new(log.current().to_string(), options.username.clone(), text);
                        spawn_post(client.clone(), msg, failed_tx.clone());
                    }
                }
            }
        }
    }

    subscription.abort();
    Ok(())
}
