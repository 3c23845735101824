use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "roomcast")]
#[command(version)]
#[command(about = "Room-based chat over server-sent events")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the chat server
    Serve {
        /// Address to bind
        #[arg(long)]
        address: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Directory of static files to serve
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// JSON file holding the message history
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Join the chat interactively
    Chat {
        /// Server base URL
        #[arg(long)]
        url: Option<String>,

        /// Name shown next to your messages
        #[arg(long, short)]
        username: Option<String>,

        /// Room to start in
        #[arg(long, short, default_value = "lobby")]
        room: String,
    },

    /// Post a single message
    Send {
        /// Message text
        message: String,

        #[arg(long, short, default_value = "lobby")]
        room: String,

        #[arg(long, short)]
        username: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Print the stored message history
    History {
        /// Only show this room
        #[arg(long, short)]
        room: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },
}

/// Fold command-line overrides into the loaded config.
pub fn apply_overrides(config: &mut Config, command: &Command) {
    match command {
        Command::Serve {
            address,
            port,
            static_dir,
            store,
        } => {
            if let Some(a) = address {
                config.server.address = a.clone();
            }
            if let Some(p) = port {
                config.server.port = *p;
            }
            if let Some(d) = static_dir {
                config.server.static_dir = d.clone();
            }
            if let Some(s) = store {
                config.server.store_path = s.clone();
            }
        }
        Command::Chat { url, username, .. } | Command::Send { url, username, .. } => {
            if let Some(u) = url {
                config.client.base_url = u.clone();
            }
            if let Some(name) = username {
                config.client.username = name.clone();
            }
        }
        Command::History { url, .. } => {
            if let Some(u) = url {
                config.client.base_url = u.clone();
            }
        }
    }
}
