use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use roomcast::chat::{self, ChatOptions};
use roomcast::cli::{apply_overrides, Args, Command};
use roomcast::{ChatClient, ChatServer, Config, Message};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args.command);

    let client = ChatClient::new(
        config.client.base_url.clone(),
        config.client.connect_timeout(),
    );

    match args.command {
        Command::Serve { .. } => {
            let server = ChatServer::bind(config.server.clone()).await?;
            eprintln!(
                "{}",
                format!("  Chat server running at http://{}", server.local_addr()?).bright_green()
            );
            eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        Command::Chat { room, .. } => {
            let options = ChatOptions {
                username: config.client.username.clone(),
                room,
                backoff: config.backoff.build(),
                connect_timeout: config.client.connect_timeout(),
            };
            chat::run(client, options).await?;
        }
        Command::Send { message, room, .. } => {
            let msg = Message::new(room, config.client.username.clone(), message);
            msg.validate()?;
            client.post_message(&msg).await?;
        }
        Command::History { room, .. } => {
            for msg in client.load_history().await? {
                if room.as_deref().is_some_and(|r| r != msg.room) {
                    continue;
                }
                println!(
                    "{} {}",
                    format!("#{}", msg.room).bright_blue(),
                    chat::render(&msg.username, &msg.message)
                );
            }
        }
    }

    Ok(())
}
