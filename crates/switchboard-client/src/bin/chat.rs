//! # switchboard-chat
//!
//! Terminal chat client for a switchboard relay.
//!
//! ## Usage
//!
//! ```bash
//! switchboard-chat --user alice --topic general
//!
//! # Point at a non-local deployment
//! switchboard-chat --relay https://relay.example.com \
//!     --broker wss://broker.example.com/connection/websocket --user alice
//! ```
//!
//! Lines typed on stdin are sent to the active topic. `/topic <name>`
//! switches topic, `/user <name>` changes identity, `/topics` lists the
//! catalog and `/quit` exits.

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_client::{LogEvent, RelayClient, Session, SessionConfig};
use switchboard_transport::WebSocketConnector;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "switchboard-chat",
    version,
    about = "Terminal chat client for a switchboard relay"
)]
struct Args {
    /// Relay HTTP base URL.
    #[arg(
        long,
        env = "SWITCHBOARD_RELAY_URL",
        default_value = "http://localhost:8080"
    )]
    relay: String,

    /// Broker realtime WebSocket URL.
    #[arg(
        long,
        env = "SWITCHBOARD_BROKER_WS_URL",
        default_value = "ws://localhost:8000/connection/websocket"
    )]
    broker: String,

    /// Display name to chat as.
    #[arg(short, long)]
    user: String,

    /// Topic to open on start.
    #[arg(short, long, default_value = "all")]
    topic: String,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Topic(String),
    User(String),
    Topics,
    Quit,
    Send(String),
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("topic", arg) if !arg.is_empty() => Input::Topic(arg.to_string()),
        ("user", arg) if !arg.is_empty() => Input::User(arg.to_string()),
        ("topics", _) => Input::Topics,
        ("quit", _) | ("exit", _) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let relay = RelayClient::new(&args.relay).context("Failed to build relay client")?;
    let connector = WebSocketConnector::new(&args.broker);
    let mut session = Session::new(connector, relay.clone(), SessionConfig::default());
    let mut updates = session.multiplexer().subscribe_updates();

    session
        .start(&args.user)
        .await
        .context("Failed to connect to broker")?;
    session
        .switch_topic(&args.topic)
        .await
        .context("Failed to join topic")?;

    let mut user = args.user;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("-- #{} as {} --", args.topic, user);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                match parse_input(&line) {
                    Input::Topic(topic) => {
                        if let Err(e) = session.switch_topic(&topic).await {
                            error!(topic = %topic, error = %e, "Failed to switch topic");
                        }
                    }
                    Input::User(name) => {
                        match session.on_identity_change(&name).await {
                            Ok(_) => {
                                user = name;
                                println!("-- now chatting as {} --", user);
                            }
                            Err(e) => error!(user = %name, error = %e, "Failed to reconnect"),
                        }
                    }
                    Input::Topics => match relay.topics().await {
                        Ok(topics) => println!("-- topics: {} --", topics.join(", ")),
                        Err(e) => error!(error = %e, "Failed to list topics"),
                    },
                    Input::Quit => break,
                    Input::Send(content) => {
                        let Some(topic) = session.multiplexer().active_topic() else { continue };
                        if let Err(e) = relay.send_message(&topic, &content, &user).await {
                            error!(topic = %topic, error = %e, "Failed to send message");
                        }
                    }
                    Input::Empty => {}
                    Input::Unknown(line) => warn!("Unknown command: {}", line),
                }
            }
            event = updates.recv() => match event {
                Ok(LogEvent::Appended(message)) => {
                    println!(
                        "[{}] #{} <{}> {}",
                        message.timestamp.format("%H:%M:%S"),
                        message.topic,
                        message.author,
                        message.content
                    );
                }
                Ok(LogEvent::Cleared) => {
                    if let Some(topic) = session.multiplexer().active_topic() {
                        println!("-- #{} --", topic);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Display fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("hello there"), Input::Send("hello there".into()));
        assert_eq!(parse_input("/topic tech"), Input::Topic("tech".into()));
        assert_eq!(parse_input("/user  bob "), Input::User("bob".into()));
        assert_eq!(parse_input("/topics"), Input::Topics);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input("/topic"), Input::Unknown("/topic".into()));
        assert_eq!(parse_input("/dance"), Input::Unknown("/dance".into()));
    }
}
