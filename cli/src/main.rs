use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use frames::{ChatMessage, Reply};
use rcon_client::{
    ClientConfig, ClientError, ClientEvent, CommandOptions, ConfigError, HeartbeatConfig, ProtocolClient,
    TransportMode,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),
    #[error("failed to encode reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty command")]
    EmptyCommand,
}

#[derive(Parser, Debug)]
#[command(name = "rcon", about = "Resilient WebSocket console client for game servers")]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnArgs {
    #[arg(long, env = "RCON_HOST")]
    host: String,

    #[arg(long, env = "RCON_PORT", default_value_t = 28016)]
    port: u16,

    #[arg(long, env = "RCON_SECRET", hide_env_values = true)]
    secret: String,

    #[arg(long, env = "RCON_TRANSPORT", default_value = "auto", value_parser = TransportMode::parse)]
    transport: TransportMode,

    #[arg(long, env = "RCON_COMMAND_TIMEOUT_MS", default_value_t = 10_000)]
    command_timeout_ms: u64,

    #[arg(long, env = "RCON_HEARTBEAT_INTERVAL_MS", default_value_t = 15_000, help = "0 disables probes")]
    heartbeat_interval_ms: u64,

    #[arg(long, env = "RCON_HEARTBEAT_TIMEOUT_MS", default_value_t = 10_000)]
    heartbeat_timeout_ms: u64,

    #[arg(long, env = "RCON_MAX_IN_FLIGHT", default_value_t = 64)]
    max_in_flight: usize,
}

impl ConnArgs {
    fn into_config(self) -> ClientConfig {
        ClientConfig::new(self.host, self.port, self.secret)
            .with_transport(self.transport)
            .with_command_timeout(Duration::from_millis(self.command_timeout_ms))
            .with_heartbeat(HeartbeatConfig {
                interval: Duration::from_millis(self.heartbeat_interval_ms),
                timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            })
            .with_max_in_flight(self.max_in_flight)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one command and print the reply.
    Command {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long, default_value_t = false, help = "Print the full reply as JSON")]
        json: bool,
    },
    /// Stay connected and print notifications until Ctrl-C.
    Watch {
        #[arg(long, default_value_t = false)]
        chat_only: bool,
    },
    /// Relay stdin lines as commands; print replies and notifications.
    Console,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let client = ProtocolClient::new(cli.conn.into_config())?;

    match cli.command {
        Command::Command { text, timeout_ms, json } => run_command(&client, &text.join(" "), timeout_ms, json).await,
        Command::Watch { chat_only } => run_watch(&client, chat_only).await,
        Command::Console => run_console(Arc::new(client)).await,
    }
}

async fn run_command(client: &ProtocolClient, text: &str, timeout_ms: Option<u64>, json: bool) -> Result<(), CliError> {
    if text.trim().is_empty() {
        return Err(CliError::EmptyCommand);
    }
    let options = CommandOptions { timeout: timeout_ms.map(Duration::from_millis) };
    let reply = client.command_with(text, options).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.message);
    }
    client.close();
    Ok(())
}

async fn run_watch(client: &ProtocolClient, chat_only: bool) -> Result<(), CliError> {
    let mut events = client.subscribe();
    if let Err(e) = client.connect().await {
        // The scheduler keeps retrying in the background.
        tracing::warn!(error = %e, "initial connect failed");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = render(&event, chat_only) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch: dropped notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    client.destroy();
    Ok(())
}

async fn run_console(client: Arc<ProtocolClient>) -> Result<(), CliError> {
    let mut events = client.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render(&event, false) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = client.connect().await {
        tracing::warn!(error = %e, "initial connect failed");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let client = Arc::clone(&client);
        let text = text.to_owned();
        tokio::spawn(async move {
            match client.command(&text).await {
                Ok(reply) => println!("{}", reply.message),
                Err(e) => eprintln!("error: {e}"),
            }
        });
    }

    client.destroy();
    let _ = printer.await;
    Ok(())
}

fn render(event: &ClientEvent, chat_only: bool) -> Option<String> {
    match event {
        ClientEvent::Chat(chat) => Some(render_chat(chat)),
        _ if chat_only => None,
        ClientEvent::Console(reply) => Some(reply.message.clone()),
        ClientEvent::Event(reply) => Some(render_event(reply)),
        ClientEvent::Raw(text) => Some(format!("[raw] {text}")),
        ClientEvent::Open { url, .. } => Some(format!("* connected to {url}")),
        ClientEvent::Close(reason) => Some(format!("* disconnected: {}", reason.describe())),
        ClientEvent::Error(e) => Some(format!("* error: {e}")),
        ClientEvent::Reconnecting { attempt, delay } => {
            Some(format!("* reconnecting in {}ms (attempt {attempt})", delay.as_millis()))
        }
        ClientEvent::Reconnect { attempts } => Some(format!("* reconnected after {attempts} attempt(s)")),
        ClientEvent::Message(_) => None,
    }
}

fn render_chat(chat: &ChatMessage) -> String {
    if chat.username.is_empty() {
        format!("[chat] {}", chat.message)
    } else {
        format!("[chat] {}: {}", chat.username, chat.message)
    }
}

fn render_event(reply: &Reply) -> String {
    let kind = reply.kind.as_ref().map_or("event", |k| k.as_str());
    format!("[{}] {}", kind.to_ascii_lowercase(), reply.message)
}
