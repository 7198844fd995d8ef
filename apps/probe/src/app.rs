//! Interactive probe session: a connection manager driven from stdin.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;

use retether_client::{
    ClientConfig, ConnectionManager, Consumer, CredentialSource, RetryPolicy, StaticToken, Status,
    TokenFile, default_token_path,
};
use retether_protocol::constants::kind;
use retether_test_server::{TestServer, TestServerConfig};

#[derive(Debug, Parser)]
#[command(name = "retether-probe")]
#[command(about = "Connect to a Retether WebSocket server and poke at it")]
pub struct Args {
    /// Server endpoint (http/https URLs are mapped to ws/wss)
    #[arg(short, long, default_value = "ws://127.0.0.1:8000/ws/test/")]
    pub endpoint: String,

    /// Auth token (overrides --token-file and the default token path)
    #[arg(short, long)]
    pub token: Option<String>,

    /// File to read the auth token from
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "10")]
    pub max_attempts: u32,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, default_value = "3000")]
    pub interval_ms: u64,

    /// Run an embedded test server and connect to it
    #[arg(long)]
    pub serve: bool,
}

/// Prints every connection event as it happens.
struct PrintingConsumer;

impl Consumer for PrintingConsumer {
    fn on_open(&self) {
        println!("connection open");
    }

    fn on_message(&self, payload: &Value) {
        println!("<< {payload}");
    }

    fn on_close(&self) {
        println!("connection closed");
    }

    fn on_error(&self, description: &str) {
        println!("connection error: {description}");
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let credentials = credential_source(&args);

    let mut endpoint = args.endpoint.clone();
    let embedded = if args.serve {
        let config = TestServerConfig {
            port: 0,
            token: credentials.token(),
            username: "testuser".to_string(),
        };
        let server = TestServer::new(config);
        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move { runner.run().await });

        let port = wait_for_bind(&server).await?;
        endpoint = format!("ws://127.0.0.1:{port}/ws/test/");
        println!("embedded test server on port {port}");
        Some((server, handle))
    } else {
        None
    };

    let config = ClientConfig {
        endpoint,
        retry: RetryPolicy {
            max_attempts: args.max_attempts,
            interval: Duration::from_millis(args.interval_ms),
        },
    };
    let manager = ConnectionManager::new(config, credentials, PrintingConsumer);
    manager.connect();

    println!("commands: /connect /disconnect /status /kind <type> <message> /quit");
    println!("anything else is sent as an echo request");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let LineOutcome::Quit = handle_line(&manager, line) {
                    break;
                }
            }
        }
    }

    manager.shutdown();
    // Give the driver a moment to send the close frame.
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some((server, handle)) = embedded {
        server.shutdown();
        let _ = handle.await;
    }
    Ok(())
}

enum LineOutcome {
    Continue,
    Quit,
}

fn handle_line(manager: &ConnectionManager, line: &str) -> LineOutcome {
    match line {
        "/quit" => return LineOutcome::Quit,
        "/connect" => manager.connect(),
        "/disconnect" => manager.disconnect(),
        "/status" => print_status(&manager.status()),
        _ => {
            if let Some(rest) = line.strip_prefix("/kind ") {
                match rest.trim().split_once(' ') {
                    Some((message_kind, message)) => manager.send_text(message_kind, message),
                    None => manager.send_text(rest.trim(), ""),
                }
            } else if line.starts_with('/') {
                println!("unknown command: {line}");
            } else {
                manager.send_text(kind::ECHO, line);
            }
        }
    }
    LineOutcome::Continue
}

fn print_status(status: &Status) {
    println!("state: {:?}", status.state);
    match &status.last_message {
        Some(message) => println!("last message: {message}"),
        None => println!("last message: none"),
    }
    match &status.last_error {
        Some(error) => println!("last error: {error}"),
        None => println!("last error: none"),
    }
}

/// Picks the credential source: explicit token, then explicit file,
/// then the default token path.
fn credential_source(args: &Args) -> Arc<dyn CredentialSource> {
    if let Some(token) = &args.token {
        return Arc::new(StaticToken::new(token.clone()));
    }
    if let Some(path) = &args.token_file {
        return Arc::new(TokenFile::new(path.clone()));
    }
    match default_token_path() {
        Some(path) => Arc::new(TokenFile::new(path)),
        None => Arc::new(StaticToken::missing()),
    }
}

async fn wait_for_bind(server: &TestServer) -> anyhow::Result<u16> {
    for _ in 0..50 {
        let port = server.port().await;
        if port > 0 {
            return Ok(port);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("embedded test server failed to bind")
}
