//! ---
//! ripc_section: "05-networking-external-interfaces"
//! ripc_subsection: "binary"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Control CLI for operators talking to ripc components."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use ripc_common::config::AppConfig;
use ripc_msg::{command_queue, decode, result_queue, Client, Envelope, Server};
use serde_json::Value as JsonValue;
use tracing::info;

/// Options for `send`.
#[derive(Debug, Args)]
pub struct SendArgs {
    /// Component whose command queue receives the command.
    pub destination: String,
    /// Component name to send as; defaults to the destination.
    #[arg(long)]
    pub component: Option<String>,
    /// Thread name owning the reply queue; defaults to the configured thread.
    #[arg(long)]
    pub thread: Option<String>,
    /// Command payload as a JSON object.
    #[arg(long, default_value = "{}")]
    pub payload: String,
    /// Reply timeout in seconds; defaults to the configured timeout.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,
}

/// Options for `serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Component whose command queue is serviced.
    pub component: String,
    /// Exit after answering a single command.
    #[arg(long)]
    pub once: bool,
}

/// Options for `drain`.
#[derive(Debug, Args)]
pub struct DrainArgs {
    /// Component owning the reply queue.
    #[arg(long)]
    pub component: String,
    /// Thread owning the reply queue; defaults to the configured thread.
    #[arg(long)]
    pub thread: Option<String>,
}

/// Options for `queues`.
#[derive(Debug, Args)]
pub struct QueuesArgs {
    /// Component to describe.
    pub component: String,
    /// Thread whose reply queue is printed.
    #[arg(long, default_value = ripc_msg::DEFAULT_THREAD)]
    pub thread: String,
}

fn parse_payload(text: &str) -> Result<Envelope> {
    match decode(text).context("payload is not valid JSON")? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(anyhow!("payload must be a JSON object")),
    }
}

fn parse_timeout(seconds: Option<f64>, config: &AppConfig) -> Result<Duration> {
    match seconds {
        None => Ok(config.client.default_timeout),
        Some(seconds) => Duration::try_from_secs_f64(seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| anyhow!("timeout must be a positive number of seconds")),
    }
}

/// Send one command and print the reply as JSON.
pub fn send(config: &AppConfig, args: SendArgs) -> Result<()> {
    let payload = parse_payload(&args.payload)?;
    let timeout = parse_timeout(args.timeout, config)?;
    let component = args.component.unwrap_or_else(|| args.destination.clone());
    let thread = args.thread.unwrap_or_else(|| config.client.thread.clone());

    let mut client = Client::connect(component, thread, &config.broker.resolve())?
        .with_timeout_policy(config.client.timeout_policy);
    let reply = client.send_and_receive(&args.destination, payload, timeout)?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// Echo commands back to their senders.
pub fn serve(config: &AppConfig, args: ServeArgs) -> Result<()> {
    let mut server = Server::connect(args.component, &config.broker.resolve())?;
    info!(queue = %server.command_queue(), "serving commands");
    loop {
        let command = server.handle_next(|command| command.clone())?;
        info!(
            command_id = command.get("command_id").and_then(JsonValue::as_str).unwrap_or(""),
            "answered command"
        );
        if args.once {
            return Ok(());
        }
    }
}

/// Remove orphaned replies from a reply queue.
pub fn drain(config: &AppConfig, args: DrainArgs) -> Result<()> {
    let thread = args.thread.unwrap_or_else(|| config.client.thread.clone());
    let mut client = Client::connect(args.component, thread, &config.broker.resolve())?;
    let drained = client.drain_replies()?;
    println!("{drained}");
    Ok(())
}

/// Print the command and reply queue keys.
pub fn queues(args: QueuesArgs) -> Result<()> {
    println!("commands: {}", command_queue(&args.component));
    println!("results:  {}", result_queue(&args.component, &args.thread));
    Ok(())
}
