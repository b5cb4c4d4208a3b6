//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Request/reply IPC over broker list queues."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
//! Lightweight request/reply messaging layered on a broker that offers
//! FIFO list queues with a blocking pop.
//!
//! A [`Client`] pushes a JSON command into `queues.commands.<component>` and
//! waits on its private `queues.results.<component>.<thread>` queue for the
//! reply carrying the same `command_id`. A [`Server`] pops its command queue,
//! computes a result and pushes it to the queue named in the command.
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! use ripc_msg::{Client, Envelope, InMemoryBroker, Server};
//!
//! let broker = InMemoryBroker::new();
//! let mut server = Server::new("printer", broker.clone());
//! std::thread::spawn(move || server.handle_next(|cmd| cmd.clone()));
//!
//! let mut client = Client::new("printer", "main", broker);
//! let reply = client.send_and_receive("printer", Envelope::new(), Duration::from_secs(1))?;
//! ```
#![warn(missing_docs)]

pub mod broker;
pub mod client;
pub mod codec;
pub mod connect;
pub mod correlation;
pub mod logging;
pub mod naming;
#[cfg(feature = "redis")]
pub mod redis_broker;
pub mod server;

use std::time::Duration;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, IpcError>;

/// Failure kinds surfaced by every public operation. None of them are retried
/// internally; callers pick their own retry policy.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// The broker could not be reached when establishing a connection.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    /// The connected broker failed a push or pop.
    #[error("broker {broker} failed: {reason}")]
    Broker {
        /// Name of the broker backend.
        broker: &'static str,
        /// Transport level failure description.
        reason: String,
    },
    /// A value could not be turned into a wire envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    /// A wire value could not be decoded into an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// No reply with the expected correlation id arrived in time.
    #[error("request {command_id} timed out after {timeout:?}")]
    RequestTimedOut {
        /// Correlation id of the unanswered command.
        command_id: String,
        /// Timeout the caller asked for.
        timeout: Duration,
    },
}

pub use broker::{Broker, InMemoryBroker};
pub use client::Client;
pub use codec::{decode, decode_envelope, encode, encode_value, to_envelope, Envelope};
pub use connect::{BrokerConfig, BrokerEndpoint};
pub use correlation::{CommandId, CommandIdGenerator, Endpoint, Identity, TimeoutPolicy};
pub use logging::{log_envelope, IpcMetricsExporter, MessageDirection};
pub use naming::{command_queue, result_queue, DEFAULT_THREAD};
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;
pub use server::Server;
