//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Server role: receive a command and push its reply."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use crate::broker::Broker;
use crate::codec::Envelope;
use crate::correlation::{Endpoint, Identity};
use crate::logging::IpcMetricsExporter;
use crate::naming::DEFAULT_THREAD;
use crate::Result;

#[cfg(feature = "redis")]
use crate::{connect::BrokerConfig, redis_broker::RedisBroker};

/// Servicing side of the protocol: pops `queues.commands.<component>` one
/// command at a time.
pub struct Server<B> {
    endpoint: Endpoint<B>,
}

impl<B: Broker> Server<B> {
    /// Create a server for `component` over an open broker handle.
    pub fn new(component: impl Into<String>, broker: B) -> Self {
        Self {
            endpoint: Endpoint::new(Identity::new(component, DEFAULT_THREAD), broker),
        }
    }

    /// Record traffic in the given metrics.
    pub fn with_metrics(mut self, metrics: IpcMetricsExporter) -> Self {
        self.endpoint = self.endpoint.with_metrics(metrics);
        self
    }

    /// Queue this server takes commands from.
    pub fn command_queue(&self) -> String {
        self.endpoint.identity().command_queue()
    }

    /// Block until the next command arrives. There is no timeout.
    pub fn receive_command(&mut self) -> Result<Envelope> {
        self.endpoint.receive_command()
    }

    /// Push `result` to the reply queue named by `command`.
    ///
    /// The command's `command_id` is copied into the result. A command without
    /// `results_queue` or `command_id` fails with
    /// [`crate::IpcError::InvalidEnvelope`].
    pub fn send_reply(&mut self, command: &Envelope, result: Envelope) -> Result<()> {
        self.endpoint.send_reply(command, result)
    }

    /// Receive one command, compute its result with `handler` and reply.
    /// Returns the command that was handled.
    pub fn handle_next<F>(&mut self, handler: F) -> Result<Envelope>
    where
        F: FnOnce(&Envelope) -> Envelope,
    {
        let command = self.receive_command()?;
        let result = handler(&command);
        self.send_reply(&command, result)?;
        Ok(command)
    }
}

#[cfg(feature = "redis")]
impl Server<RedisBroker> {
    /// Connect to the broker described by `config`.
    pub fn connect(component: impl Into<String>, config: &BrokerConfig) -> Result<Self> {
        Ok(Self::new(component, RedisBroker::connect(config)?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::codec::decode_envelope;
    use crate::IpcError;

    #[test]
    fn receive_command_decodes_object() {
        let mut broker = InMemoryBroker::new();
        broker
            .push_tail("queues.commands.printer", r#"{"msg":"hi"}"#)
            .unwrap();
        let mut server = Server::new("printer", broker);
        assert_eq!(server.command_queue(), "queues.commands.printer");
        let command = server.receive_command().unwrap();
        assert_eq!(command["msg"], json!("hi"));
    }

    #[test]
    fn receive_command_rejects_garbage() {
        let mut broker = InMemoryBroker::new();
        broker
            .push_tail("queues.commands.printer", "('bad', 'stuff')")
            .unwrap();
        let mut server = Server::new("printer", broker);
        assert!(matches!(
            server.receive_command(),
            Err(IpcError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn handle_next_replies_with_handler_output() {
        let mut broker = InMemoryBroker::new();
        broker
            .push_tail(
                "queues.commands.printer",
                r#"{"command_id":"c:1:1.000001","results_queue":"queues.results.c.main","n":2}"#,
            )
            .unwrap();
        let mut server = Server::new("printer", broker.clone());
        server
            .handle_next(|command| {
                let mut result = Envelope::new();
                result.insert("double".into(), json!(command["n"].as_i64().unwrap() * 2));
                result
            })
            .unwrap();

        let (_, raw) = broker
            .blocking_pop_head("queues.results.c.main", Some(std::time::Duration::ZERO))
            .unwrap()
            .unwrap();
        let reply = decode_envelope(&raw).unwrap();
        assert_eq!(reply["double"], json!(4));
        assert_eq!(reply["command_id"], json!("c:1:1.000001"));
    }
}
