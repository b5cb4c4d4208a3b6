//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Client role: send a command and wait for its reply."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::time::Duration;

use serde::Serialize;

use crate::broker::Broker;
use crate::codec::{to_envelope, Envelope};
use crate::correlation::{Endpoint, Identity, TimeoutPolicy};
use crate::logging::IpcMetricsExporter;
use crate::Result;

#[cfg(feature = "redis")]
use crate::{connect::BrokerConfig, redis_broker::RedisBroker};

/// Caller side of the protocol.
///
/// One client owns one reply queue (`queues.results.<component>.<thread>`)
/// and must be driven from a single thread of control. Independent callers
/// inside one component use distinct thread names.
pub struct Client<B> {
    endpoint: Endpoint<B>,
    policy: TimeoutPolicy,
}

impl<B: Broker> Client<B> {
    /// Create a client for `component`/`thread` over an open broker handle.
    pub fn new(component: impl Into<String>, thread: impl Into<String>, broker: B) -> Self {
        Self {
            endpoint: Endpoint::new(Identity::new(component, thread), broker),
            policy: TimeoutPolicy::default(),
        }
    }

    /// Choose how waits account for discarded replies.
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record traffic in the given metrics.
    pub fn with_metrics(mut self, metrics: IpcMetricsExporter) -> Self {
        self.endpoint = self.endpoint.with_metrics(metrics);
        self
    }

    /// Identity stamped on outgoing commands.
    pub fn identity(&self) -> &Identity {
        self.endpoint.identity()
    }

    /// Queue replies to this client arrive on.
    pub fn results_queue(&self) -> String {
        self.endpoint.identity().result_queue()
    }

    /// Send `payload` to `destination` and wait up to `timeout` for the reply
    /// carrying the same `command_id`.
    ///
    /// Replies answering other commands are dropped while waiting. Fails with
    /// [`crate::IpcError::RequestTimedOut`] when no matching reply arrives.
    pub fn send_and_receive(
        &mut self,
        destination: &str,
        payload: Envelope,
        timeout: Duration,
    ) -> Result<Envelope> {
        self.endpoint
            .send_and_receive(destination, payload, timeout, self.policy)
    }

    /// Like [`Client::send_and_receive`] for any map-shaped serializable payload.
    pub fn request<T: Serialize + ?Sized>(
        &mut self,
        destination: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<Envelope> {
        let payload = to_envelope(payload)?;
        self.send_and_receive(destination, payload, timeout)
    }

    /// Remove replies left behind by earlier timed-out requests.
    pub fn drain_replies(&mut self) -> Result<usize> {
        self.endpoint.drain_replies()
    }
}

#[cfg(feature = "redis")]
impl Client<RedisBroker> {
    /// Connect to the broker described by `config`.
    pub fn connect(
        component: impl Into<String>,
        thread: impl Into<String>,
        config: &BrokerConfig,
    ) -> Result<Self> {
        Ok(Self::new(component, thread, RedisBroker::connect(config)?))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::naming::DEFAULT_THREAD;
    use crate::IpcError;

    #[test]
    fn results_queue_uses_thread_name() {
        let client = Client::new("printer", "debug", InMemoryBroker::new());
        assert_eq!(client.results_queue(), "queues.results.printer.debug");
        assert_eq!(client.identity().thread, "debug");
    }

    #[test]
    fn request_rejects_non_mapping_payloads() {
        let mut client = Client::new("printer", DEFAULT_THREAD, InMemoryBroker::new());
        let err = client
            .request("printer", &("bad", "stuff"), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidEnvelope(_)));
    }

    #[test]
    fn request_refuses_nan_without_sending() {
        let broker = InMemoryBroker::new();
        let mut client = Client::new("printer", DEFAULT_THREAD, broker.clone());
        let mut reading = std::collections::BTreeMap::new();
        reading.insert("temperature", f64::NAN);
        let err = client
            .request("spooler", &reading, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidEnvelope(_)));
        assert!(broker.is_empty("queues.commands.spooler"));
    }

    #[test]
    fn huge_timeout_does_not_overflow() {
        let broker = InMemoryBroker::new();
        let mut server_side = broker.clone();
        let handle = std::thread::spawn(move || {
            let (_, raw) = server_side
                .blocking_pop_head("queues.commands.spooler", None)
                .unwrap()
                .unwrap();
            let command: serde_json::Value = serde_json::from_str(&raw).unwrap();
            let reply = json!({ "command_id": command["command_id"] });
            server_side
                .push_tail(command["results_queue"].as_str().unwrap(), &reply.to_string())
                .unwrap();
        });

        let mut client = Client::new("printer", DEFAULT_THREAD, broker);
        let reply = client
            .send_and_receive("spooler", Envelope::new(), Duration::from_secs(u64::MAX / 2))
            .unwrap();
        handle.join().unwrap();
        assert!(reply.contains_key("command_id"));
    }

    #[test]
    fn unanswered_request_times_out() {
        let broker = InMemoryBroker::new();
        let mut client = Client::new("printer", "debug", broker.clone());
        let started = Instant::now();
        let err = client
            .send_and_receive("printer", Envelope::new(), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, IpcError::RequestTimedOut { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(broker.len("queues.commands.printer"), 1);
    }

    #[test]
    fn request_accepts_serializable_maps() {
        let broker = InMemoryBroker::new();
        let mut server_side = broker.clone();
        let handle = std::thread::spawn(move || {
            let (_, raw) = server_side
                .blocking_pop_head("queues.commands.spooler", Some(Duration::from_secs(2)))
                .unwrap()
                .unwrap();
            let command: serde_json::Value = serde_json::from_str(&raw).unwrap();
            let reply = json!({ "command_id": command["command_id"], "pages": command["pages"] });
            server_side
                .push_tail(command["results_queue"].as_str().unwrap(), &reply.to_string())
                .unwrap();
        });

        let mut client = Client::new("printer", DEFAULT_THREAD, broker);
        let reply = client
            .request("spooler", &json!({ "pages": 4 }), Duration::from_secs(2))
            .unwrap();
        handle.join().unwrap();
        assert_eq!(reply["pages"], json!(4));
    }
}
