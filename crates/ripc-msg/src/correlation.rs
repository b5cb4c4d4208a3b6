//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Command id generation and reply correlation."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
//! The correlation engine shared by [`crate::Client`] and [`crate::Server`].
//!
//! Every command carries a `command_id`; the reply copies it verbatim and it
//! is the only link between the two. A waiting client pops its reply queue
//! and drops anything that answers a different command. Dropped replies are
//! not re-queued (at-most-once delivery).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use crate::broker::Broker;
use crate::codec::{decode, decode_envelope, encode, Envelope};
use crate::logging::{log_envelope, IpcMetricsExporter, MessageDirection};
use crate::naming::{command_queue, result_queue};
use crate::{IpcError, Result};

/// Field carrying the correlation id.
pub const FIELD_COMMAND_ID: &str = "command_id";
/// Field naming the queue a reply must be pushed to.
pub const FIELD_RESULTS_QUEUE: &str = "results_queue";
/// Field carrying the textual send timestamp.
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Field naming the sending component.
pub const FIELD_COMPONENT: &str = "component";
/// Field naming the sending thread.
pub const FIELD_THREAD: &str = "thread";
/// Field carrying the sender's process id.
pub const FIELD_TID: &str = "tid";

/// Who is talking: component, logical thread and process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Component name as known to other components.
    pub component: String,
    /// Logical thread within the component; owns a private reply queue.
    pub thread: String,
    /// Operating-system process id.
    pub pid: u32,
}

impl Identity {
    /// Identity of the current process.
    pub fn new(component: impl Into<String>, thread: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            thread: thread.into(),
            pid: std::process::id(),
        }
    }

    /// Queue this identity receives commands on.
    pub fn command_queue(&self) -> String {
        command_queue(&self.component)
    }

    /// Queue this identity receives replies on.
    pub fn result_queue(&self) -> String {
        result_queue(&self.component, &self.thread)
    }
}

/// How the reply wait treats time spent on discarded replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// One deadline per request; each wait gets only the remaining time.
    #[default]
    Deadline,
    /// Every wait re-arms the full timeout, so a busy reply queue can extend
    /// the total wait without bound. Matches older deployments.
    RearmPerWait,
}

/// A freshly minted correlation id and the timestamp embedded in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandId {
    /// `<component>:<pid>:<timestamp>`.
    pub id: String,
    /// Seconds since the epoch with microsecond precision.
    pub timestamp: String,
}

static LAST_STAMP_MICROS: AtomicU64 = AtomicU64::new(0);

/// Microseconds since the epoch, strictly increasing within this process.
fn unique_stamp_micros() -> u64 {
    let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
    let mut last = LAST_STAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_STAMP_MICROS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

fn format_stamp(micros: u64) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

/// Mints `command_id` values for one component/process pair.
#[derive(Debug, Clone)]
pub struct CommandIdGenerator {
    prefix: String,
}

impl CommandIdGenerator {
    /// Generator for ids issued on behalf of `identity`.
    pub fn new(identity: &Identity) -> Self {
        Self {
            prefix: format!("{}:{}", identity.component, identity.pid),
        }
    }

    /// Next id. Timestamps never repeat inside one process, so ids from the
    /// same process are unique even when calls land in the same microsecond.
    pub fn next_id(&self) -> CommandId {
        let timestamp = format_stamp(unique_stamp_micros());
        CommandId {
            id: format!("{}:{}", self.prefix, timestamp),
            timestamp,
        }
    }
}

/// Shared primitive behind both roles: an identity, its broker handle and
/// the envelope plumbing on top of it.
pub struct Endpoint<B> {
    identity: Identity,
    broker: B,
    ids: CommandIdGenerator,
    metrics: Option<IpcMetricsExporter>,
}

impl<B: Broker> Endpoint<B> {
    /// Wrap a broker handle for `identity`.
    pub fn new(identity: Identity, broker: B) -> Self {
        let ids = CommandIdGenerator::new(&identity);
        Self {
            identity,
            broker,
            ids,
            metrics: None,
        }
    }

    /// Record traffic in the given metrics.
    pub fn with_metrics(mut self, metrics: IpcMetricsExporter) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Identity this endpoint speaks for.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Encode `envelope` and append it to `queue`.
    pub fn push(&mut self, queue: &str, envelope: &Envelope) -> Result<()> {
        let text = encode(envelope)?;
        self.broker.push_tail(queue, &text)
    }

    /// Pop the raw wire text at the head of `queue`.
    pub fn pop_raw(&mut self, queue: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        Ok(self
            .broker
            .blocking_pop_head(queue, timeout)?
            .map(|(_, value)| value))
    }

    /// Stamp `payload` with the correlation fields and push it to the command
    /// queue of `destination`. Returns the command exactly as sent.
    pub fn send_command(&mut self, destination: &str, payload: Envelope) -> Result<Envelope> {
        self.dispatch(destination, payload).map(|(_, command)| command)
    }

    fn dispatch(&mut self, destination: &str, mut payload: Envelope) -> Result<(String, Envelope)> {
        let CommandId { id, timestamp } = self.ids.next_id();
        payload.insert(FIELD_TIMESTAMP.into(), JsonValue::from(timestamp));
        payload.insert(
            FIELD_COMPONENT.into(),
            JsonValue::from(self.identity.component.clone()),
        );
        payload.insert(
            FIELD_THREAD.into(),
            JsonValue::from(self.identity.thread.clone()),
        );
        payload.insert(FIELD_TID.into(), JsonValue::from(self.identity.pid));
        payload.insert(
            FIELD_RESULTS_QUEUE.into(),
            JsonValue::from(self.identity.result_queue()),
        );
        payload.insert(FIELD_COMMAND_ID.into(), JsonValue::from(id.clone()));

        let queue = command_queue(destination);
        self.push(&queue, &payload)?;
        log_envelope(MessageDirection::CommandOut, &queue, Some(&id));
        if let Some(metrics) = &self.metrics {
            metrics.observe_command_sent();
        }
        Ok((id, payload))
    }

    /// Wait on the own reply queue for the reply to `command_id`.
    ///
    /// Replies for other commands, and JSON values that are not objects or
    /// carry no id, are dropped. Text that is not JSON at all fails with
    /// [`IpcError::MalformedEnvelope`].
    pub fn await_reply(
        &mut self,
        command_id: &str,
        timeout: Duration,
        policy: TimeoutPolicy,
    ) -> Result<Envelope> {
        let started = Instant::now();
        // an unrepresentable deadline is as good as none
        let deadline = started.checked_add(timeout);
        let queue = self.identity.result_queue();
        let mut first_wait = true;

        loop {
            let wait = match policy {
                TimeoutPolicy::Deadline => deadline
                    .map(|deadline| deadline.saturating_duration_since(Instant::now())),
                TimeoutPolicy::RearmPerWait => Some(timeout),
            };
            if wait.is_some_and(|wait| wait.is_zero()) && !first_wait {
                return Err(self.timed_out(command_id, timeout));
            }
            first_wait = false;

            let Some(raw) = self.pop_raw(&queue, wait)? else {
                return Err(self.timed_out(command_id, timeout));
            };
            // valid JSON that is not an object cannot answer anything
            let reply = match decode(&raw)? {
                JsonValue::Object(map) => map,
                _ => Envelope::new(),
            };

            let reply_id = reply.get(FIELD_COMMAND_ID).and_then(JsonValue::as_str);
            if reply_id == Some(command_id) {
                log_envelope(MessageDirection::ReplyIn, &queue, reply_id);
                if let Some(metrics) = &self.metrics {
                    metrics.observe_reply_received(started.elapsed());
                }
                return Ok(reply);
            }

            log_envelope(MessageDirection::Discarded, &queue, reply_id);
            trace!(expected = command_id, "reply belongs to another command");
            if let Some(metrics) = &self.metrics {
                metrics.observe_discarded();
            }
        }
    }

    /// Send a command to `destination` and wait for its reply.
    pub fn send_and_receive(
        &mut self,
        destination: &str,
        payload: Envelope,
        timeout: Duration,
        policy: TimeoutPolicy,
    ) -> Result<Envelope> {
        let (command_id, _) = self.dispatch(destination, payload)?;
        self.await_reply(&command_id, timeout, policy)
    }

    /// Block until a command arrives on the own command queue.
    pub fn receive_command(&mut self) -> Result<Envelope> {
        let queue = self.identity.command_queue();
        loop {
            if let Some(raw) = self.pop_raw(&queue, None)? {
                let command = decode_envelope(&raw)?;
                log_envelope(
                    MessageDirection::CommandIn,
                    &queue,
                    command.get(FIELD_COMMAND_ID).and_then(JsonValue::as_str),
                );
                return Ok(command);
            }
        }
    }

    /// Push `result` to the reply queue named in `command`, tied to it by the
    /// command's `command_id`.
    pub fn send_reply(&mut self, command: &Envelope, mut result: Envelope) -> Result<()> {
        let queue = command
            .get(FIELD_RESULTS_QUEUE)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                IpcError::InvalidEnvelope(format!("command has no {FIELD_RESULTS_QUEUE} field"))
            })?
            .to_owned();
        let command_id = command.get(FIELD_COMMAND_ID).cloned().ok_or_else(|| {
            IpcError::InvalidEnvelope(format!("command has no {FIELD_COMMAND_ID} field"))
        })?;

        result.insert(FIELD_COMMAND_ID.into(), command_id);
        self.push(&queue, &result)?;
        log_envelope(
            MessageDirection::ReplyOut,
            &queue,
            result.get(FIELD_COMMAND_ID).and_then(JsonValue::as_str),
        );
        if let Some(metrics) = &self.metrics {
            metrics.observe_reply_sent();
        }
        Ok(())
    }

    /// Drop everything currently waiting on the own reply queue.
    pub fn drain_replies(&mut self) -> Result<usize> {
        let queue = self.identity.result_queue();
        let mut drained = 0;
        while self.pop_raw(&queue, Some(Duration::ZERO))?.is_some() {
            drained += 1;
        }
        if drained > 0 {
            debug!(queue = %queue, broker = self.broker.name(), drained, "drained orphaned replies");
        }
        Ok(drained)
    }

    fn timed_out(&self, command_id: &str, timeout: Duration) -> IpcError {
        warn!(command_id, timeout = ?timeout, broker = self.broker.name(), "request timed out");
        if let Some(metrics) = &self.metrics {
            metrics.observe_timeout();
        }
        IpcError::RequestTimedOut {
            command_id: command_id.to_owned(),
            timeout,
        }
    }
}
