//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Structured logging and metrics for envelope traffic."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use tracing::debug;

/// Direction of envelope movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Command pushed to a destination's command queue.
    CommandOut,
    /// Command popped from the own command queue.
    CommandIn,
    /// Reply pushed to a client's reply queue.
    ReplyOut,
    /// Reply accepted by a waiting client.
    ReplyIn,
    /// Reply popped but dropped because it answers another command.
    Discarded,
}

/// Emit a structured log entry for envelope activity.
pub fn log_envelope(direction: MessageDirection, queue: &str, command_id: Option<&str>) {
    debug!(
        queue,
        command_id = command_id.unwrap_or(""),
        direction = ?direction,
        "ipc activity"
    );
}

/// Prometheus metric handles for request/reply traffic.
#[derive(Clone)]
pub struct IpcMetricsExporter {
    commands_sent: IntCounter,
    replies_sent: IntCounter,
    replies_received: IntCounter,
    replies_discarded: IntCounter,
    timed_out: IntCounter,
    latency: Histogram,
}

impl IpcMetricsExporter {
    /// Register IPC metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let commands_sent = IntCounter::with_opts(Opts::new(
            "ipc_commands_sent_total",
            "Commands pushed to destination command queues",
        ))?;
        let replies_sent = IntCounter::with_opts(Opts::new(
            "ipc_replies_sent_total",
            "Replies pushed by servers",
        ))?;
        let replies_received = IntCounter::with_opts(Opts::new(
            "ipc_replies_received_total",
            "Replies accepted by waiting clients",
        ))?;
        let replies_discarded = IntCounter::with_opts(Opts::new(
            "ipc_replies_discarded_total",
            "Replies dropped because their command_id did not match",
        ))?;
        let timed_out = IntCounter::with_opts(Opts::new(
            "ipc_requests_timed_out_total",
            "Requests that received no matching reply in time",
        ))?;
        let latency = Histogram::with_opts(HistogramOpts::new(
            "ipc_request_latency_seconds",
            "Time between sending a command and accepting its reply",
        ))?;

        registry.register(Box::new(commands_sent.clone()))?;
        registry.register(Box::new(replies_sent.clone()))?;
        registry.register(Box::new(replies_received.clone()))?;
        registry.register(Box::new(replies_discarded.clone()))?;
        registry.register(Box::new(timed_out.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            commands_sent,
            replies_sent,
            replies_received,
            replies_discarded,
            timed_out,
            latency,
        })
    }

    pub(crate) fn observe_command_sent(&self) {
        self.commands_sent.inc();
    }

    pub(crate) fn observe_reply_sent(&self) {
        self.replies_sent.inc();
    }

    pub(crate) fn observe_reply_received(&self, latency: Duration) {
        self.replies_received.inc();
        self.latency.observe(latency.as_secs_f64());
    }

    pub(crate) fn observe_discarded(&self) {
        self.replies_discarded.inc();
    }

    pub(crate) fn observe_timeout(&self) {
        self.timed_out.inc();
    }

    /// Replies dropped so far.
    pub fn discarded(&self) -> u64 {
        self.replies_discarded.get()
    }

    /// Requests that timed out so far.
    pub fn timed_out(&self) -> u64 {
        self.timed_out.get()
    }
}
