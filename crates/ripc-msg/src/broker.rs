//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Broker abstraction over keyed FIFO list queues."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::Result;

/// List-queue primitives required from the broker.
///
/// One handle is owned by exactly one client or server; the broker itself
/// serializes pushes and pops per key.
pub trait Broker: Send {
    /// Append `value` to the tail of the list stored at `key`. Does not block.
    fn push_tail(&mut self, key: &str, value: &str) -> Result<()>;
    /// Pop the head of the list at `key`, waiting up to `timeout`.
    ///
    /// `None` waits indefinitely and `Some(Duration::ZERO)` only polls.
    /// Returns the key together with the value, or `None` once the timeout
    /// elapsed without an element.
    fn blocking_pop_head(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<(String, String)>>;
    /// Human-readable broker name for logging.
    fn name(&self) -> &'static str;
}

impl<B: Broker + ?Sized> Broker for Box<B> {
    fn push_tail(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).push_tail(key, value)
    }

    fn blocking_pop_head(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<(String, String)>> {
        (**self).blocking_pop_head(key, timeout)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    available: Condvar,
}

/// In-process broker backed by mutex protected queues.
///
/// Clones share one key space, so each clone behaves like a separate
/// connection to the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values waiting at `key`.
    pub fn len(&self, key: &str) -> usize {
        self.shared
            .queues
            .lock()
            .get(key)
            .map_or(0, VecDeque::len)
    }

    /// Whether no value is waiting at `key`.
    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }
}

impl Broker for InMemoryBroker {
    fn push_tail(&mut self, key: &str, value: &str) -> Result<()> {
        let mut queues = self.shared.queues.lock();
        queues
            .entry(key.to_owned())
            .or_default()
            .push_back(value.to_owned());
        self.shared.available.notify_all();
        Ok(())
    }

    fn blocking_pop_head(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<(String, String)>> {
        // a timeout too large to represent waits indefinitely
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut queues = self.shared.queues.lock();
        loop {
            if let Some(value) = queues.get_mut(key).and_then(VecDeque::pop_front) {
                return Ok(Some((key.to_owned(), value)));
            }
            match deadline {
                None => self.shared.available.wait(&mut queues),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    self.shared.available.wait_until(&mut queues, deadline);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
