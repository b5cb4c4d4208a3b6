//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Redis list queues as the message broker."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::path::Path;
use std::time::Duration;

use redis::{Connection, RedisError};
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::connect::{BrokerConfig, BrokerEndpoint};
use crate::{IpcError, Result};

/// Redis times out in whole milliseconds and treats zero as "forever", so
/// shorter waits fall back to a plain `LPOP`.
const MIN_BLOCKING_WAIT: Duration = Duration::from_millis(1);

/// Waits beyond this are sent as `0`, which Redis reads as "forever".
const MAX_BLOCKING_WAIT: Duration = Duration::from_secs(u32::MAX as u64);

/// Broker handle over a synchronous Redis connection.
pub struct RedisBroker {
    conn: Connection,
}

impl RedisBroker {
    /// Open a connection to the configured endpoint.
    ///
    /// A unix endpoint must point at an existing socket file; any failure is
    /// reported as [`IpcError::BrokerUnavailable`].
    pub fn connect(config: &BrokerConfig) -> Result<Self> {
        if let BrokerEndpoint::UnixSocket { path } = &config.endpoint {
            ensure_socket(path)?;
        }

        let url = config.endpoint.to_string();
        let client = redis::Client::open(url.as_str()).map_err(|err| {
            IpcError::BrokerUnavailable(format!("invalid broker address {url}: {err}"))
        })?;
        let conn = client.get_connection().map_err(|err| {
            warn!(endpoint = %config.endpoint, error = %err, "broker connection failed");
            IpcError::BrokerUnavailable(format!("{}: {err}", config.endpoint))
        })?;
        debug!(endpoint = %config.endpoint, "broker connection established");

        Ok(Self { conn })
    }

    fn broker_error(&self, err: RedisError) -> IpcError {
        IpcError::Broker {
            broker: self.name(),
            reason: err.to_string(),
        }
    }
}

impl Broker for RedisBroker {
    fn push_tail(&mut self, key: &str, value: &str) -> Result<()> {
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query::<i64>(&mut self.conn)
            .map(|_| ())
            .map_err(|err| self.broker_error(err))
    }

    fn blocking_pop_head(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<(String, String)>> {
        match timeout {
            Some(timeout) if timeout < MIN_BLOCKING_WAIT => redis::cmd("LPOP")
                .arg(key)
                .query::<Option<String>>(&mut self.conn)
                .map(|value| value.map(|value| (key.to_owned(), value)))
                .map_err(|err| self.broker_error(err)),
            timeout => redis::cmd("BLPOP")
                .arg(key)
                .arg(
                    timeout
                        .filter(|timeout| *timeout <= MAX_BLOCKING_WAIT)
                        .map_or(0.0, |timeout| timeout.as_secs_f64()),
                )
                .query::<Option<(String, String)>>(&mut self.conn)
                .map_err(|err| self.broker_error(err)),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(unix)]
fn ensure_socket(path: &Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => Ok(()),
        _ => Err(IpcError::BrokerUnavailable(format!(
            "socket path {} is not a valid socket",
            path.display()
        ))),
    }
}

#[cfg(not(unix))]
fn ensure_socket(path: &Path) -> Result<()> {
    Err(IpcError::BrokerUnavailable(format!(
        "unix sockets are not supported on this platform: {}",
        path.display()
    )))
}
