//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Broker endpoint resolution from the process environment."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Overrides the directory holding the broker socket.
pub const ENV_RUNTIME_DIR: &str = "RIPC_RUNTIME_DIR";
/// Enables the network address override; only meant for test rigs.
pub const ENV_TEST_ENV: &str = "RIPC_TEST_ENV";
/// Network address (`host` or `host:port`) used when test mode is on.
pub const ENV_SERVER_ADDR: &str = "RIPC_SERVER_ADDR";

/// Port assumed when a network address carries none.
pub const DEFAULT_BROKER_PORT: u16 = 6379;

const SOCKET_SUBPATH: &str = "redis-ipc/socket";

/// Where the broker listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerEndpoint {
    /// Local filesystem socket.
    UnixSocket {
        /// Path to the socket file.
        path: PathBuf,
    },
    /// Network address; only used in trusted or test environments.
    Tcp {
        /// Host name or IP address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerEndpoint::UnixSocket { path } => write!(f, "unix://{}", path.display()),
            BrokerEndpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "redis://[{host}]:{port}")
            }
            BrokerEndpoint::Tcp { host, port } => write!(f, "redis://{host}:{port}"),
        }
    }
}

/// Connection parameters resolved once at process start and handed to
/// whichever broker backend opens the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Target endpoint.
    pub endpoint: BrokerEndpoint,
}

impl BrokerConfig {
    /// Use the socket at `path`.
    pub fn unix_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: BrokerEndpoint::UnixSocket { path: path.into() },
        }
    }

    /// Use a network address.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: BrokerEndpoint::Tcp {
                host: host.into(),
                port,
            },
        }
    }

    /// Resolve the endpoint from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the endpoint through an arbitrary variable lookup.
    ///
    /// The socket lives at `$RIPC_RUNTIME_DIR/redis-ipc/socket`, defaulting to
    /// the system temp directory. When `RIPC_TEST_ENV` is set and
    /// `RIPC_SERVER_ADDR` names an address, a TCP endpoint is used instead.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if non_empty(ENV_TEST_ENV).is_some() {
            if let Some(addr) = non_empty(ENV_SERVER_ADDR) {
                let (host, port) = split_host_port(addr.trim());
                return Self::tcp(host, port);
            }
        }

        let runtime_dir = non_empty(ENV_RUNTIME_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::unix_socket(socket_path_in(&runtime_dir))
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::unix_socket(socket_path_in(&std::env::temp_dir()))
    }
}

/// Socket location below a runtime directory.
pub fn socket_path_in(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join(SOCKET_SUBPATH)
}

fn split_host_port(addr: &str) -> (String, u16) {
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.ends_with(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (addr, DEFAULT_BROKER_PORT),
        },
        _ => (addr, DEFAULT_BROKER_PORT),
    };
    // brackets only delimit an IPv6 literal; `Display` adds them back
    (host.trim_matches(&['[', ']'][..]).to_owned(), port)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn runtime_dir_selects_socket_path() {
        let config = BrokerConfig::from_lookup(lookup(&[(ENV_RUNTIME_DIR, "/run")]));
        assert_eq!(config, BrokerConfig::unix_socket("/run/redis-ipc/socket"));
    }

    #[test]
    fn missing_runtime_dir_uses_temp_dir() {
        let config = BrokerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn server_addr_requires_test_mode() {
        let config = BrokerConfig::from_lookup(lookup(&[
            (ENV_RUNTIME_DIR, "/run"),
            (ENV_SERVER_ADDR, "localhost"),
        ]));
        assert!(matches!(config.endpoint, BrokerEndpoint::UnixSocket { .. }));

        let config = BrokerConfig::from_lookup(lookup(&[
            (ENV_TEST_ENV, "1"),
            (ENV_SERVER_ADDR, "localhost"),
        ]));
        assert_eq!(config, BrokerConfig::tcp("localhost", DEFAULT_BROKER_PORT));
    }

    #[test]
    fn server_addr_may_carry_port() {
        let config = BrokerConfig::from_lookup(lookup(&[
            (ENV_TEST_ENV, "yes"),
            (ENV_SERVER_ADDR, "broker.test:6380"),
        ]));
        assert_eq!(config, BrokerConfig::tcp("broker.test", 6380));
        assert_eq!(config.endpoint.to_string(), "redis://broker.test:6380");
    }

    #[test]
    fn bracketed_ipv6_address_is_split() {
        assert_eq!(split_host_port("[::1]:7000"), ("::1".to_owned(), 7000));
        assert_eq!(split_host_port("::1"), ("::1".to_owned(), DEFAULT_BROKER_PORT));
        assert_eq!(split_host_port("[::1]"), ("::1".to_owned(), DEFAULT_BROKER_PORT));

        let config = BrokerConfig::from_lookup(lookup(&[
            (ENV_TEST_ENV, "yes"),
            (ENV_SERVER_ADDR, "[::1]"),
        ]));
        assert_eq!(config.endpoint.to_string(), "redis://[::1]:6379");
    }
}
