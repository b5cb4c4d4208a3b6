//! ---
//! ripc_section: "01-core-functionality"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Shared configuration and logging for IPC tooling."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
//! Shared primitives for processes built on `ripc-msg`: configuration
//! loading with environment fallbacks, and tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{AppConfig, BrokerSection, ClientSection, LoadedAppConfig, LoggingConfig};
pub use logging::{init_tracing, LogFormat};
