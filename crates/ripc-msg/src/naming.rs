//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Queue key naming shared by clients and servers."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---

/// Thread name used when a caller does not pick one.
pub const DEFAULT_THREAD: &str = "main";

const COMMANDS_PREFIX: &str = "queues.commands";
const RESULTS_PREFIX: &str = "queues.results";

/// Key of the command queue serviced by `component`.
pub fn command_queue(component: &str) -> String {
    format!("{COMMANDS_PREFIX}.{component}")
}

/// Key of the reply queue owned by `thread` within `component`.
pub fn result_queue(component: &str, thread: &str) -> String {
    format!("{RESULTS_PREFIX}.{component}.{thread}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keys_follow_namespace() {
        assert_eq!(command_queue("printer"), "queues.commands.printer");
        assert_eq!(result_queue("printer", "debug"), "queues.results.printer.debug");
        assert_eq!(
            result_queue("printer", DEFAULT_THREAD),
            "queues.results.printer.main"
        );
    }
}
