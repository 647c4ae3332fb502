//! Tempo Agent - editor time-tracking agent for the Tempo service.
//!
//! This library watches a developer's editing activity and reports it as
//! heartbeats. It never talks to the Tempo service directly: every heartbeat
//! is handed to the `tempo-cli` companion binary, which owns the network
//! submission, offline queueing and authentication details.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Tempo Agent                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐    ┌──────────────┐    ┌────────────────┐   │
//! │  │   Editor   │───▶│  Dispatcher  │───▶│    CliTool     │   │
//! │  │   events   │    │  (debounce)  │    │ (tempo-cli)    │   │
//! │  └────────────┘    └──────────────┘    └────────────────┘   │
//! │        │                                       │            │
//! │        ▼                                       ▼            │
//! │  ┌────────────┐                        ┌────────────────┐   │
//! │  │  Settings  │                        │ Tempo service  │   │
//! │  │~/.tempo.cfg│                        │   (via CLI)    │   │
//! │  └────────────┘                        └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tempo_agent::{CliTool, Dispatcher, EditorEvent, Plugin};
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime");
//! let cli = CliTool::new();
//! let plugin = Plugin::new("helix", "25.01");
//! let mut dispatcher = Dispatcher::new(cli, plugin, runtime.handle().clone());
//!
//! // Feed editor events; significant ones become tempo-cli invocations.
//! dispatcher.on_event(&EditorEvent {
//!     file: Some("/home/dev/project/main.rs".into()),
//!     is_write: false,
//!     is_empty: false,
//! });
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod heartbeat;
pub mod settings;

// Re-export key types at crate root for convenience
pub use agent::{Agent, Host};
pub use cli::{CliOutput, CliTool};
pub use config::ConfigStore;
pub use heartbeat::{Dispatcher, EditorEvent, HeartbeatTracker, Plugin};
pub use settings::Settings;

/// Agent version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The Tempo dashboard, opened by the dashboard command.
pub const DASHBOARD_URL: &str = "https://tempo.dev/dashboard";

/// Where users find their API key.
pub const API_KEY_URL: &str = "https://tempo.dev/api-key";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_populated() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_urls_share_the_service_host() {
        assert!(DASHBOARD_URL.starts_with("https://tempo.dev/"));
        assert!(API_KEY_URL.starts_with("https://tempo.dev/"));
    }
}
