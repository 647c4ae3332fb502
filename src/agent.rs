//! Agent lifecycle: activation sequence and host-facing commands.
//!
//! The agent is hosted by an editor (or by the bundled terminal harness).
//! Activation makes sure the companion binary is present and an API key is
//! saved, then the host starts feeding editor events in. Every step that can
//! fail logs and continues; background tracking must never interrupt the
//! user's editing session.

use crate::cli::CliTool;
use crate::heartbeat::{Dispatcher, EditorEvent, Plugin};
use crate::settings::Settings;

/// Surface the hosting editor provides to the agent.
///
/// The bundled harness implements this over the terminal; an editor
/// integration implements it over its own panels and browser hooks.
pub trait Host {
    /// Show a single-line input prompt. `value` is the current value to
    /// pre-fill; `None` means the user dismissed the prompt.
    fn prompt_input(&self, label: &str, placeholder: &str, value: &str) -> Option<String>;

    /// Show a single-select prompt, returning the chosen entry.
    fn prompt_choice(&self, placeholder: &str, choices: &[&str]) -> Option<String>;

    /// Open a URL in the system browser.
    fn open_url(&self, url: &str);
}

/// Prompt for an API key and persist it when it is valid.
///
/// Invalid input is dropped without comment, matching the save behavior: a
/// bad key is treated as no key, and the prompt flow still completes.
pub fn prompt_api_key(host: &dyn Host, settings: &Settings) {
    let current = settings.api_key();
    let placeholder = format!("Find your api key at {}", crate::API_KEY_URL);
    let Some(value) = host.prompt_input("API Key", &placeholder, &current) else {
        return;
    };

    match settings.set_api_key(value.trim()) {
        Ok(true) => tracing::debug!("API key saved"),
        Ok(false) => tracing::warn!("Ignoring invalid API key"),
        Err(e) => tracing::error!("Could not save API key: {e}"),
    }
}

/// Prompt for the debug mode and persist the choice.
pub fn prompt_debug(host: &dyn Host, settings: &Settings) {
    let placeholder = format!(
        "Debug mode currently {}",
        if settings.debug_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    let Some(choice) = host.prompt_choice(&placeholder, &["enable", "disable"]) else {
        return;
    };

    let enabled = match choice.as_str() {
        "enable" => true,
        "disable" => false,
        _ => return,
    };
    if let Err(e) = settings.set_debug(enabled) {
        tracing::error!("Could not save debug setting: {e}");
    }
}

/// The agent itself: owns the runtime, the dispatcher and the settings.
pub struct Agent<H: Host> {
    host: H,
    settings: Settings,
    cli: CliTool,
    dispatcher: Dispatcher,
    runtime: tokio::runtime::Runtime,
}

impl<H: Host> Agent<H> {
    /// Create an agent. Spawned heartbeats run on a single background
    /// worker owned by the agent.
    pub fn new(
        host: H,
        settings: Settings,
        cli: CliTool,
        plugin: Plugin,
    ) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let dispatcher = Dispatcher::new(cli.clone(), plugin, runtime.handle().clone());

        Ok(Self {
            host,
            settings,
            cli,
            dispatcher,
            runtime,
        })
    }

    /// Activation sequence: companion binary first, then the API key.
    ///
    /// Blocks until both steps have run; neither step's failure stops the
    /// agent from starting.
    pub fn startup(&self) {
        tracing::debug!("Initializing tempo-agent version {}", crate::VERSION);
        self.runtime.block_on(self.cli.ensure_up_to_date());
        if !self.settings.has_api_key() {
            prompt_api_key(&self.host, &self.settings);
        }
        tracing::debug!("Finished initializing tempo-agent.");
    }

    /// Feed one editor event to the dispatcher.
    pub fn on_event(&mut self, event: &EditorEvent) {
        self.dispatcher.on_event(event);
    }

    /// Open the Tempo dashboard in the browser.
    pub fn open_dashboard(&self) {
        self.host.open_url(crate::DASHBOARD_URL);
    }

    /// Re-prompt for the API key.
    pub fn prompt_api_key(&self) {
        prompt_api_key(&self.host, &self.settings);
    }

    /// Prompt for the debug mode.
    pub fn prompt_debug(&self) {
        prompt_debug(&self.host, &self.settings);
    }

    /// Get the agent settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shut down, giving in-flight heartbeats a moment to finish.
    pub fn shutdown(self) {
        self.runtime
            .shutdown_timeout(std::time::Duration::from_secs(5));
    }
}
