//! Heartbeat debouncing and dispatch.
//!
//! Editor events arrive far more often than the Tempo service wants to hear
//! about them. The tracker below decides which events are significant: saves
//! always are, and otherwise a heartbeat goes out when the file changed or
//! the last one is more than two minutes old. Significant events become one
//! `tempo-cli` invocation each, spawned fire and forget; a failed send is
//! logged and lost, never retried.

use crate::cli::{
    CliOutput, CliTool, EXIT_API_ERROR, EXIT_CONFIG_PARSE_ERROR, EXIT_INVALID_API_KEY,
};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum interval between non-save heartbeats for the same file.
const HEARTBEAT_INTERVAL_MS: i64 = 120_000;

/// One editing event as delivered by the host editor.
///
/// Content changes, selection changes and saves all map onto this shape;
/// only saves set `is_write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorEvent {
    /// Backing file of the active document, absent for untitled buffers
    pub file: Option<PathBuf>,
    /// True when the event is a document save
    #[serde(default)]
    pub is_write: bool,
    /// True when the document has no content
    #[serde(default)]
    pub is_empty: bool,
}

/// Identity of the hosting editor, rendered into the `--plugin` argument.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub editor_name: String,
    pub editor_version: String,
}

impl Plugin {
    pub fn new(editor_name: impl Into<String>, editor_version: impl Into<String>) -> Self {
        Self {
            editor_name: editor_name.into(),
            editor_version: editor_version.into(),
        }
    }

    /// User-agent style identifier sent with every heartbeat.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} {}-tempo/{}",
            self.editor_name,
            self.editor_version,
            self.editor_name,
            crate::VERSION
        )
    }
}

/// Throttle state for heartbeat decisions.
///
/// Updated at decision time, not at delivery time: once an event is judged
/// worth sending, the window advances even if the invocation later fails.
/// Dropping the occasional heartbeat is preferred over re-deciding based on
/// delivery outcomes.
#[derive(Debug, Default)]
pub struct HeartbeatTracker {
    last_sent_at: Option<DateTime<Utc>>,
    last_file: PathBuf,
}

impl HeartbeatTracker {
    /// Create a tracker with zero/empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an event for `file` should produce a heartbeat.
    pub fn should_send(&self, file: &Path, is_write: bool, now: DateTime<Utc>) -> bool {
        if is_write {
            return true;
        }
        let enough_time_passed = match self.last_sent_at {
            Some(last) => (now - last).num_milliseconds() > HEARTBEAT_INTERVAL_MS,
            None => true,
        };
        enough_time_passed || file != self.last_file
    }

    /// Advance the throttle window after a send decision.
    pub fn mark_sent(&mut self, file: &Path, now: DateTime<Utc>) {
        self.last_sent_at = Some(now);
        self.last_file = file.to_path_buf();
    }
}

/// Turns significant editor events into companion invocations.
pub struct Dispatcher {
    cli: CliTool,
    plugin: Plugin,
    tracker: HeartbeatTracker,
    handle: tokio::runtime::Handle,
}

impl Dispatcher {
    /// Create a dispatcher sending through `cli`, spawning invocations on
    /// `handle`.
    pub fn new(cli: CliTool, plugin: Plugin, handle: tokio::runtime::Handle) -> Self {
        Self {
            cli,
            plugin,
            tracker: HeartbeatTracker::new(),
            handle,
        }
    }

    /// Feed one editor event through the debounce gate.
    ///
    /// Events without a backing file and empty documents are ignored.
    pub fn on_event(&mut self, event: &EditorEvent) {
        let Some(file) = event.file.as_deref() else {
            return;
        };
        if event.is_empty || file.as_os_str().is_empty() {
            return;
        }

        let now = Utc::now();
        if !self.tracker.should_send(file, event.is_write, now) {
            return;
        }

        self.send_heartbeat(file, event.is_write);
        self.tracker.mark_sent(file, now);
    }

    fn send_heartbeat(&self, file: &Path, is_write: bool) {
        let args = heartbeat_args(file, &self.plugin, is_write);
        tracing::debug!(
            "Sending heartbeat:\n{}",
            format_arguments(&self.cli.cli_path(), &args)
        );

        let cli = self.cli.clone();
        self.handle.spawn(async move {
            match cli.invoke(&args).await {
                Ok(output) => log_outcome(&output),
                Err(e) => tracing::error!("Failed to send heartbeat: {e}"),
            }
        });
    }
}

/// Build the companion argument list for one heartbeat.
pub fn heartbeat_args(file: &Path, plugin: &Plugin, is_write: bool) -> Vec<String> {
    let mut args = vec![
        "--file".to_string(),
        file.display().to_string(),
        "--plugin".to_string(),
        plugin.user_agent(),
    ];
    if is_write {
        args.push("--write".to_string());
    }
    args
}

fn log_outcome(output: &CliOutput) {
    if output.success() {
        tracing::debug!(
            "Last heartbeat sent {}",
            Local::now().format("%b %-d, %Y %-I:%M %p")
        );
        return;
    }

    if !output.stderr.is_empty() {
        tracing::error!("{}", output.stderr.join("\n"));
    }
    if !output.stdout.is_empty() {
        tracing::error!("{}", output.stdout.join("\n"));
    }
    match output.exit_code {
        EXIT_API_ERROR => {
            tracing::warn!("API error (102); check your ~/.tempo.log file for more details.");
        }
        EXIT_CONFIG_PARSE_ERROR => {
            tracing::error!(
                "Config parsing error (103); check your ~/.tempo.log file for more details."
            );
        }
        EXIT_INVALID_API_KEY => {
            tracing::error!(
                "Invalid API key (104); make sure your key matches {}.",
                crate::API_KEY_URL
            );
        }
        code => {
            tracing::error!(
                "Unknown error ({code}); check your ~/.tempo.log file for more details."
            );
        }
    }
}

/// Render an argument list as a shell-style command line for logging.
///
/// Display only: values containing a space are quoted and inner quotes
/// escaped so the line is copy-pasteable, and any value following a `--key`
/// flag is masked. The real invocation always receives the unmodified
/// argument vector.
pub fn format_arguments(binary: &Path, args: &[String]) -> String {
    let mut rendered = vec![quote(&binary.display().to_string())];
    let mut last = "";
    for arg in args {
        if last == "--key" {
            rendered.push(quote(&obfuscate_key(arg)));
        } else {
            rendered.push(quote(arg));
        }
        last = arg;
    }
    rendered.join(" ")
}

/// Mask an API key down to its final four characters.
pub fn obfuscate_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("XXXXXXXX-XXXX-XXXX-XXXX-XXXX{tail}")
    } else {
        key.to_string()
    }
}

fn quote(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
