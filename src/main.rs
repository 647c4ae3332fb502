//! Tempo Agent CLI
//!
//! Terminal harness for the editor time-tracking agent. Editor integrations
//! normally embed the library directly; this binary hosts the same agent
//! over stdin/stdout so it can be driven by any editor able to pipe JSON
//! events, and exposes the maintenance commands users otherwise reach
//! through their editor's command palette.

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempo_agent::{
    agent::{prompt_api_key, prompt_debug},
    config::{default_config_path, ConfigStore},
    heartbeat::obfuscate_key,
    Agent, CliTool, EditorEvent, Host, Plugin, Settings, DASHBOARD_URL, VERSION,
};

#[derive(Parser)]
#[command(name = "tempo-agent")]
#[command(author = "Tempo")]
#[command(version = VERSION)]
#[command(about = "Editor time-tracking agent for the Tempo service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent, reading editor events as JSON lines on stdin
    Run {
        /// Name of the hosting editor
        #[arg(long, default_value = "terminal")]
        editor: String,

        /// Version of the hosting editor
        #[arg(long, default_value = "0")]
        editor_version: String,
    },

    /// Open the Tempo dashboard in a browser
    Dashboard,

    /// Prompt for and save the API key
    ApiKey,

    /// Enable or disable debug logging
    Debug,

    /// Show install and configuration status
    Status,
}

fn main() {
    let cli = Cli::parse();
    let settings = Settings::new(ConfigStore::new(default_config_path()));
    init_tracing(settings.debug_enabled());

    match cli.command {
        Commands::Run {
            editor,
            editor_version,
        } => {
            cmd_run(settings, editor, editor_version);
        }
        Commands::Dashboard => {
            TerminalHost.open_url(DASHBOARD_URL);
        }
        Commands::ApiKey => {
            cmd_api_key(settings);
        }
        Commands::Debug => {
            cmd_debug(settings);
        }
        Commands::Status => {
            cmd_status(settings);
        }
    }
}

/// Route module logging through a terminal subscriber. `RUST_LOG` overrides
/// the level derived from the persisted debug flag.
fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "tempo_agent=debug"
    } else {
        "tempo_agent=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn cmd_run(settings: Settings, editor: String, editor_version: String) {
    let plugin = Plugin::new(editor, editor_version);
    let mut agent = match Agent::new(TerminalHost, settings, CliTool::new(), plugin) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    agent.startup();

    // Editor events arrive as JSON lines on stdin; a reader thread feeds
    // them to the event loop so shutdown stays responsive.
    let (sender, receiver) = crossbeam_channel::bounded::<EditorEvent>(1024);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<EditorEvent>(line) {
                Ok(event) => {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Ignoring malformed event: {e}"),
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    println!("tempo-agent v{VERSION} - reading editor events from stdin");
    println!("Press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => agent.on_event(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    println!("Stopping...");
    agent.shutdown();
}

fn cmd_api_key(settings: Settings) {
    prompt_api_key(&TerminalHost, &settings);
    if settings.has_api_key() {
        println!("API key saved to {:?}", settings.store().path());
    } else {
        println!("No API key saved.");
    }
}

fn cmd_debug(settings: Settings) {
    prompt_debug(&TerminalHost, &settings);
    println!(
        "Debug mode {}",
        if settings.debug_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

fn cmd_status(settings: Settings) {
    let cli_tool = CliTool::new();

    println!("Tempo Agent Status");
    println!("==================");
    println!();

    println!("Companion binary: {:?}", cli_tool.cli_path());
    if cli_tool.is_installed() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match runtime {
            Ok(runtime) => match runtime.block_on(cli_tool.installed_version()) {
                Ok(version) => println!("  Installed: yes (version {version})"),
                Err(e) => println!("  Installed: yes (version check failed: {e})"),
            },
            Err(e) => println!("  Installed: yes (version check failed: {e})"),
        }
    } else {
        println!("  Installed: no (downloaded on first run)");
    }
    println!();

    println!("Config file: {:?}", settings.store().path());
    let api_key = settings.api_key();
    if api_key.is_empty() {
        println!("  API key: not set");
    } else {
        println!("  API key: {}", obfuscate_key(&api_key));
    }
    println!(
        "  Debug logging: {}",
        if settings.debug_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Host implementation over the controlling terminal.
struct TerminalHost;

impl Host for TerminalHost {
    fn prompt_input(&self, label: &str, placeholder: &str, value: &str) -> Option<String> {
        if value.is_empty() {
            println!("{label} ({placeholder}):");
        } else {
            println!("{label} [{}]:", obfuscate_key(value));
        }

        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(line.to_string())
    }

    fn prompt_choice(&self, placeholder: &str, choices: &[&str]) -> Option<String> {
        println!("{placeholder}");
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}) {choice}", i + 1);
        }

        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let line = line.trim();

        // Accept either the number or the entry itself.
        if let Ok(index) = line.parse::<usize>() {
            if index >= 1 && index <= choices.len() {
                return Some(choices[index - 1].to_string());
            }
        }
        choices
            .iter()
            .find(|choice| **choice == line)
            .map(|choice| choice.to_string())
    }

    fn open_url(&self, url: &str) {
        if let Err(e) = webbrowser::open(url) {
            eprintln!("Could not open {url}: {e}");
        }
    }
}
