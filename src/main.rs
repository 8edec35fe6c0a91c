//! Calmwave CLI
//!
//! Streams live telemetry, runs guided breathing sessions when stress is
//! detected and queries recorded history.

use calmwave_client::{
    activity::create_shared_log_with_persistence,
    config::Config,
    core::ClientConfig,
    runtime::{self, RunOptions, UserCommand, HELP},
    VERSION,
};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "history")]
use calmwave_client::history::{BlockingHistoryClient, EventQuery, HistoryConfig};

#[derive(Parser)]
#[command(name = "calmwave")]
#[command(version = VERSION)]
#[command(about = "Real-time EEG telemetry client with guided breathing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live telemetry and accept commands on stdin
    Run {
        /// Streaming endpoint (overrides the config file)
        #[arg(long)]
        url: Option<String>,

        /// Never show system notifications
        #[arg(long)]
        no_notify: bool,

        /// Start as if the client window were in the background
        #[arg(long)]
        unfocused: bool,
    },

    /// List recorded events, newest first
    History {
        /// User to query (defaults to the configured user)
        #[arg(long)]
        user: Option<String>,

        /// Only events recorded in this activity mode
        #[arg(long)]
        mode: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// List users with recorded events
    Users,

    /// Show per-user averages
    Stats {
        #[arg(long)]
        user: Option<String>,
    },

    /// Show activity from previous runs
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            url,
            no_notify,
            unfocused,
        } => {
            cmd_run(url, no_notify, unfocused);
        }
        Commands::History {
            user,
            mode,
            limit,
            format,
        } => {
            cmd_history(user, mode, limit, &format);
        }
        Commands::Users => {
            cmd_users();
        }
        Commands::Stats { user } => {
            cmd_stats(user);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config, using defaults: {e}");
            Config::default()
        }
    }
}

fn cmd_run(url: Option<String>, no_notify: bool, unfocused: bool) {
    let mut config = load_config();
    if let Some(url) = url {
        config.endpoint_url = url;
    }
    if no_notify {
        config.notifications = false;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Calmwave v{VERSION}");
    println!();
    println!("  Endpoint: {}", config.endpoint_url);
    println!("  Retry interval: {}s", config.retry_interval.as_secs());
    println!(
        "  System notifications: {}",
        if config.notifications {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("{HELP}");
    println!();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match UserCommand::parse(&line) {
                Ok(command) => {
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    });

    let activity = create_shared_log_with_persistence(config.activity_path());
    let options = RunOptions {
        endpoint_url: config.endpoint_url.clone(),
        notifications: config.notifications,
        focused: !unfocused,
        connect_timeout: config.connect_timeout,
        client: ClientConfig::from(&config),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(runtime::run(options, command_rx, activity.clone())) {
        eprintln!("Error: {e:#}");
    }

    println!();
    println!("{}", activity.summary());
}

#[cfg(feature = "history")]
fn history_client(config: &Config) -> BlockingHistoryClient {
    match BlockingHistoryClient::new(HistoryConfig::new(config.query_url.clone())) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "history")]
fn cmd_history(user: Option<String>, mode: Option<String>, limit: u32, format: &str) {
    let config = load_config();
    let client = history_client(&config);
    let query = EventQuery {
        user_id: Some(user.unwrap_or_else(|| config.user_id.clone())),
        mode,
        limit,
    };

    let events = match client.events(&query) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if format == "json" {
        match serde_json::to_string_pretty(&events) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing: {e}"),
        }
        return;
    }

    if events.is_empty() {
        println!("No events recorded.");
        return;
    }

    println!(
        "{:<6} {:<20} {:<12} {:>7} {:>7} {:>8}",
        "ID", "Time", "Mode", "Focus", "Load", "Anomaly"
    );
    for event in &events {
        println!(
            "{:<6} {:<20} {:<12} {:>7.2} {:>7.2} {:>8.3}",
            event.id,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.mode,
            event.focus_score,
            event.load_score,
            event.anomaly_score
        );
    }
}

#[cfg(feature = "history")]
fn cmd_users() {
    let config = load_config();
    match history_client(&config).users() {
        Ok(users) if users.is_empty() => println!("No users recorded."),
        Ok(users) => {
            for user in users {
                println!("{user}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "history")]
fn cmd_stats(user: Option<String>) {
    let config = load_config();
    let user = user.unwrap_or_else(|| config.user_id.clone());

    match history_client(&config).user_stats(&user) {
        Ok(stats) => {
            println!("Statistics for {}", stats.user_id);
            println!("  Events: {}", stats.total_events);
            println!("  Average focus: {:.2}", stats.avg_focus);
            println!("  Average load: {:.2}", stats.avg_load);
            println!("  Average anomaly: {:.3}", stats.avg_anomaly);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "history"))]
fn cmd_history(_user: Option<String>, _mode: Option<String>, _limit: u32, _format: &str) {
    history_disabled();
}

#[cfg(not(feature = "history"))]
fn cmd_users() {
    history_disabled();
}

#[cfg(not(feature = "history"))]
fn cmd_stats(_user: Option<String>) {
    history_disabled();
}

#[cfg(not(feature = "history"))]
fn history_disabled() {
    eprintln!("Error: history queries need the history feature (enabled by default)");
    std::process::exit(1);
}

fn cmd_status() {
    let config = load_config();

    println!("Calmwave Status");
    println!("===============");
    println!();
    println!("Endpoint: {}", config.endpoint_url);
    println!("Query service: {}", config.query_url);

    #[cfg(feature = "history")]
    match history_client(&config).health() {
        Ok(info) => println!("  reachable: {} v{}", info.message, info.version),
        Err(e) => println!("  unreachable: {e}"),
    }
    println!();

    if config.activity_path().exists() {
        let activity = create_shared_log_with_persistence(config.activity_path());
        let stats = activity.stats();
        println!("Cumulative Statistics:");
        println!("  Frames received: {}", stats.frames_received);
        println!("  Frames dropped: {}", stats.decode_failures);
        println!("  Connection attempts: {}", stats.connection_attempts);
        println!("  Reconnects scheduled: {}", stats.reconnects_scheduled);
        println!("  Breathing sessions: {}", stats.sessions_started);
        println!("    completed: {}", stats.sessions_auto_closed);
        println!("    dismissed: {}", stats.sessions_dismissed);
        println!("  System notifications: {}", stats.notifications_sent);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
