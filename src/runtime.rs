//! Async driver for [`TelemetryClient`].
//!
//! One task runs the whole client: transport events, user commands and timer
//! deadlines are multiplexed with `tokio::select!` and handled to completion
//! one at a time.

use crate::activity::SharedActivityLog;
use crate::core::{ClientConfig, ClientEvent, ConnectionState, TelemetryClient};
use crate::notify::{ConsoleNotifier, NotificationCapability};
use crate::protocol::MentalStateMode;
use crate::transport::{Transport, WebSocketTransport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::str::SplitWhitespace;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A line command typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    StartRecording,
    StopRecording,
    SetMode(MentalStateMode),
    SetMentalState(MentalStateMode),
    CloseSession,
    Focus,
    Blur,
    Dashboard,
    Help,
    Quit,
}

/// Invalid user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingMode(String),
    InvalidMode(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "Empty command"),
            CommandError::Unknown(c) => write!(f, "Unknown command '{c}' (type 'h' for help)"),
            CommandError::MissingMode(c) => {
                write!(f, "'{c}' needs a mode: calm, normal or stressed")
            }
            CommandError::InvalidMode(m) => {
                write!(f, "Invalid mode '{m}', expected calm, normal or stressed")
            }
        }
    }
}

impl std::error::Error for CommandError {}

impl UserCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Empty);
        };

        match head.to_lowercase().as_str() {
            "r" | "record" => Ok(UserCommand::StartRecording),
            "s" | "stop" => Ok(UserCommand::StopRecording),
            "m" | "mode" => parse_mode(head, &mut words).map(UserCommand::SetMode),
            "ms" | "state" => parse_mode(head, &mut words).map(UserCommand::SetMentalState),
            "c" | "close" => Ok(UserCommand::CloseSession),
            "f" | "focus" => Ok(UserCommand::Focus),
            "b" | "blur" => Ok(UserCommand::Blur),
            "d" | "dash" => Ok(UserCommand::Dashboard),
            "h" | "help" | "?" => Ok(UserCommand::Help),
            "q" | "quit" | "exit" => Ok(UserCommand::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_mode(
    head: &str,
    words: &mut SplitWhitespace<'_>,
) -> Result<MentalStateMode, CommandError> {
    let raw = words
        .next()
        .ok_or_else(|| CommandError::MissingMode(head.to_string()))?;
    MentalStateMode::parse(raw).ok_or_else(|| CommandError::InvalidMode(raw.to_string()))
}

pub const HELP: &str = "\
Commands:
  r            start recording
  s            stop recording
  m <mode>     set source mode (calm, normal, stressed)
  ms <mode>    set mental state (calm, normal, stressed)
  c            close the breathing session
  f / b        focus / blur the client window
  d            show the latest samples
  h / ?        show this help
  q            quit";

/// Settings for one streaming run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub endpoint_url: String,
    pub notifications: bool,
    pub focused: bool,
    /// Longest wait for the WebSocket handshake
    pub connect_timeout: Duration,
    pub client: ClientConfig,
}

/// Stream from the configured endpoint until Ctrl-C or `q`.
pub async fn run(
    options: RunOptions,
    mut commands: mpsc::UnboundedReceiver<UserCommand>,
    activity: SharedActivityLog,
) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(options.endpoint_url.clone(), event_tx)
        .with_connect_timeout(options.connect_timeout);
    tracing::info!(
        endpoint = transport.url(),
        connect_timeout_ms = transport.connect_timeout().as_millis() as u64,
        "streaming client starting"
    );
    let notifier = ConsoleNotifier::new(options.notifications);

    let mut client = TelemetryClient::new(
        transport,
        notifier,
        options.client,
        Box::new(StdRng::from_entropy()),
    )
    .with_activity(activity);
    client.set_focused(options.focused);

    let epoch = Instant::now();
    client.start(epoch.elapsed());
    present(&mut client);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut commands_open = true;

    loop {
        let deadline = client.next_deadline().map(|d| epoch + d);

        tokio::select! {
            Some(event) = event_rx.recv() => {
                let now = epoch.elapsed();
                client.advance(now);
                client.handle_transport(event, now);
            }
            command = commands.recv(), if commands_open => match command {
                Some(UserCommand::Quit) => break,
                Some(command) => {
                    let now = epoch.elapsed();
                    client.advance(now);
                    apply(&mut client, command, now);
                }
                None => {
                    tracing::debug!("command input closed");
                    commands_open = false;
                }
            },
            _ = sleep_until(deadline) => client.advance(epoch.elapsed()),
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "ctrl-c handler failed");
                }
                break;
            }
        }

        present(&mut client);
    }

    println!();
    println!("Stopping...");
    client.stop();
    present(&mut client);

    client.activity().save()?;
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Apply a user command to the client.
pub fn apply<T: Transport, N: NotificationCapability>(
    client: &mut TelemetryClient<T, N>,
    command: UserCommand,
    now: Duration,
) {
    let result = match command {
        UserCommand::StartRecording => client.start_recording(now),
        UserCommand::StopRecording => client.stop_recording(now),
        UserCommand::SetMode(mode) => client.set_mode(mode, now),
        UserCommand::SetMentalState(mode) => client.set_mental_state(mode, now),
        UserCommand::CloseSession => {
            if !client.close_intervention() {
                println!("No breathing session is open.");
            }
            Ok(())
        }
        UserCommand::Focus => {
            client.set_focused(true);
            Ok(())
        }
        UserCommand::Blur => {
            client.set_focused(false);
            Ok(())
        }
        UserCommand::Dashboard => {
            print_dashboard(client);
            Ok(())
        }
        UserCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        UserCommand::Quit => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("{e}");
    }
}

fn present<T: Transport, N: NotificationCapability>(client: &mut TelemetryClient<T, N>) {
    for event in client.take_events() {
        let time = chrono::Local::now().format("%H:%M:%S");
        match event {
            ClientEvent::ConnectionChanged { state, status } => {
                tracing::info!(%state, "connection state changed");
                if !matches!(state, ConnectionState::Connecting) {
                    println!("[{time}] {status}");
                }
            }
            ClientEvent::ModeChanged(change) => {
                println!("[{time}] Mental state: {}", change.current);
            }
            ClientEvent::RecordingChanged(recording) => {
                println!(
                    "[{time}] Recording {}",
                    if recording { "started" } else { "stopped" }
                );
            }
            ClientEvent::SessionOpened {
                auto_close_after, ..
            } => {
                println!("[{time}] Stress detected. Let's take a breathing break.");
                println!(
                    "           Session closes by itself in {}s, or type 'c' to close it.",
                    auto_close_after.as_secs()
                );
                println!("           Breathe in...");
            }
            ClientEvent::PhaseChanged { phase, cycle, .. } => {
                println!("           {}... (cycle {cycle})", phase.instruction());
            }
            ClientEvent::SessionClosed { reason, .. } => {
                tracing::info!(?reason, "breathing session closed");
            }
            ClientEvent::Encouragement(message) => {
                println!("[{time}] {message}");
            }
            ClientEvent::EncouragementCleared => {}
            ClientEvent::SystemNotification(alert) => {
                tracing::debug!(title = %alert.title, "alert sent as system notification");
            }
        }
    }
}

fn print_dashboard<T: Transport, N: NotificationCapability>(client: &TelemetryClient<T, N>) {
    let dashboard = client.dashboard();
    println!("Status: {}", dashboard.status());
    if let Some(error) = dashboard.error() {
        println!("Error: {error}");
    }
    println!(
        "Mode: {}",
        dashboard
            .mode()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!("Recording: {}", dashboard.is_recording());

    match dashboard.voltages().latest() {
        Some(sample) => println!(
            "Voltages ({} samples): {:?} at {}",
            dashboard.voltages().len(),
            sample.channel_voltages,
            sample.timestamp.format("%H:%M:%S%.3f")
        ),
        None => println!("Voltages: no samples yet"),
    }
    match dashboard.mental_states().latest() {
        Some(sample) => println!(
            "Scores ({} samples): calm {:.2}, normal {:.2}, stressed {:.2}",
            dashboard.mental_states().len(),
            sample.calm_score,
            sample.normal_score,
            sample.stressed_score
        ),
        None => println!("Scores: no samples yet"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(UserCommand::parse("r"), Ok(UserCommand::StartRecording));
        assert_eq!(UserCommand::parse("  s "), Ok(UserCommand::StopRecording));
        assert_eq!(
            UserCommand::parse("m stressed"),
            Ok(UserCommand::SetMode(MentalStateMode::Stressed))
        );
        assert_eq!(
            UserCommand::parse("MS Calm"),
            Ok(UserCommand::SetMentalState(MentalStateMode::Calm))
        );
        assert_eq!(UserCommand::parse("q"), Ok(UserCommand::Quit));
    }

    #[test]
    fn test_help_lists_every_short_command() {
        assert_eq!(UserCommand::parse("h"), Ok(UserCommand::Help));
        assert_eq!(UserCommand::parse("?"), Ok(UserCommand::Help));
        assert_eq!(UserCommand::parse("d"), Ok(UserCommand::Dashboard));

        for entry in ["r ", "s ", "m <mode>", "ms <mode>", "c ", "f / b", "d ", "h / ?", "q "] {
            assert!(
                HELP.lines().any(|line| line.trim_start().starts_with(entry)),
                "help is missing {entry:?}"
            );
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(UserCommand::parse(""), Err(CommandError::Empty));
        assert_eq!(
            UserCommand::parse("m"),
            Err(CommandError::MissingMode("m".to_string()))
        );
        assert_eq!(
            UserCommand::parse("ms anxious"),
            Err(CommandError::InvalidMode("anxious".to_string()))
        );
        assert!(matches!(
            UserCommand::parse("x"),
            Err(CommandError::Unknown(_))
        ));
    }
}
