//! Operator console for `wt run`.
//!
//! Status notifications are printed as they arrive; operator commands are
//! read line by line from stdin.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use wt_core::{Engine, ExportError, SessionState, Status, export_csv, export_file_name};

use crate::Config;
use crate::actor::{self, EngineHandle, EngineSnapshot, HandleError};
use crate::transport::{Endpoint, TransportController};

const STATUS_BUFFER: usize = 256;

pub const HELP: &str =
    "Commands: connect, disconnect, start, stop, save, clear, export [path], status, help, quit";

/// A line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Start,
    Stop,
    Save,
    Clear,
    Export(Option<PathBuf>),
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments: {s} ({HELP})"));
        }

        match (command.as_str(), argument) {
            ("connect", None) => Ok(Self::Connect),
            ("disconnect", None) => Ok(Self::Disconnect),
            ("start", None) => Ok(Self::Start),
            ("stop", None) => Ok(Self::Stop),
            ("save", None) => Ok(Self::Save),
            ("clear", None) => Ok(Self::Clear),
            ("export", path) => Ok(Self::Export(path.map(PathBuf::from))),
            ("status", None) => Ok(Self::Status),
            ("help" | "?", None) => Ok(Self::Help),
            ("quit" | "exit", None) => Ok(Self::Quit),
            _ => Err(format!("unknown command: {s} ({HELP})")),
        }
    }
}

/// Operator-facing side of the engine and transport.
#[derive(Debug)]
pub struct Console {
    handle: EngineHandle,
    transport: TransportController,
    endpoint: Endpoint,
    export_dir: PathBuf,
}

impl Console {
    pub fn new(handle: EngineHandle, endpoint: Endpoint, export_dir: PathBuf) -> Self {
        Self {
            handle,
            transport: TransportController::new(),
            endpoint,
            export_dir,
        }
    }

    /// Executes a command and returns the reply for the operator.
    ///
    /// Engine refusals are replies, not errors.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String> {
        match command {
            ConsoleCommand::Connect => {
                if self.transport.is_active() {
                    let reply = if self.handle.snapshot().await?.connected {
                        "Already connected".to_string()
                    } else {
                        format!("Reconnecting to {}", self.endpoint.url)
                    };
                    return Ok(reply);
                }
                self.transport
                    .connect(self.endpoint.clone(), self.handle.mailbox())?;
                Ok(format!("Connecting to {}", self.endpoint.url))
            }
            ConsoleCommand::Disconnect => {
                self.transport.disconnect().await?;
                self.handle.operator_disconnected().await?;
                Ok("Disconnected".to_string())
            }
            ConsoleCommand::Start => reply(self.handle.start_session().await, |()| {
                "Recording started - auto-record enabled".to_string()
            }),
            ConsoleCommand::Stop => reply(self.handle.stop_session().await, |summary| {
                format!(
                    "Session complete! Total weight: {:.3} kg, items recorded: {}",
                    summary.total_weight_kg, summary.item_count
                )
            }),
            ConsoleCommand::Save => reply(self.handle.manual_save().await, |record| {
                format!("Saved #{}: {:.3} kg", record.sequence, record.weight_kg)
            }),
            ConsoleCommand::Clear => reply(self.handle.clear_log().await, |cleared| {
                let reply = if cleared { "Data cleared" } else { "Nothing to clear" };
                reply.to_string()
            }),
            ConsoleCommand::Export(path) => self.export(path).await,
            ConsoleCommand::Status => Ok(describe(&self.handle.snapshot().await?)),
            ConsoleCommand::Help => Ok(HELP.to_string()),
            ConsoleCommand::Quit => Ok("Bye".to_string()),
        }
    }

    /// Checks whether a clear should be confirmed, or explains why not.
    pub async fn clear_blocker(&self) -> Result<Option<String>> {
        let snapshot = self.handle.snapshot().await?;
        Ok(if snapshot.state == SessionState::Measuring {
            Some("error: stop recording before clearing data".to_string())
        } else if snapshot.log.is_empty() {
            Some("Nothing to clear".to_string())
        } else {
            None
        })
    }

    async fn export(&self, path: Option<PathBuf>) -> Result<String> {
        let snapshot = self.handle.snapshot().await?;
        let csv = match export_csv(&snapshot.log) {
            Ok(csv) => csv,
            Err(ExportError::Empty) => return Ok("No data to export".to_string()),
            Err(err) => return Err(err.into()),
        };

        let path = path.unwrap_or_else(|| {
            self.export_dir
                .join(export_file_name(Local::now().naive_local()))
        });
        tokio::fs::write(&path, csv)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        let records = snapshot.log.item_count();
        tracing::info!(path = %path.display(), records, "exported session log");
        Ok(format!("Exported {records} records to {}", path.display()))
    }

    /// Stops the transport and releases the engine handle.
    pub async fn shutdown(mut self) -> Result<()> {
        self.transport.disconnect().await
    }
}

fn reply<T>(result: Result<T, HandleError>, on_ok: impl FnOnce(T) -> String) -> Result<String> {
    match result {
        Ok(value) => Ok(on_ok(value)),
        Err(HandleError::Engine(err)) => Ok(format!("error: {err}")),
        Err(err @ HandleError::Stopped) => Err(err.into()),
    }
}

/// Multi-line summary of the engine state.
pub fn describe(snapshot: &EngineSnapshot) -> String {
    let totals = snapshot.totals();
    let mut out = String::new();
    writeln!(
        out,
        "Connection: {}",
        if snapshot.connected {
            "connected"
        } else {
            "disconnected"
        }
    )
    .unwrap();
    writeln!(out, "Session: {}", snapshot.state).unwrap();
    writeln!(out, "Current weight: {:.3} kg", snapshot.current_weight).unwrap();
    writeln!(out, "Items: {}", totals.item_count).unwrap();
    write!(out, "Total: {:.3} kg", totals.total_weight_kg).unwrap();
    out
}

/// Renders one notification for the terminal.
pub fn render_status(status: &Status, json: bool) -> String {
    if json {
        serde_json::to_string(status).unwrap_or_else(|err| format!(r#"{{"kind":"error","message":"{err}"}}"#))
    } else {
        status.to_string()
    }
}

/// Drops notifications that would only repeat what the operator already sees.
#[derive(Debug, Default)]
struct StatusFilter {
    last: Option<Status>,
}

impl StatusFilter {
    /// Returns whether `status` should be printed.
    fn admit(&mut self, status: &Status) -> bool {
        // Idle readings arrive continuously; only the switch to idle is shown.
        let repeated = match (&self.last, status) {
            (Some(Status::Ready { .. }), Status::Ready { .. }) => true,
            (Some(last), status) => last == status,
            (None, _) => false,
        };
        self.last = Some(status.clone());
        !repeated
    }
}

async fn print_statuses(mut statuses: mpsc::Receiver<Status>, json: bool) {
    let mut filter = StatusFilter::default();
    while let Some(status) = statuses.recv().await {
        if filter.admit(&status) {
            println!("{}", render_status(&status, json));
        }
    }
}

fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn run(config: &Config, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(run_console(config, json))
}

async fn run_console(config: &Config, json: bool) -> Result<()> {
    let (status_tx, status_rx) = mpsc::channel(STATUS_BUFFER);
    let (handle, engine_task) = actor::spawn(Engine::new(), status_tx);
    let printer = tokio::spawn(print_statuses(status_rx, json));

    let mut console = Console::new(handle, Endpoint::from(config), config.export_dir.clone());
    console.execute(ConsoleCommand::Connect).await?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        let result = match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Clear => match console.clear_blocker().await? {
                Some(reason) => Ok(reason),
                None => {
                    println!("Clear all recorded data? [y/N]");
                    let answer = lines.next_line().await?.unwrap_or_default();
                    if confirmed(&answer) {
                        console.execute(ConsoleCommand::Clear).await
                    } else {
                        Ok("Clear cancelled".to_string())
                    }
                }
            },
            command => console.execute(command).await,
        };

        match result {
            Ok(reply) => println!("{reply}"),
            Err(err) => println!("error: {err:#}"),
        }
    }

    console.shutdown().await?;
    let engine = engine_task.await.context("engine task failed to join")?;
    printer.await.context("status printer failed to join")?;

    let totals = engine.totals();
    tracing::info!(
        items = totals.item_count,
        total_kg = totals.total_weight_kg,
        "console closed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use wt_core::{Reading, SessionLog};

    use crate::transport::TransportEvent;

    fn reading(weight_kg: f64) -> TransportEvent {
        TransportEvent::Reading(Reading {
            weight_kg,
            received_at: NaiveDate::from_ymd_opt(2025, 5, 20)
                .unwrap()
                .and_hms_opt(8, 15, 0)
                .unwrap(),
        })
    }

    fn console(export_dir: PathBuf) -> Console {
        let (status_tx, _status_rx) = mpsc::channel(STATUS_BUFFER);
        let (handle, _task) = actor::spawn(Engine::new(), status_tx);
        let endpoint = Endpoint {
            url: "ws://127.0.0.1:9/ws".to_string(),
            scale_id: 1,
        };
        Console::new(handle, endpoint, export_dir)
    }

    async fn record_one(console: &Console, weight_kg: f64) {
        let mailbox = console.handle.mailbox();
        for event in [TransportEvent::Connected, reading(weight_kg)] {
            mailbox.send(event.into()).await.unwrap();
        }
        console.handle.start_session().await.unwrap();
        for _ in 0..3 {
            mailbox.send(reading(weight_kg).into()).await.unwrap();
        }
        console.handle.stop_session().await.unwrap();
    }

    #[test]
    fn test_parses_commands() {
        assert_eq!("start".parse(), Ok(ConsoleCommand::Start));
        assert_eq!("  STOP ".parse(), Ok(ConsoleCommand::Stop));
        assert_eq!("exit".parse(), Ok(ConsoleCommand::Quit));
        assert_eq!("export".parse(), Ok(ConsoleCommand::Export(None)));
        assert_eq!(
            "export out.csv".parse(),
            Ok(ConsoleCommand::Export(Some(PathBuf::from("out.csv"))))
        );
        assert!("start now".parse::<ConsoleCommand>().is_err());
        assert!("export a.csv b.csv".parse::<ConsoleCommand>().is_err());
        assert!("weigh".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_confirmation_accepts_yes_only() {
        assert!(confirmed("y"));
        assert!(confirmed(" YES\n"));
        assert!(!confirmed(""));
        assert!(!confirmed("no"));
    }

    #[test]
    fn test_describe_snapshot() {
        let snapshot = EngineSnapshot {
            state: SessionState::Measuring,
            connected: true,
            current_weight: 1.2345,
            log: SessionLog::new(),
        };

        assert_snapshot!(describe(&snapshot), @r"
        Connection: connected
        Session: measuring
        Current weight: 1.234 kg
        Items: 0
        Total: 0.000 kg
        ");
    }

    #[test]
    fn test_render_status_text_and_json() {
        let status = Status::Stabilizing {
            count: 2,
            needed: 3,
        };
        assert_eq!(render_status(&status, false), "Stabilizing... (2/3)");
        assert_eq!(
            render_status(&status, true),
            r#"{"kind":"stabilizing","count":2,"needed":3}"#
        );
    }

    #[test]
    fn test_idle_readings_print_once_until_state_changes() {
        let mut filter = StatusFilter::default();
        let ready = |weight_kg| Status::Ready { weight_kg };

        assert!(filter.admit(&Status::Connected));
        assert!(filter.admit(&ready(0.002)));
        assert!(!filter.admit(&ready(0.004)));
        assert!(!filter.admit(&ready(0.001)));
        assert!(filter.admit(&Status::Disconnected));
        assert!(filter.admit(&ready(0.003)));

        let duplicate = Status::DuplicateRejected { weight_kg: 1.0 };
        assert!(filter.admit(&duplicate));
        assert!(!filter.admit(&duplicate));
    }

    #[tokio::test]
    async fn test_connect_while_retrying_reports_reconnecting() {
        // Accepts TCP but never answers the websocket handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());

        let (status_tx, _status_rx) = mpsc::channel(STATUS_BUFFER);
        let (handle, _task) = actor::spawn(Engine::new(), status_tx);
        let endpoint = Endpoint {
            url: url.clone(),
            scale_id: 1,
        };
        let mut console = Console::new(handle, endpoint, PathBuf::from("."));

        let reply = console.execute(ConsoleCommand::Connect).await.unwrap();
        assert_eq!(reply, format!("Connecting to {url}"));

        let reply = console.execute(ConsoleCommand::Connect).await.unwrap();
        assert_eq!(reply, format!("Reconnecting to {url}"));

        console
            .handle
            .mailbox()
            .send(TransportEvent::Connected.into())
            .await
            .unwrap();
        let reply = console.execute(ConsoleCommand::Connect).await.unwrap();
        assert_eq!(reply, "Already connected");

        console.shutdown().await.unwrap();
        drop(listener);
    }

    #[tokio::test]
    async fn test_engine_refusals_are_replies() {
        let mut console = console(PathBuf::from("."));

        let reply = console.execute(ConsoleCommand::Start).await.unwrap();
        assert_eq!(reply, "error: not connected to the scale server");

        let reply = console.execute(ConsoleCommand::Save).await.unwrap();
        assert_eq!(reply, "error: no recording session is active");
    }

    #[tokio::test]
    async fn test_export_without_records() {
        let temp = tempfile::tempdir().unwrap();
        let mut console = console(temp.path().to_path_buf());

        let reply = console.execute(ConsoleCommand::Export(None)).await.unwrap();
        assert_eq!(reply, "No data to export");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_export_writes_csv_to_export_dir() {
        let temp = tempfile::tempdir().unwrap();
        let mut console = console(temp.path().to_path_buf());
        record_one(&console, 2.5).await;

        let reply = console.execute(ConsoleCommand::Export(None)).await.unwrap();
        assert!(reply.starts_with("Exported 1 records to "), "{reply}");

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("scale_") && name.ends_with(".csv"), "{name}");

        let csv = std::fs::read_to_string(&entries[0]).unwrap();
        assert!(csv.contains("1,2.500,20-05-2025,08:15:00\n"), "{csv}");
        assert!(csv.ends_with("Total Weight,2.500 kg\nTotal Items,1\n"));
    }

    #[tokio::test]
    async fn test_clear_blocked_while_recording_then_allowed() {
        let mut console = console(PathBuf::from("."));
        assert_eq!(
            console.clear_blocker().await.unwrap(),
            Some("Nothing to clear".to_string())
        );

        record_one(&console, 1.5).await;
        console.handle.start_session().await.unwrap();
        assert_eq!(
            console.clear_blocker().await.unwrap(),
            Some("error: stop recording before clearing data".to_string())
        );

        console.execute(ConsoleCommand::Stop).await.unwrap();
        assert_eq!(console.clear_blocker().await.unwrap(), None);
        let reply = console.execute(ConsoleCommand::Clear).await.unwrap();
        assert_eq!(reply, "Data cleared");
        assert!(console.handle.snapshot().await.unwrap().log.is_empty());
    }
}
