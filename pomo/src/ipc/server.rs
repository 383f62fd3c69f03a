//! Unix domain socket server for IPC

use crate::countdown::format_countdown;
use crate::host::HostHandle;
use crate::machine::{Event, Snapshot};
use crate::schedule::{next_entry_id, EntryDraft, PlannedEntry};
use anyhow::{Context, Result};
use chrono::Local;
use pomo_ipc::{Command, EntryPatch, EntryReport, Response, StatusReport};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

pub async fn start(path: &Path, host: HostHandle) -> Result<()> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind IPC socket at {:?}", path))?;
    info!("IPC server listening on {}", path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let host = host.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, host).await {
                        error!("Error handling client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, host: HostHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader.read_line(&mut line).await?;
    let response = match serde_json::from_str::<Command>(&line) {
        Ok(command) => {
            debug!(?command, "IPC command");
            execute(command, &host).await
        }
        Err(e) => Response::Error(format!("Malformed command: {}", e)),
    };

    let response_json = serde_json::to_vec(&response)?;
    writer.write_all(&response_json).await?;
    writer.shutdown().await?;

    Ok(())
}

/// Runs one command against the host. Commands that map to timer events
/// answer with the status right after the event was handled.
pub async fn execute(command: Command, host: &HostHandle) -> Response {
    let event = match command {
        Command::Status => return Response::Status(status_report(&host.snapshot())),
        Command::ListEntries => return Response::Entries(entry_reports(&host.snapshot())),
        Command::StartWork => Event::StartWork,
        Command::StartPlanned => Event::StartPlanned,
        Command::StartBreak => Event::StartBreak,
        Command::Pause => Event::Pause,
        Command::Resume => Event::Resume,
        Command::Stop => Event::Stop,
        Command::Reset => Event::Reset,
        Command::SwitchMode { mode } => Event::SwitchMode(mode),
        Command::UpdateSettings { patch } => Event::UpdateSettings(patch),
        Command::AddEntry { draft } => return add_entry(draft, host).await,
        Command::UpdateEntry { id, patch } => Event::UpdatePlannedEntry { id, patch },
        Command::DeleteEntry { id } => Event::DeletePlannedEntry { id },
    };
    match host.request(event).await {
        Ok(snapshot) => Response::Status(status_report(&snapshot)),
        Err(e) => Response::Error(e.to_string()),
    }
}

/// Adds a drafted entry. The draft is built from a snapshot, so another
/// client may have changed the schedule in between; the reply says so when
/// the entry did not make it in.
async fn add_entry(draft: EntryPatch, host: &HostHandle) -> Response {
    let timer = host.snapshot().timer;
    let id = next_entry_id(&timer.schedule, Local::now().timestamp_millis());
    let entry = EntryDraft::suggest(&timer.schedule, &timer.settings)
        .patched(&draft, &timer.settings)
        .into_entry(id, timer.schedule.len());
    match host.request(Event::AddPlannedEntry(entry.clone())).await {
        Ok(snapshot) => added_reply(&entry, &snapshot),
        Err(e) => Response::Error(e.to_string()),
    }
}

fn added_reply(entry: &PlannedEntry, snapshot: &Snapshot) -> Response {
    if snapshot.timer.schedule.entries().contains(entry) {
        Response::Status(status_report(snapshot))
    } else if !snapshot.is_idle() {
        Response::Error("Entry not added: stop the timer first".to_string())
    } else {
        Response::Error(format!(
            "Entry not added: id {} is already taken, try again",
            entry.id
        ))
    }
}

pub fn status_report(snapshot: &Snapshot) -> StatusReport {
    let timer = &snapshot.timer;
    let current_entry = entry_reports(snapshot).into_iter().find(|e| e.current);
    StatusReport {
        state: snapshot.state,
        mode: timer.mode,
        phase: timer.phase,
        remaining_secs: timer.remaining_time,
        countdown: format_countdown(timer.remaining_time),
        work_duration: timer.settings.work_duration,
        break_duration: timer.settings.break_duration,
        auto_repeat: timer.settings.auto_repeat,
        volume: timer.settings.volume,
        current_entry,
    }
}

pub fn entry_reports(snapshot: &Snapshot) -> Vec<EntryReport> {
    let current = snapshot.timer.current_planned_index();
    snapshot
        .timer
        .schedule
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| EntryReport {
            index,
            id: entry.id.clone(),
            name: entry.display_name(index),
            start_time: entry.start_time.to_string(),
            work_end_time: entry.work_end_time.to_string(),
            break_end_time: entry.break_end_time.to_string(),
            current: current == Some(index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockTime, ManualClock};
    use crate::cue::SilentCue;
    use crate::host::{Host, HostOptions};
    use crate::machine::Machine;
    use crate::persistence::MemoryStore;
    use pomo_ipc::{Mode, Phase, RunState};
    use tokio::io::AsyncReadExt;

    fn spawn_host(time: &str) -> HostHandle {
        let (host, handle) = Host::new(
            Machine::with_clock(ManualClock::at(time)),
            Box::new(MemoryStore::default()),
            Box::new(SilentCue),
            HostOptions {
                notifications: false,
                auto_start_planned: false,
            },
        );
        host.spawn();
        handle
    }

    fn expect_status(response: Response) -> StatusReport {
        match response {
            Response::Status(status) => status,
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn added_entries_follow_each_other() {
        let host = spawn_host("09:00");
        execute(Command::SwitchMode { mode: Mode::Planned }, &host).await;
        execute(
            Command::AddEntry {
                draft: EntryPatch {
                    name: Some("Review".to_string()),
                    start_time: Some("10:00".to_string()),
                    ..Default::default()
                },
            },
            &host,
        )
        .await;
        execute(
            Command::AddEntry {
                draft: EntryPatch::default(),
            },
            &host,
        )
        .await;

        let entries = match execute(Command::ListEntries, &host).await {
            Response::Entries(entries) => entries,
            other => panic!("expected entries, got {:?}", other),
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Review");
        assert_eq!(entries[0].work_end_time, "10:25");
        assert_eq!(entries[1].name, "Pomodoro 2");
        assert_eq!(entries[1].start_time, "10:30");
        assert_eq!(entries[1].break_end_time, "11:00");
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn rejected_add_is_reported() {
        let host = spawn_host("09:00");
        execute(Command::StartWork, &host).await;
        match execute(Command::AddEntry { draft: EntryPatch::default() }, &host).await {
            Response::Error(e) => assert!(e.contains("stop the timer")),
            other => panic!("expected error, got {:?}", other),
        }
        let status = expect_status(execute(Command::Stop, &host).await);
        assert!(status.current_entry.is_none());
        assert!(host.snapshot().timer.schedule.is_empty());
    }

    #[test]
    fn add_lost_to_a_taken_id_is_an_error() {
        let planned = |name: &str| {
            let start = ClockTime::parse("07:00");
            PlannedEntry {
                id: "1700000000000".to_string(),
                name: name.to_string(),
                start_time: start,
                work_end_time: start.add_minutes(25),
                break_end_time: start.add_minutes(30),
            }
        };
        let mut machine = Machine::with_clock(ManualClock::at("09:00"));
        machine.send(Event::AddPlannedEntry(planned("Other client")));

        match added_reply(&planned("Mine"), &machine.snapshot()) {
            Response::Error(e) => assert!(e.contains("already taken")),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(matches!(
            added_reply(&planned("Other client"), &machine.snapshot()),
            Response::Status(_)
        ));
    }

    #[tokio::test]
    async fn event_commands_reply_with_new_status() {
        let host = spawn_host("09:00");
        let status = expect_status(execute(Command::StartWork, &host).await);
        assert_eq!(status.state, RunState::Running);
        assert_eq!(status.phase, Phase::Work);
        assert_eq!(status.countdown, "25:00");

        // Ignored while running: state is reported unchanged.
        let status = expect_status(
            execute(Command::SwitchMode { mode: Mode::Planned }, &host).await,
        );
        assert_eq!(status.mode, Mode::Default);
        assert_eq!(status.state, RunState::Running);
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pomo.sock");
        let host = spawn_host("09:00");
        let server_path = path.clone();
        tokio::spawn(async move { start(&server_path, host).await });

        let mut stream = loop {
            match UnixStream::connect(&path).await {
                Ok(stream) => break stream,
                Err(_) => tokio::task::yield_now().await,
            }
        };
        let mut msg = serde_json::to_vec(&Command::Status).unwrap();
        msg.push(b'\n');
        stream.write_all(&msg).await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let status = match serde_json::from_slice::<Response>(&buf).unwrap() {
            Response::Status(status) => status,
            other => panic!("expected status, got {:?}", other),
        };
        assert_eq!(status.state, RunState::Idle);
        assert_eq!(status.countdown, "00:00");
        assert!(status.current_entry.is_none());
    }
}
