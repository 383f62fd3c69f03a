use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use pomo_ipc::{
    Command, EntryPatch, EntryReport, IpcError, Mode, Response, SettingsPatch, StatusReport,
    SOCKET_PATH,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "pomoctl")]
#[command(about = "Control the pomo timer", long_about = None)]
struct Cli {
    /// Socket pomo listens on
    #[arg(long, global = true, default_value = SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a work session
    Start,
    /// Start the planned schedule
    PlanStart,
    /// Start a break after a finished phase
    Break,
    /// Pause the timer
    Pause,
    /// Resume the timer
    Resume,
    /// Stop the timer
    Stop,
    /// Reset the timer
    Reset,
    /// Switch between default and planned mode
    Mode { mode: Mode },
    /// Change settings
    Set {
        /// Work duration in minutes
        #[arg(long)]
        work: Option<u32>,
        /// Break duration in minutes
        #[arg(long = "break")]
        break_duration: Option<u32>,
        #[arg(long)]
        auto_repeat: Option<bool>,
        /// Volume from 0 to 1
        #[arg(long)]
        volume: Option<f64>,
    },
    /// Add a planned entry; missing times follow the last entry
    Add(EntryArgs),
    /// Edit a planned entry
    Edit {
        id: String,
        #[command(flatten)]
        fields: EntryArgs,
    },
    /// Remove a planned entry
    Rm { id: String },
    /// List planned entries
    List,
    /// Get timer status
    Status,
}

#[derive(Args)]
struct EntryArgs {
    #[arg(long)]
    name: Option<String>,
    /// HH:MM
    #[arg(long)]
    start: Option<String>,
    /// HH:MM
    #[arg(long)]
    work_end: Option<String>,
    /// HH:MM
    #[arg(long)]
    break_end: Option<String>,
}

impl From<EntryArgs> for EntryPatch {
    fn from(args: EntryArgs) -> Self {
        EntryPatch {
            name: args.name,
            start_time: args.start,
            work_end_time: args.work_end,
            break_end_time: args.break_end,
        }
    }
}

fn into_command(command: Commands) -> Result<Command> {
    Ok(match command {
        Commands::Start => Command::StartWork,
        Commands::PlanStart => Command::StartPlanned,
        Commands::Break => Command::StartBreak,
        Commands::Pause => Command::Pause,
        Commands::Resume => Command::Resume,
        Commands::Stop => Command::Stop,
        Commands::Reset => Command::Reset,
        Commands::Mode { mode } => Command::SwitchMode { mode },
        Commands::Set {
            work,
            break_duration,
            auto_repeat,
            volume,
        } => {
            let patch = SettingsPatch {
                work_duration: work,
                break_duration,
                auto_repeat,
                volume,
            };
            if patch.is_empty() {
                bail!("nothing to set, see `pomoctl set --help`");
            }
            Command::UpdateSettings { patch }
        }
        Commands::Add(fields) => Command::AddEntry {
            draft: fields.into(),
        },
        Commands::Edit { id, fields } => Command::UpdateEntry {
            id,
            patch: fields.into(),
        },
        Commands::Rm { id } => Command::DeleteEntry { id },
        Commands::List => Command::ListEntries,
        Commands::Status => Command::Status,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = into_command(cli.command)?;

    match send_command(&cli.socket, command).await? {
        Response::Status(status) => print_status(&status),
        Response::Entries(entries) => {
            if entries.is_empty() {
                println!("No planned entries");
            }
            for entry in &entries {
                println!("{}", entry_line(entry));
            }
        }
        Response::Error(e) => bail!("{}", e),
    }

    Ok(())
}

async fn send_command(socket: &Path, cmd: Command) -> Result<Response, IpcError> {
    let mut stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::NotFound => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;

    // Send command
    let mut msg = serde_json::to_vec(&cmd)?;
    msg.push(b'\n');
    stream.write_all(&msg).await?;

    // The server closes its side after one response.
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

fn print_status(status: &StatusReport) {
    println!("State:     {}", status.state);
    println!("Mode:      {}", status.mode);
    println!("Phase:     {}", status.phase);
    println!("Remaining: {}", status.countdown);
    if let Some(entry) = &status.current_entry {
        println!(
            "Entry:     {} ({}-{}-{})",
            entry.name, entry.start_time, entry.work_end_time, entry.break_end_time
        );
    }
    println!(
        "Settings:  work {}m, break {}m, auto-repeat {}, volume {:.0}%",
        status.work_duration,
        status.break_duration,
        if status.auto_repeat { "on" } else { "off" },
        status.volume * 100.0
    );
}

fn entry_line(entry: &EntryReport) -> String {
    format!(
        "{} {:>2}. {}-{}-{}  {}  [{}]",
        if entry.current { "▶" } else { " " },
        entry.index + 1,
        entry.start_time,
        entry.work_end_time,
        entry.break_end_time,
        entry.name,
        entry.id
    )
}
