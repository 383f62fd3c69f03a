use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pomo::app::{Action, App};
use pomo::config::load_config;
use pomo::cue::{Bell, BellCue};
use pomo::host::{Host, HostHandle, HostMessage, HostOptions};
use pomo::ipc;
use pomo::machine::Machine;
use pomo::persistence::{default_data_dir, JsonFileStore};
use pomo::ui;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pomo")]
#[command(about = "Pomodoro timer with a planned daily schedule", long_about = None)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where settings, the schedule and the log are kept
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Don't listen for pomoctl commands
    #[arg(long)]
    no_ipc: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let data_dir = match cli.data_dir.clone().or_else(|| config.runtime.data_dir.clone()) {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory at {:?}", data_dir))?;
    init_logging(&data_dir, cli.verbose)?;
    info!(data_dir = %data_dir.display(), "Starting pomo");

    let options = HostOptions {
        notifications: config.runtime.notifications,
        auto_start_planned: config.runtime.auto_start_planned,
    };
    let bell = Bell::default();
    let (host, handle) = Host::new(
        Machine::new(),
        Box::new(JsonFileStore::new(&data_dir)),
        Box::new(BellCue::new(bell.clone())),
        options,
    );
    let host_task = host.spawn();

    let socket_path = config.runtime.socket_path.clone();
    let ipc_task = (!cli.no_ipc).then(|| {
        let handle = handle.clone();
        let path = socket_path.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc::server::start(&path, handle).await {
                error!("IPC server failed: {:#}", e);
            }
        })
    });

    let app = App::new(config);
    let tui_handle = handle.clone();
    let res = tokio::task::spawn_blocking(move || run_terminal(app, tui_handle, bell)).await?;

    if let Some(task) = ipc_task {
        task.abort();
        let _ = fs::remove_file(&socket_path);
    }
    // The host may already be gone; either way it is stopping.
    let _ = handle.shutdown().await;
    drop(handle);
    let _ = host_task.await;
    info!("pomo stopped");

    if let Err(err) = &res {
        eprintln!("Error: {:?}", err);
    }
    res
}

fn init_logging(data_dir: &Path, verbose: bool) -> Result<()> {
    let path = data_dir.join("pomo.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file at {:?}", path))?;
    let default_filter = if verbose { "pomo=debug" } else { "pomo=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_terminal(mut app: App, handle: HostHandle, bell: Bell) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, &handle, &bell);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend + Write>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    handle: &HostHandle,
    bell: &Bell,
) -> Result<()> {
    loop {
        let snapshot = handle.snapshot();
        terminal.draw(|f| ui::draw(f, app, &snapshot))?;

        // Only between frames, so BEL never lands inside an escape sequence.
        let rings = bell.take();
        if rings > 0 {
            let backend = terminal.backend_mut();
            for _ in 0..rings {
                backend.write_all(b"\x07")?;
            }
            Write::flush(backend)?;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.handle_key(key, &snapshot) {
                        Action::None => {}
                        Action::Send(event) => handle.blocking_send(event)?,
                        Action::TestCue => handle.blocking_message(HostMessage::TestCue)?,
                        Action::Quit => return Ok(()),
                    }
                }
            }
        }
    }
}
