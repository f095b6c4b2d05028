//! lifelog-tui - terminal timeline of reading, listening, health and coding
//! activity.

use std::collections::HashMap;
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifelog_tui::api::{ApiCommand, ApiMessage, FetchGate, HttpTransport, PagedClient};
use lifelog_tui::app::App;
use lifelog_tui::catalog::Catalog;
use lifelog_tui::config::{init_logging, Config};
use lifelog_tui::ui;

/// Frame rate for animations (approximately 30 FPS)
const FRAME_DURATION: Duration = Duration::from_millis(33);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().ok();

    let config = Config::parse();
    config.validate()?;

    let _log_guard = init_logging(&config.log_dir())?;
    info!(?config, "starting lifelog-tui");

    let transport = HttpTransport::new(config.timeout())?;
    let client = PagedClient::new(Arc::new(transport), FetchGate::new(config.concurrency))
        .with_max_pages(config.max_pages);

    let mut catalog = Catalog::standard(client)?;
    if !config.lanes.is_empty() {
        catalog = catalog.only(&config.lanes)?;
    }

    let result = run_tui(catalog, &config).await;
    if let Err(ref e) = result {
        tracing::error!("exited with error: {e:#}");
    }
    info!("lifelog-tui stopped");
    result
}

/// Run the TUI application
async fn run_tui(catalog: Catalog, config: &Config) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let (api_tx, mut api_rx) = mpsc::channel::<ApiMessage>(32);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ApiCommand>(32);

    let mut app = App::new(&catalog.groups(), config.window());

    let api_task = tokio::spawn(async move { run_api_worker(catalog, api_tx, &mut cmd_rx).await });

    for cmd in app.reload_all() {
        cmd_tx.send(cmd).await.ok();
    }

    let result = run_event_loop(&mut terminal, &mut app, &mut api_rx, &cmd_tx).await;

    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    api_task.abort();

    result
}

/// Run the API worker task
///
/// One task per lane load. A new load for a lane aborts the one still in
/// flight, so a pan storm never queues up stale fetches behind the gate.
async fn run_api_worker(
    catalog: Catalog,
    tx: mpsc::Sender<ApiMessage>,
    rx: &mut mpsc::Receiver<ApiCommand>,
) {
    let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(ApiCommand::Load(request)) => {
                        let group = request.group.clone();
                        if let Some(previous) = in_flight.remove(&group) {
                            if !previous.is_finished() {
                                debug!(%group, generation = request.generation, "superseding in-flight load");
                                previous.abort();
                            }
                        }

                        let catalog = catalog.clone();
                        let tx = tx.clone();
                        let handle = tokio::spawn(async move {
                            let started = Instant::now();
                            let message = match catalog.run(request.clone()).await {
                                Ok(outcome) => {
                                    info!(
                                        group = %outcome.request.group,
                                        generation = outcome.request.generation,
                                        records = outcome.data.records().len(),
                                        errors = outcome.data.error_count(),
                                        elapsed_ms = started.elapsed().as_millis() as u64,
                                        "lane loaded"
                                    );
                                    ApiMessage::Loaded(outcome)
                                }
                                Err(e) => {
                                    warn!(group = %request.group, "lane load failed: {e:#}");
                                    ApiMessage::Failed { request, message: format!("{e:#}") }
                                }
                            };
                            tx.send(message).await.ok();
                        });
                        in_flight.insert(group, handle);
                    }
                    Some(ApiCommand::Shutdown) | None => {
                        for (_, handle) in in_flight.drain() {
                            handle.abort();
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Run the main event loop
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    api_rx: &mut mpsc::Receiver<ApiMessage>,
    cmd_tx: &mpsc::Sender<ApiCommand>,
) -> Result<()> {
    loop {
        for cmd in app.tick(Instant::now()) {
            cmd_tx.send(cmd).await.ok();
        }

        terminal.draw(|frame| ui::render(frame, app))?;

        while let Ok(msg) = api_rx.try_recv() {
            app.handle_api_message(msg);
        }

        if event::poll(FRAME_DURATION)? {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events (not release)
                if key.kind == KeyEventKind::Press {
                    for cmd in app.handle_key(key) {
                        cmd_tx.send(cmd).await.ok();
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
