mod app;
mod msg;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use msg::Msg;
use urlmark::EngineConfig;

const TICK: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: urlmark <file>")?;

    let _log_guard = init_logging()?;
    tracing::info!(path = %path.display(), "urlmark starting");
    let config = EngineConfig::load()?;

    let mut terminal = enter_terminal()?;
    let outcome = run(&mut terminal, &config, path);
    leave_terminal(&mut terminal)?;

    if let Err(err) = outcome {
        tracing::error!("urlmark exited with an error: {err:?}");
        eprintln!("urlmark error: {err:?}");
    }
    Ok(())
}

/// Logs go to a daily file in the data dir; stdout belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = directories::ProjectDirs::from("", "", "urlmark")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "urlmark.log"));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "urlmark=info".into()))
        .init();
    Ok(guard)
}

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn enter_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn leave_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(terminal: &mut Term, config: &EngineConfig, path: PathBuf) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Msg>();
    let mut app = App::new(config, path.clone(), tx.clone())?;

    forward_terminal_events(tx.clone());
    // With background scheduling off, these ticks are what drive scans.
    spawn_ticker(tx.clone(), TICK);
    spawn_file_watcher(&path, tx);

    while !app.should_quit {
        terminal.draw(|frame| app.view(frame))?;

        // Block for one message, then take whatever else queued up meanwhile.
        app.update(rx.recv()?)?;
        for msg in rx.try_iter() {
            app.update(msg)?;
        }
    }

    app.shutdown()
}

fn forward_terminal_events(tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        while let Ok(event) = event::read() {
            let msg = match event {
                Event::Key(key) => Msg::Key(key),
                Event::Resize(width, height) => Msg::Resize(width, height),
                _ => continue,
            };
            if tx.send(msg).is_err() {
                return;
            }
        }
    });
}

fn spawn_ticker(tx: mpsc::Sender<Msg>, every: Duration) {
    thread::spawn(move || {
        while tx.send(Msg::Tick).is_ok() {
            thread::sleep(every);
        }
    });
}

/// Watches the file's directory; editors often replace files instead of
/// writing them in place.
fn spawn_file_watcher(path: &Path, tx: mpsc::Sender<Msg>) {
    let watch_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    thread::spawn(move || {
        let tx_watch = tx.clone();
        let mut watcher: RecommendedWatcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            if tx_watch.send(Msg::FileChanged(path)).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("file watcher error: {err}");
                }
            }) {
                Ok(w) => w,
                Err(err) => {
                    tracing::warn!("failed to initialize file watcher: {err}");
                    return;
                }
            };

        if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
            tracing::warn!("failed to watch {}: {err}", watch_dir.display());
            return;
        }

        loop {
            thread::park();
        }
    });
}
