//! sitecache - Cached, cost-capped lookup of storefront sites
//!
//! Resolves slug-addressed storefront sites through a read cache and a daily
//! read governor, exports static snapshots, and shows read usage in a
//! terminal dashboard.

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use directories::ProjectDirs;
use ratatui::{backend::CrosstermBackend, Terminal};

use sitecache::app::App;
use sitecache::cli::{resolve_report, stats_report, Backend, Cli, Command};
use sitecache::config::SafetyConfig;
use sitecache::service::StorefrontService;
use sitecache::snapshot::export_snapshot;
use sitecache::store::{DocumentStore, FirestoreStore, MemoryStore};
use sitecache::ui;

/// Where dashboard logs go, since the terminal is taken by the UI
fn log_file_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "sitecache")?;
    Some(dirs.cache_dir().join("sitecache.log"))
}

/// Sets up tracing, to stderr or (for the dashboard) to a log file
///
/// `RUST_LOG` overrides the default `sitecache=info` filter.
fn init_logging(to_file: bool) -> Result<Option<PathBuf>, Box<dyn Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitecache=info"));

    let (fmt_layer, log_path) = if to_file {
        let path = log_file_path().ok_or("Cannot determine a directory for the log file")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed();
        (layer, Some(path))
    } else {
        (fmt::layer().with_writer(io::stderr).boxed(), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(log_path)
}

fn open_store(backend: Backend) -> Result<Arc<dyn DocumentStore>, Box<dyn Error>> {
    match backend {
        Backend::Dump(path) => {
            let store = MemoryStore::from_dump_file(&path)?;
            tracing::info!(path = %path.display(), "Loaded document dump");
            Ok(Arc::new(store))
        }
        Backend::Firestore {
            project,
            api_key,
            access_token,
        } => {
            let mut store = FirestoreStore::new(&project);
            if let Some(key) = api_key {
                store = store.with_api_key(key);
            }
            if let Some(token) = access_token {
                store = store.with_bearer_token(token);
            }
            tracing::info!(project = %project, "Using Firestore backend");
            Ok(Arc::new(store))
        }
    }
}

/// Sets up a panic hook that restores the terminal before printing the panic message.
/// This ensures the terminal is usable even if the dashboard panics.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Attempt to restore the terminal
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        // Call the original panic hook
        original_hook(panic_info);
    }));
}

/// Renders the dashboard and, on top, the help overlay if open
fn render_ui(frame: &mut ratatui::Frame, app: &App) {
    ui::render_dashboard(frame, app);
    if app.show_help {
        ui::render_help_overlay(frame);
    }
}

async fn run_dashboard(service: Arc<StorefrontService>) -> Result<(), Box<dyn Error>> {
    // Set up panic hook to restore terminal on crash
    setup_panic_hook();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(service);

    // Main event loop
    loop {
        terminal.draw(|f| render_ui(f, &app))?;

        // Poll for keyboard events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.pending_lookup.is_some() {
            app.run_pending_lookup().await;
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_path = init_logging(cli.command == Command::Dashboard)?;
    let config = SafetyConfig::load(cli.config.as_deref())?;
    let store = open_store(cli.backend()?)?;
    let service = Arc::new(StorefrontService::new(store, config));

    match cli.command {
        Command::Resolve { slugs } => {
            for slug in &slugs {
                let resolved = service.resolve_website_by_slug(slug).await;
                print_json(&resolve_report(slug, resolved.as_ref()))?;
            }
            print_json(&stats_report(service.config(), &service.governor_stats()))?;
        }
        Command::Stats => {
            print_json(&stats_report(service.config(), &service.governor_stats()))?;
        }
        Command::Export { dir } => {
            let index = export_snapshot(service.store(), service.clock(), &dir).await?;
            print_json(&serde_json::to_value(&index)?)?;
        }
        Command::Dashboard => {
            run_dashboard(service).await?;
            if let Some(path) = log_path {
                eprintln!("Logs written to {}", path.display());
            }
        }
    }

    Ok(())
}
