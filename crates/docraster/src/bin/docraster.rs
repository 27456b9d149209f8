//! Command-line front end: converts local documents through the same worker
//! pool the service uses, or runs one expiry sweep.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};

use docraster::auth::ChainAuthenticator;
use docraster::config::{apply_env_overrides, default_settings_path, load_settings};
use docraster::telemetry::{init_logging, LogFormat};
use docraster::{
    BackgroundMode, Principal, Settings, SubmitRequest, TaskService, TaskState, TaskView, Upload,
    WorkspaceStore,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "docraster", version, about = "Convert office documents and PDFs to page images")]
struct Cli {
    /// Settings file (JSON). Defaults to the per-user config location.
    #[arg(long, global = true, env = "DOCRASTER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert documents and wait for the results.
    Convert {
        /// .doc, .docx or .pdf files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long)]
        dpi: Option<u32>,

        /// none, color or image.
        #[arg(long, default_value = "none")]
        background: BackgroundMode,

        /// Hex color for `--background color`, e.g. #FFF8E7.
        #[arg(long)]
        color: Option<String>,

        /// Image for `--background image`.
        #[arg(long)]
        background_image: Option<PathBuf>,
    },

    /// Remove expired result workspaces once.
    Sweep,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(format).context("Failed to initialize logging")?;

    let settings = settings(cli.config.as_deref())?;

    match cli.command {
        Command::Convert {
            files,
            dpi,
            background,
            color,
            background_image,
        } => convert(settings, files, dpi, background, color, background_image),
        Command::Sweep => sweep(&settings),
    }
}

fn settings(path: Option<&Path>) -> Result<Settings> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| default_settings_path().filter(|p| p.exists()));

    let mut settings = match path {
        Some(path) => {
            info!("Loading settings from {}", path.display());
            load_settings(&path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?
        }
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings).context("Invalid environment override")?;
    Ok(settings)
}

fn convert(
    settings: Settings,
    files: Vec<PathBuf>,
    dpi: Option<u32>,
    background: BackgroundMode,
    color: Option<String>,
    background_image: Option<PathBuf>,
) -> Result<()> {
    let uploads = files
        .iter()
        .map(|path| Upload::from_path(path).with_context(|| format!("Cannot read {}", path.display())))
        .collect::<Result<Vec<_>>>()?;
    let background_image = background_image
        .as_deref()
        .map(|path| {
            Upload::from_path(path).with_context(|| format!("Cannot read {}", path.display()))
        })
        .transpose()?;

    let authenticator = ChainAuthenticator::from_config(&settings.auth)?;
    let service = TaskService::start(settings, Box::new(authenticator))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let principal = Principal {
        id: 0,
        username: "local".to_string(),
        email: None,
    };

    let submitted = service.submit(
        &principal,
        SubmitRequest {
            files: uploads,
            background,
            background_color: color,
            background_image,
            dpi,
        },
    )?;

    let mut views: Vec<TaskView> = submitted;
    while !interrupted.load(Ordering::SeqCst) {
        views = views
            .iter()
            .map(|v| service.status(&principal, &v.task_id))
            .collect::<std::result::Result<_, _>>()?;
        if views.iter().all(|v| v.state.is_terminal()) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    if interrupted.load(Ordering::SeqCst) {
        warn!("Interrupted, stopping workers");
    }
    service.shutdown();

    let mut failed = 0;
    for view in &views {
        println!("{}", serde_json::to_string(view)?);
        match view.state {
            TaskState::Completed => {
                if let Ok(download) = service.download(&principal, &view.task_id) {
                    info!("{} -> {}", view.source_name, download.path.display());
                }
            }
            TaskState::Failed => failed += 1,
            _ => {}
        }
    }

    if failed > 0 {
        bail!("{} of {} document(s) failed", failed, views.len());
    }
    Ok(())
}

fn sweep(settings: &Settings) -> Result<()> {
    let store = WorkspaceStore::new(settings.result_dir());
    let report = store.sweep_expired(Utc::now());
    for path in &report.removed {
        println!("{}", path.display());
    }
    info!("Removed {} expired workspace(s)", report.removed_count());
    Ok(())
}
