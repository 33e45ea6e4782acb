use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shareport::common::config::{apply_overrides, load_config};
use shareport::common::{AppConfig, ConfigOverrides};
use shareport::server::{routes, runtime, AppState};
use shareport::session::{Mode, Session};
use shareport::ui::terminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shareport")]
#[command(about = "Share one file or folder, or receive uploads, over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Exit once the transfer completes, fails or is cancelled
    #[arg(long, global = true)]
    auto_exit: bool,

    /// Don't print a QR code for the LAN address
    #[arg(long, global = true)]
    no_qr: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a file or directory for download
    Send {
        #[arg(help = "File or directory to share")]
        path: PathBuf,
    },
    /// Accept uploads into a directory
    Recv {
        #[arg(help = "Directory to save uploads into")]
        path: PathBuf,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            auto_exit: self.auto_exit.then_some(true),
            show_qr: self.no_qr.then_some(false),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    let (mode, path) = match cli.command {
        Commands::Send { path } => (Mode::Send, path),
        Commands::Recv { path } => (Mode::Recv, path),
    };

    // fail fast before a listener is opened
    let target = match prepare_target(mode, path) {
        Ok(target) => target,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    };

    let config = match load_config() {
        Ok(config) => apply_overrides(config, &overrides),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(mode, target, config).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shareport=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Send needs an existing target; recv creates its destination directory.
fn prepare_target(mode: Mode, path: PathBuf) -> Result<PathBuf> {
    match mode {
        Mode::Send => {
            if !path.exists() {
                anyhow::bail!("File not found: {}", path.display());
            }
        }
        Mode::Recv => {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory {}", path.display()))?;
        }
    }
    Ok(path)
}

async fn run(mode: Mode, target: PathBuf, config: AppConfig) -> Result<()> {
    let (listener, port) = runtime::bind(config.port)?;

    let session = Session::new(mode, target, config.session_limits());
    terminal::print_banner(&session, port, &config);
    let progress = terminal::spawn_progress(session.clone());

    let state = AppState::new(session.clone(), config.clone());
    let app = routes::create_router(&state);

    let result = runtime::run(listener, app, session, &config).await;
    progress.abort();
    result
}
