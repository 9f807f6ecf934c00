use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use warden::config::loader::load_app_configs;
use warden::runtime::{ShutdownHandle, SupervisorRuntime};
use warden::supervisor::LifecyclePhase;

#[derive(Parser)]
#[command(name = "warden", version, about = "Supervisor for long-running child processes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start every declared app and supervise until shutdown
    Run {
        /// Path to the app declaration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate the app declaration file without starting anything
    Check {
        /// Path to the app declaration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { config } => run(&config).await,
        Command::Check { config } => check(&config),
    };

    if let Err(e) = result {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let configs = load_app_configs(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let runtime = SupervisorRuntime::new(configs)?;
    setup_signal_handlers(runtime.shutdown_handle());

    let final_states = runtime.run().await;

    let failed = final_states
        .values()
        .filter(|state| state.phase == LifecyclePhase::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} slots ended in the failed state", failed, final_states.len());
    }

    Ok(())
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let configs = load_app_configs(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let slots: usize = configs.iter().map(|c| c.instances).sum();
    println!("✓ {} ({} apps, {} slots)", config_path.display(), configs.len(), slots);
    for config in &configs {
        println!(
            "  {:<20} {} (instances: {}, autorestart: {})",
            config.name,
            config.command.display(),
            config.instances,
            if config.autorestart { "on" } else { "off" },
        );
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown. A repeated signal
/// escalates any in-progress grace wait to SIGKILL.
fn setup_signal_handlers(handle: ShutdownHandle) {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                }
            }
            handle.trigger();
        }
    });
}
