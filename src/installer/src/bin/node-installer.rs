//! node-installer binary. Runs inside the per-node provisioning job.

use clap::{Parser, Subcommand};
use node_installer::{Installer, InstallerConfig, NoopRestarter, Restarter, SystemdRestarter};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "node-installer", version, about = "Install or remove containerd shims on this node")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Optional TOML config; flags below override it
    #[arg(long, global = true, default_value = "/etc/node-installer/node-installer.toml")]
    config: PathBuf,

    /// Mount point of the node's root filesystem
    #[arg(short = 'H', long, global = true, env = "HOST_ROOT")]
    host_root: Option<PathBuf>,

    /// Host path that receives shim binaries and the ledger
    #[arg(long, global = true, env = "SHIM_INSTALL_ROOT")]
    install_root: Option<PathBuf>,

    /// Directory the fetch step downloaded shims into
    #[arg(long, global = true, env = "SHIM_ASSET_DIR")]
    asset_dir: Option<PathBuf>,

    /// containerd config path on the host; detected when omitted
    #[arg(long, global = true, env = "RUNTIME_CONFIG_PATH")]
    runtime_config: Option<PathBuf>,

    /// Do not restart the container runtime after changing its config
    #[arg(long, global = true)]
    no_restart: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a shim and register it with containerd
    Install {
        shim_name: String,
    },
    /// Remove a previously installed shim
    Uninstall {
        shim_name: String,
    },
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = InstallerConfig::load(&args.config)?;
    if let Some(host_root) = args.host_root {
        config.host_root = host_root;
    }
    if let Some(install_root) = args.install_root {
        config.install_root = install_root;
    }
    if let Some(asset_dir) = args.asset_dir {
        config.asset_dir = asset_dir;
    }
    if let Some(runtime_config) = args.runtime_config {
        config.runtime_config_path = Some(runtime_config);
    }
    if args.no_restart {
        config.restart = false;
    }
    config.validate()?;

    let restarter: Box<dyn Restarter> = if config.restart {
        Box::new(SystemdRestarter)
    } else {
        Box::new(NoopRestarter)
    };
    let installer = Installer::new(&config, restarter);

    match args.command {
        Command::Install { shim_name } => {
            let outcome = installer.install(&shim_name)?;
            if outcome.changed {
                tracing::info!("shim {} installed at {}", shim_name, outcome.shim_path.display());
            } else {
                tracing::info!("shim {} already up to date", shim_name);
            }
        }
        Command::Uninstall { shim_name } => {
            let path = installer.uninstall(&shim_name)?;
            tracing::info!("shim {} removed from {}", shim_name, path.display());
        }
    }
    Ok(())
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(Args::parse()) {
        tracing::error!("node-installer failed: {:#}", e);
        std::process::exit(1);
    }
}
