//! shim-controller binary

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use shim_controller::{ControllerConfig, Shim};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shim-controller", version, about = "Roll containerd shims out to cluster nodes")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Optional TOML config; flags below override it
    #[arg(long, global = true, default_value = "/etc/shim-controller/shim-controller.toml")]
    config: PathBuf,

    /// Namespace provisioning jobs run in
    #[arg(long, global = true, env = "CONTROLLER_NAMESPACE")]
    namespace: Option<String>,

    /// Image of the shim downloader init container
    #[arg(long, global = true, env = "SHIM_DOWNLOADER_IMAGE")]
    downloader_image: Option<String>,

    /// Image running node-installer
    #[arg(long, global = true, env = "SHIM_NODE_INSTALLER_IMAGE")]
    installer_image: Option<String>,

    /// ttlSecondsAfterFinished for install jobs
    #[arg(long, global = true, env = "SHIM_NODE_INSTALLER_JOB_TTL")]
    job_ttl: Option<i32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller (default)
    Run,
    /// Print the Shim CustomResourceDefinition as YAML
    Crd,
}

async fn run(args: Args) -> anyhow::Result<()> {
    if let Some(Command::Crd) = args.command {
        print!("{}", serde_yaml::to_string(&Shim::crd())?);
        return Ok(());
    }

    let mut config = ControllerConfig::load(&args.config)?;
    if let Some(namespace) = args.namespace {
        config.namespace = namespace;
    }
    if let Some(image) = args.downloader_image {
        config.downloader_image = image;
    }
    if let Some(image) = args.installer_image {
        config.installer_image = image;
    }
    if let Some(ttl) = args.job_ttl {
        config.job_ttl_seconds = Some(ttl);
    }
    config.validate()?;

    let client = kube::Client::try_default().await?;
    shim_controller::controller::run(client, config).await
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(Args::parse()).await {
        tracing::error!("shim-controller failed: {:#}", e);
        std::process::exit(1);
    }
}
