//! ebs-e2e - end-to-end dynamic provisioning suite for the AWS EBS CSI driver

use std::sync::Arc;

use clap::{Parser, Subcommand};

use ebs_e2e::client::{connect, KubeStorageClient};
use ebs_e2e::config::TestContext;
use ebs_e2e::suite::{register_driver, render_manifests};
use ebs_e2e::telemetry::init_tracing;

/// End-to-end dynamic provisioning tests for the EBS CSI driver
#[derive(Parser, Debug)]
#[command(name = "ebs-e2e", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    ctx: TestContext,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the suite against the current cluster (default)
    ///
    /// Every (volume type, fsType) scenario provisions a storage class and a
    /// claim in a fresh namespace, checks the bound volume, optionally writes
    /// and reads data through a pod, and cleans up.
    Run,

    /// Print the storage classes and claims the suite would create
    Manifests {
        /// Namespace to render the manifests for
        #[arg(long, default_value = "default")]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's rustls transport needs a process-wide provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.ctx.log_format)?;

    match cli.command {
        Some(Commands::Manifests { namespace }) => {
            let yaml = render_manifests(
                register_driver(),
                &namespace,
                cli.ctx.reclaim_policy,
                cli.ctx.focus.as_deref(),
                cli.ctx.skip.as_deref(),
            )?;
            print!("{yaml}");
            Ok(())
        }
        Some(Commands::Run) | None => run(cli.ctx).await,
    }
}

async fn run(ctx: TestContext) -> anyhow::Result<()> {
    ctx.validate()?;
    let client = connect(ctx.kubeconfig.as_deref()).await?;
    let storage = Arc::new(KubeStorageClient::new(client));
    ebs_e2e::suite::run(&ctx, storage).await?;
    Ok(())
}
