//! stratad — the Strata daemon.
//!
//! One binary, several roles:
//! - `control-plane`: generation authority, compute spec endpoint and the
//!   tenant/timeline watch loops
//! - `operator`: reconciles `StrataDeployment` resources into workloads
//! - `crds`: prints the custom resource definitions
//! - `config`: prints the effective configuration
//!
//! # Usage
//!
//! ```text
//! stratad control-plane --port 1234 --safekeepers 3
//! stratad operator --config /etc/strata/strata.toml
//! stratad crds | kubectl apply -f -
//! ```

mod control_plane;
mod operator;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use strata_core::StrataConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratad", about = "Strata daemon")]
struct Cli {
    /// Path to strata.toml.
    #[arg(long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace the cluster runs in.
    #[arg(long, global = true, env = "NAMESPACE")]
    namespace: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control plane API and run the tenant controllers.
    ControlPlane {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the attachment store.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Safekeeper replicas listed in compute specs.
        #[arg(long, env = "STRATA_SAFEKEEPERS", default_value = "1")]
        safekeepers: u32,

        /// Do not watch tenant and timeline resources.
        #[arg(long)]
        no_watch: bool,
    },

    /// Reconcile StrataDeployment resources.
    Operator {
        /// Apply against an in-memory backend and leave resources untouched.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the custom resource definitions as a JSON list.
    Crds,

    /// Print the effective configuration as TOML.
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stratad=debug,strata=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = StrataConfig::load(cli.config.as_deref())?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }

    match cli.command {
        Command::ControlPlane {
            port,
            data_dir,
            safekeepers,
            no_watch,
        } => {
            if let Some(port) = port {
                config.control_plane.port = port;
            }
            if let Some(dir) = data_dir {
                config.control_plane.data_dir = dir;
            }
            if no_watch {
                config.control_plane.watch_tenants = false;
            }
            control_plane::run_control_plane(config, safekeepers).await
        }
        Command::Operator { dry_run } => operator::run_operator(config, dry_run).await,
        Command::Crds => {
            let list = serde_json::json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": strata_kube::crds(),
            });
            println!("{}", serde_json::to_string_pretty(&list)?);
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
