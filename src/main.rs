//! fluxfleet - watch and operate Flux GitOps resources across clusters
//!
//! Connects to the current kubeconfig cluster plus any clusters listed in the
//! config file, streams Flux resource status and events, and can suspend,
//! resume or reconcile individual objects.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fluxfleet::cli::{self, ConfigSubcommand, Mutation};
use fluxfleet::config::{ConfigLoader, Overrides, defaults};

/// fluxfleet - multi-cluster Flux resource manager
#[derive(Parser, Debug)]
#[command(name = "fluxfleet")]
#[command(version, about = "Watch and operate Flux GitOps resources across clusters", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the kubeconfig for the default cluster
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context for the default cluster
    #[arg(long, global = true)]
    context: Option<String>,

    /// Namespace to operate in ("all" for every namespace)
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    /// Enable debug logging to a temp file
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Log level when not in debug mode (overrides logger.level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream resource, event and error updates (default)
    Watch,
    /// List connected clusters
    Clusters,
    /// List resources of one kind in the current cluster
    List {
        /// Resource kind (e.g. kustomization, hr)
        kind: String,
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Suspend a resource
    Suspend {
        kind: String,
        name: String,
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Resume a suspended resource
    Resume {
        kind: String,
        name: String,
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Request an immediate reconciliation
    Reconcile {
        kind: String,
        name: String,
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = Overrides {
        kubeconfig: args.kubeconfig,
        context: args.context,
        namespace: args.namespace,
    };
    let loaded = ConfigLoader::load(args.config.as_deref(), &overrides);

    let level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.logger.level.clone()))
        .unwrap_or_else(defaults::log_level);
    let log_file = cli::init_logging(args.debug, &level);
    if let Some(ref log_path) = log_file {
        eprintln!(
            "Debug logging enabled. Logs written to: {}",
            log_path.display()
        );
    }

    let command = args.command.unwrap_or(Command::Watch);
    if let Command::Config { subcommand } = command {
        return cli::handle_config_command(subcommand, args.config.as_deref(), loaded);
    }

    let config = loaded?;
    match command {
        Command::Watch => cli::run_watch(config).await,
        Command::Clusters => cli::run_clusters(config).await,
        Command::List { kind, cluster } => cli::run_list(config, &kind, cluster.as_deref()).await,
        Command::Suspend {
            kind,
            name,
            cluster,
        } => cli::run_mutation(config, Mutation::Suspend, &kind, &name, cluster.as_deref()).await,
        Command::Resume {
            kind,
            name,
            cluster,
        } => cli::run_mutation(config, Mutation::Resume, &kind, &name, cluster.as_deref()).await,
        Command::Reconcile {
            kind,
            name,
            cluster,
        } => {
            cli::run_mutation(config, Mutation::Reconcile, &kind, &name, cluster.as_deref()).await
        }
        Command::Config { .. } => Ok(()),
    }
}
