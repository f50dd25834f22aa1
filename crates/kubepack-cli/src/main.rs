//! Kubepack CLI - manages cluster API objects in packages

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kubepack_engine::PackageManager;
use kubepack_kubectl::{Context, KubectlClient};

mod commands;
mod error;

use commands::SourceArgs;

#[derive(Parser)]
#[command(name = "kubepack")]
#[command(version)]
#[command(about = "Manages cluster API objects in packages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug log
    #[arg(short, long, global = true)]
    debug: bool,

    /// Use a particular kubeconfig file (overrides the KUBECONFIG env var)
    #[arg(long, global = true)]
    kubeconfig: Option<String>,

    /// Set command timeout (e.g. 90s, 5m)
    #[arg(short, long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Sets the namespace to be used
    #[arg(short, long, global = true, default_value = "")]
    namespace: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Installs or updates a package and waits for the rollout to complete
    Apply {
        #[command(flatten)]
        source: SourceArgs,

        /// Add package name label to all input objects
        #[arg(long)]
        name: Option<String>,

        /// Delete all resources that belong to the package but were not
        /// present within the input
        #[arg(long)]
        prune: bool,
    },

    /// Deletes a package from the cluster and awaits its removal
    Delete {
        #[command(flatten)]
        source: SourceArgs,

        /// Name of an installed package
        package: Option<String>,
    },

    /// Lists the packages installed within the cluster
    List {
        /// List packages across all namespaces
        #[arg(long)]
        all_namespaces: bool,
    },

    /// Prints the merged and labelled manifest
    #[command(alias = "build")]
    Manifest {
        #[command(flatten)]
        source: SourceArgs,

        /// Add package name label to all input objects
        #[arg(long)]
        name: Option<String>,

        /// Name of an installed package
        package: Option<String>,
    },

    /// Waits for a package's components to become ready
    Status {
        #[command(flatten)]
        source: SourceArgs,

        /// Add package name label to all input objects
        #[arg(long)]
        name: Option<String>,
    },

    /// Prints the kubepack version
    Version,
}

fn parse_duration(arg: &str) -> Result<Duration, String> {
    humantime::parse_duration(arg).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };
    init_logging(cli.debug);

    let ctx = Context::with_timeout(cli.timeout);
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("received termination signal");
            signal_ctx.cancel();
        }
    });

    match run(cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("kubepack: {e}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, ctx: &Context) -> error::Result<()> {
    let client = KubectlClient::new(cli.kubeconfig.clone());
    let manager = PackageManager::new(client, cli.namespace.clone());

    match cli.command {
        Commands::Apply {
            source,
            name,
            prune,
        } => {
            commands::apply::run(
                ctx,
                &manager,
                &source,
                &cli.namespace,
                name.as_deref().unwrap_or(""),
                prune,
            )
            .await
        }
        Commands::Delete { source, package } => {
            commands::delete::run(ctx, &manager, &source, package.as_deref()).await
        }
        Commands::List { all_namespaces } => commands::list::run(ctx, &manager, all_namespaces).await,
        Commands::Manifest {
            source,
            name,
            package,
        } => {
            commands::manifest::run(
                ctx,
                &manager,
                &source,
                &cli.namespace,
                name.as_deref().unwrap_or(""),
                package.as_deref(),
            )
            .await
        }
        Commands::Status { source, name } => {
            commands::status::run(
                ctx,
                &manager,
                &source,
                &cli.namespace,
                name.as_deref().unwrap_or(""),
            )
            .await
        }
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
