use clap::Parser;
use postings_report::{Context, config::Config, pipeline, server};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "Queries the postings store and emails the daily report")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the pipeline once and exit.
    Run {
        /// Keep a copy of the workbook in this directory.
        #[arg(long, value_name = "DIR")]
        write_to: Option<PathBuf>,
    },
    /// Serve the health probe and the report trigger endpoint.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let ctx = Arc::new(Context::from_config(config)?);

    match cli.command {
        Command::Run { write_to } => run_once(&ctx, write_to.as_deref()).await,
        Command::Serve { addr } => server::serve(addr, ctx).await,
    }
}

async fn run_once(ctx: &Context, artifact_dir: Option<&Path>) -> anyhow::Result<()> {
    match pipeline::run(&ctx.store, &ctx.graph, &ctx.config, artifact_dir).await {
        Ok(summary) => {
            tracing::info!(
                count = summary.count,
                skipped = summary.skipped,
                email_sent = summary.email_sent,
                "report run finished"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("report run failed: {e}");
            std::process::exit(1);
        }
    }
}
