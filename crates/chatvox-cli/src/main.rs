//! CLI entry point.
//!
//! Parses arguments, loads config and dispatches to handlers. Stores,
//! providers and the service are wired in `bootstrap`.

use anyhow::Result;
use chatvox_cli::{Cli, CliConfig, Commands, SinkArg, bootstrap, handlers, resolve_data_dir};
use chatvox_engine::SinkKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn sink_kind(sink: SinkArg) -> Result<SinkKind> {
    Ok(match sink {
        SinkArg::Timed => SinkKind::Timed,
        SinkArg::Overlay => SinkKind::Overlay,
        #[cfg(feature = "rodio")]
        SinkArg::Device => SinkKind::Custom(std::sync::Arc::new(chatvox_engine::RodioSink::spawn()?)),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables (provider API keys)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // The simulation needs neither config nor data directory.
    if let Commands::Simulate { json } = command {
        return handlers::simulate::execute(json).await;
    }

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let config = CliConfig::load(cli.config.as_deref(), &data_dir).await?;
    let sink = match &command {
        Commands::Run { sink } => sink_kind(*sink)?,
        _ => SinkKind::Timed,
    };
    let ctx = bootstrap(config, &data_dir, sink).await?;

    let result = match command {
        Commands::Run { .. } => handlers::run::execute(&ctx).await,
        Commands::User { command } => handlers::user::execute(&ctx, command).await,
        Commands::Stats { json } => handlers::stats::execute(&ctx, json).await,
        Commands::Simulate { .. } => Ok(()),
    };
    ctx.service().shutdown().await;
    result
}
