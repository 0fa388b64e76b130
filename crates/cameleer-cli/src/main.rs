// Cameleer CLI
//
// The command-line entry point, stdin/HTTP control surfaces, and
// config-module loading described as external collaborators in spec.md §1
// and §6. Everything else — the orchestration engine itself — lives in
// `cameleer-engine` and is driven only through its public API.

mod config_file;
mod control;
mod http_control;
mod shell_task;
mod stdin_control;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use cameleer_engine::engine::Cameleer;
use cameleer_engine::logging::TracingSink;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config_file::{ConfigProvider, TomlConfigProvider};
use control::{CommandRouter, ShutdownSignal};

#[derive(Clone, Copy, Debug)]
enum InstrumentKind {
    None,
    Stdin,
    Http,
}

#[derive(Parser)]
#[command(name = "cameleer")]
#[command(about = "Cameleer task orchestration engine")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file describing queues and tasks.
    #[arg(long)]
    config: std::path::PathBuf,

    /// Which control surface to expose: none, stdin, or http[-<port>]
    /// (e.g. `--instrument http-8080`).
    #[arg(long, default_value = "none")]
    instrument: String,

    /// Load configuration and validate it, but do not start the engine.
    #[arg(long)]
    norun: bool,

    /// Override the default tracing log level.
    #[arg(long)]
    loglevel: Option<String>,
}

struct ParsedInstrument {
    kind: InstrumentKind,
    http_port: u16,
}

fn parse_instrument(raw: &str) -> anyhow::Result<ParsedInstrument> {
    const DEFAULT_HTTP_PORT: u16 = 7777;
    if raw == "none" {
        return Ok(ParsedInstrument { kind: InstrumentKind::None, http_port: DEFAULT_HTTP_PORT });
    }
    if raw == "stdin" {
        return Ok(ParsedInstrument { kind: InstrumentKind::Stdin, http_port: DEFAULT_HTTP_PORT });
    }
    if raw == "http" {
        return Ok(ParsedInstrument { kind: InstrumentKind::Http, http_port: DEFAULT_HTTP_PORT });
    }
    if let Some(port) = raw.strip_prefix("http-") {
        let port: u16 = port.parse().with_context(|| format!("invalid http port in --instrument {raw:?}"))?;
        return Ok(ParsedInstrument { kind: InstrumentKind::Http, http_port: port });
    }
    anyhow::bail!("unrecognized --instrument value {raw:?}; expected none, stdin, http, or http-<port>")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = cli.loglevel.clone().unwrap_or_else(|| "cameleer_cli=info,cameleer_engine=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let instrument = parse_instrument(&cli.instrument)?;

    let provider: Arc<dyn ConfigProvider> = Arc::new(
        TomlConfigProvider::from_path(&cli.config).context("loading config file")?,
    );

    // "constructs the engine" happens regardless of --norun (spec.md §6);
    // only task loading and running are skipped.
    let engine = Cameleer::new(
        provider.queue_specs(),
        provider.engine_defaults(),
        provider.context_store_path(),
        Arc::new(TracingSink),
        None,
    )
    .await
    .context("constructing engine")?;

    if cli.norun {
        tracing::info!("engine constructed (--norun); exiting without loading tasks");
        return Ok(());
    }

    engine.load_tasks(provider.all_task_configs()?).await.context("loading tasks")?;
    engine.run();

    let shutdown = ShutdownSignal::new();
    let router = Arc::new(CommandRouter::new(engine.clone(), provider.clone(), shutdown.clone()));

    let mut surface_handle = None;
    match instrument.kind {
        InstrumentKind::None => {}
        InstrumentKind::Stdin => {
            let router = router.clone();
            surface_handle = Some(tokio::spawn(async move {
                stdin_control::serve(router).await;
            }));
        }
        InstrumentKind::Http => {
            let router = router.clone();
            let addr = SocketAddr::from(([0, 0, 0, 0], instrument.http_port));
            surface_handle = Some(tokio::spawn(async move {
                if let Err(e) = http_control::serve(router, addr).await {
                    tracing::error!(error = %e, "http control surface exited");
                }
            }));
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c; shutting down");
            engine.shutdown().await;
        }
        _ = shutdown.wait() => {
            tracing::info!("shutdown command received; exiting");
        }
    }

    if let Some(handle) = surface_handle {
        handle.abort();
    }

    Ok(())
}
