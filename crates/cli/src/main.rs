use crate::{
    commands::{Commands, Preset},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
    transport::FsTransport,
};
use clap::Parser;
use engine_config::settings::batch::{BatchConfig, BatchConfigBuilder};
use engine_core::cache::InMemoryCache;
use engine_processing::BatchCoordinator;
use model::core::strategy::ExecutionStrategy;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;
mod targets;
mod transport;

#[derive(Parser)]
#[command(
    name = "manifest-fetch",
    version = "0.1.0",
    about = "Batch dependency manifest fetcher"
)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match execute(cli.command).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => ExitCode::ShutdownRequested,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Plan {
            targets,
            config,
            preset,
            strategy,
            output,
        } => {
            let config = Arc::new(load_config(config.as_deref(), preset).await?);
            let strategy = parse_strategy(strategy.as_deref())?;
            let specs = targets::load_targets(&targets).await?;
            let items = targets::to_work_items(&specs, config.common_manifest_files())?;

            info!(targets = specs.len(), items = items.len(), "Planning run");
            let report = output::build_plan_report(config, items, strategy);
            output::emit_json(&report, output).await?;
        }
        Commands::Run {
            targets,
            root,
            config,
            preset,
            strategy,
            with_content,
            output,
        } => {
            let config = load_config(config.as_deref(), preset).await?;
            let strategy = parse_strategy(strategy.as_deref())?;
            let specs = targets::load_targets(&targets).await?;
            let items = targets::to_work_items(&specs, config.common_manifest_files())?;

            let shutdown = ShutdownCoordinator::new(CancellationToken::new());
            shutdown.register_handlers();

            let coordinator = BatchCoordinator::new(config, Arc::new(FsTransport::new(&root)))
                .with_cache(Arc::new(InMemoryCache::new()))
                .with_cancellation(shutdown.cancel_token());

            info!(root = %root, items = items.len(), "Starting run against local mirror");
            let outcome = coordinator.process_targets(items, strategy).await;
            coordinator.cleanup();
            let results = outcome?;

            let cancelled = results.cancelled || shutdown.is_shutdown_requested();
            let report = output::build_run_report(&coordinator, results, with_content);
            output::emit_json(&report, output).await?;

            if cancelled {
                warn!("Run was interrupted; the report covers admitted batches only");
                return Err(CliError::ShutdownRequested);
            }
        }
        Commands::CheckConfig { config } => {
            let config = BatchConfig::from_json_file(&config)?;
            info!("Configuration is valid");
            output::emit_json(&config.to_builder(), None).await?;
        }
    }

    Ok(())
}

/// An explicit config file wins over a preset; both fall back to defaults.
async fn load_config(path: Option<&str>, preset: Option<Preset>) -> Result<BatchConfig, CliError> {
    if let Some(path) = path {
        return Ok(BatchConfig::from_json_file(path)?);
    }

    let builder = match preset {
        Some(Preset::Conservative) => BatchConfigBuilder::conservative(),
        Some(Preset::Balanced) => BatchConfigBuilder::balanced(),
        Some(Preset::Aggressive) => BatchConfigBuilder::aggressive(),
        None => BatchConfigBuilder::default(),
    };
    Ok(builder.build()?)
}

fn parse_strategy(value: Option<&str>) -> Result<Option<ExecutionStrategy>, CliError> {
    value
        .map(str::parse::<ExecutionStrategy>)
        .transpose()
        .map_err(CliError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::memory::{MemoryProbe, MemoryReading};
    use tempfile::tempdir;

    struct CalmProbe;

    impl MemoryProbe for CalmProbe {
        fn read(&self) -> MemoryReading {
            MemoryReading {
                percent_used: 10.0,
                process_rss_mb: 5.0,
            }
        }
    }

    #[tokio::test]
    async fn config_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_concurrent_requests": 4, "default_batch_size": 8 }"#)
            .unwrap();

        let config = load_config(path.to_str(), Some(Preset::Aggressive))
            .await
            .unwrap();

        assert_eq!(config.max_concurrent_requests(), 4);
        assert_eq!(config.default_batch_size(), 8);
        assert_eq!(config.max_concurrent_per_target(), 3);
    }

    #[tokio::test]
    async fn presets_apply_without_a_file() {
        let config = load_config(None, Some(Preset::Conservative)).await.unwrap();
        assert_eq!(config.max_concurrent_requests(), 3);
        assert_eq!(config.default_strategy(), ExecutionStrategy::Conservative);
    }

    #[tokio::test]
    async fn invalid_config_files_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "min_batch_size": 20, "default_batch_size": 5 }"#).unwrap();

        let err = load_config(path.to_str(), None).await.unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!(
            parse_strategy(Some("Sequential")).unwrap(),
            Some(ExecutionStrategy::Sequential)
        );
        assert_eq!(parse_strategy(None).unwrap(), None);
        assert!(matches!(
            parse_strategy(Some("turbo")),
            Err(CliError::InvalidStrategy(_))
        ));
    }

    #[tokio::test]
    async fn runs_against_a_local_mirror() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("acme").join("api");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("package.json"), "{}").unwrap();

        let config = BatchConfigBuilder::default().retry(0, 1, 1).build().unwrap();
        let coordinator = BatchCoordinator::new(config, Arc::new(FsTransport::new(dir.path())))
            .with_memory_probe(Arc::new(CalmProbe));
        let specs = targets::parse_targets(
            r#"[{ "repo": "acme/api", "paths": ["package.json", "go.mod"] }]"#,
            "inline",
        )
        .unwrap();
        let items = targets::to_work_items(&specs, &[]).unwrap();

        let results = coordinator.process_targets(items, None).await.unwrap();
        let report = output::build_run_report(&coordinator, results, false);

        assert_eq!(report.metrics.successful_requests, 1);
        assert_eq!(report.resources.active, 0);
        let success = report.results.successful().next().unwrap();
        assert!(success.content.as_ref().is_some_and(|c| c.content.is_empty()));
    }
}
