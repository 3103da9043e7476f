use crate::{
    auth::OwnershipGuard,
    catalog::Catalog,
    cli::commands::{
        ChannelsCommand, Commands, DatasetsCommand, DeleteCommand, IngestCommand, RangeCommand,
        WindowCommand,
    },
    config::{LoggingConfig, Settings},
    extract::JsonReader,
    ingest::Ingestor,
    response::{self, WindowResponse},
    storage::{DuckDbBackend, StorageBackend},
    window::WindowEngine,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the tracing subscriber.
///
/// Logs go to stderr, or to `tdms-analytics.log` under `logging.directory`
/// when one is configured. Keep the returned guard alive to flush the file.
pub fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    LogTracer::init().context("Failed to initialize log tracer")?;

    let filter = match &logging.filter {
        Some(directives) => EnvFilter::builder()
            .with_default_directive(
                logging
                    .level
                    .parse::<tracing::Level>()
                    .unwrap_or(tracing::Level::INFO)
                    .into(),
            )
            .parse_lossy(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    };

    match &logging.directory {
        Some(dir) => {
            let file_appender = RollingFileAppender::new(Rotation::NEVER, dir, "tdms-analytics.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .compact()
                .init();
            Ok(Some(guard))
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
            Ok(None)
        }
    }
}

/// Open and initialize the configured storage backend.
pub async fn open_backend(settings: &Settings) -> Result<Arc<dyn StorageBackend>> {
    let storage = &settings.storage;
    let backend: Arc<dyn StorageBackend> = match storage.engine.as_str() {
        "duckdb" => Arc::new(
            DuckDbBackend::new(&storage.connection, storage.options.clone(), storage.pool_size)
                .context("Failed to create DuckDB backend")?,
        ),
        other => anyhow::bail!("Unsupported engine type: {other}"),
    };
    backend
        .init()
        .await
        .context("Failed to initialize storage backend")?;
    Ok(backend)
}

pub async fn dispatch(command: Commands, settings: Settings) -> Result<()> {
    let backend = open_backend(&settings).await?;
    match command {
        Commands::Ingest(cmd) => handle_ingest(backend, &settings, cmd).await,
        Commands::Window(cmd) => handle_window(backend, &settings, cmd).await,
        Commands::Datasets(cmd) => handle_datasets(backend, cmd).await,
        Commands::Channels(cmd) => handle_channels(backend, cmd).await,
        Commands::Range(cmd) => handle_range(backend, &settings, cmd).await,
        Commands::Delete(cmd) => handle_delete(backend, cmd).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn handle_ingest(
    backend: Arc<dyn StorageBackend>,
    settings: &Settings,
    cmd: IngestCommand,
) -> Result<()> {
    let reader = JsonReader::from_path(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let filename = match cmd.name {
        Some(name) => name,
        None => cmd
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cmd.file.display().to_string()),
    };

    let ingestor = Ingestor::new(backend, &settings.ingestion);
    let report = ingestor
        .ingest(&reader, &filename, cmd.owner.as_deref())
        .await
        .context("Ingestion failed")?;
    print_json(&report)
}

pub async fn handle_window(
    backend: Arc<dyn StorageBackend>,
    settings: &Settings,
    cmd: WindowCommand,
) -> Result<()> {
    let engine = WindowEngine::new(backend, settings.query);
    let result = engine.fetch(&cmd.request(), cmd.owner.as_deref()).await?;

    if let Some(path) = &cmd.arrow_out {
        let bytes = response::encode_arrow_stream(&result)?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = result.returned_points, "Wrote Arrow stream");
        return Ok(());
    }
    print_json(&WindowResponse::from(result))
}

pub async fn handle_datasets(backend: Arc<dyn StorageBackend>, cmd: DatasetsCommand) -> Result<()> {
    let datasets = Catalog::new(backend).list_datasets(cmd.owner.as_deref()).await?;
    print_json(&datasets)
}

pub async fn handle_channels(backend: Arc<dyn StorageBackend>, cmd: ChannelsCommand) -> Result<()> {
    let catalog = Catalog::new(backend);
    OwnershipGuard::new(catalog.clone())
        .authorize_dataset(cmd.dataset_id, cmd.owner.as_deref())
        .await?;
    print_json(&catalog.list_channels(cmd.dataset_id).await?)
}

pub async fn handle_range(
    backend: Arc<dyn StorageBackend>,
    settings: &Settings,
    cmd: RangeCommand,
) -> Result<()> {
    let engine = WindowEngine::new(backend, settings.query);
    print_json(&engine.time_range(cmd.channel_id, cmd.owner.as_deref()).await?)
}

pub async fn handle_delete(backend: Arc<dyn StorageBackend>, cmd: DeleteCommand) -> Result<()> {
    let catalog = Catalog::new(backend);
    OwnershipGuard::new(catalog.clone())
        .authorize_dataset(cmd.dataset_id, cmd.owner.as_deref())
        .await?;
    catalog.delete_dataset(cmd.dataset_id).await?;
    println!("Deleted dataset {}", cmd.dataset_id);
    Ok(())
}
