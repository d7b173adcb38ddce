use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lectern_server::config::{AppConfig, CliConfig, FileConfig};
use lectern_server::ingestion::{
    ArtifactStore, FfmpegTranscoder, IngestionPipeline, IngestionSettings, TranscodeSettings,
    WaveformSettings,
};
use lectern_server::lesson_store::SqliteLessonStore;
use lectern_server::server::state::{GuardedLessonStore, GuardedPipeline};
use lectern_server::server::{run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite lessons database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for audio artifacts (originals and processed files).
    /// Defaults to <db_dir>/content.
    #[clap(long, value_parser = parse_path)]
    pub content_root: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Token required by the upload and delete endpoints. When absent,
    /// audio administration is disabled.
    #[clap(long)]
    pub admin_token: Option<String>,

    /// Path to a TOML config file. Values in the file override CLI args.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        content_root: cli_args.content_root,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        frontend_dir_path: cli_args.frontend_dir_path,
        admin_token: cli_args.admin_token,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!(
        "Opening SQLite lessons database at {:?}...",
        config.lessons_db_path()
    );
    let lesson_store: GuardedLessonStore =
        Arc::new(SqliteLessonStore::new(&config.lessons_db_path())?);

    info!("Initializing metrics...");
    lectern_server::server::metrics::init_metrics();

    let transcoder = Arc::new(FfmpegTranscoder::new(TranscodeSettings {
        bitrate_kbps: config.ingestion.bitrate_kbps,
        ..TranscodeSettings::default()
    }));

    let pipeline: GuardedPipeline = Arc::new(IngestionPipeline::new(
        ArtifactStore::new(config.content_root.clone()),
        transcoder,
        lesson_store.clone(),
        IngestionSettings {
            max_upload_bytes: config.ingestion.max_upload_bytes,
            max_concurrent_transcodes: config.ingestion.max_concurrent_transcodes,
            loudness_normalization: config.ingestion.loudness_normalization,
            waveform: WaveformSettings {
                points_per_second: config.ingestion.waveform_points_per_second,
                ..WaveformSettings::default()
            },
        },
    ));

    info!("Preparing artifact directories at {:?}...", config.content_root);
    pipeline.init().await?;

    if config.admin_token.is_none() {
        info!("No admin token configured; upload and delete endpoints are disabled.");
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level,
        port: config.port,
        frontend_dir_path: config.frontend_dir_path,
        admin_token: config.admin_token,
        chunk_size: config.streaming.chunk_size,
    };

    info!("Ready to serve at port {}!", server_config.port);
    run_server(server_config, lesson_store, pipeline).await
}
