mod file_config;

pub use file_config::{FileConfig, IngestionConfig, StreamingConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

use crate::server::RequestsLoggingLevel;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub content_root: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub content_root: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs (with defaults)
    pub streaming: StreamingSettings,
    pub ingestion: IngestionTuning,
}

#[derive(Debug, Clone)]
pub struct StreamingSettings {
    /// Read size used when chunking audio responses.
    pub chunk_size: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub max_upload_bytes: u64,
    pub max_concurrent_transcodes: usize,
    pub bitrate_kbps: u32,
    pub loudness_normalization: bool,
    pub waveform_points_per_second: u32,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            max_upload_bytes: 200 * 1024 * 1024,
            max_concurrent_transcodes: 2,
            bitrate_kbps: 64,
            loudness_normalization: true,
            waveform_points_per_second: 4,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        // Artifact directories are created at startup, so the content root
        // only has to be a resolvable path here.
        let content_root = file
            .content_root
            .map(PathBuf::from)
            .or_else(|| cli.content_root.clone())
            .unwrap_or_else(|| db_dir.join("content"));

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let admin_token = file.admin_token.or_else(|| cli.admin_token.clone());

        let defaults = StreamingSettings::default();
        let streaming_file = file.streaming.unwrap_or_default();
        let streaming = StreamingSettings {
            chunk_size: match streaming_file.chunk_size {
                Some(s) => parse_size(&s)? as usize,
                None => defaults.chunk_size,
            },
        };
        if streaming.chunk_size == 0 {
            bail!("streaming.chunk_size must be greater than zero");
        }

        let defaults = IngestionTuning::default();
        let ingestion_file = file.ingestion.unwrap_or_default();
        let ingestion = IngestionTuning {
            max_upload_bytes: match ingestion_file.max_upload_size {
                Some(s) => parse_size(&s)?,
                None => defaults.max_upload_bytes,
            },
            max_concurrent_transcodes: ingestion_file
                .max_concurrent_transcodes
                .unwrap_or(defaults.max_concurrent_transcodes),
            bitrate_kbps: ingestion_file.bitrate_kbps.unwrap_or(defaults.bitrate_kbps),
            loudness_normalization: ingestion_file
                .loudness_normalization
                .unwrap_or(defaults.loudness_normalization),
            waveform_points_per_second: ingestion_file
                .waveform_points_per_second
                .unwrap_or(defaults.waveform_points_per_second),
        };
        if ingestion.max_concurrent_transcodes == 0 {
            bail!("ingestion.max_concurrent_transcodes must be greater than zero");
        }

        Ok(Self {
            db_dir,
            content_root,
            port,
            logging_level,
            frontend_dir_path,
            admin_token,
            streaming,
            ingestion,
        })
    }

    pub fn lessons_db_path(&self) -> PathBuf {
        self.db_dir.join("lessons.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

/// Parses a human-readable size like "200 MiB" or "65536" into bytes.
fn parse_size(s: &str) -> Result<u64> {
    let byte = byte_unit::Byte::parse_str(s, true)
        .map_err(|e| anyhow::anyhow!("Invalid size {:?}: {}", s, e))?;
    Ok(byte.as_u64())
}
