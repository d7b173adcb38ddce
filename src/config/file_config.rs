use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub content_root: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs
    pub streaming: Option<StreamingConfig>,
    pub ingestion: Option<IngestionConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StreamingConfig {
    /// Chunk size for range responses, e.g. "64 KiB".
    pub chunk_size: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    /// Upload size ceiling, e.g. "200 MiB".
    pub max_upload_size: Option<String>,
    pub max_concurrent_transcodes: Option<usize>,
    pub bitrate_kbps: Option<u32>,
    pub loudness_normalization: Option<bool>,
    pub waveform_points_per_second: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
