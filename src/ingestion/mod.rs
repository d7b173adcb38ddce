mod artifacts;
mod pipeline;
mod transcoder;
mod waveform;

pub use artifacts::{sanitize_stem, ArtifactError, ArtifactPaths, ArtifactStore};
pub use pipeline::{
    IngestError, IngestOutcome, IngestionPipeline, IngestionSettings, UploadSpool,
};
pub use transcoder::{FfmpegTranscoder, TranscodeError, TranscodeSettings, Transcoder};
pub use waveform::WaveformSettings;
