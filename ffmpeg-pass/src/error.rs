use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Failure of one pipeline stage. Every initialization variant aborts the pipeline; none are
/// retried.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("ffmpeg init: {0}")]
    Init(#[source] ffmpeg_next::Error),

    #[error("failed to open input {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("failed to read stream info: {0}")]
    StreamInfo(#[source] ffmpeg_next::Error),

    #[error("no video stream found")]
    StreamNotFound,

    #[error("failed to open {codec} codec: {source}")]
    CodecOpen {
        codec: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("parameter copy failed: {0}")]
    ParameterCopy(String),

    #[error("failed to allocate output container for {}: {source}", path.display())]
    Allocation {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("failed to create output stream: {0}")]
    StreamCreation(#[source] ffmpeg_next::Error),

    #[error("encoder not found: {0:?}")]
    EncoderNotFound(ffmpeg_next::codec::Id),

    #[error("failed to open {} for writing: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("failed to write container header: {0}")]
    HeaderWrite(#[source] ffmpeg_next::Error),

    #[error("output header has not been written")]
    HeaderNotWritten,

    #[error("encode failed: {0}")]
    Encode(#[source] ffmpeg_next::Error),

    #[error("mux failed: {0}")]
    Mux(#[source] ffmpeg_next::Error),

    #[error("pipeline is not initialized")]
    NotInitialized,

    #[error("picture conversion failed: {0}")]
    Scale(#[source] ffmpeg_next::Error),

    #[error("failed to dump picture to {}: {source}", path.display())]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
