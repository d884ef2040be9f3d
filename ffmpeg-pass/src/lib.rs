use std::sync::OnceLock;

use crate::error::{Result, TranscodeError};

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg_next::Error>> = OnceLock::new();

/// Registers FFmpeg's formats and codecs. Safe to call repeatedly; only the first call does
/// any work and every later call reports its outcome.
pub fn init() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(ffmpeg_next::init)
        .clone()
        .map_err(TranscodeError::Init)
}

pub mod config;
pub mod decoder;
pub mod dump;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod input;
pub mod metadata;
pub mod output;
pub mod packet;
pub mod pipeline;
pub mod scaler;
pub mod stream;
pub mod transcode;

pub use ffmpeg_next;
pub use ffmpeg_next::Rational;

pub use config::{DEFAULT_MAX_PICTURES, TranscodeConfig};
pub use decoder::{ContainerGuess, Fixed, FrameRatePolicy, StreamAverage, VideoParameters};
pub use error::TranscodeError as Error;
pub use pipeline::{Pipeline, ReleaseStep, transcode};
pub use transcode::TranscodeReport;
