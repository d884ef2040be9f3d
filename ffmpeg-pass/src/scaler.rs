use ffmpeg_next::{
    format::Pixel,
    software::scaling::{Context, Flags},
};

use crate::error::{Result, TranscodeError};

/// Pixel-format converter bound to one source geometry; rebuilt when that changes.
pub struct Scaler {
    context: Context,
    source: (Pixel, u32, u32),
}

impl Scaler {
    pub fn new(format: Pixel, width: u32, height: u32, target: Pixel) -> Result<Self> {
        let context = Context::get(format, width, height, target, width, height, Flags::BILINEAR)
            .map_err(TranscodeError::Scale)?;
        Ok(Self {
            context,
            source: (format, width, height),
        })
    }

    pub fn matches(&self, frame: &ffmpeg_next::frame::Video) -> bool {
        self.source == (frame.format(), frame.width(), frame.height())
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> Result<()> {
        self.context.run(frame, dst).map_err(TranscodeError::Scale)
    }
}
