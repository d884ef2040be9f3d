use ffmpeg_next::{Rational, codec::Parameters, format::stream, media};

/// Snapshot of one input stream taken when the container was probed.
#[derive(Clone)]
pub struct StreamDescriptor {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    avg_frame_rate: Rational,
    base_frame_rate: Rational,
}

impl StreamDescriptor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Average frame rate as reported by the demuxer, `0/0` when unknown.
    pub fn avg_frame_rate(&self) -> Rational {
        self.avg_frame_rate
    }

    /// Lowest frame rate that can represent all timestamps accurately (`r_frame_rate`).
    pub fn base_frame_rate(&self) -> Rational {
        self.base_frame_rate
    }

    pub fn medium(&self) -> media::Type {
        self.parameters.medium()
    }

    pub fn codec_id(&self) -> ffmpeg_next::codec::Id {
        self.parameters.id()
    }

    pub fn is_video(&self) -> bool {
        self.medium() == media::Type::Video
    }

    pub fn width(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr();
            (*ptr).width.max(0) as u32
        }
    }

    pub fn height(&self) -> u32 {
        unsafe {
            let ptr = self.parameters.as_ptr();
            (*ptr).height.max(0) as u32
        }
    }
}

impl From<stream::Stream<'_>> for StreamDescriptor {
    fn from(stream: stream::Stream<'_>) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            avg_frame_rate: stream.avg_frame_rate(),
            base_frame_rate: stream.rate(),
        }
    }
}

impl std::fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("index", &self.index)
            .field("medium", &self.medium())
            .field("codec_id", &self.codec_id())
            .field("time_base", &self.time_base)
            .field("avg_frame_rate", &self.avg_frame_rate)
            .finish()
    }
}
