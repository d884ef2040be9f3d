//! Media file metadata (similar to ffprobe).

use std::fmt;
use std::path::Path;

use crate::{
    error::Result,
    input::{ContainerTiming, InputContainer},
    stream::StreamDescriptor,
};

/// Format-level info (corresponds to ffprobe format).
#[derive(Debug, Clone)]
pub struct FormatInfo {
    /// Format name, e.g. "yuv4mpegpipe"
    pub format_name: String,
    /// Duration in seconds; None if unknown.
    pub duration_sec: Option<f64>,
    /// Total bitrate in bps; 0 if unknown.
    pub bit_rate: i64,
    pub nb_streams: usize,
}

/// Per-stream info (corresponds to ffprobe stream).
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    /// "video" | "audio" | "subtitle" etc.
    pub codec_type: String,
    /// e.g. "rawvideo", "h264"
    pub codec_name: String,
    /// e.g. "1/25"
    pub time_base: String,
    /// e.g. "25/1"
    pub rate: String,
    /// Video only.
    pub width: Option<u32>,
    /// Video only.
    pub height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn new(format_name: &str, timing: ContainerTiming, streams: Vec<StreamInfo>) -> Self {
        // AV_TIME_BASE = 1_000_000; duration is in 1/AV_TIME_BASE seconds
        let duration_sec = {
            let d = timing.duration;
            if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
                None
            } else {
                Some(d as f64 / 1_000_000.0)
            }
        };
        Self {
            format: FormatInfo {
                format_name: format_name.to_string(),
                duration_sec,
                bit_rate: timing.bit_rate,
                nb_streams: streams.len(),
            },
            streams,
        }
    }

    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.codec_type == "video")
    }
}

impl From<&StreamDescriptor> for StreamInfo {
    fn from(stream: &StreamDescriptor) -> Self {
        let time_base = stream.time_base();
        let rate = stream.avg_frame_rate();
        let (width, height) = if stream.is_video() {
            (Some(stream.width()), Some(stream.height()))
        } else {
            (None, None)
        };
        Self {
            index: stream.index(),
            codec_type: format!("{:?}", stream.medium()).to_lowercase(),
            codec_name: format!("{:?}", stream.codec_id()).to_lowercase(),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            rate: format!("{}/{}", rate.numerator(), rate.denominator()),
            width,
            height,
        }
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format.format_name)?;
        if let Some(d) = self.format.duration_sec {
            writeln!(f, "duration_sec={:.3}", d)?;
        } else {
            writeln!(f, "duration_sec=N/A")?;
        }
        writeln!(f, "bit_rate={}", self.format.bit_rate)?;
        writeln!(f, "nb_streams={}", self.format.nb_streams)?;
        writeln!(f, "[/FORMAT]")?;
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.codec_type)?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            writeln!(f, "time_base={}", s.time_base)?;
            writeln!(f, "rate={}", s.rate)?;
            if let Some(w) = s.width {
                writeln!(f, "width={}", w)?;
            }
            if let Some(h) = s.height {
                writeln!(f, "height={}", h)?;
            }
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

/// Opens a file and returns media metadata (similar to ffprobe).
///
/// # Example
///
/// ```ignore
/// use ffmpeg_pass::metadata::probe;
/// let info = probe("input.y4m")?;
/// println!("{}", info);
/// ```
pub fn probe(path: impl AsRef<Path>) -> Result<MediaInfo> {
    crate::init()?;
    let mut input = InputContainer::open(path)?;
    input.probe_streams()?;
    Ok(input.media_info())
}
