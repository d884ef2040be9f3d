use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::{Rational, ffi, media};

use crate::{
    error::{Result, TranscodeError},
    metadata::{MediaInfo, StreamInfo},
    packet::RawPacket,
    stream::StreamDescriptor,
};

/// Container-level timing hints carried over to the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerTiming {
    pub duration: i64,
    pub bit_rate: i64,
    pub start_time: i64,
}

/// An opened input container. Streams are known once `probe_streams` has run; the video
/// stream, once selected, stays selected for the life of the container.
pub struct InputContainer {
    inner: ffmpeg_next::format::context::Input,
    path: PathBuf,
    streams: Vec<StreamDescriptor>,
    selected: Option<usize>,
}

impl InputContainer {
    /// Opens `path` and parses the container header. The format is auto-detected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|_| {
            TranscodeError::Open {
                path: path.clone(),
                source: ffmpeg_next::Error::InvalidData,
            }
        })?;

        let mut ctx = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_open_input(&mut ctx, c_path.as_ptr(), ptr::null_mut(), ptr::null_mut())
        };
        if ret < 0 || ctx.is_null() {
            return Err(TranscodeError::Open {
                path,
                source: ffmpeg_next::Error::from(ret),
            });
        }
        let inner = unsafe { ffmpeg_next::format::context::Input::wrap(ctx) };
        log::info!("opened input {}", path.display());

        Ok(Self {
            inner,
            path,
            streams: Vec::new(),
            selected: None,
        })
    }

    /// Reads stream metadata, which may scan a bounded prefix of the data, and logs every
    /// discovered stream.
    pub fn probe_streams(&mut self) -> Result<()> {
        let ret =
            unsafe { ffi::avformat_find_stream_info(self.inner.as_mut_ptr(), ptr::null_mut()) };
        if ret < 0 {
            return Err(TranscodeError::StreamInfo(ffmpeg_next::Error::from(ret)));
        }

        self.streams = self.inner.streams().map(StreamDescriptor::from).collect();
        for stream in &self.streams {
            let info = StreamInfo::from(stream);
            log::info!(
                "stream #{}: codec_type={}, codec_name={}",
                info.index,
                info.codec_type,
                info.codec_name
            );
        }
        if log::log_enabled!(log::Level::Debug) {
            ffmpeg_next::format::context::input::dump(
                &self.inner,
                0,
                Some(&*self.path.to_string_lossy()),
            );
        }
        Ok(())
    }

    /// Picks the video stream FFmpeg scores best. Repeated calls return the stream chosen by
    /// the first successful call.
    pub fn select_video_stream(&mut self) -> Result<StreamDescriptor> {
        if let Some(index) = self.selected {
            return self
                .inner
                .stream(index)
                .map(StreamDescriptor::from)
                .ok_or(TranscodeError::StreamNotFound);
        }

        let best = self
            .inner
            .streams()
            .best(media::Type::Video)
            .ok_or(TranscodeError::StreamNotFound)?;
        let descriptor = StreamDescriptor::from(best);
        if !descriptor.is_video() {
            return Err(TranscodeError::StreamNotFound);
        }

        log::info!(
            "selected video stream #{} ({:?})",
            descriptor.index(),
            descriptor.codec_id()
        );
        self.selected = Some(descriptor.index());
        Ok(descriptor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next packet from any stream. End of stream and read errors both yield
    /// `None`; a read error is logged and otherwise treated as end of stream.
    pub fn read_packet(&mut self) -> Option<RawPacket> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {
                let time_base = self
                    .inner
                    .stream(packet.stream())
                    .map(|s| s.time_base())
                    .unwrap_or(Rational(0, 1));
                Some(RawPacket::from((packet, time_base)))
            }
            Err(ffmpeg_next::Error::Eof) => None,
            Err(e) => {
                log::warn!(
                    "read error on {}, treating as end of stream: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// FFmpeg's frame-rate estimate for a stream, combining container and stream hints.
    pub fn guess_frame_rate(&self, index: usize) -> Option<Rational> {
        let stream = self.inner.stream(index)?;
        let rate = unsafe {
            ffi::av_guess_frame_rate(
                self.inner.as_ptr() as *mut _,
                stream.as_ptr() as *mut _,
                ptr::null_mut(),
            )
        };
        let rate = Rational::from(rate);
        (rate.numerator() > 0 && rate.denominator() > 0).then_some(rate)
    }

    pub fn timing(&self) -> ContainerTiming {
        let start_time = unsafe { (*self.inner.as_ptr()).start_time };
        ContainerTiming {
            duration: self.inner.duration(),
            bit_rate: self.inner.bit_rate(),
            start_time,
        }
    }

    pub fn media_info(&self) -> MediaInfo {
        MediaInfo::new(
            self.inner.format().name(),
            self.timing(),
            self.streams.iter().map(StreamInfo::from).collect(),
        )
    }
}
