use std::collections::VecDeque;

use ffmpeg_next::{Rational, codec::packet::Packet, format::Pixel, frame};

use crate::{
    error::{Result, TranscodeError},
    frame::Picture,
    input::InputContainer,
    packet::RawPacket,
    stream::StreamDescriptor,
};

/// Decides the frame rate a stream is negotiated at when its metadata is ambiguous.
pub trait FrameRatePolicy: Send + Sync {
    fn frame_rate(&self, input: &InputContainer, stream: &StreamDescriptor) -> Option<Rational>;
}

/// FFmpeg's own guess from container and stream hints (`av_guess_frame_rate`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerGuess;

impl FrameRatePolicy for ContainerGuess {
    fn frame_rate(&self, input: &InputContainer, stream: &StreamDescriptor) -> Option<Rational> {
        input.guess_frame_rate(stream.index())
    }
}

/// The stream's average frame rate, falling back to its base frame rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAverage;

impl FrameRatePolicy for StreamAverage {
    fn frame_rate(&self, _input: &InputContainer, stream: &StreamDescriptor) -> Option<Rational> {
        [stream.avg_frame_rate(), stream.base_frame_rate()]
            .into_iter()
            .find(|r| is_positive(*r))
    }
}

/// A caller-supplied rate, ignoring whatever the container says.
#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub Rational);

impl FrameRatePolicy for Fixed {
    fn frame_rate(&self, _input: &InputContainer, _stream: &StreamDescriptor) -> Option<Rational> {
        Some(self.0)
    }
}

fn is_positive(rate: Rational) -> bool {
    rate.numerator() > 0 && rate.denominator() > 0
}

/// Decode parameters negotiated once the decoder is open. The encoder copies its spatial
/// parameters from here and derives its time base from `frame_rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoParameters {
    pub width: u32,
    pub height: u32,
    pub format: Pixel,
    pub sample_aspect_ratio: Rational,
    pub frame_rate: Rational,
    /// Time base of the decoded pictures' timestamps (the input stream's).
    pub time_base: Rational,
}

impl VideoParameters {
    /// Encoder time base: one tick per picture.
    pub fn encoder_time_base(&self) -> Rational {
        self.frame_rate.invert()
    }
}

/// The send/receive half of a video decoder that the packet backlog drives.
trait DecodeIo {
    fn submit(&mut self, packet: &Packet) -> std::result::Result<(), ffmpeg_next::Error>;
    fn submit_eof(&mut self) -> std::result::Result<(), ffmpeg_next::Error>;
    fn fetch(&mut self, frame: &mut frame::Video) -> std::result::Result<(), ffmpeg_next::Error>;
}

impl DecodeIo for ffmpeg_next::codec::decoder::Video {
    fn submit(&mut self, packet: &Packet) -> std::result::Result<(), ffmpeg_next::Error> {
        self.send_packet(packet)
    }

    fn submit_eof(&mut self) -> std::result::Result<(), ffmpeg_next::Error> {
        self.send_eof()
    }

    fn fetch(&mut self, frame: &mut frame::Video) -> std::result::Result<(), ffmpeg_next::Error> {
        self.receive_frame(frame)
    }
}

fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}

/// Packets the decoder has not accepted yet. A packet refused with "again" stays queued
/// until the decoder has handed out enough pictures to take it; end of stream is only
/// signalled once the queue is empty.
#[derive(Default)]
struct Backlog {
    packets: VecDeque<RawPacket>,
    eof_sent: bool,
}

impl Backlog {
    fn decode(&mut self, io: &mut impl DecodeIo, packet: RawPacket) -> Option<Picture> {
        self.packets.push_back(packet);
        self.pump(io);
        let picture = Self::receive(io);
        self.pump(io);
        picture
    }

    fn flush(&mut self, io: &mut impl DecodeIo) -> Option<Picture> {
        self.pump(io);
        self.finish(io);
        if let Some(picture) = Self::receive(io) {
            return Some(picture);
        }
        if !self.packets.is_empty() {
            log::warn!(
                "decoder neither accepts input nor has output, dropping {} queued packets",
                self.packets.len()
            );
            self.packets.clear();
            self.finish(io);
            return Self::receive(io);
        }
        None
    }

    fn pump(&mut self, io: &mut impl DecodeIo) {
        while let Some(packet) = self.packets.front() {
            match io.submit(packet.packet()) {
                Ok(()) => {}
                Err(e) if is_again(&e) => break,
                Err(e) => log::warn!("send packet error: {}", e),
            }
            self.packets.pop_front();
        }
    }

    fn finish(&mut self, io: &mut impl DecodeIo) {
        if self.packets.is_empty() && !self.eof_sent {
            self.eof_sent = true;
            if let Err(e) = io.submit_eof() {
                log::warn!("decoder send eof error: {}", e);
            }
        }
    }

    fn receive(io: &mut impl DecodeIo) -> Option<Picture> {
        let mut frame = frame::Video::empty();
        match io.fetch(&mut frame) {
            Ok(()) => Some(Picture::from(frame)),
            Err(ffmpeg_next::Error::Eof) => None,
            Err(e) if is_again(&e) => None,
            Err(e) => {
                log::warn!("receive frame error: {}", e);
                None
            }
        }
    }
}

pub struct DecoderSession {
    stream: StreamDescriptor,
    inner: ffmpeg_next::codec::decoder::Video,
    decoder_time_base: Rational,
    parameters: VideoParameters,
    backlog: Backlog,
}

impl DecoderSession {
    /// Binds a decoder to `stream`: copies the stream's codec parameters into a fresh
    /// context, applies the frame rate chosen by `policy` and opens the matching decoder.
    pub fn open(
        input: &InputContainer,
        stream: &StreamDescriptor,
        policy: &dyn FrameRatePolicy,
    ) -> Result<Self> {
        let mut decoder_ctx =
            ffmpeg_next::codec::Context::from_parameters(stream.parameters().clone()).map_err(
                |e| TranscodeError::ParameterCopy(format!("stream parameters: {}", e)),
            )?;

        let frame_rate = policy
            .frame_rate(input, stream)
            .filter(|r| is_positive(*r))
            .ok_or_else(|| {
                TranscodeError::ParameterCopy(format!(
                    "no usable frame rate for stream #{}",
                    stream.index()
                ))
            })?;

        unsafe {
            let ctx = decoder_ctx.as_mut_ptr();
            (*ctx).time_base = stream.time_base().into();
            (*ctx).pkt_timebase = stream.time_base().into();
            (*ctx).framerate = frame_rate.into();
        }

        let video_decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| TranscodeError::CodecOpen {
                codec: format!("{:?} decoder", stream.codec_id()).to_lowercase(),
                source: e,
            })?;

        let parameters = Self::negotiate(&video_decoder, stream, frame_rate)?;
        log::info!(
            "decoder opened: {:?} {}x{} {:?}, sar {}, frame rate {}",
            stream.codec_id(),
            parameters.width,
            parameters.height,
            parameters.format,
            parameters.sample_aspect_ratio,
            parameters.frame_rate
        );

        Ok(Self {
            stream: stream.clone(),
            decoder_time_base: video_decoder.time_base(),
            inner: video_decoder,
            parameters,
            backlog: Backlog::default(),
        })
    }

    fn negotiate(
        video_decoder: &ffmpeg_next::codec::decoder::Video,
        stream: &StreamDescriptor,
        frame_rate: Rational,
    ) -> Result<VideoParameters> {
        if video_decoder.format() == Pixel::None
            || video_decoder.width() == 0
            || video_decoder.height() == 0
        {
            return Err(TranscodeError::ParameterCopy(format!(
                "missing codec parameters for stream #{}",
                stream.index()
            )));
        }

        Ok(VideoParameters {
            width: video_decoder.width(),
            height: video_decoder.height(),
            format: video_decoder.format(),
            sample_aspect_ratio: video_decoder.aspect_ratio(),
            frame_rate,
            time_base: stream.time_base(),
        })
    }

    pub fn parameters(&self) -> &VideoParameters {
        &self.parameters
    }

    pub fn stream_index(&self) -> usize {
        self.stream.index()
    }

    /// Feeds one coded packet and returns at most one picture. A packet the decoder accepts
    /// without finishing a picture yields `None`. A packet refused while output is pending
    /// is kept and resubmitted on later calls; one the decoder rejects outright is logged
    /// and dropped.
    pub fn decode_packet(&mut self, mut packet: RawPacket) -> Option<Picture> {
        let time_base = packet.time_base();
        packet
            .get_mut()
            .rescale_ts(time_base, self.decoder_time_base);
        self.backlog.decode(&mut self.inner, packet)
    }

    /// Submits any queued packets, then signals end of input (once), and returns the next
    /// buffered picture. `None` once the decoder is drained.
    pub fn flush(&mut self) -> Option<Picture> {
        self.backlog.flush(&mut self.inner)
    }
}
