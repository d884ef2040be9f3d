use std::path::Path;

use ffmpeg_next::{Rational, codec};

use crate::{
    decoder::VideoParameters,
    error::{Result, TranscodeError},
    frame::Picture,
    input::ContainerTiming,
    output::OutputContainer,
    packet::RawPacket,
};

/// Codec every picture is wrapped in: the decoded frame is carried as-is, no compression.
pub const PASSTHROUGH_CODEC: codec::Id = codec::Id::WRAPPED_AVFRAME;

/// Passthrough encoder bound to a single-stream output container.
///
/// Built in two phases so a session whose configuration failed half way still owns the
/// container allocated for it and can be released in order.
pub struct EncoderSession {
    output: Option<OutputContainer>,
    encoder: Option<codec::encoder::Video>,
    time_base: Rational,
    stream_index: usize,
    frame_index: i64,
    flushed: bool,
}

impl EncoderSession {
    /// Allocates (and configures) the output in one go.
    pub fn initialize(
        parameters: &VideoParameters,
        path: impl AsRef<Path>,
        timing: Option<ContainerTiming>,
    ) -> Result<Self> {
        let mut session = Self::allocate(path)?;
        session.configure(parameters, timing)?;
        Ok(session)
    }

    /// Allocates the output container, with the format deduced from `path`.
    pub fn allocate(path: impl AsRef<Path>) -> Result<Self> {
        let output = OutputContainer::allocate(path)?;
        Ok(Self {
            output: Some(output),
            encoder: None,
            time_base: Rational(0, 1),
            stream_index: 0,
            frame_index: 0,
            flushed: false,
        })
    }

    /// Creates the output stream, opens the passthrough encoder with the decoder's
    /// parameters, opens the destination and writes the container header.
    pub fn configure(
        &mut self,
        parameters: &VideoParameters,
        timing: Option<ContainerTiming>,
    ) -> Result<()> {
        let output = self.output.as_mut().ok_or(TranscodeError::NotInitialized)?;
        let found = ffmpeg_next::encoder::find(PASSTHROUGH_CODEC);
        let stream_index = output.add_stream(found)?;
        let wrapped = found.ok_or(TranscodeError::EncoderNotFound(PASSTHROUGH_CODEC))?;

        // The first pixel format the encoder advertises wins; a codec that lists none
        // takes whatever the decoder produces.
        let format = wrapped
            .video()
            .ok()
            .and_then(|v| v.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(parameters.format);

        let mut encoder = codec::Context::new_with_codec(wrapped)
            .encoder()
            .video()
            .map_err(|e| TranscodeError::CodecOpen {
                codec: wrapped.name().to_string(),
                source: e,
            })?;
        encoder.set_width(parameters.width);
        encoder.set_height(parameters.height);
        encoder.set_aspect_ratio(parameters.sample_aspect_ratio);
        encoder.set_format(format);
        encoder.set_time_base(parameters.encoder_time_base());
        encoder.set_frame_rate(Some(parameters.frame_rate));

        let encoder = encoder
            .open_as(wrapped)
            .map_err(|e| TranscodeError::CodecOpen {
                codec: wrapped.name().to_string(),
                source: e,
            })?;
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        log::info!(
            "encoder opened: {} {}x{} {:?}, time base {}",
            wrapped.name(),
            parameters.width,
            parameters.height,
            format,
            time_base
        );

        output.set_stream_parameters(stream_index, &encoder)?;
        if let Some(timing) = timing {
            output.inherit_timing(timing);
        }
        output.open_io()?;
        output.write_header()?;

        self.encoder = Some(encoder);
        self.time_base = time_base;
        self.stream_index = stream_index;
        Ok(())
    }

    /// Encodes one picture and muxes every packet it produced. The picture is stamped with
    /// the running picture counter so output timestamps follow decode order. Returns the
    /// number of packets written.
    pub fn encode_and_mux(&mut self, picture: &mut Picture) -> Result<usize> {
        let encoder = self.encoder.as_mut().ok_or(TranscodeError::NotInitialized)?;

        let frame = picture.get_mut();
        frame.set_pts(Some(self.frame_index));
        frame.set_kind(ffmpeg_next::picture::Type::None);
        encoder.send_frame(frame).map_err(TranscodeError::Encode)?;
        self.frame_index += 1;

        self.drain_packets()
    }

    /// Signals end of stream to the encoder (once) and muxes whatever it still buffered.
    pub fn flush(&mut self) -> Result<usize> {
        if self.flushed {
            return Ok(0);
        }
        let encoder = self.encoder.as_mut().ok_or(TranscodeError::NotInitialized)?;
        self.flushed = true;
        encoder.send_eof().map_err(TranscodeError::Encode)?;
        self.drain_packets()
    }

    fn drain_packets(&mut self) -> Result<usize> {
        let (Some(encoder), Some(output)) = (self.encoder.as_mut(), self.output.as_mut()) else {
            return Err(TranscodeError::NotInitialized);
        };

        let mut muxed = 0;
        loop {
            let mut packet = ffmpeg_next::codec::packet::Packet::empty();
            match encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    log::debug!(
                        "muxing packet pts {:?}, size {}",
                        packet.pts(),
                        packet.size()
                    );
                    output.write_packet(
                        self.stream_index,
                        RawPacket::from((packet, self.time_base)),
                    )?;
                    muxed += 1;
                }
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(TranscodeError::Encode(e)),
            }
        }
        Ok(muxed)
    }

    /// Writes the trailer when a header went out and no trailer has been written yet.
    pub fn write_trailer(&mut self) -> Result<bool> {
        match self.output.as_mut() {
            Some(output) => output.finish(),
            None => Ok(false),
        }
    }

    /// Drops the encoder. Returns whether there was one.
    pub fn release_encoder(&mut self) -> bool {
        self.encoder.take().is_some()
    }

    /// Drops the output container, closing its I/O. Returns whether there was one.
    pub fn release_output(&mut self) -> bool {
        match self.output.take() {
            Some(output) => {
                log::debug!("closing output {}", output.path().display());
                true
            }
            None => false,
        }
    }

    pub fn header_written(&self) -> bool {
        self.output.as_ref().is_some_and(|o| o.header_written())
    }

    pub fn encoder_time_base(&self) -> Rational {
        self.time_base
    }

    /// Time base the muxer chose for the output stream.
    pub fn output_time_base(&self) -> Option<Rational> {
        self.output
            .as_ref()
            .and_then(|o| o.stream_time_base(self.stream_index))
    }
}
