use std::ffi::{CString, c_int};
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::{Rational, ffi};

use crate::{
    error::{Result, TranscodeError},
    input::ContainerTiming,
    packet::RawPacket,
};

/// Output container whose format is picked from the destination path. The header is
/// written at most once, and the trailer only after a header.
pub struct OutputContainer {
    inner: ffmpeg_next::format::context::Output,
    path: PathBuf,
    c_path: CString,
    io_opened: bool,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl OutputContainer {
    /// Allocates the muxer context only; nothing touches the filesystem until `open_io`.
    pub fn allocate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let allocation_error = |source| TranscodeError::Allocation {
            path: path.clone(),
            source,
        };
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| allocation_error(ffmpeg_next::Error::InvalidData))?;

        let mut ctx = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null_mut(),
                ptr::null_mut(),
                c_path.as_ptr(),
            )
        };
        if ret < 0 || ctx.is_null() {
            return Err(allocation_error(ffmpeg_next::Error::from(ret)));
        }
        let inner = unsafe { ffmpeg_next::format::context::Output::wrap(ctx) };
        log::info!(
            "allocated output {} ({})",
            path.display(),
            inner.format().name()
        );

        Ok(Self {
            inner,
            path,
            c_path,
            io_opened: false,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    /// Adds the single output stream and returns its index.
    pub fn add_stream(&mut self, codec: Option<ffmpeg_next::Codec>) -> Result<usize> {
        let stream = self
            .inner
            .add_stream(codec)
            .map_err(TranscodeError::StreamCreation)?;
        Ok(stream.index())
    }

    /// Copies an opened encoder's parameters onto stream `index`, along with its time base
    /// and sample aspect ratio.
    pub fn set_stream_parameters(
        &mut self,
        index: usize,
        encoder: &ffmpeg_next::codec::encoder::Video,
    ) -> Result<()> {
        if index >= self.inner.nb_streams() as usize {
            return Err(TranscodeError::ParameterCopy(format!(
                "output stream #{} does not exist",
                index
            )));
        }
        unsafe {
            let stream = *(*self.inner.as_mut_ptr()).streams.add(index);
            let enc = encoder.as_ptr() as *mut ffi::AVCodecContext;
            let ret = ffi::avcodec_parameters_from_context((*stream).codecpar, enc);
            if ret < 0 {
                return Err(TranscodeError::ParameterCopy(format!(
                    "encoder parameters: {}",
                    ffmpeg_next::Error::from(ret)
                )));
            }
            (*stream).time_base = (*enc).time_base;
            (*stream).sample_aspect_ratio = (*enc).sample_aspect_ratio;
        }
        Ok(())
    }

    /// Carries container-level duration, bit rate and start time over from the input.
    pub fn inherit_timing(&mut self, timing: ContainerTiming) {
        unsafe {
            let ctx = self.inner.as_mut_ptr();
            (*ctx).duration = timing.duration;
            (*ctx).bit_rate = timing.bit_rate;
            (*ctx).start_time = timing.start_time;
        }
    }

    /// Opens the destination for writing, unless the format does its own I/O.
    pub fn open_io(&mut self) -> Result<()> {
        if self.io_opened {
            return Ok(());
        }
        unsafe {
            let ctx = self.inner.as_mut_ptr();
            if (*(*ctx).oformat).flags & ffi::AVFMT_NOFILE as c_int == 0 {
                let ret = ffi::avio_open(
                    &mut (*ctx).pb,
                    self.c_path.as_ptr(),
                    ffi::AVIO_FLAG_WRITE as c_int,
                );
                if ret < 0 {
                    return Err(TranscodeError::Io {
                        path: self.path.clone(),
                        source: ffmpeg_next::Error::from(ret),
                    });
                }
            }
        }
        self.io_opened = true;
        Ok(())
    }

    pub fn write_header(&mut self) -> Result<()> {
        if self.have_written_header {
            return Ok(());
        }
        if log::log_enabled!(log::Level::Debug) {
            ffmpeg_next::format::context::output::dump(
                &self.inner,
                0,
                Some(&*self.path.to_string_lossy()),
            );
        }
        self.inner
            .write_header()
            .map_err(TranscodeError::HeaderWrite)?;
        self.have_written_header = true;
        log::info!("wrote header to {}", self.path.display());
        Ok(())
    }

    /// Time base the muxer settled on for stream `index`; only final after the header.
    pub fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.inner.stream(index).map(|s| s.time_base())
    }

    /// Rescales `packet` from its own time base to the stream's and writes it interleaved.
    pub fn write_packet(&mut self, stream_index: usize, mut packet: RawPacket) -> Result<()> {
        if !self.have_written_header {
            return Err(TranscodeError::HeaderNotWritten);
        }
        let out_time_base = self
            .stream_time_base(stream_index)
            .ok_or(TranscodeError::Mux(ffmpeg_next::Error::StreamNotFound))?;
        let time_base = packet.time_base();

        let p = packet.get_mut();
        p.set_stream(stream_index);
        p.set_position(-1);
        p.rescale_ts(time_base, out_time_base);
        p.write_interleaved(&mut self.inner)
            .map_err(TranscodeError::Mux)?;
        Ok(())
    }

    /// Writes the trailer if a header was written and no trailer yet. Returns whether a
    /// trailer was written by this call.
    pub fn finish(&mut self) -> Result<bool> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer().map_err(TranscodeError::Mux)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn header_written(&self) -> bool {
        self.have_written_header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
