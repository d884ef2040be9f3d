//! Debug sink: writes decoded pictures out as binary PPM images for manual inspection.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ffmpeg_next::format::Pixel;

use crate::{
    error::{Result, TranscodeError},
    frame::Picture,
    scaler::Scaler,
};

/// Writes `frame<N>.ppm` files into a directory, converting to RGB24 as needed.
pub struct PictureDumper {
    dir: PathBuf,
    scaler: Option<Scaler>,
}

impl PictureDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| TranscodeError::Dump {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, scaler: None })
    }

    /// Dumps `picture` as `frame<index>.ppm` and returns the file written.
    pub fn dump(&mut self, picture: &Picture, index: u64) -> Result<PathBuf> {
        let path = self.dir.join(format!("frame{}.ppm", index));
        let frame = picture.as_video();

        if frame.format() == Pixel::RGB24 {
            write_ppm(&path, frame)?;
            return Ok(path);
        }

        if !self.scaler.as_ref().is_some_and(|s| s.matches(frame)) {
            self.scaler = Some(Scaler::new(
                frame.format(),
                frame.width(),
                frame.height(),
                Pixel::RGB24,
            )?);
        }
        let mut rgb = ffmpeg_next::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(frame, &mut rgb)?;
        }
        write_ppm(&path, &rgb)?;
        Ok(path)
    }
}

/// `P6` header followed by `width * 3` bytes per row; row padding is dropped.
fn write_ppm(path: &Path, frame: &ffmpeg_next::frame::Video) -> Result<()> {
    let io_error = |source| TranscodeError::Dump {
        path: path.to_path_buf(),
        source,
    };
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
    write!(out, "P6\n{} {}\n255\n", width, height).map_err(io_error)?;
    for y in 0..height {
        let row = &data[y * stride..y * stride + width * 3];
        out.write_all(row).map_err(io_error)?;
    }
    out.flush().map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_picture_written_without_padding() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut frame = ffmpeg_next::frame::Video::new(Pixel::RGB24, 3, 2);
        let stride = frame.stride(0);
        for y in 0..2 {
            for x in 0..9 {
                frame.data_mut(0)[y * stride + x] = (y * 9 + x) as u8;
            }
        }

        let mut dumper = PictureDumper::new(dir.path())?;
        let path = dumper.dump(&Picture::from(frame), 7)?;
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("frame7.ppm"));

        let bytes = std::fs::read(&path)?;
        let header = b"P6\n3 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        let pixels: Vec<u8> = (0..18).collect();
        assert_eq!(&bytes[header.len()..], &pixels[..]);
        Ok(())
    }
}
