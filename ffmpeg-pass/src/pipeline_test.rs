use std::io::Write;
use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::config::TranscodeConfig;
use crate::decoder::{Fixed, StreamAverage};
use crate::error::TranscodeError;
use crate::metadata::probe;
use crate::pipeline::{Pipeline, ReleaseStep, transcode};

const WIDTH: usize = 64;
const HEIGHT: usize = 48;

/// Writes a 25 fps 4:2:0 YUV4MPEG2 file whose n-th picture has every luma sample set to n.
fn write_y4m(path: &Path, frames: usize) -> anyhow::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write!(
        file,
        "YUV4MPEG2 W{} H{} F25:1 Ip A1:1 C420jpeg\n",
        WIDTH, HEIGHT
    )?;
    let chroma = vec![128u8; (WIDTH / 2) * (HEIGHT / 2)];
    for n in 0..frames {
        file.write_all(b"FRAME\n")?;
        file.write_all(&vec![n as u8; WIDTH * HEIGHT])?;
        file.write_all(&chroma)?;
        file.write_all(&chroma)?;
    }
    file.flush()?;
    Ok(())
}

/// One second of 8 kHz mono silence: a valid container without any video.
fn write_wav(path: &Path) -> anyhow::Result<()> {
    let samples = 8000u32;
    let data_len = samples * 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&16000u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Muxes `frames` raw 4:2:0 pictures (luma set to the picture index) interleaved with one
/// 40 ms block of 8 kHz mono PCM per picture into a NUT file.
fn write_nut_with_audio(path: &Path, frames: usize) -> anyhow::Result<()> {
    use ffmpeg_next::{codec, ffi, format};

    crate::init()?;
    let video_tb = Rational::new(1, 25);
    let audio_tb = Rational::new(1, 8000);
    let samples_per_block = 320;

    let mut octx = format::output(path)?;
    {
        let mut video = octx.add_stream(ffmpeg_next::encoder::find(codec::Id::RAWVIDEO))?;
        video.set_time_base(video_tb);
        unsafe {
            let par = (*video.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_RAWVIDEO;
            (*par).width = WIDTH as i32;
            (*par).height = HEIGHT as i32;
            (*par).format = ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;
            (*par).codec_tag =
                ffi::avcodec_pix_fmt_to_codec_tag(ffi::AVPixelFormat::AV_PIX_FMT_YUV420P);
        }
    }
    {
        let mut audio = octx.add_stream(ffmpeg_next::encoder::find(codec::Id::PCM_S16LE))?;
        audio.set_time_base(audio_tb);
        unsafe {
            let par = (*audio.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
            (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_PCM_S16LE;
            (*par).sample_rate = 8000;
            (*par).format = ffi::AVSampleFormat::AV_SAMPLE_FMT_S16 as i32;
            (*par).bits_per_coded_sample = 16;
            (*par).block_align = 2;
            ffi::av_channel_layout_default(&mut (*par).ch_layout, 1);
        }
    }
    octx.write_header()?;

    let video_out_tb = octx
        .stream(0)
        .map(|s| s.time_base())
        .ok_or_else(|| anyhow::anyhow!("missing video stream"))?;
    let audio_out_tb = octx
        .stream(1)
        .map(|s| s.time_base())
        .ok_or_else(|| anyhow::anyhow!("missing audio stream"))?;

    let chroma = vec![128u8; (WIDTH / 2) * (HEIGHT / 2)];
    for n in 0..frames {
        let mut picture = vec![n as u8; WIDTH * HEIGHT];
        picture.extend_from_slice(&chroma);
        picture.extend_from_slice(&chroma);
        let mut packet = ffmpeg_next::Packet::copy(&picture);
        packet.set_stream(0);
        packet.set_pts(Some(n as i64));
        packet.set_dts(Some(n as i64));
        packet.set_duration(1);
        packet.rescale_ts(video_tb, video_out_tb);
        packet.write_interleaved(&mut octx)?;

        let mut packet = ffmpeg_next::Packet::copy(&vec![0u8; samples_per_block * 2]);
        let start = (n * samples_per_block) as i64;
        packet.set_stream(1);
        packet.set_pts(Some(start));
        packet.set_dts(Some(start));
        packet.set_duration(samples_per_block as i64);
        packet.rescale_ts(audio_tb, audio_out_tb);
        packet.write_interleaved(&mut octx)?;
    }
    octx.write_trailer()?;
    Ok(())
}

struct Y4mOutput {
    header: String,
    frames: Vec<Vec<u8>>,
}

/// Splits a YUV4MPEG2 file into its stream header and the payload of each FRAME record.
fn read_y4m(path: &Path) -> anyhow::Result<Y4mOutput> {
    let bytes = std::fs::read(path)?;
    let header_end = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| anyhow::anyhow!("no y4m header in {}", path.display()))?;
    let header = String::from_utf8(bytes[..header_end].to_vec())?;
    anyhow::ensure!(header.starts_with("YUV4MPEG2 "), "bad magic: {}", header);

    let frame_size = WIDTH * HEIGHT * 3 / 2;
    let mut frames = Vec::new();
    let mut pos = header_end + 1;
    while pos < bytes.len() {
        anyhow::ensure!(bytes[pos..].starts_with(b"FRAME"), "no FRAME at {}", pos);
        let line_end = bytes[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| anyhow::anyhow!("unterminated FRAME line"))?;
        pos += line_end + 1;
        anyhow::ensure!(pos + frame_size <= bytes.len(), "truncated frame");
        frames.push(bytes[pos..pos + frame_size].to_vec());
        pos += frame_size;
    }
    Ok(Y4mOutput { header, frames })
}

fn header_field<'a>(header: &'a str, key: char) -> Option<&'a str> {
    header.split(' ').find_map(|f| f.strip_prefix(key))
}

fn fixture(dir: &Path, frames: usize) -> anyhow::Result<PathBuf> {
    let input = dir.join("input.y4m");
    write_y4m(&input, frames)?;
    Ok(input)
}

#[test]
fn test_writes_every_picture_below_ceiling() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 10)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;
    let mut pipeline = Pipeline::open(config)?;
    let report = pipeline.run()?;
    assert_eq!(report.packets_read, 10);
    assert_eq!(report.packets_discarded, 0);
    assert_eq!(report.pictures_decoded, 10);
    assert_eq!(report.pictures_written, 10);
    assert_eq!(report.packets_muxed, 10);
    assert!(!report.limit_reached);

    let steps = pipeline.teardown();
    assert_eq!(
        steps,
        vec![
            ReleaseStep::Trailer,
            ReleaseStep::Decoder,
            ReleaseStep::Encoder,
            ReleaseStep::Input,
            ReleaseStep::Output,
        ]
    );
    assert!(pipeline.teardown().is_empty());

    let written = read_y4m(&output)?;
    assert_eq!(written.frames.len(), 10);
    Ok(())
}

#[test]
fn test_stops_at_picture_ceiling() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 50)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .max_pictures(3)
        .build()?;
    let report = transcode(config)?;
    assert_eq!(report.pictures_written, 3);
    assert_eq!(report.packets_read, 3);
    assert!(report.limit_reached);

    assert_eq!(read_y4m(&output)?.frames.len(), 3);
    Ok(())
}

#[test]
fn test_unbounded_reads_whole_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 120)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .unbounded()
        .build()?;
    let report = transcode(config)?;
    assert_eq!(report.pictures_written, 120);
    assert!(!report.limit_reached);
    assert_eq!(read_y4m(&output)?.frames.len(), 120);
    Ok(())
}

#[test]
fn test_pictures_keep_read_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 12)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;
    transcode(config)?;

    let written = read_y4m(&output)?;
    for (n, frame) in written.frames.iter().enumerate() {
        assert!(
            frame[..WIDTH * HEIGHT].iter().all(|y| *y == n as u8),
            "picture {} out of order",
            n
        );
    }
    Ok(())
}

#[test]
fn test_output_matches_decoder_parameters() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 5)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;
    let mut pipeline = Pipeline::open(config)?;

    let stream = pipeline
        .video_stream()
        .ok_or_else(|| anyhow::anyhow!("no stream selected"))?;
    assert_eq!(stream.index(), 0);
    let parameters = *pipeline
        .decoder()
        .ok_or_else(|| anyhow::anyhow!("no decoder"))?
        .parameters();
    assert_eq!(parameters.width, WIDTH as u32);
    assert_eq!(parameters.height, HEIGHT as u32);
    assert_eq!(parameters.format, ffmpeg_next::format::Pixel::YUV420P);
    assert_eq!(parameters.frame_rate.numerator(), 25);
    assert_eq!(parameters.frame_rate.denominator(), 1);

    let encoder = pipeline
        .encoder()
        .ok_or_else(|| anyhow::anyhow!("no encoder"))?;
    assert!(encoder.header_written());
    let time_base = encoder.encoder_time_base();
    assert_eq!((time_base.numerator(), time_base.denominator()), (1, 25));

    let report = pipeline.run()?;
    let out_tb = report
        .output_time_base
        .ok_or_else(|| anyhow::anyhow!("no output stream"))?;
    assert_eq!((out_tb.numerator(), out_tb.denominator()), (1, 25));
    pipeline.teardown();

    let written = read_y4m(&output)?;
    assert_eq!(header_field(&written.header, 'W'), Some("64"));
    assert_eq!(header_field(&written.header, 'H'), Some("48"));
    assert_eq!(header_field(&written.header, 'F'), Some("25:1"));
    assert_eq!(header_field(&written.header, 'A'), Some("1:1"));
    Ok(())
}

#[test]
fn test_same_input_gives_identical_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 8)?;
    let first = dir.path().join("first.y4m");
    let second = dir.path().join("second.y4m");

    for output in [&first, &second] {
        let config = TranscodeConfig::builder()
            .input_file(&input)
            .output_file(output)
            .build()?;
        transcode(config)?;
    }
    assert_eq!(std::fs::read(&first)?, std::fs::read(&second)?);
    Ok(())
}

#[test]
fn test_input_without_video_stream() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("silence.wav");
    write_wav(&input)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;
    let err = transcode(config).err();
    assert!(matches!(err, Some(TranscodeError::StreamNotFound)), "{:?}", err);
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_unreadable_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output.y4m");

    let missing = dir.path().join("missing.y4m");
    let config = TranscodeConfig::builder()
        .input_file(&missing)
        .output_file(&output)
        .build()?;
    let err = transcode(config).err();
    assert!(matches!(err, Some(TranscodeError::Open { .. })), "{:?}", err);

    let garbage = dir.path().join("garbage.bin");
    std::fs::write(&garbage, "not a media file\n".repeat(64))?;
    let config = TranscodeConfig::builder()
        .input_file(&garbage)
        .output_file(&output)
        .build()?;
    let err = transcode(config).err();
    assert!(
        matches!(
            err,
            Some(
                TranscodeError::Open { .. }
                    | TranscodeError::StreamInfo(_)
                    | TranscodeError::StreamNotFound
            )
        ),
        "{:?}",
        err
    );
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_unknown_output_format() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 2)?;
    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(dir.path().join("output.nosuchformat"))
        .build()?;

    crate::init()?;
    let mut pipeline = Pipeline::empty(config);
    let err = pipeline.initialize().err();
    assert!(matches!(err, Some(TranscodeError::Allocation { .. })), "{:?}", err);
    assert_eq!(
        pipeline.teardown(),
        vec![ReleaseStep::Decoder, ReleaseStep::Input]
    );
    assert!(pipeline.teardown().is_empty());
    Ok(())
}

#[test]
fn test_no_trailer_without_header() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 2)?;
    let output = dir.path().join("no").join("such").join("dir").join("output.y4m");
    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;

    crate::init()?;
    let mut pipeline = Pipeline::empty(config);
    let err = pipeline.initialize().err();
    assert!(matches!(err, Some(TranscodeError::Io { .. })), "{:?}", err);
    assert!(!pipeline.encoder().is_some_and(|e| e.header_written()));
    assert_eq!(
        pipeline.teardown(),
        vec![
            ReleaseStep::Decoder,
            ReleaseStep::Input,
            ReleaseStep::Output
        ]
    );
    assert!(pipeline.teardown().is_empty());
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_run_after_teardown() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 2)?;
    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(dir.path().join("output.y4m"))
        .build()?;

    let mut pipeline = Pipeline::open(config)?;
    pipeline.teardown();
    assert!(matches!(pipeline.run(), Err(TranscodeError::NotInitialized)));
    Ok(())
}

#[test]
fn test_frame_rate_policies() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 4)?;

    let fixed = dir.path().join("fixed.y4m");
    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&fixed)
        .frame_rate_policy(Fixed(Rational::new(10, 1)))
        .build()?;
    let report = transcode(config)?;
    assert_eq!(report.parameters.frame_rate.numerator(), 10);
    assert_eq!(report.pictures_written, 4);
    assert_eq!(header_field(&read_y4m(&fixed)?.header, 'F'), Some("10:1"));

    let average = dir.path().join("average.y4m");
    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&average)
        .frame_rate_policy(StreamAverage)
        .build()?;
    transcode(config)?;
    assert_eq!(header_field(&read_y4m(&average)?.header, 'F'), Some("25:1"));

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(dir.path().join("zero.y4m"))
        .frame_rate_policy(Fixed(Rational::new(0, 1)))
        .build()?;
    let err = transcode(config).err();
    assert!(matches!(err, Some(TranscodeError::ParameterCopy(_))), "{:?}", err);
    Ok(())
}

#[test]
fn test_dump_pictures() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 3)?;
    let dumps = dir.path().join("frames");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(dir.path().join("output.y4m"))
        .dump_pictures_to(&dumps)
        .build()?;
    transcode(config)?;

    let header = format!("P6\n{} {}\n255\n", WIDTH, HEIGHT);
    for n in 0..3 {
        let bytes = std::fs::read(dumps.join(format!("frame{}.ppm", n)))?;
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(bytes.len(), header.len() + WIDTH * HEIGHT * 3);
    }
    assert!(!dumps.join("frame3.ppm").exists());
    Ok(())
}

#[test]
fn test_probe_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 5)?;

    let info = probe(&input)?;
    assert_eq!(info.format.format_name, "yuv4mpegpipe");
    assert_eq!(info.format.nb_streams, 1);
    let video: Vec<_> = info.video_streams().collect();
    assert_eq!(video.len(), 1);
    assert_eq!(video[0].width, Some(WIDTH as u32));
    assert_eq!(video[0].height, Some(HEIGHT as u32));
    assert_eq!(video[0].codec_name, "rawvideo");
    Ok(())
}

#[test]
fn test_other_streams_are_discarded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.nut");
    write_nut_with_audio(&input, 10)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .frame_rate_policy(Fixed(Rational::new(25, 1)))
        .build()?;
    let report = transcode(config)?;
    assert_eq!(report.pictures_written, 10);
    assert_eq!(report.packets_discarded, 10);
    assert_eq!(report.packets_read, 20);

    let written = read_y4m(&output)?;
    assert_eq!(written.frames.len(), 10);
    for (n, frame) in written.frames.iter().enumerate() {
        assert!(
            frame[..WIDTH * HEIGHT].iter().all(|y| *y == n as u8),
            "picture {} out of order",
            n
        );
    }
    Ok(())
}

#[test]
fn test_truncated_input_gives_complete_pictures() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = fixture(dir.path(), 6)?;
    let full = std::fs::metadata(&input)?.len();
    let cut = (WIDTH * HEIGHT) as u64;
    std::fs::OpenOptions::new()
        .write(true)
        .open(&input)?
        .set_len(full - cut)?;
    let output = dir.path().join("output.y4m");

    let config = TranscodeConfig::builder()
        .input_file(&input)
        .output_file(&output)
        .build()?;
    let mut pipeline = Pipeline::open(config)?;
    let report = pipeline.run()?;
    assert_eq!(report.pictures_written, 5);
    assert!(!report.limit_reached);
    assert_eq!(pipeline.teardown().first(), Some(&ReleaseStep::Trailer));

    let written = read_y4m(&output)?;
    assert_eq!(written.frames.len(), 5);
    assert_eq!(header_field(&written.header, 'W'), Some("64"));
    for (n, frame) in written.frames.iter().enumerate() {
        assert_eq!(frame[0], n as u8);
    }
    Ok(())
}
