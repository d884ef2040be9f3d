use ffmpeg_next::Rational;

use crate::{
    decoder::{DecoderSession, VideoParameters},
    dump::PictureDumper,
    encoder::EncoderSession,
    error::Result,
    frame::Picture,
    input::InputContainer,
};

/// What one run of the loop did.
#[derive(Debug, Clone)]
pub struct TranscodeReport {
    /// Parameters the decoder negotiated and the encoder was built from.
    pub parameters: VideoParameters,
    pub output_time_base: Option<Rational>,
    /// Every packet read from the input, including discarded ones.
    pub packets_read: u64,
    /// Packets on streams other than the selected one.
    pub packets_discarded: u64,
    pub pictures_decoded: u64,
    pub pictures_written: u64,
    pub packets_muxed: u64,
    /// The picture ceiling stopped the loop before the input ran out.
    pub limit_reached: bool,
}

/// Reads packets until end of stream or until `max_pictures` pictures have been written.
///
/// Packets of the decoder's stream are decoded and every completed picture is encoded and
/// muxed straight away, so output order is read order. Anything else is dropped. When the
/// input runs out below the ceiling, pictures still buffered in the decoder are written too;
/// the encoder is always flushed before returning.
pub fn run(
    input: &mut InputContainer,
    decoder: &mut DecoderSession,
    encoder: &mut EncoderSession,
    max_pictures: Option<u64>,
    mut dumper: Option<&mut PictureDumper>,
) -> Result<TranscodeReport> {
    let selected = decoder.stream_index();
    let mut report = TranscodeReport {
        parameters: *decoder.parameters(),
        output_time_base: encoder.output_time_base(),
        packets_read: 0,
        packets_discarded: 0,
        pictures_decoded: 0,
        pictures_written: 0,
        packets_muxed: 0,
        limit_reached: false,
    };
    let below_limit =
        |report: &TranscodeReport| max_pictures.is_none_or(|max| report.pictures_written < max);

    loop {
        if !below_limit(&report) {
            report.limit_reached = true;
            break;
        }
        let Some(packet) = input.read_packet() else {
            break;
        };
        report.packets_read += 1;

        if packet.index() != selected {
            report.packets_discarded += 1;
            continue;
        }
        log::debug!(
            "packet #{}: pts {:?}, size {}",
            report.packets_read,
            packet.pts(),
            packet.size()
        );
        if let Some(mut picture) = decoder.decode_packet(packet) {
            report.pictures_decoded += 1;
            write_picture(encoder, &mut picture, &mut report, dumper.as_deref_mut())?;
        }
    }

    if !report.limit_reached {
        while below_limit(&report) {
            let Some(mut picture) = decoder.flush() else {
                break;
            };
            report.pictures_decoded += 1;
            write_picture(encoder, &mut picture, &mut report, dumper.as_deref_mut())?;
        }
        report.limit_reached = !below_limit(&report);
    }

    report.packets_muxed += encoder.flush()? as u64;
    log::info!(
        "transcode finished: {} packets read ({} discarded), {} pictures written, {} packets muxed{}",
        report.packets_read,
        report.packets_discarded,
        report.pictures_written,
        report.packets_muxed,
        if report.limit_reached {
            ", picture limit reached"
        } else {
            ""
        }
    );
    Ok(report)
}

fn write_picture(
    encoder: &mut EncoderSession,
    picture: &mut Picture,
    report: &mut TranscodeReport,
    dumper: Option<&mut PictureDumper>,
) -> Result<()> {
    if let Some(dumper) = dumper {
        let path = dumper.dump(picture, report.pictures_written)?;
        log::debug!("dumped picture to {}", path.display());
    }
    report.packets_muxed += encoder.encode_and_mux(picture)? as u64;
    report.pictures_written += 1;
    Ok(())
}
