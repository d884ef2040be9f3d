use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ffmpeg_pass::{
    ContainerGuess, DEFAULT_MAX_PICTURES, Fixed, Rational, StreamAverage, TranscodeConfig,
    config::TranscodeConfigBuilder, metadata,
};

/// Decode the best video stream of INPUT and write every picture, unchanged, into OUTPUT.
#[derive(Parser, Debug)]
#[command(name = "lite-transcode", version)]
struct Args {
    /// Input media file; the container format is detected.
    input: PathBuf,

    /// Output file; its extension picks the container format (e.g. `.y4m`, `.nut`).
    #[arg(required_unless_present = "probe")]
    output: Option<PathBuf>,

    /// Stop after this many pictures.
    #[arg(long, default_value_t = DEFAULT_MAX_PICTURES)]
    max_pictures: u64,

    /// Ignore --max-pictures and transcode the whole input.
    #[arg(long)]
    unbounded: bool,

    /// Frame rate used when negotiating the stream: guess, average, or NUM/DEN.
    #[arg(long, default_value = "guess")]
    frame_rate: FrameRateArg,

    /// Also save every written picture as frame<N>.ppm in this directory.
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Print the input's streams and exit.
    #[arg(long)]
    probe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameRateArg {
    Guess,
    Average,
    Fixed(Rational),
}

impl FromStr for FrameRateArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "guess" => Ok(Self::Guess),
            "average" => Ok(Self::Average),
            _ => {
                let (num, den) = s
                    .split_once('/')
                    .map(|(n, d)| (n.trim(), d.trim()))
                    .unwrap_or((s.trim(), "1"));
                let num: i32 = num.parse().context("frame rate numerator")?;
                let den: i32 = den.parse().context("frame rate denominator")?;
                if num <= 0 || den <= 0 {
                    bail!("frame rate must be positive: {}", s);
                }
                Ok(Self::Fixed(Rational::new(num, den)))
            }
        }
    }
}

impl FrameRateArg {
    fn apply(self, builder: TranscodeConfigBuilder) -> TranscodeConfigBuilder {
        match self {
            Self::Guess => builder.frame_rate_policy(ContainerGuess),
            Self::Average => builder.frame_rate_policy(StreamAverage),
            Self::Fixed(rate) => builder.frame_rate_policy(Fixed(rate)),
        }
    }
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pass", log::LevelFilter::Info)
        .filter_module("lite_transcode", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn build_config(args: &Args) -> Result<TranscodeConfig> {
    let output = args
        .output
        .as_ref()
        .context("OUTPUT is required unless --probe is given")?;
    let mut builder = TranscodeConfig::builder()
        .input_file(&args.input)
        .output_file(output)
        .max_pictures(args.max_pictures);
    if args.unbounded {
        builder = builder.unbounded();
    }
    if let Some(dir) = &args.dump_dir {
        builder = builder.dump_pictures_to(dir);
    }
    Ok(args.frame_rate.apply(builder).build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if args.probe {
        let input = args.input.clone();
        let info = tokio::task::spawn_blocking(move || metadata::probe(&input))
            .await?
            .with_context(|| format!("probing {}", args.input.display()))?;
        print!("{}", info);
        return Ok(());
    }

    let config = build_config(&args)?;
    log::info!("transcoding {:?}", config);
    let report = tokio::task::spawn_blocking(move || ffmpeg_pass::transcode(config))
        .await?
        .with_context(|| format!("transcoding {}", args.input.display()))?;

    log::info!(
        "wrote {} pictures ({} packets) at {}x{}, frame rate {}{}",
        report.pictures_written,
        report.packets_muxed,
        report.parameters.width,
        report.parameters.height,
        report.parameters.frame_rate,
        if report.limit_reached {
            ", stopped at picture limit"
        } else {
            ""
        }
    );
    Ok(())
}
