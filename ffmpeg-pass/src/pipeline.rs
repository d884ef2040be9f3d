use crate::{
    config::TranscodeConfig,
    decoder::DecoderSession,
    dump::PictureDumper,
    encoder::EncoderSession,
    error::{Result, TranscodeError},
    input::InputContainer,
    stream::StreamDescriptor,
    transcode::{self, TranscodeReport},
};

/// One release performed by [`Pipeline::teardown`], in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    Trailer,
    Decoder,
    Encoder,
    Input,
    Output,
}

/// Owns every handle of a single input-to-output run.
///
/// Each handle sits in its own slot and is filled as initialization progresses, so a
/// failure at any stage leaves exactly the handles acquired so far for `teardown`.
pub struct Pipeline {
    config: TranscodeConfig,
    input: Option<InputContainer>,
    video_stream: Option<StreamDescriptor>,
    decoder: Option<DecoderSession>,
    encoder: Option<EncoderSession>,
}

impl Pipeline {
    fn empty(config: TranscodeConfig) -> Self {
        Self {
            config,
            input: None,
            video_stream: None,
            decoder: None,
            encoder: None,
        }
    }

    /// Opens the input, picks its video stream, opens the decoder and then the encoder and
    /// output. On failure whatever was acquired is released before the error is returned.
    pub fn open(config: TranscodeConfig) -> Result<Self> {
        crate::init()?;
        let mut pipeline = Self::empty(config);
        if let Err(e) = pipeline.initialize() {
            log::error!("pipeline initialization failed: {}", e);
            pipeline.teardown();
            return Err(e);
        }
        Ok(pipeline)
    }

    fn initialize(&mut self) -> Result<()> {
        let input = self
            .input
            .insert(InputContainer::open(&self.config.input)?);
        input.probe_streams()?;
        let stream = self.video_stream.insert(input.select_video_stream()?);

        let decoder = self.decoder.insert(DecoderSession::open(
            input,
            stream,
            self.config.frame_rate.as_ref(),
        )?);

        let parameters = *decoder.parameters();
        let timing = input.timing();
        let encoder = self
            .encoder
            .insert(EncoderSession::allocate(&self.config.output)?);
        encoder.configure(&parameters, Some(timing))
    }

    /// Runs the transcode loop over the opened handles.
    pub fn run(&mut self) -> Result<TranscodeReport> {
        let (Some(input), Some(decoder), Some(encoder)) = (
            self.input.as_mut(),
            self.decoder.as_mut(),
            self.encoder.as_mut(),
        ) else {
            return Err(TranscodeError::NotInitialized);
        };

        let mut dumper = match &self.config.dump_dir {
            Some(dir) => Some(PictureDumper::new(dir)?),
            None => None,
        };
        transcode::run(
            input,
            decoder,
            encoder,
            self.config.max_pictures,
            dumper.as_mut(),
        )
    }

    /// Releases everything still held, in order: trailer (only after a header), decoder,
    /// encoder, input, output. Returns the steps actually performed; calling it again
    /// performs none.
    pub fn teardown(&mut self) -> Vec<ReleaseStep> {
        let mut steps = Vec::new();

        if let Some(encoder) = self.encoder.as_mut() {
            match encoder.write_trailer() {
                Ok(true) => steps.push(ReleaseStep::Trailer),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("failed to write trailer: {}", e);
                    steps.push(ReleaseStep::Trailer);
                }
            }
        }
        if self.decoder.take().is_some() {
            steps.push(ReleaseStep::Decoder);
        }
        if let Some(encoder) = self.encoder.as_mut() {
            if encoder.release_encoder() {
                steps.push(ReleaseStep::Encoder);
            }
        }
        self.video_stream = None;
        if let Some(input) = self.input.take() {
            log::debug!("closing input {}", input.path().display());
            steps.push(ReleaseStep::Input);
        }
        if let Some(mut encoder) = self.encoder.take() {
            if encoder.release_output() {
                steps.push(ReleaseStep::Output);
            }
        }

        if !steps.is_empty() {
            log::info!("pipeline torn down: {:?}", steps);
        }
        steps
    }

    pub fn video_stream(&self) -> Option<&StreamDescriptor> {
        self.video_stream.as_ref()
    }

    pub fn decoder(&self) -> Option<&DecoderSession> {
        self.decoder.as_ref()
    }

    pub fn encoder(&self) -> Option<&EncoderSession> {
        self.encoder.as_ref()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Opens, runs and tears down a pipeline. Teardown happens whether or not the run
/// succeeded.
pub fn transcode(config: TranscodeConfig) -> Result<TranscodeReport> {
    let mut pipeline = Pipeline::open(config)?;
    let result = pipeline.run();
    pipeline.teardown();
    result
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
