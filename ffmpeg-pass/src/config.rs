use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    decoder::{ContainerGuess, FrameRatePolicy},
    error::{Result, TranscodeError},
};

/// Pictures written before the loop stops, unless configured otherwise.
pub const DEFAULT_MAX_PICTURES: u64 = 100;

/// Everything one transcode run needs.
#[derive(Clone)]
pub struct TranscodeConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `None` runs until the input is exhausted.
    pub max_pictures: Option<u64>,
    pub frame_rate: Arc<dyn FrameRatePolicy>,
    /// Debug sink; each written picture is also saved as `frame<N>.ppm` here.
    pub dump_dir: Option<PathBuf>,
}

impl TranscodeConfig {
    pub fn builder() -> TranscodeConfigBuilder {
        TranscodeConfigBuilder::default()
    }
}

impl fmt::Debug for TranscodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeConfig")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("max_pictures", &self.max_pictures)
            .field("dump_dir", &self.dump_dir)
            .finish_non_exhaustive()
    }
}

pub struct TranscodeConfigBuilder {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    max_pictures: Option<u64>,
    frame_rate: Arc<dyn FrameRatePolicy>,
    dump_dir: Option<PathBuf>,
}

impl Default for TranscodeConfigBuilder {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            max_pictures: Some(DEFAULT_MAX_PICTURES),
            frame_rate: Arc::new(ContainerGuess),
            dump_dir: None,
        }
    }
}

impl TranscodeConfigBuilder {
    /// Set the file to read
    pub fn input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Set the file to write; its extension picks the container format
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn max_pictures(mut self, max: u64) -> Self {
        self.max_pictures = Some(max);
        self
    }

    /// Remove the picture ceiling
    pub fn unbounded(mut self) -> Self {
        self.max_pictures = None;
        self
    }

    pub fn frame_rate_policy(mut self, policy: impl FrameRatePolicy + 'static) -> Self {
        self.frame_rate = Arc::new(policy);
        self
    }

    pub fn dump_pictures_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<TranscodeConfig> {
        Ok(TranscodeConfig {
            input: self
                .input
                .ok_or_else(|| TranscodeError::Config("input file is required".to_string()))?,
            output: self
                .output
                .ok_or_else(|| TranscodeError::Config("output file is required".to_string()))?,
            max_pictures: self.max_pictures,
            frame_rate: self.frame_rate,
            dump_dir: self.dump_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() -> anyhow::Result<()> {
        let config = TranscodeConfig::builder()
            .input_file("in.y4m")
            .output_file("out.y4m")
            .build()?;
        assert_eq!(config.input, PathBuf::from("in.y4m"));
        assert_eq!(config.output, PathBuf::from("out.y4m"));
        assert_eq!(config.max_pictures, Some(DEFAULT_MAX_PICTURES));
        assert!(config.dump_dir.is_none());
        Ok(())
    }

    #[test]
    fn test_unbounded_clears_ceiling() -> anyhow::Result<()> {
        let config = TranscodeConfig::builder()
            .input_file("in.y4m")
            .output_file("out.y4m")
            .max_pictures(3)
            .unbounded()
            .build()?;
        assert_eq!(config.max_pictures, None);
        Ok(())
    }

    #[test]
    fn test_missing_paths_rejected() {
        let err = TranscodeConfig::builder().output_file("out.y4m").build();
        assert!(matches!(err, Err(TranscodeError::Config(_))));

        let err = TranscodeConfig::builder().input_file("in.y4m").build();
        assert!(matches!(err, Err(TranscodeError::Config(_))));
    }
}
