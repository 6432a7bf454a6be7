use async_trait::async_trait;
use tracing::debug;

use crate::config::AudioCodec;
use crate::error::{MergeError, Result};
use crate::media::ToolOutput;

use super::{ConversionOptions, Encoder};

/// FFmpeg-backed encoder used for all file conversions.
#[derive(Debug, Default)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn convert(&self, options: &ConversionOptions) -> Result<ToolOutput> {
        // a stale destination from an interrupted run would make the output
        // validation pass vacuously
        if options.destination.exists() {
            std::fs::remove_file(&options.destination)?;
        }

        let mut command = tokio::process::Command::new("ffmpeg");
        command.arg("-i").arg(&options.source).arg("-vn");
        command.args(["-acodec", options.codec.encoder_name()]);

        if let Some(channels) = options.channels {
            command.args(["-ac", &channels.to_string()]);
        }
        if let Some(sample_rate) = options.sample_rate {
            command.args(["-ar", &sample_rate.to_string()]);
        }
        if let Some(ref bit_rate) = options.bit_rate {
            command.args(["-ab", bit_rate]);
        }

        // alac fits the container but the tool refuses the explicit flag
        if options.codec != AudioCodec::Alac {
            command.args(["-f", &options.format.to_string()]);
        }

        command.arg(&options.destination);

        debug!(
            "encoding {} -> {}",
            options.source.display(),
            options.destination.display()
        );

        let output = command
            .output()
            .await
            .map_err(|e| MergeError::Conversion(format!("Failed to run ffmpeg: {e}")))?;

        let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() || !options.destination.exists() {
            return Ok(ToolOutput::failed(diagnostic));
        }

        Ok(ToolOutput::succeeded(
            options.destination.clone(),
            diagnostic,
        ))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
