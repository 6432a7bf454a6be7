pub mod encoder;
pub mod pool;

pub use encoder::FfmpegEncoder;
pub use pool::{PoolSnapshot, TaskPool};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{AudioCodec, AudioFormat};
use crate::error::Result;
use crate::media::ToolOutput;

/// Everything one conversion needs; created at submission, discarded after
/// the result has been validated.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub temp_dir: PathBuf,
    pub extension: String,
    pub codec: AudioCodec,
    pub format: AudioFormat,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<String>,
    pub force: bool,
}

/// External encoder seam. Implementations turn one source file into one
/// destination file; the caller infers success from the destination existing
/// with non-zero size.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn convert(&self, options: &ConversionOptions) -> Result<ToolOutput>;
    fn name(&self) -> &'static str;
}

/// One file's conversion unit, executed by the task pool.
pub struct ConversionTask {
    index: usize,
    encoder: Arc<dyn Encoder>,
    options: ConversionOptions,
}

impl ConversionTask {
    pub fn new(index: usize, encoder: Arc<dyn Encoder>, options: ConversionOptions) -> Self {
        Self {
            index,
            encoder,
            options,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.options.destination
    }

    pub(crate) async fn run(self) -> TaskOutcome {
        let started = Instant::now();
        debug!(
            "converting {} with {}",
            self.options.source.display(),
            self.encoder.name()
        );

        let error = match self.encoder.convert(&self.options).await {
            Ok(output) if output.success => None,
            Ok(output) => {
                warn!(
                    "conversion of {} reported failure",
                    self.options.source.display()
                );
                Some(output.diagnostic)
            }
            Err(e) => {
                warn!("conversion of {} failed: {}", self.options.source.display(), e);
                Some(e.to_string())
            }
        };

        TaskOutcome {
            index: self.index,
            source: self.options.source,
            destination: self.options.destination,
            error,
            elapsed: started.elapsed(),
        }
    }
}

/// Terminal state of one conversion task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub index: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
