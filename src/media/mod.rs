pub mod ffmpeg;
pub mod parse;

pub use ffmpeg::{
    check_ffmpeg, check_ffprobe, concat_files, detect_silences, probe_audio_file, probe_duration,
    probe_tags, remux_with_metadata,
};
pub use parse::{parse_chapters_txt, parse_ffmetadata, parse_silences};

use std::path::PathBuf;
use std::time::Duration;

/// A single audio input file with the metadata needed for chapter synthesis.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    pub extension: String,
    pub duration: Duration,
    pub title: Option<String>,
}

impl AudioFile {
    /// Title derived from the file name, used when no tag title is available.
    pub fn filename_title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A detected low-amplitude interval in the merged stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Silence {
    pub start: Duration,
    pub length: Duration,
}

impl Silence {
    pub fn end(&self) -> Duration {
        self.start + self.length
    }

    /// Center of the interval, used as the candidate split point.
    pub fn midpoint(&self) -> Duration {
        self.start + self.length / 2
    }
}

/// Outcome of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub produced: Option<PathBuf>,
    pub diagnostic: String,
}

impl ToolOutput {
    pub fn succeeded(produced: PathBuf, diagnostic: String) -> Self {
        Self {
            success: true,
            produced: Some(produced),
            diagnostic,
        }
    }

    pub fn failed(diagnostic: String) -> Self {
        Self {
            success: false,
            produced: None,
            diagnostic,
        }
    }
}
