use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{AudioCodec, AudioFormat};
use crate::error::{MergeError, Result};

use super::{parse_silences, Silence, ToolOutput};

/// Minimum silence length passed to the detection filter.
pub const DEFAULT_SILENCE_MIN_LENGTH: Duration = Duration::from_millis(1750);

/// Noise floor for silence detection.
const SILENCE_NOISE_LEVEL: &str = "-30dB";

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        MergeError::Conversion(format!(
            "ffmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(MergeError::Conversion("ffmpeg check failed".to_string()));
    }

    debug!("ffmpeg is available");
    Ok(())
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe").arg("-version").output().map_err(|e| {
        MergeError::Conversion(format!(
            "ffprobe not found. Please install FFmpeg (includes ffprobe). Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(MergeError::Conversion("ffprobe check failed".to_string()));
    }

    debug!("ffprobe is available");
    Ok(())
}

/// Get the stream duration of an audio file.
pub fn probe_duration(input: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(|e| MergeError::Conversion(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MergeError::Conversion(format!("ffprobe failed: {stderr}")));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration_secs: f64 = duration_str.trim().parse().map_err(|e| {
        MergeError::Conversion(format!(
            "Failed to parse duration '{}': {e}",
            duration_str.trim()
        ))
    })?;

    Ok(Duration::from_secs_f64(duration_secs))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Read the container-level tags of an audio file, keys lowercased.
pub fn probe_tags(input: &Path) -> Result<HashMap<String, String>> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_format",
            "-print_format",
            "json",
        ])
        .arg(input)
        .output()
        .map_err(|e| MergeError::Conversion(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MergeError::Conversion(format!("ffprobe failed: {stderr}")));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    let tags = parsed
        .format
        .map(|f| f.tags)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    Ok(tags)
}

/// Probe a source file into an [`AudioFile`](super::AudioFile) with its
/// duration and embedded title.
pub fn probe_audio_file(input: &Path) -> Result<super::AudioFile> {
    let duration = probe_duration(input)?;
    let title = probe_tags(input)
        .unwrap_or_default()
        .remove("title")
        .filter(|t| !t.trim().is_empty());

    Ok(super::AudioFile {
        path: input.to_path_buf(),
        extension: input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase(),
        duration,
        title,
    })
}

/// Concatenate the files listed in a manifest into one output using stream copy.
///
/// The manifest must contain `file '<path>'` lines as understood by the concat
/// demuxer. The container format hint is omitted for ALAC, which fits the mp4
/// container but is not declared compliant by the tool.
pub async fn concat_files(
    manifest: &Path,
    destination: &Path,
    format: Option<AudioFormat>,
    codec: AudioCodec,
) -> Result<ToolOutput> {
    let mut command = tokio::process::Command::new("ffmpeg");
    command
        .args(["-f", "concat", "-safe", "0", "-vn", "-i"])
        .arg(manifest)
        .args(["-max_muxing_queue_size", "9999", "-c", "copy"]);

    if let Some(format) = format {
        if codec != AudioCodec::Alac {
            command.args(["-f", &format.to_string()]);
        }
    }

    command.arg(destination);

    info!("merging to {}, this can take a while", destination.display());

    let output = command
        .output()
        .await
        .map_err(|e| MergeError::Merge(format!("Failed to run ffmpeg: {e}")))?;

    let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() || !destination.exists() {
        return Ok(ToolOutput::failed(diagnostic));
    }

    Ok(ToolOutput::succeeded(destination.to_path_buf(), diagnostic))
}

/// Run silence detection over an audio file and return the ordered intervals.
pub async fn detect_silences(input: &Path, min_length: Duration) -> Result<Vec<Silence>> {
    let filter = format!(
        "silencedetect=noise={}:d={:.3}",
        SILENCE_NOISE_LEVEL,
        min_length.as_secs_f64()
    );

    debug!("detecting silences in {}", input.display());

    let output = tokio::process::Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args(["-af", &filter, "-f", "null", "-"])
        .output()
        .await
        .map_err(|e| MergeError::Merge(format!("Failed to run ffmpeg: {e}")))?;

    // silencedetect reports on stderr regardless of exit status
    let stderr = String::from_utf8_lossy(&output.stderr);
    let silences = parse_silences(&stderr);

    debug!("detected {} silences", silences.len());
    Ok(silences)
}

/// Remux a file with a prepared metadata file (and optional cover image),
/// copying all streams into the destination.
pub async fn remux_with_metadata(
    audio: &Path,
    metadata_file: &Path,
    cover: Option<&Path>,
    format: Option<AudioFormat>,
    destination: &Path,
) -> Result<ToolOutput> {
    let mut command = tokio::process::Command::new("ffmpeg");
    command.arg("-i").arg(audio).arg("-i").arg(metadata_file);

    if let Some(cover) = cover {
        command.arg("-i").arg(cover);
    }

    command.args(["-map_metadata", "1", "-map_chapters", "1", "-map", "0:a"]);

    if cover.is_some() {
        command.args(["-map", "2:0", "-disposition:v:0", "attached_pic"]);
    }

    command.args(["-c", "copy"]);

    if let Some(format) = format {
        command.args(["-f", &format.to_string()]);
    }

    command.arg("-y").arg(destination);

    let output = command
        .output()
        .await
        .map_err(|e| MergeError::Merge(format!("Failed to run ffmpeg: {e}")))?;

    let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() || !destination.exists() {
        return Ok(ToolOutput::failed(diagnostic));
    }

    Ok(ToolOutput::succeeded(destination.to_path_buf(), diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_ffmpeg() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: ffmpeg not available");
            return;
        }
        assert!(check_ffmpeg().is_ok());
    }

    #[test]
    fn test_probe_duration_missing_file() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: ffmpeg not available");
            return;
        }
        assert!(probe_duration(Path::new("/nonexistent/file.mp3")).is_err());
    }
}
