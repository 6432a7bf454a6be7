use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default audio file extensions considered as merge input.
pub const DEFAULT_INCLUDE_EXTENSIONS: &str = "aac,alac,flac,m4a,m4b,mp3,oga,ogg,wav,wma,mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp4,
    Mp3,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioFormat::Mp4 => write!(f, "mp4"),
            AudioFormat::Mp3 => write!(f, "mp3"),
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(AudioFormat::Mp4),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(format!("Unknown audio format: {}. Use 'mp4' or 'mp3'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Alac,
    Mp3,
}

impl AudioCodec {
    /// Encoder name as passed to the external tool.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Alac => "alac",
            AudioCodec::Mp3 => "libmp3lame",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::Aac => write!(f, "aac"),
            AudioCodec::Alac => write!(f, "alac"),
            AudioCodec::Mp3 => write!(f, "mp3"),
        }
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aac" => Ok(AudioCodec::Aac),
            "alac" => Ok(AudioCodec::Alac),
            "mp3" | "libmp3lame" => Ok(AudioCodec::Mp3),
            _ => Err(format!(
                "Unknown audio codec: {}. Use 'aac', 'alac' or 'mp3'",
                s
            )),
        }
    }
}

/// Map a destination file extension to its container format.
pub fn format_for_extension(extension: &str) -> Option<AudioFormat> {
    match extension.to_lowercase().as_str() {
        "m4b" | "m4a" | "m4r" | "mp4" => Some(AudioFormat::Mp4),
        "mp3" => Some(AudioFormat::Mp3),
        _ => None,
    }
}

/// Default codec for a container format.
pub fn codec_for_format(format: AudioFormat) -> AudioCodec {
    match format {
        AudioFormat::Mp4 => AudioCodec::Aac,
        AudioFormat::Mp3 => AudioCodec::Mp3,
    }
}

/// Tool defaults loadable from a config file, overridable by environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub jobs: usize,
    pub include_extensions: String,
    pub audio_channels: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_bit_rate: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: 1,
            include_extensions: DEFAULT_INCLUDE_EXTENSIONS.to_string(),
            audio_channels: None,
            audio_sample_rate: None,
            audio_bit_rate: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_settings) = toml::from_str::<Settings>(&contents) {
                    settings = file_settings;
                }
            }
        }

        if let Ok(jobs) = std::env::var("ABMERGE_JOBS") {
            if let Ok(j) = jobs.parse() {
                settings.jobs = j;
            }
        }
        if let Ok(extensions) = std::env::var("ABMERGE_INCLUDE_EXTENSIONS") {
            settings.include_extensions = extensions;
        }
        if let Ok(bit_rate) = std::env::var("ABMERGE_AUDIO_BIT_RATE") {
            settings.audio_bit_rate = Some(bit_rate);
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(MergeError::InvalidInput(
                "Number of jobs must be greater than 0".to_string(),
            ));
        }

        if self.include_extensions.trim().is_empty() {
            return Err(MergeError::InvalidInput(
                "At least one include extension is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Split the comma separated extension list into lowercase entries.
    pub fn parse_include_extensions(&self) -> Vec<String> {
        parse_extension_list(&self.include_extensions)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("abmerge").join("config.toml"))
    }
}

/// Split a comma separated extension list, dropping empty entries.
pub fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("mp4".parse::<AudioFormat>().unwrap(), AudioFormat::Mp4);
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert!("ogg".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_codec_parsing() {
        assert_eq!("aac".parse::<AudioCodec>().unwrap(), AudioCodec::Aac);
        assert_eq!("alac".parse::<AudioCodec>().unwrap(), AudioCodec::Alac);
        assert_eq!(
            "libmp3lame".parse::<AudioCodec>().unwrap(),
            AudioCodec::Mp3
        );
        assert!("opus".parse::<AudioCodec>().is_err());
    }

    #[test]
    fn test_format_for_extension() {
        assert_eq!(format_for_extension("m4b"), Some(AudioFormat::Mp4));
        assert_eq!(format_for_extension("M4A"), Some(AudioFormat::Mp4));
        assert_eq!(format_for_extension("mp3"), Some(AudioFormat::Mp3));
        assert_eq!(format_for_extension("xyz"), None);
    }

    #[test]
    fn test_codec_for_format() {
        assert_eq!(codec_for_format(AudioFormat::Mp4), AudioCodec::Aac);
        assert_eq!(codec_for_format(AudioFormat::Mp3), AudioCodec::Mp3);
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.jobs, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_jobs() {
        let settings = Settings {
            jobs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_extension_list() {
        let extensions = parse_extension_list("mp3, M4A,,.flac");
        assert_eq!(extensions, vec!["mp3", "m4a", "flac"]);
    }
}
