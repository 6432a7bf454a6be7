use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::error::{MergeError, Result};

use super::Silence;

/// Parse `silencedetect` filter output into ordered silence intervals.
///
/// The filter logs `silence_start: <secs>` and
/// `silence_end: <secs> | silence_duration: <secs>` lines on stderr; intervals
/// are closed on the end line. A trailing unclosed start is dropped.
pub fn parse_silences(output: &str) -> Vec<Silence> {
    let start_re = Regex::new(r"silence_start:\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap();
    let end_re = Regex::new(
        r"silence_end:\s*([0-9]+(?:\.[0-9]+)?)\s*\|\s*silence_duration:\s*([0-9]+(?:\.[0-9]+)?)",
    )
    .unwrap();

    let mut silences = Vec::new();
    let mut pending_start: Option<f64> = None;

    for line in output.lines() {
        if let Some(captures) = start_re.captures(line) {
            // negative starts occur when the stream leads with silence
            let start: f64 = captures[1].parse().unwrap_or(0.0);
            pending_start = Some(start.max(0.0));
            continue;
        }

        if let Some(captures) = end_re.captures(line) {
            let end: f64 = match captures[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let duration: f64 = match captures[2].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };

            let start = pending_start.take().unwrap_or((end - duration).max(0.0));
            let length = (end - start).max(0.0);
            if length > 0.0 {
                silences.push(Silence {
                    start: Duration::from_secs_f64(start),
                    length: Duration::from_secs_f64(length),
                });
            }
        }
    }

    silences
}

/// Parse mp4chaps style chapter lines (`HH:MM:SS.mmm Title`) into ordered
/// (start, title) pairs. Lines that do not match are skipped; an input with no
/// valid line at all is an error.
pub fn parse_chapters_txt(content: &str) -> Result<Vec<(Duration, String)>> {
    let line_re = Regex::new(r"^(\d+):(\d{2}):(\d{2})[.,](\d{1,3})\s+(.+)$").unwrap();

    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(captures) = line_re.captures(line) {
            let hours: u64 = captures[1].parse().unwrap_or(0);
            let minutes: u64 = captures[2].parse().unwrap_or(0);
            let seconds: u64 = captures[3].parse().unwrap_or(0);
            let millis: u64 = format!("{:0<3}", &captures[4]).parse().unwrap_or(0);
            let title = captures[5].trim().to_string();

            let start = Duration::from_millis(
                ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
            );
            entries.push((start, title));
        }
    }

    if entries.is_empty() {
        return Err(MergeError::ChapterParse(
            "no valid chapter lines found".to_string(),
        ));
    }

    entries.sort_by_key(|(start, _)| *start);
    Ok(entries)
}

/// Parse the global key/value section of an FFMETADATA file, keys lowercased.
///
/// Parsing stops at the first section header (`[CHAPTER]`, `[STREAM]`), since
/// only the global fields feed the tag.
pub fn parse_ffmetadata(content: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.starts_with(';') || line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            break;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            if !key.is_empty() {
                fields.insert(key, unescape_ffmetadata(value));
            }
        }
    }

    fields
}

fn unescape_ffmetadata(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some(escaped) => result.push(escaped),
                None => break,
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SILENCE_OUTPUT: &str = "\
[silencedetect @ 0x7f9] silence_start: 180.254
[silencedetect @ 0x7f9] silence_end: 182.412 | silence_duration: 2.158
[silencedetect @ 0x7f9] silence_start: 240.1
[silencedetect @ 0x7f9] silence_end: 242.0 | silence_duration: 1.9
size=N/A time=00:08:00.00 bitrate=N/A speed= 512x";

    #[test]
    fn test_parse_silences() {
        let silences = parse_silences(SILENCE_OUTPUT);
        assert_eq!(silences.len(), 2);
        assert_eq!(silences[0].start, Duration::from_secs_f64(180.254));
        assert_eq!(silences[0].length, Duration::from_secs_f64(2.158));
        assert_eq!(silences[1].start, Duration::from_secs_f64(240.1));
    }

    #[test]
    fn test_parse_silences_unclosed_start() {
        let silences = parse_silences("silence_start: 10.0\nno end follows");
        assert!(silences.is_empty());
    }

    #[test]
    fn test_parse_silences_negative_start() {
        let output =
            "silence_start: -0.01\nsilence_end: 1.5 | silence_duration: 1.51";
        let silences = parse_silences(output);
        assert_eq!(silences.len(), 1);
        assert_eq!(silences[0].start, Duration::ZERO);
    }

    #[test]
    fn test_parse_chapters_txt() {
        let content = "\
00:00:00.000 Intro
00:03:00.500 Chapter 1
01:02:03.250 Chapter 2";
        let entries = parse_chapters_txt(content).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (Duration::ZERO, "Intro".to_string()));
        assert_eq!(entries[1].0, Duration::from_millis(180_500));
        assert_eq!(entries[2].0, Duration::from_millis(3_723_250));
    }

    #[test]
    fn test_parse_chapters_txt_skips_garbage() {
        let content = "# comment\n\ninvalid line\n00:00:10.000 Start";
        let entries = parse_chapters_txt(content).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "Start");
    }

    #[test]
    fn test_parse_chapters_txt_empty_is_error() {
        assert!(parse_chapters_txt("nothing valid here").is_err());
    }

    #[test]
    fn test_parse_ffmetadata() {
        let content = "\
;FFMETADATA1
title=My Book
artist=Some Author
comment=line one\\nline two
[CHAPTER]
TIMEBASE=1/1000
title=ignored";
        let fields = parse_ffmetadata(content);
        assert_eq!(fields.get("title"), Some(&"My Book".to_string()));
        assert_eq!(fields.get("artist"), Some(&"Some Author".to_string()));
        assert_eq!(
            fields.get("comment"),
            Some(&"line one\nline two".to_string())
        );
        assert!(!fields.contains_key("timebase"));
    }
}
