pub mod adjust;
pub mod align;
pub mod build;
pub mod lookup;

pub use adjust::{adjust_chapters, ChapterLengthOptions};
pub use align::{align_with_reference, normalize_chapters, NormalizeOptions};
pub use build::{build_chapters, BuildOptions};
pub use lookup::{ChapterLookup, MusicBrainzLookup, TrackReference};

use std::time::Duration;

/// A titled time span within the merged audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub start: Duration,
    pub length: Duration,
    pub title: String,
}

impl Chapter {
    pub fn new(start: Duration, length: Duration, title: impl Into<String>) -> Self {
        Self {
            start,
            length,
            title: title.into(),
        }
    }

    pub fn end(&self) -> Duration {
        self.start + self.length
    }
}

/// Build a chapter list from ordered (start, title) entries, deriving each
/// length from the next chapter's start and the last from the total duration.
pub fn from_start_entries(entries: Vec<(Duration, String)>, total: Duration) -> Vec<Chapter> {
    let mut chapters = Vec::with_capacity(entries.len());
    for (index, (start, title)) in entries.iter().enumerate() {
        let end = entries
            .get(index + 1)
            .map(|(next_start, _)| *next_start)
            .unwrap_or(total)
            .max(*start);
        chapters.push(Chapter::new(*start, end - *start, title.clone()));
    }
    chapters
}

/// Render chapters in mp4chaps format (`HH:MM:SS.mmm Title` per line).
pub fn to_mp4chaps(chapters: &[Chapter]) -> String {
    let mut output = String::new();
    for chapter in chapters {
        output.push_str(&format_timestamp(chapter.start));
        output.push(' ');
        output.push_str(&chapter.title);
        output.push('\n');
    }
    output
}

/// Whether the chapter list is ordered and gap-free.
pub fn is_contiguous(chapters: &[Chapter]) -> bool {
    chapters
        .windows(2)
        .all(|pair| pair[0].end() == pair[1].start)
}

/// Sum of all chapter lengths.
pub fn total_length(chapters: &[Chapter]) -> Duration {
    chapters.iter().map(|c| c.length).sum()
}

fn format_timestamp(duration: Duration) -> String {
    let millis = duration.as_millis();
    let hours = millis / 3_600_000;
    let minutes = millis / 60_000 % 60;
    let seconds = millis / 1000 % 60;
    let millis = millis % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}
