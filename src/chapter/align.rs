use std::time::Duration;

use tracing::debug;

use super::build::reindex_numbered_runs;
use super::{Chapter, TrackReference};

/// Pair chapters with an externally retrieved track list by position.
///
/// Titles are taken from the reference up to the shorter length; boundaries
/// are never moved, and unmatched tail entries on either side keep their
/// original titles.
pub fn align_with_reference(
    mut chapters: Vec<Chapter>,
    reference: &[TrackReference],
) -> Vec<Chapter> {
    let paired = chapters.len().min(reference.len());
    for index in 0..paired {
        let title = reference[index].title.trim();
        if !title.is_empty() {
            chapters[index].title = title.to_string();
        }
    }

    debug!(
        "aligned {} of {} chapters with {} reference tracks",
        paired,
        chapters.len(),
        reference.len()
    );
    chapters
}

/// Normalization applied after external alignment.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Shift of the boundary between the first and second chapter (later).
    pub first_chapter_offset: Duration,
    /// Shift of the boundary between the last two chapters (earlier).
    pub last_chapter_offset: Duration,
    /// Merge adjacent chapters whose titles are similar.
    pub merge_similar: bool,
    /// Characters stripped from every title.
    pub remove_chars: String,
    /// Renumber index-only titles.
    pub reindex: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            first_chapter_offset: Duration::ZERO,
            last_chapter_offset: Duration::ZERO,
            merge_similar: false,
            remove_chars: "\u{201e}\u{201c}\u{201d}".to_string(),
            reindex: true,
        }
    }
}

/// Apply title cleanup, similar-title merging, reindexing and boundary
/// offsets. The list stays ordered and contiguous and keeps its total span.
pub fn normalize_chapters(chapters: Vec<Chapter>, options: &NormalizeOptions) -> Vec<Chapter> {
    let mut chapters = chapters;

    for chapter in &mut chapters {
        chapter.title = strip_chars(&chapter.title, &options.remove_chars);
    }

    if options.merge_similar {
        chapters = merge_similar_titles(chapters);
    }

    if options.reindex {
        reindex_numbered_runs(&mut chapters);
    }

    apply_boundary_offsets(&mut chapters, options);

    chapters
}

/// The similarity rule: equal ignoring case, after stripping the configured
/// characters and collapsing whitespace.
fn titles_similar(left: &str, right: &str) -> bool {
    let collapse = |s: &str| {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    };
    collapse(left) == collapse(right)
}

fn merge_similar_titles(chapters: Vec<Chapter>) -> Vec<Chapter> {
    let mut result: Vec<Chapter> = Vec::with_capacity(chapters.len());

    for chapter in chapters {
        match result.last_mut() {
            Some(last) if titles_similar(&last.title, &chapter.title) => {
                last.length += chapter.length;
            }
            _ => result.push(chapter),
        }
    }

    result
}

fn strip_chars(title: &str, remove_chars: &str) -> String {
    title
        .chars()
        .filter(|c| !remove_chars.contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn apply_boundary_offsets(chapters: &mut [Chapter], options: &NormalizeOptions) {
    if chapters.len() < 2 {
        return;
    }

    let last_index = chapters.len() - 1;
    let total_end = chapters[last_index].end();

    if !options.first_chapter_offset.is_zero() {
        let upper = if chapters.len() > 2 {
            chapters[2].start
        } else {
            total_end
        };
        let shifted = (chapters[1].start + options.first_chapter_offset).min(upper);
        chapters[1].start = shifted;
    }

    if !options.last_chapter_offset.is_zero() {
        let lower = chapters[last_index - 1].start;
        let shifted = chapters[last_index]
            .start
            .saturating_sub(options.last_chapter_offset)
            .max(lower);
        chapters[last_index].start = shifted;
    }

    // restore contiguity around the moved boundaries
    for index in 0..last_index {
        let next_start = chapters[index + 1].start;
        chapters[index].length = next_start.saturating_sub(chapters[index].start);
    }
    chapters[last_index].length = total_end.saturating_sub(chapters[last_index].start);
}
