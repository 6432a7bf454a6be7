use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::media::AudioFile;

use super::Chapter;

/// Options for building the raw chapter list from input files.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Use file names for chapter titles even when a tag title exists.
    pub use_filenames: bool,
    /// Keep index-only titles (e.g. "Chapter 1") as-is instead of renumbering.
    pub no_reindex: bool,
}

/// Build one chapter per input file: starts are cumulative durations, titles
/// come from the embedded tag title or the file name.
pub fn build_chapters(files: &[AudioFile], options: &BuildOptions) -> Vec<Chapter> {
    let mut chapters = Vec::with_capacity(files.len());
    let mut offset = Duration::ZERO;

    for file in files {
        let title = if options.use_filenames {
            file.filename_title()
        } else {
            file.title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| file.filename_title())
        };

        chapters.push(Chapter::new(offset, file.duration, title));
        offset += file.duration;
    }

    if !options.no_reindex {
        reindex_numbered_runs(&mut chapters);
    }

    debug!("built {} raw chapters", chapters.len());
    chapters
}

/// Renumber runs of index-only titles ("Chapter 1", "Track 02", "3") with
/// plain contiguous numbers starting at 1. Runs shorter than two chapters are
/// left alone; titles with real wording are never touched.
pub fn reindex_numbered_runs(chapters: &mut [Chapter]) {
    let index_only = Regex::new(r"^[^0-9]*[0-9]+[^0-9]*$").unwrap();

    let mut run_start = 0;
    let mut index = 0;
    while index <= chapters.len() {
        let in_run = index < chapters.len() && index_only.is_match(chapters[index].title.trim());
        if in_run {
            index += 1;
            continue;
        }

        let run_length = index - run_start;
        if run_length >= 2 {
            for (offset, chapter) in chapters[run_start..index].iter_mut().enumerate() {
                chapter.title = (offset + 1).to_string();
            }
        }

        index += 1;
        run_start = index;
    }
}
