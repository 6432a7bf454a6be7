use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::tag::Tag;

use super::pattern::PLACEHOLDERS;
use super::{load_batch_directories, BatchMatch, BatchPattern};

/// A per-directory merge job derived from a batch pattern match.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub directory: PathBuf,
    pub destination: PathBuf,
    pub overrides: Tag,
}

/// Derive merge jobs for every leaf directory under `root` that matches the
/// pattern. Matched directories are added to the already-processed set so a
/// later pattern does not pick them up again. Dry-run reports the same
/// diagnostics but emits no jobs.
pub fn derive_jobs(
    root: &Path,
    pattern: &BatchPattern,
    output_dir: &Path,
    output_extension: &str,
    extensions: &[String],
    already_processed: &mut BTreeSet<PathBuf>,
    dry_run: bool,
) -> Result<Vec<MergeJob>> {
    let directories = load_batch_directories(root, extensions, already_processed)?;

    let mut matches = Vec::new();
    for directory in directories {
        if let Some(matched) = pattern.match_directory(&directory) {
            already_processed.insert(matched.directory.clone());
            matches.push(matched);
        }
    }

    info!(
        "{} {} for pattern {}",
        matches.len(),
        if matches.len() == 1 { "match" } else { "matches" },
        pattern.as_str()
    );

    let mut jobs = Vec::new();
    for matched in matches {
        let destination = derive_destination(&matched, output_dir, output_extension);

        info!("merge {}", matched.directory.display());
        info!("  =>  {}", destination.display());
        for (placeholder, name) in PLACEHOLDERS {
            if let Some(value) = matched.field(*placeholder) {
                info!("- {}: {}", name, value);
            }
        }

        if dry_run {
            continue;
        }

        jobs.push(MergeJob {
            directory: matched.directory.clone(),
            destination,
            overrides: overrides_from_match(&matched),
        });
    }

    Ok(jobs)
}

/// Output file name comes from the title (falling back to the album, then to
/// the directory name); a matched series nests the file under a series
/// directory. Collisions between distinct jobs are the caller's concern.
fn derive_destination(matched: &BatchMatch, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = matched
        .title()
        .or_else(|| matched.album())
        .map(str::to_string)
        .unwrap_or_else(|| {
            matched
                .directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string())
        });

    let file_name = format!("{}.{}", sanitize_component(&stem), extension);
    match matched.series() {
        Some(series) => output_dir.join(sanitize_component(series)).join(file_name),
        None => output_dir.join(file_name),
    }
}

/// Keep captured values usable as single path components.
fn sanitize_component(value: &str) -> String {
    value.replace(['/', '\\'], "-").trim().to_string()
}

fn overrides_from_match(matched: &BatchMatch) -> Tag {
    let get = |placeholder: char| matched.field(placeholder).map(str::to_string);

    Tag {
        title: get('t'),
        artist: get('a'),
        album: get('m'),
        series: get('s'),
        series_part: get('p'),
        genre: get('g'),
        year: get('y'),
        writer: get('w'),
        comment: get('c'),
        description: get('d'),
        ..Tag::default()
    }
}
