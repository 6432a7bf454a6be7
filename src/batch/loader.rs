use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{MergeError, Result};

/// Whether a file's extension is in the qualifying set (lowercase).
fn has_qualifying_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|allowed| allowed == &e.to_lowercase()))
        .unwrap_or(false)
}

/// Enumerate leaf directories under `root` that contain at least one
/// qualifying file, excluding already-processed directories.
///
/// A directory counts as a leaf when no deeper qualifying directory lies
/// beneath it. The result is sorted lexically for deterministic job order.
pub fn load_batch_directories(
    root: &Path,
    extensions: &[String],
    already_processed: &BTreeSet<PathBuf>,
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(MergeError::InvalidInput(format!(
            "batch input {} is not a directory",
            root.display()
        )));
    }

    let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && has_qualifying_extension(entry.path(), extensions) {
            if let Some(parent) = entry.path().parent() {
                candidates.insert(parent.to_path_buf());
            }
        }
    }

    let leaves: Vec<PathBuf> = candidates
        .iter()
        .filter(|dir| {
            !candidates
                .iter()
                .any(|other| other != *dir && other.starts_with(dir))
        })
        .filter(|dir| !already_processed.contains(*dir))
        .cloned()
        .collect();

    debug!(
        "found {} leaf directories under {}",
        leaves.len(),
        root.display()
    );
    Ok(leaves)
}

/// Input files resolved for a single merge, with skipped entries and reasons.
#[derive(Debug, Default)]
pub struct LoadedFiles {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Collect qualifying audio files from the given files and directories.
///
/// Directories are scanned recursively and their contents sorted lexically;
/// the outer input order is preserved.
pub fn gather_audio_files(inputs: &[PathBuf], extensions: &[String]) -> Result<LoadedFiles> {
    let mut loaded = LoadedFiles::default();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| has_qualifying_extension(path, extensions))
                .collect();
            found.sort();
            loaded.files.extend(found);
        } else if input.is_file() {
            if has_qualifying_extension(input, extensions) {
                loaded.files.push(input.clone());
            } else {
                loaded
                    .skipped
                    .push((input.clone(), "extension not included".to_string()));
            }
        } else {
            loaded
                .skipped
                .push((input.clone(), "file not found".to_string()));
        }
    }

    Ok(loaded)
}
