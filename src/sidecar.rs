use std::path::{Path, PathBuf};

use tracing::debug;

/// Pre-built chapter marks, short-circuiting chapter synthesis.
pub const CHAPTERS_TXT: &str = "chapters.txt";
/// Plain text description filling the description tag field.
pub const DESCRIPTION_TXT: &str = "description.txt";
/// Open Packaging Format package description.
pub const METADATA_OPF: &str = "metadata.opf";
/// Generic key/value metadata in FFMETADATA form.
pub const FFMETADATA_TXT: &str = "ffmetadata.txt";
/// Cover image attached to the output.
pub const COVER_JPG: &str = "cover.jpg";

/// Read a sidecar file next to the input, if present and readable.
pub fn lookup_contents(input_dir: &Path, name: &str) -> Option<String> {
    let path = input_dir.join(name);
    if !path.is_file() {
        return None;
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            debug!("found sidecar {}", path.display());
            Some(contents)
        }
        Err(e) => {
            debug!("could not read sidecar {}: {}", path.display(), e);
            None
        }
    }
}

/// Path of the cover image sidecar, if one exists.
pub fn lookup_cover(input_dir: &Path) -> Option<PathBuf> {
    let path = input_dir.join(COVER_JPG);
    path.is_file().then(|| {
        debug!("found cover {}", path.display());
        path
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_contents_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(lookup_contents(dir.path(), DESCRIPTION_TXT).is_none());
    }

    #[test]
    fn test_lookup_contents_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DESCRIPTION_TXT), "A fine book.").unwrap();
        assert_eq!(
            lookup_contents(dir.path(), DESCRIPTION_TXT).as_deref(),
            Some("A fine book.")
        );
    }

    #[test]
    fn test_lookup_cover() {
        let dir = tempfile::tempdir().unwrap();
        assert!(lookup_cover(dir.path()).is_none());
        std::fs::write(dir.path().join(COVER_JPG), [0xffu8, 0xd8]).unwrap();
        assert_eq!(lookup_cover(dir.path()), Some(dir.path().join(COVER_JPG)));
    }
}
