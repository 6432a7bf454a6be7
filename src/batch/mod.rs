pub mod job;
pub mod loader;
pub mod pattern;

pub use job::{derive_jobs, MergeJob};
pub use loader::{gather_audio_files, load_batch_directories, LoadedFiles};
pub use pattern::BatchPattern;

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Result of matching one leaf directory against a batch pattern.
#[derive(Debug, Clone)]
pub struct BatchMatch {
    pub directory: PathBuf,
    pub fields: BTreeMap<char, String>,
}

impl BatchMatch {
    pub fn field(&self, placeholder: char) -> Option<&str> {
        self.fields.get(&placeholder).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.field('t')
    }

    pub fn album(&self) -> Option<&str> {
        self.field('m')
    }

    pub fn series(&self) -> Option<&str> {
        self.field('s')
    }
}
