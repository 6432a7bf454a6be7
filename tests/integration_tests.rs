//! Integration tests for abmerge
//!
//! These tests validate the interplay of batch derivation, chapter synthesis
//! and the merge engine without requiring an installed FFmpeg.

use abmerge::batch::{derive_jobs, BatchPattern};
use abmerge::chapter::{
    adjust_chapters, align_with_reference, build_chapters, from_start_entries, is_contiguous,
    normalize_chapters, to_mp4chaps, total_length, BuildOptions, Chapter, ChapterLengthOptions,
    NormalizeOptions, TrackReference,
};
use abmerge::media::{parse_chapters_txt, AudioFile, Silence};
use abmerge::tag::{layer, Tag};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn audio_file(name: &str, secs: u64, title: Option<&str>) -> AudioFile {
    AudioFile {
        path: PathBuf::from(format!("/book/{name}")),
        extension: "mp3".to_string(),
        duration: Duration::from_secs(secs),
        title: title.map(str::to_string),
    }
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"x").unwrap();
}

// ============================================================================
// Batch Derivation Integration Tests
// ============================================================================

mod batch_tests {
    use super::*;

    #[test]
    fn test_directory_tree_to_jobs() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("Jane Doe/The Long Way/01.mp3"));
        touch(&root.path().join("Jane Doe/The Long Way/02.mp3"));
        touch(&root.path().join("John Roe/Short Tales/single.mp3"));
        touch(&root.path().join("unmatched.mp3"));

        let pattern = BatchPattern::compile("%a/%t").unwrap();
        let mut already = BTreeSet::new();
        let jobs = derive_jobs(
            root.path(),
            &pattern,
            Path::new("/library"),
            "m4b",
            &["mp3".to_string()],
            &mut already,
            false,
        )
        .unwrap();

        assert_eq!(jobs.len(), 2);
        let destinations: Vec<&Path> = jobs.iter().map(|j| j.destination.as_path()).collect();
        assert!(destinations.contains(&Path::new("/library/Short Tales.m4b")));
        assert!(destinations.contains(&Path::new("/library/The Long Way.m4b")));

        let long_way = jobs
            .iter()
            .find(|j| j.destination.ends_with("The Long Way.m4b"))
            .unwrap();
        assert_eq!(long_way.overrides.artist.as_deref(), Some("Jane Doe"));
        assert_eq!(long_way.overrides.title.as_deref(), Some("The Long Way"));
    }

    #[test]
    fn test_jobs_are_derived_in_lexical_order() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("B Author/Book/01.mp3"));
        touch(&root.path().join("A Author/Book/01.mp3"));

        let pattern = BatchPattern::compile("%a/%t").unwrap();
        let mut already = BTreeSet::new();
        let jobs = derive_jobs(
            root.path(),
            &pattern,
            Path::new("/out"),
            "m4b",
            &["mp3".to_string()],
            &mut already,
            false,
        )
        .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].overrides.artist.as_deref(), Some("A Author"));
        assert_eq!(jobs[1].overrides.artist.as_deref(), Some("B Author"));
    }

    #[test]
    fn test_colliding_destinations_are_not_deduplicated() {
        // two directories deriving the same output path both produce a job;
        // collision handling is the caller's responsibility
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("X/Same Title/01.mp3"));
        touch(&root.path().join("Y/Same Title/01.mp3"));

        let pattern = BatchPattern::compile("%a/%t").unwrap();
        let mut already = BTreeSet::new();
        let jobs = derive_jobs(
            root.path(),
            &pattern,
            Path::new("/out"),
            "m4b",
            &["mp3".to_string()],
            &mut already,
            false,
        )
        .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].destination, jobs[1].destination);
    }
}

// ============================================================================
// Chapter Pipeline Integration Tests
// ============================================================================

mod chapter_pipeline_tests {
    use super::*;

    #[test]
    fn test_raw_chapters_cover_track_without_gaps() {
        let files = vec![
            audio_file("01.mp3", 600, Some("Prologue")),
            audio_file("02.mp3", 1800, Some("The Road")),
            audio_file("03.mp3", 900, None),
        ];

        let chapters = build_chapters(&files, &BuildOptions::default());

        assert_eq!(chapters.len(), files.len());
        assert_eq!(chapters[0].start, Duration::ZERO);
        assert!(is_contiguous(&chapters));
        assert_eq!(total_length(&chapters), Duration::from_secs(3300));
        assert_eq!(chapters[2].title, "03");
    }

    #[test]
    fn test_build_align_normalize_adjust_pipeline() {
        let files = vec![
            audio_file("01.mp3", 180, Some("Intro")),
            audio_file("02.mp3", 300, Some("Chapter 1")),
        ];

        let chapters = build_chapters(&files, &BuildOptions::default());
        let reference = vec![
            TrackReference {
                title: "Opening".to_string(),
                length: Some(Duration::from_secs(180)),
            },
            TrackReference {
                title: "The Hunt".to_string(),
                length: Some(Duration::from_secs(300)),
            },
        ];
        let chapters = align_with_reference(chapters, &reference);
        let chapters = normalize_chapters(chapters, &NormalizeOptions::default());

        // silence midpoint 241s into chapter two (at 421s absolute)
        let silences = vec![Silence {
            start: Duration::from_secs(420),
            length: Duration::from_secs(2),
        }];
        let options = ChapterLengthOptions::parse("0,240").unwrap().unwrap();
        let chapters = adjust_chapters(chapters, &silences, &options);

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Opening");
        assert_eq!(chapters[1].title, "The Hunt");
        assert_eq!(chapters[2].title, "The Hunt");
        assert!(is_contiguous(&chapters));
        assert_eq!(total_length(&chapters), Duration::from_secs(480));
    }

    #[test]
    fn test_no_usable_silence_keeps_chapter_whole() {
        let files = vec![
            audio_file("01.mp3", 180, Some("Intro")),
            audio_file("02.mp3", 300, Some("Chapter 1")),
        ];
        let chapters = build_chapters(&files, &BuildOptions::default());

        let options = ChapterLengthOptions::parse("0,240").unwrap().unwrap();
        let adjusted = adjust_chapters(chapters, &[], &options);

        assert_eq!(adjusted.len(), 2);
        assert_eq!(adjusted[1].length, Duration::from_secs(300));
    }

    #[test]
    fn test_chapters_txt_round_trip() {
        let chapters = vec![
            Chapter::new(Duration::ZERO, Duration::from_secs(90), "Intro"),
            Chapter::new(
                Duration::from_secs(90),
                Duration::from_secs(510),
                "Chapter 1",
            ),
        ];

        let rendered = to_mp4chaps(&chapters);
        let entries = parse_chapters_txt(&rendered).unwrap();
        let rebuilt = from_start_entries(entries, Duration::from_secs(600));

        assert_eq!(rebuilt, chapters);
    }
}

// ============================================================================
// Tag Layering Integration Tests
// ============================================================================

mod tag_tests {
    use super::*;

    #[test]
    fn test_full_precedence_chain() {
        let overrides = Tag {
            title: Some("Forced Title".to_string()),
            ..Tag::default()
        };
        let opf = Tag::from_opf(
            r#"<package><metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <dc:title>OPF Title</dc:title>
                <dc:creator>OPF Author</dc:creator>
            </metadata></package>"#,
        );
        let ffmetadata = {
            let mut map = std::collections::HashMap::new();
            map.insert("artist".to_string(), "Sidecar Author".to_string());
            map.insert("genre".to_string(), "Fantasy".to_string());
            Tag::from_ff_map(&map)
        };
        let baseline = {
            let mut map = std::collections::HashMap::new();
            map.insert("title".to_string(), "File Title".to_string());
            map.insert("album".to_string(), "File Album".to_string());
            map.insert("genre".to_string(), "Spoken Word".to_string());
            Tag::from_ff_map(&map)
        };

        let tag = layer(vec![overrides, opf, ffmetadata, baseline]);

        // command line wins, OPF beats the generic sidecar, the sidecar
        // beats the file baseline, and the baseline fills the rest
        assert_eq!(tag.title.as_deref(), Some("Forced Title"));
        assert_eq!(tag.artist.as_deref(), Some("OPF Author"));
        assert_eq!(tag.genre.as_deref(), Some("Fantasy"));
        assert_eq!(tag.album.as_deref(), Some("File Album"));
    }
}
