use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::batch::gather_audio_files;
use crate::chapter::{
    self, adjust_chapters, align_with_reference, build_chapters, normalize_chapters,
    BuildOptions, Chapter, ChapterLengthOptions, ChapterLookup, NormalizeOptions,
};
use crate::config::{
    codec_for_format, format_for_extension, parse_extension_list, AudioFormat,
    DEFAULT_INCLUDE_EXTENSIONS,
};
use crate::convert::{ConversionOptions, ConversionTask, Encoder, TaskPool};
use crate::error::{MergeError, Result};
use crate::media::{
    check_ffmpeg, check_ffprobe, concat_files, detect_silences, parse_chapters_txt,
    parse_ffmetadata, probe_audio_file, probe_duration, probe_tags, AudioFile,
    ffmpeg::DEFAULT_SILENCE_MIN_LENGTH, remux_with_metadata,
};
use crate::sidecar;
use crate::tag::{self, Tag};

/// Configuration for one merge run, constructed fresh per book.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub include_extensions: Vec<String>,
    pub jobs: usize,
    pub force: bool,
    /// Keep temporary artifacts for inspection.
    pub debug: bool,
    pub no_conversion: bool,
    /// Treat an existing destination as "already done" instead of an error.
    pub skip_existing: bool,
    pub musicbrainz_id: Option<String>,
    pub max_chapter_length: Option<ChapterLengthOptions>,
    pub chapters: BuildOptions,
    pub normalize: NormalizeOptions,
    pub overrides: Tag,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    pub bit_rate: Option<String>,
    pub show_progress: bool,
}

impl MergeOptions {
    pub fn new(output: PathBuf, inputs: Vec<PathBuf>) -> Self {
        Self {
            output,
            inputs,
            include_extensions: parse_extension_list(DEFAULT_INCLUDE_EXTENSIONS),
            jobs: 1,
            force: false,
            debug: false,
            no_conversion: false,
            skip_existing: false,
            musicbrainz_id: None,
            max_chapter_length: None,
            chapters: BuildOptions::default(),
            normalize: NormalizeOptions::default(),
            overrides: Tag::default(),
            channels: None,
            sample_rate: None,
            bit_rate: None,
            show_progress: true,
        }
    }
}

/// Result of a completed (or skipped) merge run.
#[derive(Debug)]
pub struct MergeOutcome {
    pub output: PathBuf,
    pub skipped: bool,
    pub files_merged: usize,
    pub chapter_count: usize,
    pub total_duration: Duration,
    pub elapsed: Duration,
}

/// Merge all input files into one tagged audiobook container.
///
/// Stages: load input files, convert them through the task pool (unless
/// conversion is skipped), synthesize chapters, concatenate, adjust chapter
/// lengths against detected silences, assemble and write tags, then move the
/// finished file into place and clean up.
pub async fn merge_book(
    options: &MergeOptions,
    encoder: Arc<dyn Encoder>,
    lookup: Option<&dyn ChapterLookup>,
) -> Result<MergeOutcome> {
    let started = Instant::now();

    let extension = options
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("m4b")
        .to_lowercase();
    let mut format = format_for_extension(&extension).unwrap_or(AudioFormat::Mp4);
    let codec = codec_for_format(format);

    if options.output.is_file() && !options.force {
        if options.skip_existing {
            info!(
                "output file {} already exists - skipping",
                options.output.display()
            );
            return Ok(MergeOutcome {
                output: options.output.clone(),
                skipped: true,
                files_merged: 0,
                chapter_count: 0,
                total_duration: Duration::ZERO,
                elapsed: started.elapsed(),
            });
        }
        return Err(MergeError::ExistingOutput(
            options.output.display().to_string(),
        ));
    }

    // ─── Stage 1: load input files ─────────────────────────────────────────
    let loaded = gather_audio_files(&options.inputs, &options.include_extensions)?;
    for (path, reason) in &loaded.skipped {
        info!("skipping {} ({})", path.display(), reason);
    }
    if loaded.files.is_empty() {
        return Err(MergeError::InvalidInput(
            "no files to convert for given input".to_string(),
        ));
    }

    check_ffmpeg()?;
    check_ffprobe()?;

    let input_dir = sidecar_dir(&options.inputs);

    let mut source_files = Vec::with_capacity(loaded.files.len());
    for path in &loaded.files {
        source_files.push(probe_audio_file(path)?);
    }

    let temp_dir = output_temp_dir(&options.output);
    std::fs::create_dir_all(&temp_dir)?;

    // ─── Stage 2: conversion ───────────────────────────────────────────────
    let files_to_merge = if options.no_conversion {
        let mut extensions: Vec<&str> = source_files
            .iter()
            .map(|f| f.extension.as_str())
            .collect();
        extensions.sort_unstable();
        extensions.dedup();

        if extensions.len() > 1 && !options.force {
            return Err(MergeError::InvalidInput(
                "--no-conversion is unlikely to work with multiple extensions present, use --force to merge anyway"
                    .to_string(),
            ));
        }
        if let Some(source_format) = extensions.first().and_then(|e| format_for_extension(e)) {
            format = source_format;
        }

        loaded.files.clone()
    } else {
        convert_input_files(options, &source_files, &temp_dir, &extension, codec, format, encoder)
            .await?
    };

    // ─── Stage 3: chapter synthesis ────────────────────────────────────────
    let chapter_files = if options.no_conversion {
        source_files.clone()
    } else {
        let mut converted = Vec::with_capacity(files_to_merge.len());
        for (source, destination) in source_files.iter().zip(&files_to_merge) {
            converted.push(AudioFile {
                path: source.path.clone(),
                extension: extension.clone(),
                duration: probe_duration(destination)?,
                title: source.title.clone(),
            });
        }
        converted
    };
    let total_duration: Duration = chapter_files.iter().map(|f| f.duration).sum();

    let mut adjustable = true;
    let mut chapters =
        if let Some(content) = sidecar::lookup_contents(&input_dir, sidecar::CHAPTERS_TXT) {
            info!("importing chapters from existing chapters.txt");
            adjustable = false;
            chapter::from_start_entries(parse_chapters_txt(&content)?, total_duration)
        } else {
            info!("rebuilding chapters from converted file title tags");
            let mut chapters = build_chapters(&chapter_files, &options.chapters);
            if let (Some(release_id), Some(lookup)) = (&options.musicbrainz_id, lookup) {
                chapters = replace_with_reference(chapters, release_id, lookup, options).await;
            }
            chapters
        };

    // ─── Stage 4: concatenation ────────────────────────────────────────────
    let merged_temp = temp_dir.join(format!("tmp_{}", output_file_name(&options.output)));
    let chapters_temp = chapters_sidecar_path(&merged_temp);
    if merged_temp.is_file() {
        std::fs::remove_file(&merged_temp)?;
    }
    if chapters_temp.is_file() {
        std::fs::remove_file(&chapters_temp)?;
    }

    if files_to_merge.len() == 1 {
        debug!("only one file in merge list, copying file");
        std::fs::copy(&files_to_merge[0], &merged_temp)?;
    } else {
        let manifest = temp_dir.join(format!("{}.listing.txt", output_file_name(&options.output)));
        write_concat_manifest(&manifest, &files_to_merge)?;

        let result = concat_files(&manifest, &merged_temp, Some(format), codec).await?;
        if !result.success {
            return Err(MergeError::Merge(format!(
                "could not merge to {}: {}",
                merged_temp.display(),
                last_line(&result.diagnostic)
            )));
        }

        if !options.debug {
            let _ = std::fs::remove_file(&manifest);
        }
    }

    // ─── Stage 5: chapter length adjustment ────────────────────────────────
    if adjustable {
        if let Some(length_options) = options.max_chapter_length {
            match detect_silences(&merged_temp, DEFAULT_SILENCE_MIN_LENGTH).await {
                Ok(silences) => {
                    chapters = adjust_chapters(chapters, &silences, &length_options);
                }
                Err(e) => warn!("silence detection failed, keeping chapters as-is: {}", e),
            }
        }
    }

    // ─── Stage 6: tag assembly and writing ─────────────────────────────────
    let tag = assemble_tag(options, &input_dir, &loaded.files[0]);
    write_tags(&temp_dir, &merged_temp, &tag, &chapters, format, options).await?;
    std::fs::write(&chapters_temp, chapter::to_mp4chaps(&chapters))?;

    // ─── Stage 7: finalization ─────────────────────────────────────────────
    move_finished_output(&merged_temp, &chapters_temp, &options.output)?;
    cleanup_temp_files(&temp_dir, &files_to_merge, options);

    info!(
        "successfully merged {} files to {}",
        files_to_merge.len(),
        options.output.display()
    );

    Ok(MergeOutcome {
        output: options.output.clone(),
        skipped: false,
        files_merged: files_to_merge.len(),
        chapter_count: chapters.len(),
        total_duration,
        elapsed: started.elapsed(),
    })
}

/// Convert every source file through the bounded task pool and validate the
/// produced destinations.
async fn convert_input_files(
    options: &MergeOptions,
    source_files: &[AudioFile],
    temp_dir: &Path,
    extension: &str,
    codec: crate::config::AudioCodec,
    format: AudioFormat,
    encoder: Arc<dyn Encoder>,
) -> Result<Vec<PathBuf>> {
    let pad_len = source_files.len().to_string().len();
    let mut pool = TaskPool::new(options.jobs);
    let mut destinations = Vec::with_capacity(source_files.len());

    for (index, file) in source_files.iter().enumerate() {
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("part{}", index + 1));
        let destination =
            temp_dir.join(format!("{:0>pad_len$}-{}.{}", index + 1, stem, extension));
        destinations.push(destination.clone());

        pool.submit(ConversionTask::new(
            index,
            encoder.clone(),
            ConversionOptions {
                source: file.path.clone(),
                destination,
                temp_dir: temp_dir.to_path_buf(),
                extension: extension.to_string(),
                codec,
                format,
                channels: options.channels,
                sample_rate: options.sample_rate,
                bit_rate: options.bit_rate.clone(),
                force: options.force,
            },
        ));
    }

    info!(
        "preparing conversion with {} simultaneous {}, please wait...",
        options.jobs,
        if options.jobs == 1 { "job" } else { "jobs" }
    );

    let progress_bar = options.show_progress.then(|| {
        let pb = ProgressBar::new(source_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });

    let callback_bar = progress_bar.clone();
    let outcomes = pool
        .process(move |snapshot| {
            if let Some(pb) = &callback_bar {
                pb.set_position(snapshot.finished as u64);
            }
        })
        .await;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("conversion complete");
    }

    // success is inferred from the destination existing with non-zero size;
    // a failed task's partial output is removed here
    for outcome in &outcomes {
        let size = std::fs::metadata(&outcome.destination)
            .map(|m| m.len())
            .unwrap_or(0);
        if !outcome.succeeded() || size == 0 {
            if outcome.destination.exists() {
                let _ = std::fs::remove_file(&outcome.destination);
            }
            return Err(MergeError::Conversion(format!(
                "could not convert {} to {}",
                outcome.source.display(),
                outcome.destination.display()
            )));
        }
    }

    Ok(destinations)
}

/// Replace chapter titles with an external reference track list, tolerating
/// lookup failure by keeping the raw chapters.
async fn replace_with_reference(
    chapters: Vec<Chapter>,
    release_id: &str,
    lookup: &dyn ChapterLookup,
    options: &MergeOptions,
) -> Vec<Chapter> {
    match lookup.lookup(release_id).await {
        Ok(tracks) if !tracks.is_empty() => {
            info!(
                "aligning chapters with {} reference tracks from {}",
                tracks.len(),
                lookup.name()
            );
            let aligned = align_with_reference(chapters, &tracks);
            normalize_chapters(aligned, &options.normalize)
        }
        Ok(_) => {
            warn!("chapter reference {} returned no tracks", release_id);
            chapters
        }
        Err(e) => {
            warn!("chapter reference lookup failed, keeping raw chapters: {}", e);
            chapters
        }
    }
}

/// Layer tag sources: command line and batch overrides win, then the OPF
/// sidecar, then generic metadata, then the first file's own tags.
fn assemble_tag(options: &MergeOptions, input_dir: &Path, first_file: &Path) -> Tag {
    let mut overrides = options.overrides.clone();
    if overrides.description.is_none() {
        overrides.description = sidecar::lookup_contents(input_dir, sidecar::DESCRIPTION_TXT)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
    }
    if overrides.cover.is_none() {
        overrides.cover = sidecar::lookup_cover(input_dir);
    }

    let opf = sidecar::lookup_contents(input_dir, sidecar::METADATA_OPF)
        .map(|content| {
            info!("enhancing tag with additional metadata from metadata.opf");
            Tag::from_opf(&content)
        })
        .unwrap_or_default();

    let ffmetadata = sidecar::lookup_contents(input_dir, sidecar::FFMETADATA_TXT)
        .map(|content| {
            info!("enhancing tag with additional metadata from ffmetadata.txt");
            Tag::from_ff_map(&parse_ffmetadata(&content))
        })
        .unwrap_or_default();

    let baseline = match probe_tags(first_file) {
        Ok(tags) => Tag::from_ff_map(&tags),
        Err(e) => {
            warn!("could not read tags from first input file: {}", e);
            Tag::default()
        }
    };

    tag::layer(vec![overrides, opf, ffmetadata, baseline])
}

/// Write the assembled tag and chapters into the merged temp file.
async fn write_tags(
    temp_dir: &Path,
    merged_temp: &Path,
    tag: &Tag,
    chapters: &[Chapter],
    format: AudioFormat,
    options: &MergeOptions,
) -> Result<()> {
    let metadata_file = temp_dir.join("ffmetadata-out.txt");
    std::fs::write(&metadata_file, tag::to_ffmetadata(tag, chapters))?;

    let tagged_temp = temp_dir.join(format!("tagged_{}", output_file_name(merged_temp)));
    let result = remux_with_metadata(
        merged_temp,
        &metadata_file,
        tag.cover.as_deref(),
        Some(format),
        &tagged_temp,
    )
    .await?;

    if !result.success {
        return Err(MergeError::Merge(format!(
            "could not write tags to {}: {}",
            merged_temp.display(),
            last_line(&result.diagnostic)
        )));
    }

    std::fs::rename(&tagged_temp, merged_temp)?;
    if !options.debug {
        let _ = std::fs::remove_file(&metadata_file);
    }

    info!(
        "tagged file {} (artist: {}, name: {}, chapters: {})",
        output_file_name(merged_temp),
        tag.artist.as_deref().unwrap_or("-"),
        tag.title.as_deref().unwrap_or("-"),
        chapters.len()
    );
    Ok(())
}

/// Atomically move the merged file and its chapter sidecar into place.
fn move_finished_output(merged_temp: &Path, chapters_temp: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::rename(merged_temp, output)?;

    if chapters_temp.is_file() {
        std::fs::rename(chapters_temp, chapters_sidecar_path(output))?;
    }

    info!(
        "moved temporary {} to {}",
        output_file_name(merged_temp),
        output.display()
    );
    Ok(())
}

/// Remove converted temp files and the temp directory if it ended up empty.
/// Errors here are logged only; the destination already exists.
fn cleanup_temp_files(temp_dir: &Path, files_to_merge: &[PathBuf], options: &MergeOptions) {
    if options.debug {
        return;
    }

    if !options.no_conversion {
        for file in files_to_merge {
            if file.exists() {
                if let Err(e) = std::fs::remove_file(file) {
                    warn!("could not delete temporary file {}: {}", file.display(), e);
                }
            }
        }
    }

    match std::fs::read_dir(temp_dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                if let Err(e) = std::fs::remove_dir(temp_dir) {
                    warn!(
                        "could not remove temp directory {}: {}",
                        temp_dir.display(),
                        e
                    );
                }
            } else {
                debug!(
                    "temp directory {} not empty, leaving it in place",
                    temp_dir.display()
                );
            }
        }
        Err(e) => warn!("could not inspect temp directory: {}", e),
    }
}

/// Print a human readable summary of a finished merge.
pub fn print_summary(outcome: &MergeOutcome) {
    if outcome.skipped {
        println!(
            "{} {} already exists, skipped",
            style("-").yellow(),
            outcome.output.display()
        );
        return;
    }

    println!();
    println!(
        "{} merged {} files into {}",
        style("✓").green(),
        outcome.files_merged,
        outcome.output.display()
    );
    println!(
        "  {} chapters over {:.1} minutes, finished in {:.1}s",
        outcome.chapter_count,
        outcome.total_duration.as_secs_f64() / 60.0,
        outcome.elapsed.as_secs_f64()
    );
}

/// Temp directory next to the destination: `<stem>-tmpfiles/`.
fn output_temp_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(format!("{stem}-tmpfiles"))
        }
        _ => PathBuf::from(format!("{stem}-tmpfiles")),
    }
}

/// The chapter sidecar lives next to its audio file as `<stem>.chapters.txt`.
fn chapters_sidecar_path(audio_file: &Path) -> PathBuf {
    audio_file.with_extension("chapters.txt")
}

fn output_file_name(output: &Path) -> String {
    output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Directory searched for sidecar files: the first input directory, or the
/// parent of the first input file.
fn sidecar_dir(inputs: &[PathBuf]) -> PathBuf {
    inputs
        .first()
        .map(|input| {
            if input.is_dir() {
                input.clone()
            } else {
                input
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf()
            }
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write the concat manifest with absolute, shell-escaped paths in
/// submission order.
fn write_concat_manifest(manifest: &Path, files: &[PathBuf]) -> Result<()> {
    let mut content = String::new();
    for file in files {
        let absolute = std::fs::canonicalize(file)?;
        content.push_str(&format!(
            "file '{}'\n",
            absolute.to_string_lossy().replace('\'', "'\\''")
        ));
    }
    std::fs::write(manifest, content)?;
    Ok(())
}

fn last_line(diagnostic: &str) -> &str {
    diagnostic
        .lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .unwrap_or("no diagnostic output")
}
