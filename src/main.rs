use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use abmerge::batch::{derive_jobs, BatchPattern, MergeJob};
use abmerge::chapter::{
    BuildOptions, ChapterLengthOptions, ChapterLookup, MusicBrainzLookup, NormalizeOptions,
};
use abmerge::config::parse_extension_list;
use abmerge::convert::{Encoder, FfmpegEncoder};
use abmerge::tag::Tag;
use abmerge::{merge_book, print_summary, MergeOptions, Settings};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "abmerge")]
#[command(version, about = "Merge audiobook files into a single m4b with chapters")]
#[command(
    long_about = "Merge a set of per-chapter audio files into one audiobook container, \
deriving chapter markers from file tags, file names, external chapter references and \
silence detection."
)]
struct Cli {
    /// Input file or directory
    input: PathBuf,

    /// Additional input files or directories
    more_inputs: Vec<PathBuf>,

    /// Output file (a directory in batch mode)
    #[arg(short, long)]
    output_file: PathBuf,

    /// Comma separated list of file extensions to include (others are skipped)
    #[arg(long)]
    include_extensions: Option<String>,

    /// Batch pattern to derive merge jobs from a directory tree
    /// (e.g. "%a/%t" for author/title); can be given multiple times
    #[arg(long)]
    batch_pattern: Vec<String>,

    /// Report batch matches and derived fields without merging anything
    #[arg(long)]
    dry_run: bool,

    /// Number of conversions to run simultaneously
    #[arg(long)]
    jobs: Option<usize>,

    /// MusicBrainz release id to load chapter titles from
    #[arg(short = 'm', long)]
    musicbrainz_id: Option<String>,

    /// Skip conversion (the destination uses the same encoding as the source)
    #[arg(long)]
    no_conversion: bool,

    /// Use file names for chapter titles instead of tag contents
    #[arg(long)]
    use_filenames_as_chapters: bool,

    /// Do not renumber index-only chapter names like "Chapter 1", "Chapter 2"
    #[arg(long)]
    no_chapter_reindexing: bool,

    /// Desired and maximum chapter length in seconds ("D" or "D,M")
    #[arg(long, default_value = "")]
    max_chapter_length: String,

    /// Overwrite an existing output file
    #[arg(short, long)]
    force: bool,

    /// Keep temporary files for inspection
    #[arg(long)]
    debug: bool,

    /// Title tag override
    #[arg(long)]
    name: Option<String>,

    /// Album tag override
    #[arg(long)]
    album: Option<String>,

    /// Artist tag override
    #[arg(long)]
    artist: Option<String>,

    /// Album artist tag override
    #[arg(long)]
    albumartist: Option<String>,

    /// Genre tag override
    #[arg(long)]
    genre: Option<String>,

    /// Writer/narrator tag override
    #[arg(long)]
    writer: Option<String>,

    /// Year tag override
    #[arg(long)]
    year: Option<String>,

    /// Description tag override
    #[arg(long)]
    description: Option<String>,

    /// Comment tag override
    #[arg(long)]
    comment: Option<String>,

    /// Copyright tag override
    #[arg(long)]
    copyright: Option<String>,

    /// Series tag override
    #[arg(long)]
    series: Option<String>,

    /// Series part tag override
    #[arg(long)]
    series_part: Option<String>,

    /// Cover image to attach
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Output channel count
    #[arg(long)]
    audio_channels: Option<u32>,

    /// Output sample rate in Hz
    #[arg(long)]
    audio_samplerate: Option<u32>,

    /// Output bit rate (e.g. "64k")
    #[arg(long)]
    audio_bitrate: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn overrides_from_cli(cli: &Cli) -> Tag {
    Tag {
        title: cli.name.clone(),
        album: cli.album.clone(),
        artist: cli.artist.clone(),
        album_artist: cli.albumartist.clone(),
        genre: cli.genre.clone(),
        writer: cli.writer.clone(),
        year: cli.year.clone(),
        description: cli.description.clone(),
        comment: cli.comment.clone(),
        copyright: cli.copyright.clone(),
        series: cli.series.clone(),
        series_part: cli.series_part.clone(),
        cover: cli.cover.clone(),
        ..Tag::default()
    }
}

fn merge_options_for(cli: &Cli, run: &RunConfig, output: PathBuf, inputs: Vec<PathBuf>) -> MergeOptions {
    let mut options = MergeOptions::new(output, inputs);
    options.include_extensions = run.include_extensions.clone();
    options.jobs = run.jobs;
    options.force = cli.force;
    options.debug = cli.debug;
    options.no_conversion = cli.no_conversion;
    options.musicbrainz_id = cli.musicbrainz_id.clone();
    options.max_chapter_length = run.max_chapter_length;
    options.chapters = BuildOptions {
        use_filenames: cli.use_filenames_as_chapters,
        no_reindex: cli.no_chapter_reindexing,
    };
    options.normalize = NormalizeOptions {
        reindex: !cli.no_chapter_reindexing,
        ..NormalizeOptions::default()
    };
    options.overrides = overrides_from_cli(cli);
    options.channels = cli.audio_channels;
    options.sample_rate = cli.audio_samplerate;
    options.bit_rate = cli.audio_bitrate.clone();
    options
}

/// Per-run values resolved from settings and flags.
struct RunConfig {
    include_extensions: Vec<String>,
    jobs: usize,
    max_chapter_length: Option<ChapterLengthOptions>,
}

async fn run_single(cli: &Cli, run: &RunConfig, encoder: Arc<dyn Encoder>) -> Result<()> {
    if cli.output_file.is_dir() {
        anyhow::bail!(
            "Without --batch-pattern it is assumed that --output-file is a file and NOT an existing directory"
        );
    }
    if cli.dry_run {
        anyhow::bail!("--dry-run requires --batch-pattern");
    }

    let mut inputs = vec![cli.input.clone()];
    inputs.extend(cli.more_inputs.iter().cloned());

    let options = merge_options_for(cli, run, cli.output_file.clone(), inputs);
    let lookup = MusicBrainzLookup::new();
    let lookup_ref: Option<&dyn ChapterLookup> =
        cli.musicbrainz_id.is_some().then_some(&lookup as &dyn ChapterLookup);

    let outcome = merge_book(&options, encoder, lookup_ref)
        .await
        .context("Merge failed")?;
    print_summary(&outcome);
    Ok(())
}

async fn run_batch(cli: &Cli, run: &RunConfig, encoder: Arc<dyn Encoder>) -> Result<()> {
    if !cli.input.is_dir() || !cli.more_inputs.is_empty() {
        anyhow::bail!(
            "The use of --batch-pattern assumes that exactly one existing directory is processed"
        );
    }
    if cli.output_file.is_file() {
        anyhow::bail!("The use of --batch-pattern assumes that --output-file is a directory");
    }

    let mut already_processed: BTreeSet<PathBuf> = BTreeSet::new();
    let mut batch_jobs: Vec<MergeJob> = Vec::new();

    for pattern_str in &cli.batch_pattern {
        let pattern = BatchPattern::compile(pattern_str)?;
        let jobs = derive_jobs(
            &cli.input,
            &pattern,
            &cli.output_file,
            "m4b",
            &run.include_extensions,
            &mut already_processed,
            cli.dry_run,
        )?;
        batch_jobs.extend(jobs);
    }

    if cli.dry_run {
        info!("dry run, no files were changed");
        return Ok(());
    }

    let lookup = MusicBrainzLookup::new();
    let lookup_ref: Option<&dyn ChapterLookup> =
        cli.musicbrainz_id.is_some().then_some(&lookup as &dyn ChapterLookup);

    // strictly sequential; per-job state is built fresh and dropped at the
    // end of each iteration
    for job in batch_jobs {
        info!("processing {}", job.directory.display());

        let mut options =
            merge_options_for(cli, run, job.destination.clone(), vec![job.directory.clone()]);
        options.skip_existing = true;
        options.overrides.fill_missing_from(&job.overrides);

        match merge_book(&options, encoder.clone(), lookup_ref).await {
            Ok(outcome) => print_summary(&outcome),
            Err(e) => error!("processing failed for {}: {}", job.directory.display(), e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if !cli.input.exists() {
        anyhow::bail!("Input not found: {}", cli.input.display());
    }

    let settings = Settings::load().context("Failed to load configuration")?;
    settings.validate().context("Configuration validation failed")?;

    let jobs = cli.jobs.unwrap_or(settings.jobs);
    if jobs == 0 {
        anyhow::bail!("Number of jobs must be greater than 0");
    }

    let include_extensions = parse_extension_list(
        cli.include_extensions
            .as_deref()
            .unwrap_or(&settings.include_extensions),
    );

    let max_chapter_length = ChapterLengthOptions::parse(&cli.max_chapter_length)?;

    let run = RunConfig {
        include_extensions,
        jobs,
        max_chapter_length,
    };

    let encoder: Arc<dyn Encoder> = Arc::new(FfmpegEncoder::new());

    if cli.batch_pattern.is_empty() {
        run_single(&cli, &run, encoder).await
    } else {
        run_batch(&cli, &run, encoder).await
    }
}
