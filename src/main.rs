//! ranobe2ebook - build EPUB/FB2 books from a chapter dump

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use ranobe2ebook::{
    Assembly, Backend, BuildConfig, BuildEvent, BuildReport, BuildRequest, EpubBackend,
    Fb2Backend, Format, LocalSource, spawn_build,
};

#[derive(Parser)]
#[command(name = "ranobe2ebook")]
#[command(
    version,
    about = "Build EPUB/FB2 books from downloaded novel chapters",
    long_about = None
)]
#[command(after_help = "EXAMPLES:
    ranobe2ebook dump/ out/                   Build an EPUB
    ranobe2ebook dump/ out/ -f fb2 --no-images
    ranobe2ebook dump/ out/ --from 10 --to 20 Only chapters 10 to 20 of the list")]
struct Cli {
    /// Directory with book.json, chapters/ and images/
    #[arg(value_name = "SOURCE_DIR")]
    source: PathBuf,

    /// Directory to write the book into
    #[arg(value_name = "OUTPUT_DIR")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Epub)]
    format: Format,

    /// Leave chapter images out (the cover is kept)
    #[arg(long)]
    no_images: bool,

    /// Pause before each chapter, in milliseconds
    #[arg(long, value_name = "N", default_value_t = 500)]
    delay_ms: u64,

    /// First chapter of the list to include (1-based)
    #[arg(long, value_name = "N")]
    from: Option<usize>,

    /// Last chapter of the list to include (1-based, inclusive)
    #[arg(long, value_name = "N")]
    to: Option<usize>,

    /// Suppress progress messages
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match build(&cli) {
        Ok(report) => {
            if !cli.quiet && !report.skipped.is_empty() {
                eprintln!("{} chapter(s) skipped", report.skipped.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build(cli: &Cli) -> Result<BuildReport, String> {
    let source = LocalSource::new(&cli.source);
    let manifest = source.manifest().map_err(|e| e.to_string())?;

    let chapters = select(manifest.chapters, cli.from, cli.to)?;
    let request = BuildRequest::new(manifest.metadata, chapters)
        .with_series(manifest.series_id, manifest.branch_id);

    let config = BuildConfig::default()
        .with_images(!cli.no_images)
        .with_delay(Duration::from_millis(cli.delay_ms));

    let source = Arc::new(source);
    match cli.format {
        Format::Epub => drive(EpubBackend::new(), source, config, request, &cli.output, cli.quiet),
        Format::Fb2 => drive(Fb2Backend::new(), source, config, request, &cli.output, cli.quiet),
    }
}

/// Slice the chapter list by 1-based inclusive positions.
fn select<T>(chapters: Vec<T>, from: Option<usize>, to: Option<usize>) -> Result<Vec<T>, String> {
    let start = from.unwrap_or(1).max(1);
    let end = to.unwrap_or(chapters.len()).min(chapters.len());
    if start > end {
        return Err(format!("empty chapter range {start}..={end}"));
    }
    Ok(chapters.into_iter().skip(start - 1).take(end + 1 - start).collect())
}

fn drive<B: Backend + 'static>(
    backend: B,
    source: Arc<LocalSource>,
    config: BuildConfig,
    request: BuildRequest,
    output: &Path,
    quiet: bool,
) -> Result<BuildReport, String> {
    let assembly = Assembly::new(backend, source, config);
    let handle = spawn_build(assembly, request, output).map_err(|e| e.to_string())?;

    handle
        .wait(|event| {
            if let BuildEvent::Log(line) = event
                && !quiet
            {
                println!("{line}");
            }
        })
        .map_err(|e| e.to_string())
}
