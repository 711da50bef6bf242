use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use exif_backfill::config::Config;
use exif_backfill::pipeline::{self, Outcome};

#[derive(Parser, Debug)]
#[command(
    name = "exif-backfill",
    version,
    about = "Restore missing EXIF capture timestamps from JSON sidecar records. The source files are never changed or moved.",
    after_help = "Examples:\n  \
        exif-backfill                          process sidecars under the current directory\n  \
        exif-backfill /path/to/takeout         process a specific folder\n  \
        exif-backfill -r                       one pass per directory of the tree\n  \
        exif-backfill -o fixed -s tagged       custom output and skipped folders"
)]
struct Cli {
    /// Input folder where the JSON sidecars are located
    #[arg(value_name = "INPUT_FOLDER", default_value = ".")]
    input_folder: PathBuf,

    /// Output folder for rewritten images
    #[arg(
        short = 'o',
        long = "output_folder",
        visible_alias = "output-folder",
        default_value = "output"
    )]
    output_folder: PathBuf,

    /// Folder to copy images that already have a capture timestamp
    #[arg(short = 's', long = "skipped_folder", visible_alias = "skipped-folder")]
    skipped_folder: Option<PathBuf>,

    /// Run a discovery pass for every directory in the input tree
    #[arg(short, long)]
    recursive: bool,

    /// With --recursive, process nested sidecars again for every ancestor directory
    #[arg(long, requires = "recursive")]
    rewalk_nested: bool,

    /// Preview decisions without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for the report with --json
    let log_level = if cli.verbose { "debug" } else { "info" };
    let target = if cli.json {
        env_logger::Target::Stderr
    } else {
        env_logger::Target::Stdout
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .target(target)
        .init();

    let mut config = Config {
        input_folder: cli.input_folder,
        output_folder: cli.output_folder,
        skipped_folder: cli.skipped_folder,
        recursive: cli.recursive,
        rewalk_nested: cli.rewalk_nested,
        dry_run: cli.dry_run,
    };
    config.prepare()?;

    if config.dry_run {
        log::info!("DRY RUN: no files will be written");
    }

    let results = pipeline::run(&config);

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                let (output, tag_embedded, archived, reason) = match &r.outcome {
                    Outcome::Rewritten {
                        output,
                        tag_embedded,
                    } => (Some(output.display().to_string()), Some(*tag_embedded), None, None),
                    Outcome::AlreadyTagged { archived } => (
                        None,
                        None,
                        archived.as_ref().map(|p| p.display().to_string()),
                        None,
                    ),
                    Outcome::Skipped(reason) => (None, None, None, Some(reason.to_string())),
                    Outcome::Failed(err) => (None, None, None, Some(err.clone())),
                };
                serde_json::json!({
                    "sidecar": r.sidecar.display().to_string(),
                    "image": r.image.as_ref().map(|p| p.display().to_string()),
                    "outcome": r.outcome.label(),
                    "output": output,
                    "tag_embedded": tag_embedded,
                    "archived": archived,
                    "reason": reason,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let count = |label: &str| results.iter().filter(|r| r.outcome.label() == label).count();
    log::info!(
        "Done: {} rewritten, {} already tagged, {} skipped, {} failed out of {} sidecars",
        count("rewritten"),
        count("already_tagged"),
        count("skipped"),
        count("failed"),
        results.len()
    );

    Ok(())
}
