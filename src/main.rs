use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use picsort::config::Config;
use picsort::detection::SimilarityGrouper;
use picsort::report::{self, ExportFormat};
use picsort::{KeepPolicy, Pipeline, RunOptions, RunReport, ScanPhase, ScanProgress, Store};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "picsort", version, about = "Organize photos and quarantine duplicates")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan inputs, resolve duplicates and organize keepers
    Organize {
        /// Only show what would happen
        #[arg(long)]
        dry_run: bool,
        /// Maximum Hamming distance for visual duplicates
        #[arg(long, value_name = "N")]
        threshold: Option<u32>,
        /// first_found, highest_resolution, newest or oldest
        #[arg(long)]
        policy: Option<KeepPolicy>,
        /// Output folder for organized keepers
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Additional input folder (repeatable)
        #[arg(short, long, value_name = "DIR")]
        input: Vec<PathBuf>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Inspect quarantined files
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCmd,
    },

    /// Catalog maintenance
    Db {
        #[command(subcommand)]
        command: DbCmd,
    },

    /// Hash listings
    Hashes {
        #[command(subcommand)]
        command: HashesCmd,
    },
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Find duplicate groups without moving anything
    Scan {
        /// Also look for visually similar images
        #[arg(long)]
        similar: bool,
        #[arg(long, value_name = "N")]
        threshold: Option<u32>,
        #[arg(short, long, value_name = "DIR")]
        input: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum QuarantineCmd {
    /// List quarantine history
    List,
}

#[derive(Subcommand, Debug)]
enum DbCmd {
    /// Write a timestamped copy of the catalog
    Backup {
        /// Destination folder (default: `backups` next to the catalog)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Catalog counts
    Stats,
}

#[derive(Subcommand, Debug)]
enum HashesCmd {
    /// Export every catalogued image with its hashes
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    setup_logging(&config.logging.level, cli.verbose);

    match cli.command {
        Commands::Organize {
            dry_run,
            threshold,
            policy,
            output,
            input,
            yes,
        } => {
            config.input_folders.extend(input);
            if let Some(threshold) = threshold {
                config.duplicates.similarity_threshold = threshold;
            }
            if let Some(policy) = policy {
                config.duplicates.keep_policy = policy;
            }
            if output.is_some() {
                config.output_folder = output;
            }
            check_folder_conflicts(&config)?;
            config.validate()?;

            println!("▶ Organizing {} input folder(s)", config.input_folders.len());
            for folder in &config.input_folders {
                println!("   📁 {}", folder.display());
            }
            println!(
                "   policy: {}, similar: {}, operation: {:?}",
                config.duplicates.keep_policy,
                config.duplicates.detect_similar,
                config.safety.file_operation
            );

            if !dry_run && !yes {
                let proceed = Confirm::new()
                    .with_prompt("Quarantine duplicates and organize files?")
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            let options = RunOptions {
                dry_run,
                organize: config.output_folder.is_some(),
            };
            let report = run_with_progress(config.clone(), options)?;
            print_summary(&report);
            write_reports(&config, &report)?;

            if dry_run {
                println!("\n⚠️  Dry-run only; no files were changed.");
            }
        }

        Commands::Duplicates { command } => match command {
            Dups::Scan {
                similar,
                threshold,
                input,
            } => {
                config.input_folders.extend(input);
                config.duplicates.detect_similar |= similar;
                if let Some(threshold) = threshold {
                    config.duplicates.similarity_threshold = threshold;
                }
                check_folder_conflicts(&config)?;
                config.validate()?;

                let options = RunOptions {
                    dry_run: true,
                    organize: false,
                };
                let report = run_with_progress(config, options)?;
                if report.groups.is_empty() {
                    println!("No duplicates found.");
                } else {
                    println!("Found {} duplicate group(s):", report.groups.len());
                    for (i, group) in report.groups.iter().enumerate() {
                        println!("\n✨ Group {} ({}):", i + 1, group.reason);
                        println!("   🏆 Keeping → {}", group.keeper.display());
                        for dup in &group.duplicates {
                            println!("   📦 {}", dup.display());
                        }
                    }
                }
            }
        },

        Commands::Quarantine { command } => match command {
            QuarantineCmd::List => {
                let store = open_store(&config)?;
                let entries = store.quarantine().list()?;
                if entries.is_empty() {
                    println!("Quarantine is empty.");
                    return Ok(());
                }
                println!("🗂️  Quarantine history:");
                for (i, entry) in entries.iter().enumerate() {
                    println!(
                        "[{}] {} ({})\n     from: {}\n     to:   {}\n     kept: {}\n",
                        i,
                        entry.created_at.to_rfc3339(),
                        entry.reason,
                        entry.original_path.display(),
                        entry.destination.display(),
                        entry.keeper_path.display()
                    );
                }
            }
        },

        Commands::Db { command } => {
            let store = open_store(&config)?;
            match command {
                DbCmd::Backup { dir } => {
                    let path = store.backup(dir.as_deref())?;
                    let pruned = store.prune_backups(
                        dir.as_deref(),
                        config.database.backup_retention_days,
                    )?;
                    println!("✅ Backup written to {}", path.display());
                    if pruned > 0 {
                        println!("🧹 Removed {} expired backup(s)", pruned);
                    }
                }
                DbCmd::Stats => {
                    println!("Catalog: {}", store.path().display());
                    println!("   images:      {}", store.images().count()?);
                    println!("   quarantined: {}", store.quarantine().count()?);
                    match store.stored_signature_bits()? {
                        Some(bits) => println!("   signatures:  {} bits", bits),
                        None => println!("   signatures:  none"),
                    }
                    let records = store.images().live_with_perceptual()?;
                    let clusters = SimilarityGrouper::new(config.duplicates.similarity_threshold)
                        .group(&records)?;
                    let similar = clusters.iter().filter(|c| c.has_duplicates()).count();
                    println!(
                        "   similar groups at threshold {}: {}",
                        config.duplicates.similarity_threshold, similar
                    );
                }
            }
        }

        Commands::Hashes { command } => match command {
            HashesCmd::Export { output, format } => {
                let store = open_store(&config)?;
                let format = match format {
                    Format::Csv => ExportFormat::Csv,
                    Format::Json => ExportFormat::Json,
                };
                let rows = report::export_hashes(&store, &output, format)
                    .with_context(|| format!("Failed to export hashes to {}", output.display()))?;
                println!("✅ Exported {} image(s) to {}", rows, output.display());
            }
        },
    }

    Ok(())
}

fn setup_logging(configured: &str, verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(configured);
    match verbosity {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Info);
        }
        2 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn check_folder_conflicts(config: &Config) -> Result<()> {
    for input in &config.input_folders {
        if config.output_folder.as_ref() == Some(input) {
            bail!("--output {} is also an input folder", input.display());
        }
        if *input == config.quarantine_folder {
            bail!(
                "input folder {} is the quarantine folder",
                input.display()
            );
        }
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.database.path)
        .with_context(|| format!("Failed to open catalog {}", config.database.path.display()))
}

fn run_with_progress(config: Config, options: RunOptions) -> Result<RunReport> {
    let store = open_store(&config)?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}",
    )?);
    bar.enable_steady_tick(Duration::from_millis(100));

    let sink = bar.clone();
    let pipeline = Pipeline::new(config, store).with_progress(Box::new(
        move |progress: &ScanProgress| {
            sink.set_length(progress.total as u64);
            sink.set_position(progress.processed as u64);
            sink.set_message(progress_message(progress));
        },
    ));

    let report = pipeline.run(options).context("Run aborted")?;
    bar.finish_with_message("Done");
    Ok(report)
}

fn progress_message(progress: &ScanProgress) -> String {
    let phase = match progress.phase {
        ScanPhase::Scanning => "Scanning for images…",
        ScanPhase::Fingerprinting => "Hashing",
        ScanPhase::SimilarDuplicates => "Comparing",
        ScanPhase::Organizing => "Organizing",
        ScanPhase::Done => "Done",
    };
    match &progress.current_file {
        Some(path) => format!("{} {}", phase, file_label(path)),
        None => phase.to_string(),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_summary(report: &RunReport) {
    println!("\n📊 Summary");
    println!("   processed:          {}", report.files_processed);
    println!("   organized:          {}", report.files_organized);
    println!("   exact duplicates:   {}", report.duplicates_exact);
    println!("   similar duplicates: {}", report.duplicates_similar);
    println!("   quarantined:        {}", report.quarantined);
    println!("   errors:             {}", report.errors);
    if let Some(secs) = report.duration_secs() {
        println!("   ⏱ took {:.2}s", secs);
    }
    for failure in &report.file_errors {
        eprintln!("⚠️  {}: {}", failure.path.display(), failure.error);
    }
}

fn write_reports(config: &Config, report: &RunReport) -> Result<()> {
    let reports = &config.reports;
    if !reports.generate_json && !reports.generate_csv {
        return Ok(());
    }
    let written = report::write_reports(
        report,
        &reports.directory,
        reports.generate_json,
        reports.generate_csv,
    )
    .context("Failed to write reports")?;
    for path in written {
        println!("📝 Report: {}", path.display());
    }
    Ok(())
}
