use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vendor_patcher::config::{
    discover_patch_files, load_from_path, load_series, PatchConfig, PatchSeries, SkippedPatch,
};
use vendor_patcher::{
    apply_series, check_series, preview_series, PatchOutcome, PatchSpec, SourceTree,
};

#[derive(Parser)]
#[command(name = "vendor-patcher")]
#[command(about = "Verified regex patching of vendored source trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to a source tree, stopping at the first patch that does not apply
    Apply {
        #[command(flatten)]
        series: SeriesArgs,

        /// Dry run - report what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Check whether each patch would apply, without modifying files
    Check {
        #[command(flatten)]
        series: SeriesArgs,
    },

    /// List patches and the files they target
    List {
        /// Patch files, or directories of *.toml patch files
        #[arg(required = true)]
        patches: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct SeriesArgs {
    /// Patch files, or directories of *.toml patch files, in series order
    #[arg(required = true)]
    patches: Vec<PathBuf>,

    /// Root of the source tree the patches target
    #[arg(short, long, env = "VENDOR_PATCHER_ROOT")]
    root: PathBuf,

    /// Only run patches with these ids (repeatable)
    #[arg(long = "only", value_name = "ID")]
    only: Vec<String>,

    /// Version of the checked-out source, matched against each file's version_range
    #[arg(long, env = "VENDOR_PATCHER_SOURCE_VERSION")]
    source_version: Option<String>,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,
}

/// Process exit status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Status {
    Success,
    /// A patch matched nothing or changed nothing
    NotApplied,
    /// A target could not be read or written
    IoFailure,
    /// Patch files, patterns, templates or arguments are invalid
    ConfigFailure,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::NotApplied => ExitCode::from(1),
            Status::IoFailure => ExitCode::from(2),
            Status::ConfigFailure => ExitCode::from(3),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Apply { series, dry_run } => {
            if dry_run {
                println!("{}", "[DRY RUN - no files will be modified]".cyan());
                cmd_check(series, true)
            } else {
                cmd_apply(series)
            }
        }
        Commands::Check { series } => cmd_check(series, false),
        Commands::List { patches } => cmd_list(&patches),
    };

    match result {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            Status::ConfigFailure.into()
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Patches selected to run, after version gating and `--only` filtering.
struct Selection {
    tree: SourceTree,
    series: PatchSeries,
}

/// Load and compile every patch file before any patch runs, so a broken
/// pattern anywhere in the series is reported without touching the tree.
fn select_patches(args: &SeriesArgs) -> Result<Selection> {
    let tree = SourceTree::new(&args.root)?;
    let mut series = load_series(&args.patches, &tree, args.source_version.as_deref())?;
    series.retain_ids(&args.only)?;
    Ok(Selection { tree, series })
}

fn print_header(tree: &SourceTree, args: &SeriesArgs) {
    println!("Source tree: {}", tree.root().display());
    println!(
        "Version: {}",
        args.source_version.as_deref().unwrap_or("unspecified")
    );
    println!();
}

fn print_skipped(skipped: &[SkippedPatch]) {
    for skip in skipped {
        println!("{} {}: Skipped ({})", "⊘".cyan(), skip.id, skip.gate);
    }
}

fn outcome_status(outcome: &PatchOutcome) -> Status {
    match outcome {
        PatchOutcome::Applied(_) | PatchOutcome::NotAttempted => Status::Success,
        PatchOutcome::NotApplied(_) => Status::NotApplied,
        PatchOutcome::Failed(_) => Status::IoFailure,
    }
}

fn print_not_applied(spec: &PatchSpec, detail: &str) {
    eprintln!("{} {}: NOT APPLIED - {}", "✗".red(), spec, detail);
    eprintln!("  File: {}", spec.target_path().display());
    eprintln!("  {}", "CONFLICT: the patch did not change its target".red());
    eprintln!("  Possible causes:");
    eprintln!("    - Upstream source changed around the pattern");
    eprintln!("    - Patch was already applied to this tree");
    eprintln!("    - Pattern is stale and needs updating");
}

fn cmd_apply(args: SeriesArgs) -> Result<Status> {
    let selection = select_patches(&args)?;
    print_header(&selection.tree, &args);
    print_skipped(&selection.series.skipped);

    // Snapshot targets before applying (for diff output)
    let before: Vec<(PathBuf, String)> = if args.diff {
        let targets: BTreeSet<&Path> = selection
            .series.specs
            .iter()
            .map(PatchSpec::target_path)
            .collect();
        targets
            .into_iter()
            .filter_map(|path| {
                fs::read_to_string(path)
                    .ok()
                    .map(|content| (path.to_path_buf(), content))
            })
            .collect()
    } else {
        Vec::new()
    };

    let report = apply_series(&selection.series.specs);

    let mut applied = 0;
    let mut failed = 0;
    let mut not_attempted = 0;

    for (spec, (_, outcome)) in selection.series.specs.iter().zip(&report.outcomes) {
        match outcome {
            PatchOutcome::Applied(result) => {
                println!(
                    "{} {}: Applied to {} ({} bytes)",
                    "✓".green(),
                    spec,
                    spec.target_path().display(),
                    result.bytes_written
                );
                applied += 1;
            }
            PatchOutcome::NotApplied(result) => {
                print_not_applied(spec, result.error_detail.as_deref().unwrap_or("no change"));
                failed += 1;
            }
            PatchOutcome::Failed(err) => {
                eprintln!("{} {}: Error - {}", "✗".red(), spec, err);
                failed += 1;
            }
            PatchOutcome::NotAttempted => {
                println!(
                    "{} {}: Not attempted (earlier patch failed)",
                    "·".dimmed(),
                    spec
                );
                not_attempted += 1;
            }
        }
    }

    for (path, original) in &before {
        if let Ok(after) = fs::read_to_string(path) {
            if original != &after {
                display_diff(path, original, &after);
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", applied).green());
    println!("  {} failed", format!("{}", failed).red());
    println!("  {} not attempted", format!("{}", not_attempted).dimmed());
    println!("  {} skipped", format!("{}", selection.series.skipped.len()).cyan());

    Ok(report
        .outcomes
        .iter()
        .map(|(_, outcome)| outcome_status(outcome))
        .max()
        .unwrap_or(Status::Success))
}

/// Report what `apply` would do. A dry run stops where `apply` would stop;
/// `check` evaluates every patch.
fn cmd_check(args: SeriesArgs, dry_run: bool) -> Result<Status> {
    let selection = select_patches(&args)?;
    print_header(&selection.tree, &args);
    print_skipped(&selection.series.skipped);

    let check = if dry_run {
        preview_series(&selection.series.specs)
    } else {
        check_series(&selection.series.specs)
    };

    let mut would_apply = 0;
    let mut would_fail = 0;

    let outcomes = check.report.outcomes.iter();
    for (spec, (_, outcome)) in selection.series.specs.iter().zip(outcomes) {
        match outcome {
            PatchOutcome::Applied(_) => {
                println!(
                    "{} {}: Would apply to {}",
                    "✓".green(),
                    spec,
                    spec.target_path().display()
                );
                would_apply += 1;
            }
            PatchOutcome::NotApplied(result) => {
                print_not_applied(spec, result.error_detail.as_deref().unwrap_or("no change"));
                would_fail += 1;
            }
            PatchOutcome::Failed(err) => {
                eprintln!("{} {}: Error - {}", "✗".red(), spec, err);
                would_fail += 1;
            }
            PatchOutcome::NotAttempted => {
                println!(
                    "{} {}: Not attempted (earlier patch would fail)",
                    "·".dimmed(),
                    spec
                );
            }
        }
    }

    if args.diff {
        for file in &check.files {
            display_diff(&file.path, &file.original, &file.patched);
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} would apply", format!("{}", would_apply).green());
    println!("  {} would fail", format!("{}", would_fail).red());
    println!("  {} skipped", format!("{}", selection.series.skipped.len()).cyan());

    Ok(check
        .report
        .outcomes
        .iter()
        .map(|(_, outcome)| outcome_status(outcome))
        .max()
        .unwrap_or(Status::Success))
}

fn cmd_list(inputs: &[PathBuf]) -> Result<Status> {
    for patch_file in discover_patch_files(inputs)? {
        let config: PatchConfig = load_from_path(&patch_file)?;

        let name = if config.meta.name.is_empty() {
            patch_file.display().to_string()
        } else {
            config.meta.name.clone()
        };
        println!("{}", name.bold());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }
        if let Some(range) = &config.meta.version_range {
            println!("  version_range: {}", range);
        }

        for patch in &config.patches {
            println!("  - {} -> {}", patch.id, patch.file);
            if let Some(description) = &patch.description {
                println!("      {}", description.dimmed());
            }
        }
        println!();
    }

    Ok(Status::Success)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
}
