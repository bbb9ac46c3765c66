use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fjson_gen::archive::{fetch_and_extract, HttpArchiveSource};
use fjson_gen::config::{load_or_default, GenConfig};
use fjson_gen::patch::{prepare_import_rewrite, prepare_patch, ImportRewrite, PendingPatch};
use fjson_gen::telemetry::init_tracing;
use fjson_gen::{Generator, RunSummary};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fjson-gen")]
#[command(about = "Regenerate a patched encoding/json fork for every Go release", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and patch every retained release
    Generate {
        /// Parent directory of the per-release output directories
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only these releases (tag or number, repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Semver requirement on releases, e.g. ">=1.16"
        #[arg(long)]
        since: Option<String>,
    },

    /// List the releases a run would process
    List {
        /// Semver requirement on releases, e.g. ">=1.16"
        #[arg(long)]
        since: Option<String>,
    },

    /// Fetch and extract one release without patching it
    Extract {
        /// Release tag, e.g. go1.21
        tag: String,

        /// Parent directory of the release directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Patch a single Go file in place
    Patch {
        /// File to patch
        file: PathBuf,

        /// Apply the configured import rewrites instead of the call rewrite
        #[arg(long)]
        imports: bool,

        /// Method name to match (overrides config)
        #[arg(long)]
        method: Option<String>,

        /// Receiver type to match, without the `*` (overrides config)
        #[arg(long)]
        receiver_type: Option<String>,

        /// Dry run - show what would be changed without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            output,
            only,
            since,
        } => cmd_generate(config, output, only, since),

        Commands::List { since } => cmd_list(config, since),

        Commands::Extract { tag, output } => cmd_extract(config, &tag, output),

        Commands::Patch {
            file,
            imports,
            method,
            receiver_type,
            dry_run,
            diff,
        } => cmd_patch(config, &file, imports, method, receiver_type, dry_run, diff),
    }
}

fn apply_since(config: &mut GenConfig, since: Option<String>) {
    if let Some(req) = since {
        config.catalog.version_req = Some(req);
    }
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
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_generate(
    mut config: GenConfig,
    output: Option<PathBuf>,
    only: Vec<String>,
    since: Option<String>,
) -> Result<()> {
    if let Some(output) = output {
        config.output.root = output;
    }
    apply_since(&mut config, since);

    fs::create_dir_all(&config.output.root).with_context(|| {
        format!(
            "failed to create output root {}",
            config.output.root.display()
        )
    })?;
    println!("Output: {}", config.output.root.display());
    println!();

    let generator = Generator::from_config(config).with_only(only);
    let summary = generator.run()?;
    print_summary(&summary);

    // Per-release failures are reported above but do not fail the run.
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.completed {
        let rewritten: usize = report.patches.iter().map(|p| p.rewritten).sum();
        println!(
            "{} {}: {} files, {} rewrites -> {}",
            "✓".green(),
            report.release,
            report.extract.files,
            rewritten,
            report.dir.display()
        );
    }
    for failed in &summary.failed {
        eprintln!("{} {}: {}", "✗".red(), failed.release, failed.error);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} generated",
        format!("{}", summary.completed.len()).green()
    );
    println!("  {} failed", format!("{}", summary.failed.len()).red());
}

fn cmd_list(mut config: GenConfig, since: Option<String>) -> Result<()> {
    apply_since(&mut config, since);

    let generator = Generator::from_config(config);
    let releases = generator.discover()?;

    for release in &releases {
        println!("{}", release);
    }
    println!();
    println!("{} releases", format!("{}", releases.len()).bold());
    Ok(())
}

fn cmd_extract(mut config: GenConfig, tag: &str, output: Option<PathBuf>) -> Result<()> {
    if let Some(output) = output {
        config.output.root = output;
    }

    let generator = Generator::from_config(config).with_only([tag]);
    let release = generator
        .discover()?
        .into_iter()
        .next()
        .with_context(|| format!("release {tag} not found in the catalog"))?;

    let config = generator.config();
    let dest = config.output.root.join(release.number());
    let archives = HttpArchiveSource::new(&config.archive.url_template);
    let summary = fetch_and_extract(&archives, &release, &dest, &config.archive.filters)
        .with_context(|| format!("failed to extract {release}"))?;

    println!(
        "{} {}: {} files, {} directories -> {}",
        "✓".green(),
        release,
        summary.files,
        summary.directories,
        dest.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_patch(
    config: GenConfig,
    file: &Path,
    imports: bool,
    method: Option<String>,
    receiver_type: Option<String>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let formatter = config.format.formatter();

    let pending: PendingPatch = if imports {
        let rewrites: Vec<ImportRewrite> = config
            .imports
            .iter()
            .flat_map(|i| i.rewrites.iter().cloned())
            .collect();
        prepare_import_rewrite(file, &rewrites, &formatter)?
    } else {
        let (mut pattern, rule) = config
            .patches
            .first()
            .map(|p| (p.pattern.clone(), p.rule.clone()))
            .unwrap_or_default();
        if let Some(method) = method {
            pattern.method = method;
        }
        if let Some(receiver_type) = receiver_type {
            pattern.receiver_type = receiver_type;
        }
        prepare_patch(file, &pattern, &rule, &formatter)?
    };

    let report = &pending.report;
    for skipped in &report.skipped {
        println!(
            "{} line {}: {} ({:?})",
            "⊘".cyan(),
            skipped.line,
            skipped.receiver,
            skipped.reason
        );
    }

    if show_diff && report.changed {
        display_diff(file, &pending.original, &pending.patched);
    }

    let rewritten = report.rewritten;
    let changed = report.changed;
    if dry_run {
        println!("{}", "[DRY RUN - file not modified]".cyan());
    } else {
        pending.commit()?;
    }

    let status = if changed {
        "✓".green()
    } else {
        "⊙".yellow()
    };
    println!(
        "{} {}: {} rewritten{}",
        status,
        file.display(),
        rewritten,
        if changed { "" } else { " (unchanged)" }
    );
    Ok(())
}
