use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{debug, info, Level, LevelFilter};
use revpatch::{
    CommitDefaults, DefaultBackend, Patch, PatchAuthor, PatchResult, Patcher, PatcherBackend,
    PatcherError, PatcherOptions, ScmRegistry,
};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

// --- Main Application Entry Point ---

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        // {:?} prints the full error chain from `anyhow`.
        eprintln!("{} {:?}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Contains the primary logic of the application.
fn run(args: Args) -> Result<()> {
    setup_logging(args.verbose);

    // --- Argument Validation ---
    if !args.dest.is_dir() {
        return Err(anyhow!(
            "Destination directory '{}' not found or is not a directory.",
            args.dest.display()
        ));
    }
    let commit = args.commit || args.commit_no_edit;
    if args.squash && !commit {
        return Err(anyhow!("--squash can only be used with --commit or --commit-no-edit."));
    }

    if args.print {
        return print_patches(&args.patch_files);
    }

    // --- Patch Setup ---
    let patches: Vec<Patch> = args
        .patch_files
        .iter()
        .map(|path| {
            let mut patch = Patch::from_path(path);
            patch.prefix_level = args.px;
            patch.base_dir = args.base_dir.clone();
            patch
        })
        .collect();
    let total_patches = patches.len();

    let mut options = PatcherOptions::builder()
        .dest_path(&args.dest)
        .revert(args.revert)
        .squash(args.squash);

    let backend: Box<dyn PatcherBackend> = match ScmRegistry::with_defaults().detect(&args.dest) {
        Some((client, repository_info)) => {
            info!("Using {} repository '{}'", client.name(), repository_info.path);
            options = options.repository_info(repository_info);
            client.patcher_backend()
        }
        None => {
            debug!("No repository detected; patching as a plain directory.");
            Box::new(DefaultBackend)
        }
    };

    let mut patcher = Patcher::with_backend(patches, options.build(), backend);
    patcher
        .check_dependencies()
        .context("Cannot apply patches")?;

    if commit {
        let defaults = commit_defaults(&args)?;
        patcher
            .prepare_for_commit(&defaults, !args.commit_no_edit)
            .context("Cannot commit the applied patches")?;
    }

    // --- Core Patching Logic ---
    let (verb, past) = if args.revert {
        ("Reverting", "Reverted")
    } else {
        ("Applying", "Applied")
    };
    println!("{} {} patch(es)", verb, total_patches);

    for step in patcher.patch() {
        match step {
            Ok(result) => {
                print_output(&result);
                println!("{} patch {} / {}", past, result.patch_range.1, total_patches);
            }
            Err(e) => {
                report_failure(&e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

// --- Helper Structs and Functions ---

fn commit_defaults(args: &Args) -> Result<CommitDefaults> {
    match (&args.author, &args.message) {
        (Some(author), Some(message)) => Ok(CommitDefaults::new(author.clone(), message.clone())),
        _ => Err(anyhow!(
            "--author and --message are required when committing patches."
        )),
    }
}

fn print_patches(patch_files: &[PathBuf]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for path in patch_files {
        let content = fs::read(path)
            .with_context(|| format!("Failed to read patch file '{}'", path.display()))?;
        stdout.write_all(&content)?;
    }
    stdout.flush()?;
    Ok(())
}

fn print_output(result: &PatchResult) {
    let output = result.output_text();
    if !output.is_empty() {
        println!("{}", output);
    }
}

/// Prints the patch output and conflicting files for a failed patch.
fn report_failure(e: &PatcherError) {
    let Some(failed) = e
        .as_apply_error()
        .and_then(|apply_error| apply_error.failed_patch_result.as_ref())
    else {
        return;
    };

    print_output(failed);

    if !failed.conflicting_files.is_empty() {
        eprintln!();
        eprintln!("{}", "Conflicting files:".yellow().bold());
        for path in &failed.conflicting_files {
            eprintln!("    {}", path);
        }
    }

    for (path, reason) in &failed.binary_failed {
        eprintln!("{} {}: {}", "warning:".yellow().bold(), path, reason);
    }
}

/// Defines the command-line arguments for the application.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Apply or revert patches to a tree using the system patch tool.",
    long_about = "Applies one or more unified diffs in order using GNU or BSD patch, reports conflicts per file, and optionally commits each applied patch to the repository."
)]
struct Args {
    /// The patch files to apply, in order.
    #[arg(required = true)]
    patch_files: Vec<PathBuf>,
    /// The directory to apply the patches in.
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,
    /// Strip this many leading path components from file names in the patches.
    #[arg(long, value_name = "N")]
    px: Option<u32>,
    /// Revert the patches instead of applying them.
    #[arg(short = 'R', long)]
    revert: bool,
    /// Commit each applied patch, opening an editor for the message.
    #[arg(short, long)]
    commit: bool,
    /// Commit each applied patch without opening an editor.
    #[arg(short = 'C', long, conflicts_with = "commit")]
    commit_no_edit: bool,
    /// Squash all patches into a single commit.
    #[arg(long)]
    squash: bool,
    /// The author for commits, as "Full Name <email>".
    #[arg(long, value_name = "AUTHOR")]
    author: Option<PatchAuthor>,
    /// The message for commits.
    #[arg(short, long)]
    message: Option<String>,
    /// The directory within the repository the patches were generated in.
    #[arg(long, value_name = "PATH")]
    base_dir: Option<String>,
    /// Print the patch contents instead of applying them.
    #[arg(long)]
    print: bool,
    /// Increase logging verbosity. Can be used multiple times.
    /// -v for info, -vv for debug, -vvv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Sets up the global logger.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "{} {}", "error:".red().bold(), record.args()),
            Level::Warn => writeln!(buf, "{} {}", "warning:".yellow().bold(), record.args()),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug => writeln!(buf, "{} {}", "debug:".blue().bold(), record.args()),
            Level::Trace => writeln!(buf, "{} {}", "trace:".cyan().bold(), record.args()),
        })
        .init();
}
