mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{change::ChangeSubcommand, config::ConfigSubcommand, worktree::WorktreeSubcommand};
use specflow_core::SpecflowError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "specflow",
    about = "Spec-driven change lifecycle: start, ship, land and release changes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Repository root (default: auto-detect from .specflow/ or .git)
    #[arg(long, global = true, env = "SPECFLOW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log lifecycle steps to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize specflow in the current repository
    Init,

    /// Start a change: branch, worktree and proposal skeleton
    Start {
        /// What the change does; the id is derived from it
        description: String,
        /// Use this id instead of deriving one
        #[arg(long)]
        id: Option<String>,
        /// Branch to start from (default: the configured base)
        #[arg(long)]
        base: Option<String>,
        /// Switch the current checkout instead of creating a worktree
        #[arg(long)]
        no_worktree: bool,
    },

    /// Commit, push and open (or update) the pull request for this branch
    Ship {
        /// Conventional commit type (feat, fix, ...)
        #[arg(long = "type", value_name = "TYPE")]
        commit_type: Option<String>,
        /// Commit subject
        #[arg(long, short = 'm')]
        message: Option<String>,
        /// Open the pull request as a draft
        #[arg(long)]
        draft: bool,
    },

    /// Merge a ready pull request, auto-release if allowed, and clean up
    Land {
        /// Pull request number or branch (default: the current branch)
        pr: Option<String>,
        /// Never auto-release
        #[arg(long)]
        no_release: bool,
    },

    /// Bump the version on the base branch and push the release marker
    Release {
        /// Bump tier; required for major releases
        #[arg(long, value_name = "patch|minor|major")]
        bump: Option<String>,
    },

    /// Show the current branch, change, pull request and readiness
    Status,

    /// Dry-run the version analysis
    Analyze {
        /// Include this pull request's commits
        pr: Option<String>,
    },

    /// Inspect change records
    Change {
        #[command(subcommand)]
        subcommand: ChangeSubcommand,
    },

    /// Inspect worktrees
    Worktree {
        #[command(subcommand)]
        subcommand: WorktreeSubcommand,
    },

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, json),
        Commands::Start {
            description,
            id,
            base,
            no_worktree,
        } => cmd::start::run(&root, &description, id, base, no_worktree, json),
        Commands::Ship {
            commit_type,
            message,
            draft,
        } => cmd::ship::run(&root, commit_type, message, draft, json),
        Commands::Land { pr, no_release } => cmd::land::run(&root, pr.as_deref(), no_release, json),
        Commands::Release { bump } => cmd::release::run(&root, bump.as_deref(), json),
        Commands::Status => cmd::status::run(&root, json),
        Commands::Analyze { pr } => cmd::analyze::run(&root, pr.as_deref(), json),
        Commands::Change { subcommand } => cmd::change::run(&root, subcommand, json),
        Commands::Worktree { subcommand } => cmd::worktree::run(&root, subcommand, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        report_error(&e, json);
        std::process::exit(1);
    }
}

fn report_error(e: &anyhow::Error, json: bool) {
    let cause = e.downcast_ref::<SpecflowError>();
    if json {
        let payload = serde_json::json!({
            "kind": cause.map(|c| c.kind()),
            "message": format!("{e:#}"),
            "hint": cause.and_then(|c| c.hint()),
            "context": cause.map(|c| c.context()),
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        return;
    }
    // Print the full error chain (anyhow's alternate Display)
    eprintln!("error: {e:#}");
    if let Some(SpecflowError::NotReady { blockers, .. }) = cause {
        for blocker in blockers {
            eprintln!("  - {blocker}");
        }
    }
    if let Some(hint) = cause.and_then(|c| c.hint()) {
        eprintln!("hint: {hint}");
    }
}
