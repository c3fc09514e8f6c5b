use crate::output::print_json;
use anyhow::Context;
use specflow_core::{git::SystemGit, git::Vcs, lifecycle, paths};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    // Initialize the main checkout even when invoked from a worktree.
    let root = SystemGit.main_root(root).unwrap_or_else(|_| root.to_path_buf());
    let outcome = lifecycle::init(&root).context("failed to initialize")?;

    if json {
        return print_json(&outcome);
    }

    println!("Initializing specflow in: {}", outcome.root.display());
    let verb = if outcome.config_created { "created" } else { "exists: " };
    println!("  {verb} {}", paths::CONFIG_FILE);
    println!("  ready:   {}", paths::CHANGES_DIR);
    println!("  ready:   {}", paths::ARCHIVE_DIR);
    if outcome.gitignore_updated {
        println!("  updated: .gitignore");
    }
    println!("\nCommit the .specflow/ directory, then run 'specflow start \"<description>\"'.");
    Ok(())
}
