use crate::output::{print_json, print_table};
use clap::Subcommand;
use specflow_core::branch_kind;
use std::path::Path;

#[derive(Subcommand)]
pub enum WorktreeSubcommand {
    /// List checkouts and the branch each one holds
    List,
}

pub fn run(root: &Path, subcmd: WorktreeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorktreeSubcommand::List => list(root, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let manager = flow.worktrees();
    let worktrees = manager.list()?;

    if json {
        return print_json(&worktrees);
    }

    let rows = worktrees
        .iter()
        .map(|w| {
            let branch = w.branch.clone().unwrap_or_else(|| "(detached)".to_string());
            let kind = if manager.is_main_checkout(&w.path) {
                "main checkout"
            } else {
                branch_kind::classify(&flow.config().branching, &branch).label()
            };
            vec![
                w.path.display().to_string(),
                branch,
                kind.to_string(),
            ]
        })
        .collect();
    print_table(&["PATH", "BRANCH", "KIND"], rows);
    Ok(())
}
