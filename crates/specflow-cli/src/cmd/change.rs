use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ChangeSubcommand {
    /// List change records
    List {
        /// Include archived (landed) changes
        #[arg(long)]
        all: bool,
    },

    /// Show one change record
    Show {
        /// Change id
        id: String,
    },
}

pub fn run(root: &Path, subcmd: ChangeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ChangeSubcommand::List { all } => list(root, all, json),
        ChangeSubcommand::Show { id } => show(root, &id, json),
    }
}

fn list(root: &Path, all: bool, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let changes = flow.list_changes(all).context("failed to list changes")?;

    if json {
        return print_json(&changes);
    }
    if changes.is_empty() {
        println!("No changes.");
        return Ok(());
    }

    let rows = changes
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.state.to_string(),
                c.pr.map(|n| format!("#{n}")).unwrap_or_default(),
                c.released_version.clone().unwrap_or_default(),
                c.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATE", "PR", "RELEASED", "TITLE"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let change = flow.change(id)?;

    if json {
        return print_json(&change);
    }

    println!("{} - {}", change.id, change.title);
    println!("  branch:  {}", change.branch);
    println!("  state:   {}", change.state);
    if let Some(path) = &change.worktree {
        println!("  worktree: {}", path.display());
    }
    if let Some(pr) = change.pr {
        println!("  pr:      #{pr}");
    }
    if let Some(version) = &change.released_version {
        println!("  release: v{version}");
    }
    if change.archived {
        println!("  archived");
    }
    println!("  history:");
    for t in &change.state_history {
        println!("    {:<12} {}", t.state.as_str(), t.entered.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}
