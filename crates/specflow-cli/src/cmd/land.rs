use crate::output::print_json;
use specflow_core::hosting::PrRef;
use specflow_core::lifecycle::{LandOptions, ReleaseDecision};
use std::path::Path;

pub fn run(root: &Path, pr: Option<&str>, no_release: bool, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let target = pr.map(str::parse::<PrRef>).transpose()?;
    let outcome = flow.land(root, target, &LandOptions { no_release })?;

    if json {
        return print_json(&outcome);
    }

    if outcome.already_merged {
        println!("#{} was already merged; finished cleanup", outcome.number);
    } else {
        println!("Merged #{} ({})", outcome.number, outcome.branch);
    }
    if let Some(analysis) = &outcome.analysis {
        println!("  analysis: {}", analysis.reasoning);
    }
    match &outcome.release {
        ReleaseDecision::Applied {
            previous, version, ..
        } => println!("  released: {previous} -> {version}"),
        ReleaseDecision::Declined { bump, reason } => {
            println!("  release:  {bump} not applied ({reason})")
        }
        ReleaseDecision::Skipped { reason } => println!("  release:  skipped ({reason})"),
    }

    let cleanup = &outcome.cleanup;
    if let Some(path) = &cleanup.worktree_removed {
        println!("  removed worktree {}", path.display());
    }
    if cleanup.switched_to_base {
        println!("  switched main checkout to {}", flow.config().branching.base);
    }
    if cleanup.branch_deleted {
        println!("  deleted branch {}", cleanup.branch);
    }
    if let Some(state) = outcome.change_state {
        println!("  change: {state}");
    }
    for warning in &outcome.warnings {
        println!("[warning] {warning}");
    }
    Ok(())
}
