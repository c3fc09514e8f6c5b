use crate::output::print_json;
use specflow_core::lifecycle::StartOptions;
use std::path::Path;

pub fn run(
    root: &Path,
    description: &str,
    id: Option<String>,
    base: Option<String>,
    no_worktree: bool,
    json: bool,
) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let opts = StartOptions {
        id,
        base,
        no_worktree,
    };
    let outcome = flow.start(root, description, &opts)?;

    if json {
        return print_json(&outcome);
    }

    println!("Started '{}' ({})", outcome.title, outcome.id);
    println!("  branch:   {} (from {})", outcome.branch, outcome.base);
    match &outcome.worktree {
        Some(path) => println!("  worktree: {}", path.display()),
        None => println!("  checkout: {}", outcome.checkout.display()),
    }
    println!(
        "  proposal: {}",
        specflow_core::paths::proposal_path(&outcome.checkout, &outcome.id).display()
    );
    if let Some(path) = &outcome.worktree {
        println!("\nNext: cd {} and fill in the proposal.", path.display());
    }
    Ok(())
}
