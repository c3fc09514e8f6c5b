use crate::output::print_json;
use specflow_core::lifecycle::ShipOptions;
use std::path::Path;

pub fn run(
    root: &Path,
    commit_type: Option<String>,
    message: Option<String>,
    draft: bool,
    json: bool,
) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let opts = ShipOptions {
        commit_type,
        message,
        draft,
    };
    let outcome = flow.ship(root, &opts)?;

    if json {
        return print_json(&outcome);
    }

    for warning in &outcome.warnings {
        println!("[warning] {warning}");
    }
    if outcome.proposal_archived {
        println!("Archived proposal for {}", outcome.branch);
    }
    if let (Some(sha), Some(message)) = (&outcome.commit, &outcome.commit_message) {
        println!("Committed {} {message}", short(sha));
    }
    if outcome.pushed {
        println!("Pushed {}", outcome.branch);
    }
    let pr = &outcome.pull_request;
    let verb = if outcome.created { "Opened" } else { "Updated" };
    println!("{verb} #{} {}", pr.number, pr.title);
    println!("  {}", pr.url);
    if let Some(state) = outcome.change_state {
        println!("  change: {state}");
    }
    Ok(())
}

fn short(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
