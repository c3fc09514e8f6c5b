use crate::output::print_json;
use specflow_core::branch_kind::BranchKind;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let status = flow.status(root)?;

    if json {
        return print_json(&status);
    }

    let branch = status.branch.as_deref().unwrap_or("(detached HEAD)");
    let kind = status.kind.as_ref().map(BranchKind::label).unwrap_or("-");
    println!("Branch:   {branch} [{kind}]");
    println!("Checkout: {}", status.checkout.display());
    if let Some(path) = &status.worktree {
        println!("Worktree: {}", path.display());
    }

    if let Some(change) = &status.change {
        println!("Change:   {} ({}) - {}", change.id, change.state, change.title);
    }
    if let Some(tasks) = status.tasks.as_ref().filter(|t| t.total > 0) {
        println!("Tasks:    {}/{} complete", tasks.completed, tasks.total);
    }

    match (&status.pull_request, &status.host_error) {
        (Some(pr), _) => {
            let state = format!("{:?}", pr.state).to_lowercase();
            println!("PR:       #{} {} [{state}]", pr.number, pr.title);
            println!("          {}", pr.url);
        }
        (None, Some(err)) => println!("PR:       unavailable ({err})"),
        (None, None) => {
            if !matches!(status.kind, Some(BranchKind::Invalid { .. }) | None) {
                println!("PR:       none (run 'specflow ship')");
            }
        }
    }

    if let Some(readiness) = &status.readiness {
        if readiness.ready {
            println!("Ready:    yes (run 'specflow land')");
        } else {
            println!("Ready:    no");
            for blocker in &readiness.blockers {
                println!("  - {blocker}");
            }
        }
    }
    Ok(())
}
