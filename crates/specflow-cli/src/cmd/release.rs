use crate::output::print_json;
use specflow_core::types::BumpTier;
use std::path::Path;

pub fn run(root: &Path, bump: Option<&str>, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let bump = bump.map(str::parse::<BumpTier>).transpose()?;
    let outcome = flow.release(root, bump)?;

    if json {
        return print_json(&outcome);
    }

    if outcome.pushed_only {
        println!("Pushed pending release v{}", outcome.version);
    } else {
        println!(
            "Released v{} (was {})",
            outcome.version,
            outcome.previous.as_deref().unwrap_or("unknown")
        );
        if let Some(analysis) = &outcome.analysis {
            let source = if outcome.explicit { "explicit" } else { "suggested" };
            let bump = outcome.bump.map(|b| b.as_str()).unwrap_or("-");
            println!("  bump: {bump} ({source}); {}", analysis.reasoning);
        }
        for file in &outcome.files {
            println!("  updated {}", file.display());
        }
    }
    if !outcome.released_changes.is_empty() {
        println!("  changes: {}", outcome.released_changes.join(", "));
    }
    Ok(())
}
