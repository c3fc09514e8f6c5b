use crate::output::{print_json, print_table};
use specflow_core::hosting::PrRef;
use std::path::Path;

pub fn run(root: &Path, pr: Option<&str>, json: bool) -> anyhow::Result<()> {
    let flow = super::open(root)?;
    let target = pr.map(str::parse::<PrRef>).transpose()?;
    let report = flow.analyze(root, target.as_ref())?;

    if json {
        return print_json(&report);
    }

    match &report.since_tag {
        Some(tag) => println!("Commits since {tag}: {}", report.commits.len()),
        None => println!("Commits since last release: {}", report.commits.len()),
    }
    if !report.commits.is_empty() {
        let rows = report
            .commits
            .iter()
            .map(|c| {
                vec![
                    c.sha.get(..7).unwrap_or(&c.sha).to_string(),
                    c.commit_type.clone(),
                    if c.is_breaking { "yes".into() } else { String::new() },
                    c.message.lines().next().unwrap_or("").to_string(),
                ]
            })
            .collect();
        print_table(&["SHA", "TYPE", "BREAKING", "SUBJECT"], rows);
    }

    println!();
    println!("{}", report.analysis.reasoning);
    println!("Next version: {} -> {}", report.current_version, report.next_version);
    let auto = if report.auto_release {
        "yes"
    } else {
        "no (run 'specflow release')"
    };
    println!("Auto-release on land: {auto}");
    Ok(())
}
