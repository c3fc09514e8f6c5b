//! Proposal artifacts that travel with a managed change.
//!
//! A proposal lives in the change's checkout under
//! `.specflow/changes/<id>/` (`proposal.md` + `tasks.md`). Shipping a managed
//! change validates it and moves it to `.specflow/archive/<id>/` so the
//! archive lands in the same pull request as the code.

use crate::error::{Result, SpecflowError};
use crate::{io, naming, paths};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProposalValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ProposalValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskItem {
    pub id: Option<String>,
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub completed: usize,
    pub total: usize,
    pub items: Vec<TaskItem>,
}

/// What the lifecycle needs from a proposal to commit and open a PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalSummary {
    pub id: String,
    pub title: String,
    /// Conventional-commit type declared in the front matter.
    pub commit_type: Option<String>,
    pub summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProposalMeta {
    #[serde(default, rename = "type")]
    change_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

pub trait Proposals {
    /// Write the proposal skeleton. Existing files are left untouched.
    fn scaffold(&self, checkout: &Path, id: &str, description: &str) -> Result<()>;
    fn validate(&self, checkout: &Path, id: &str) -> Result<ProposalValidation>;
    /// Move the artifacts to the archive. Returns `false` when already archived.
    fn archive(&self, checkout: &Path, id: &str) -> Result<bool>;
    fn is_archived(&self, checkout: &Path, id: &str) -> bool;
    fn read_tasks(&self, checkout: &Path, id: &str) -> Result<TaskProgress>;
    fn proposal(&self, checkout: &Path, id: &str) -> Result<ProposalSummary>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsProposals;

impl Proposals for FsProposals {
    fn scaffold(&self, checkout: &Path, id: &str, description: &str) -> Result<()> {
        let title = title_for(id, description);
        let proposal = format!(
            "---\nid: {id}\ntype: {}\n---\n\n# {title}\n\n## Why\n\n{}\n\n## What Changes\n\n- \n",
            scaffold_type(id),
            description.trim(),
        );
        let tasks = format!("# Tasks\n\n- [ ] 1. {title}\n- [ ] 2. Tests\n");

        io::ensure_dir(&paths::proposal_dir(checkout, id))?;
        io::write_if_missing(&paths::proposal_path(checkout, id), proposal.as_bytes())?;
        io::write_if_missing(&paths::tasks_path(checkout, id), tasks.as_bytes())?;
        Ok(())
    }

    fn validate(&self, checkout: &Path, id: &str) -> Result<ProposalValidation> {
        let mut report = ProposalValidation::default();
        let Some(dir) = locate(checkout, id) else {
            report
                .errors
                .push(format!("no proposal at {}", paths::proposal_dir(checkout, id).display()));
            return Ok(report);
        };

        let proposal_file = dir.join(paths::PROPOSAL_FILE);
        if !proposal_file.exists() {
            report.errors.push(format!("missing {}", paths::PROPOSAL_FILE));
        } else {
            let content = std::fs::read_to_string(&proposal_file)?;
            if extract_title(&content).is_none() {
                report.errors.push("proposal has no '# ' title".to_string());
            }
            match section(&content, "Why") {
                None => report.errors.push("proposal has no '## Why' section".to_string()),
                Some(body) if body.trim().is_empty() => {
                    report.errors.push("'## Why' section is empty".to_string())
                }
                Some(_) => {}
            }
            if section(&content, "What Changes").is_none() {
                report
                    .warnings
                    .push("proposal has no '## What Changes' section".to_string());
            }
        }

        let tasks_file = dir.join(paths::TASKS_FILE);
        if !tasks_file.exists() {
            report.warnings.push(format!("missing {}", paths::TASKS_FILE));
        } else {
            let progress = parse_tasks(&std::fs::read_to_string(&tasks_file)?);
            if progress.total == 0 {
                report.warnings.push("no tasks listed".to_string());
            } else if progress.completed < progress.total {
                report.warnings.push(format!(
                    "{} of {} tasks still open",
                    progress.total - progress.completed,
                    progress.total
                ));
            }
        }
        Ok(report)
    }

    fn archive(&self, checkout: &Path, id: &str) -> Result<bool> {
        let from = paths::proposal_dir(checkout, id);
        let to = paths::archived_proposal_dir(checkout, id);
        match (from.exists(), to.exists()) {
            (false, true) => Ok(false),
            (false, false) => Err(SpecflowError::InvalidProposal {
                id: id.to_string(),
                errors: vec!["no proposal to archive".to_string()],
            }),
            (true, true) => Err(SpecflowError::InvalidProposal {
                id: id.to_string(),
                errors: vec![format!("{} already exists", to.display())],
            }),
            (true, false) => {
                io::move_path(&from, &to)?;
                tracing::info!(id, "archived proposal");
                Ok(true)
            }
        }
    }

    fn is_archived(&self, checkout: &Path, id: &str) -> bool {
        !paths::proposal_dir(checkout, id).exists()
            && paths::archived_proposal_dir(checkout, id).exists()
    }

    fn read_tasks(&self, checkout: &Path, id: &str) -> Result<TaskProgress> {
        let Some(dir) = locate(checkout, id) else {
            return Ok(TaskProgress::default());
        };
        let path = dir.join(paths::TASKS_FILE);
        if !path.exists() {
            return Ok(TaskProgress::default());
        }
        Ok(parse_tasks(&std::fs::read_to_string(path)?))
    }

    fn proposal(&self, checkout: &Path, id: &str) -> Result<ProposalSummary> {
        let path = locate(checkout, id)
            .map(|dir| dir.join(paths::PROPOSAL_FILE))
            .filter(|p| p.exists())
            .ok_or_else(|| SpecflowError::InvalidProposal {
                id: id.to_string(),
                errors: vec![format!("missing {}", paths::PROPOSAL_FILE)],
            })?;
        let content = std::fs::read_to_string(path)?;

        let meta: ProposalMeta = extract_frontmatter(&content)
            .and_then(|fm| serde_yaml::from_str(fm).ok())
            .unwrap_or_default();
        let summary = section(&content, "What Changes")
            .filter(|s| !is_placeholder(s))
            .or_else(|| section(&content, "Why"))
            .unwrap_or_default();

        Ok(ProposalSummary {
            id: id.to_string(),
            title: extract_title(&content).unwrap_or_else(|| naming::humanize(id)),
            commit_type: meta.change_type.filter(|t| !t.trim().is_empty()),
            summary: summary.trim().to_string(),
        })
    }
}

/// The active proposal directory, or the archived one once shipped.
fn locate(checkout: &Path, id: &str) -> Option<std::path::PathBuf> {
    [
        paths::proposal_dir(checkout, id),
        paths::archived_proposal_dir(checkout, id),
    ]
    .into_iter()
    .find(|p| p.exists())
}

fn title_for(id: &str, description: &str) -> String {
    let line = description.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        naming::humanize(id)
    } else {
        line.to_string()
    }
}

/// Commit type to pre-fill from the id's leading verb.
fn scaffold_type(id: &str) -> &'static str {
    match id.split('-').next().unwrap_or("") {
        "fix" | "repair" | "correct" | "resolve" => "fix",
        "docs" | "document" => "docs",
        "refactor" | "restructure" | "simplify" => "refactor",
        "remove" | "drop" | "delete" | "bump" | "upgrade" => "chore",
        "speed" | "optimize" => "perf",
        "test" => "test",
        _ => "feat",
    }
}

// ---------------------------------------------------------------------------
// Markdown parsing
// ---------------------------------------------------------------------------

fn extract_frontmatter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix('\n')
        .or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Body of the `## <name>` section, up to the next `## ` heading.
fn section(content: &str, name: &str) -> Option<String> {
    let mut lines = content.lines();
    lines.find(|l| {
        l.strip_prefix("## ")
            .is_some_and(|h| h.trim().eq_ignore_ascii_case(name))
    })?;
    let body: Vec<&str> = lines.take_while(|l| !l.starts_with("## ")).collect();
    Some(body.join("\n").trim().to_string())
}

fn is_placeholder(body: &str) -> bool {
    body.lines().all(|l| matches!(l.trim(), "" | "-" | "*"))
}

static TASK_RE: OnceLock<Regex> = OnceLock::new();

fn task_re() -> &'static Regex {
    TASK_RE.get_or_init(|| {
        Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s+(?:(\d+(?:\.\d+)*)\.?\s+)?(.+?)\s*$")
            .expect("static regex")
    })
}

/// Parse checkbox lines (`- [x] 1.2 Text`) into task progress.
pub fn parse_tasks(content: &str) -> TaskProgress {
    let items: Vec<TaskItem> = content
        .lines()
        .filter_map(|line| {
            let caps = task_re().captures(line)?;
            Some(TaskItem {
                done: !caps[1].trim().is_empty(),
                id: caps.get(2).map(|m| m.as_str().to_string()),
                text: caps[3].to_string(),
            })
        })
        .collect();
    TaskProgress {
        completed: items.iter().filter(|t| t.done).count(),
        total: items.len(),
        items,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
