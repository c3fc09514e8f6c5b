//! Code-hosting collaborator.
//!
//! Pull requests are mirrored read-only into [`PullRequest`] snapshots; the
//! only transitions this crate triggers are *create* and *merge*. [`GhCli`]
//! implements [`CodeHost`] on top of the GitHub `gh` CLI.

use crate::config::MergeMethod;
use crate::error::{Result, SpecflowError};
use crate::git::RawCommit;
use crate::runner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Snapshot model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    ChangesRequested,
    ReviewRequired,
    /// The repository does not require a review for this pull request.
    NoneRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksStatus {
    Success,
    Pending,
    Failure,
    /// No checks are configured for the head commit.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    /// The host has not computed mergeability yet.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub head_branch: String,
    pub base_branch: String,
    pub head_sha: String,
    pub state: PrState,
    pub is_draft: bool,
    pub is_cross_repository: bool,
    pub review_decision: ReviewDecision,
    pub checks: ChecksStatus,
    /// Names of checks that failed; empty unless `checks` is `Failure`.
    pub failing_checks: Vec<String>,
    pub mergeable: Mergeable,
    pub commits: Vec<RawCommit>,
}

/// How a caller names the pull request it wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrRef {
    Number(u64),
    Branch(String),
}

impl PrRef {
    pub fn as_arg(&self) -> String {
        match self {
            PrRef::Number(n) => n.to_string(),
            PrRef::Branch(b) => b.clone(),
        }
    }
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrRef::Number(n) => write!(f, "#{n}"),
            PrRef::Branch(b) => write!(f, "branch '{b}'"),
        }
    }
}

impl std::str::FromStr for PrRef {
    type Err = SpecflowError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SpecflowError::Parse("empty pull request reference".into()));
        }
        let digits = s.strip_prefix('#').unwrap_or(s);
        if let Ok(n) = digits.parse::<u64>() {
            return Ok(PrRef::Number(n));
        }
        Ok(PrRef::Branch(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub number: u64,
    pub head_branch: String,
    pub method: MergeMethod,
    /// Refuse the merge unless the head is still at this commit.
    pub expected_head: Option<String>,
    /// Extra lines for the merge commit body.
    pub body: Option<String>,
}

// ---------------------------------------------------------------------------
// CodeHost
// ---------------------------------------------------------------------------

pub trait CodeHost {
    /// Look a pull request up; `Ok(None)` when none exists for the target.
    fn find_pull_request(&self, dir: &Path, target: &PrRef) -> Result<Option<PullRequest>>;
    fn create_pull_request(&self, dir: &Path, request: &NewPullRequest) -> Result<PullRequest>;
    fn merge_pull_request(&self, dir: &Path, request: &MergeRequest) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GhCli
// ---------------------------------------------------------------------------

const PR_FIELDS: &str = "number,title,url,state,isDraft,isCrossRepository,headRefName,\
baseRefName,headRefOid,reviewDecision,mergeable,statusCheckRollup,commits";

#[derive(Debug, Clone, Copy, Default)]
pub struct GhCli;

impl GhCli {
    /// Run `gh` in `dir`, failing with `ToolMissing` up front when it is not installed.
    fn gh(args: &[&str], dir: &Path) -> Result<std::process::Output> {
        runner::require("gh")?;
        runner::run("gh", args, dir)
    }
}

impl CodeHost for GhCli {
    fn find_pull_request(&self, dir: &Path, target: &PrRef) -> Result<Option<PullRequest>> {
        let arg = target.as_arg();
        let args = ["pr", "view", arg.as_str(), "--json", PR_FIELDS];
        let output = Self::gh(&args, dir)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("no pull requests found")
                || stderr.contains("could not resolve to a pullrequest")
                || stderr.contains("could not resolve to a pull request")
            {
                return Ok(None);
            }
            return Err(runner::command_error("gh", &args, &output));
        }
        let raw: GhPullRequest = serde_json::from_slice(&output.stdout)?;
        Ok(Some(raw.into_pull_request()))
    }

    fn create_pull_request(&self, dir: &Path, request: &NewPullRequest) -> Result<PullRequest> {
        let mut args = vec![
            "pr",
            "create",
            "--title",
            request.title.as_str(),
            "--body",
            request.body.as_str(),
            "--head",
            request.head.as_str(),
            "--base",
            request.base.as_str(),
        ];
        if request.draft {
            args.push("--draft");
        }
        let output = Self::gh(&args, dir)?;
        if !output.status.success() {
            return Err(runner::command_error("gh", &args, &output));
        }

        self.find_pull_request(dir, &PrRef::Branch(request.head.clone()))?
            .ok_or_else(|| SpecflowError::PullRequestNotFound(request.head.clone()))
    }

    fn merge_pull_request(&self, dir: &Path, request: &MergeRequest) -> Result<()> {
        let number = request.number.to_string();
        let mut args = vec!["pr", "merge", number.as_str(), request.method.as_flag()];
        if let Some(sha) = &request.expected_head {
            args.extend(["--match-head-commit", sha.as_str()]);
        }
        if let Some(body) = &request.body {
            args.extend(["--body", body.as_str()]);
        }

        let output = Self::gh(&args, dir)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let lowered = stderr.to_lowercase();
        if lowered.contains("not mergeable") || lowered.contains("conflict") {
            return Err(SpecflowError::MergeConflict {
                branch: request.head_branch.clone(),
                detail: stderr.trim().to_string(),
            });
        }
        Err(runner::command_error("gh", &args, &output))
    }
}

// ---------------------------------------------------------------------------
// gh JSON mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    state: String,
    #[serde(default)]
    is_draft: bool,
    #[serde(default)]
    is_cross_repository: bool,
    head_ref_name: String,
    #[serde(default)]
    base_ref_name: String,
    #[serde(default)]
    head_ref_oid: String,
    #[serde(default)]
    review_decision: Option<String>,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(default)]
    status_check_rollup: Option<Vec<GhCheck>>,
    #[serde(default)]
    commits: Vec<GhCommit>,
}

/// Either a check run (`status` + `conclusion`) or a commit status (`state`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhCheck {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhCommit {
    oid: String,
    #[serde(default)]
    message_headline: String,
    #[serde(default)]
    message_body: String,
}

enum CheckOutcome {
    Passed,
    Waiting,
    Failed,
}

impl GhCheck {
    fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.context.clone())
            .unwrap_or_else(|| "unnamed check".to_string())
    }

    fn outcome(&self) -> CheckOutcome {
        if let Some(state) = &self.state {
            return match state.as_str() {
                "SUCCESS" => CheckOutcome::Passed,
                "FAILURE" | "ERROR" => CheckOutcome::Failed,
                _ => CheckOutcome::Waiting,
            };
        }
        if self.status.as_deref() != Some("COMPLETED") {
            return CheckOutcome::Waiting;
        }
        match self.conclusion.as_deref() {
            Some("SUCCESS" | "NEUTRAL" | "SKIPPED") => CheckOutcome::Passed,
            _ => CheckOutcome::Failed,
        }
    }
}

fn summarize_checks(checks: &[GhCheck]) -> (ChecksStatus, Vec<String>) {
    if checks.is_empty() {
        return (ChecksStatus::None, Vec::new());
    }
    let mut failing = Vec::new();
    let mut waiting = false;
    for check in checks {
        match check.outcome() {
            CheckOutcome::Passed => {}
            CheckOutcome::Waiting => waiting = true,
            CheckOutcome::Failed => failing.push(check.label()),
        }
    }
    if !failing.is_empty() {
        (ChecksStatus::Failure, failing)
    } else if waiting {
        (ChecksStatus::Pending, failing)
    } else {
        (ChecksStatus::Success, failing)
    }
}

impl GhPullRequest {
    fn into_pull_request(self) -> PullRequest {
        let state = match self.state.as_str() {
            "MERGED" => PrState::Merged,
            "CLOSED" => PrState::Closed,
            _ => PrState::Open,
        };
        let review_decision = match self.review_decision.as_deref() {
            Some("APPROVED") => ReviewDecision::Approved,
            Some("CHANGES_REQUESTED") => ReviewDecision::ChangesRequested,
            Some("REVIEW_REQUIRED") => ReviewDecision::ReviewRequired,
            _ => ReviewDecision::NoneRequired,
        };
        let mergeable = match self.mergeable.as_deref() {
            Some("MERGEABLE") => Mergeable::Mergeable,
            Some("CONFLICTING") => Mergeable::Conflicting,
            _ => Mergeable::Unknown,
        };
        let (checks, failing_checks) =
            summarize_checks(self.status_check_rollup.as_deref().unwrap_or(&[]));
        let commits = self
            .commits
            .into_iter()
            .map(|c| RawCommit {
                sha: c.oid,
                message: if c.message_body.trim().is_empty() {
                    c.message_headline
                } else {
                    format!("{}\n\n{}", c.message_headline, c.message_body.trim())
                },
            })
            .collect();

        PullRequest {
            number: self.number,
            title: self.title,
            url: self.url,
            head_branch: self.head_ref_name,
            base_branch: self.base_ref_name,
            head_sha: self.head_ref_oid,
            state,
            is_draft: self.is_draft,
            is_cross_repository: self.is_cross_repository,
            review_decision,
            checks,
            failing_checks,
            mergeable,
            commits,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
