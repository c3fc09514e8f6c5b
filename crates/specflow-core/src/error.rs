use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecflowError {
    #[error("not initialized: run 'specflow init'")]
    NotInitialized,

    #[error("invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("branch already exists: {branch}")]
    BranchExists {
        branch: String,
        worktree: Option<PathBuf>,
    },

    #[error("change not found: {0}")]
    ChangeNotFound(String),

    #[error("no pull request found for {0}")]
    PullRequestNotFound(String),

    #[error("pull request #{number} is not ready to land: {}", blockers.join("; "))]
    NotReady { number: u64, blockers: Vec<String> },

    #[error("nothing to commit: {0}")]
    NothingToCommit(String),

    #[error("merge conflict on '{branch}': {detail}")]
    MergeConflict { branch: String, detail: String },

    #[error("cleanup incomplete for '{branch}': {detail}")]
    PartialCleanup {
        branch: String,
        worktree: Option<PathBuf>,
        worktree_present: bool,
        branch_deleted: bool,
        detail: String,
    },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("cannot operate on branch '{branch}': {reason}")]
    InvalidBranch { branch: String, reason: String },

    #[error("proposal '{id}' failed validation: {}", errors.join("; "))]
    InvalidProposal { id: String, errors: Vec<String> },

    #[error("cannot infer a commit type from branch '{0}'")]
    CommitTypeRequired(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("version file not found: {0}")]
    VersionFileNotFound(String),

    #[error("`{program}` is not installed or not on PATH")]
    ToolMissing { program: String },

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Semver(#[from] semver::Error),

    #[error(transparent)]
    Toml(#[from] toml_edit::TomlError),
}

pub type Result<T> = std::result::Result<T, SpecflowError>;

/// Stable, machine-checkable classification of a [`SpecflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    InvalidIdentifier,
    BranchExists,
    NotFound,
    NotReady,
    NothingToCommit,
    MergeConflict,
    PartialCleanup,
    PolicyViolation,
    InvalidBranch,
    InvalidProposal,
    CommitTypeRequired,
    InvalidTransition,
    Command,
    Io,
    Parse,
}

impl SpecflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpecflowError::NotInitialized => ErrorKind::NotInitialized,
            SpecflowError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            SpecflowError::BranchExists { .. } => ErrorKind::BranchExists,
            SpecflowError::ChangeNotFound(_)
            | SpecflowError::PullRequestNotFound(_)
            | SpecflowError::VersionFileNotFound(_) => ErrorKind::NotFound,
            SpecflowError::NotReady { .. } => ErrorKind::NotReady,
            SpecflowError::NothingToCommit(_) => ErrorKind::NothingToCommit,
            SpecflowError::MergeConflict { .. } => ErrorKind::MergeConflict,
            SpecflowError::PartialCleanup { .. } => ErrorKind::PartialCleanup,
            SpecflowError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            SpecflowError::InvalidBranch { .. } => ErrorKind::InvalidBranch,
            SpecflowError::InvalidProposal { .. } => ErrorKind::InvalidProposal,
            SpecflowError::CommitTypeRequired(_) => ErrorKind::CommitTypeRequired,
            SpecflowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            SpecflowError::ToolMissing { .. } | SpecflowError::Command { .. } => {
                ErrorKind::Command
            }
            SpecflowError::Io(_) => ErrorKind::Io,
            SpecflowError::Parse(_)
            | SpecflowError::Yaml(_)
            | SpecflowError::Json(_)
            | SpecflowError::Semver(_)
            | SpecflowError::Toml(_) => ErrorKind::Parse,
        }
    }

    /// The corrective next action for the operator, when there is one.
    pub fn hint(&self) -> Option<String> {
        let hint = match self {
            SpecflowError::NotInitialized => "run 'specflow init' in the main checkout".to_string(),
            SpecflowError::InvalidIdentifier { .. } => {
                "pick a different description or pass --id <kebab-case-id>".to_string()
            }
            SpecflowError::BranchExists { worktree: Some(path), .. } => {
                format!("the change is already started; continue in {}", path.display())
            }
            SpecflowError::BranchExists { branch, .. } => {
                format!("the change is already started; check out '{branch}' to continue")
            }
            SpecflowError::ChangeNotFound(_) => "run 'specflow change list' to see known changes".to_string(),
            SpecflowError::PullRequestNotFound(_) => "run 'specflow ship' first".to_string(),
            SpecflowError::NotReady { .. } => {
                "resolve the blockers (or wait for checks) and re-run 'specflow land'".to_string()
            }
            SpecflowError::NothingToCommit(_) => return None,
            SpecflowError::MergeConflict { .. } => {
                "update the branch from the base branch, resolve conflicts, then ship again".to_string()
            }
            SpecflowError::PartialCleanup { worktree: Some(path), .. } => {
                format!("remove {} manually, then run 'git worktree prune'", path.display())
            }
            SpecflowError::PartialCleanup { branch, .. } => {
                format!("delete the local branch with 'git branch -D {branch}'")
            }
            SpecflowError::PolicyViolation(_) => "re-run with an explicit --bump major".to_string(),
            SpecflowError::InvalidBranch { .. } => {
                "check out a change branch or pass a pull request number".to_string()
            }
            SpecflowError::InvalidProposal { .. } => {
                "fix the proposal artifacts and re-run 'specflow ship'".to_string()
            }
            SpecflowError::CommitTypeRequired(_) => "re-run with --type <feat|fix|...>".to_string(),
            SpecflowError::VersionFileNotFound(_) => {
                "add a version file or list one under release.version_files".to_string()
            }
            SpecflowError::ToolMissing { program } => format!("install `{program}` and retry"),
            _ => return None,
        };
        Some(hint)
    }

    /// Machine-readable payload describing the unmet precondition.
    pub fn context(&self) -> serde_json::Value {
        match self {
            SpecflowError::InvalidIdentifier { id, reason } => json!({ "id": id, "reason": reason }),
            SpecflowError::BranchExists { branch, worktree } => {
                json!({ "branch": branch, "worktree": worktree })
            }
            SpecflowError::ChangeNotFound(id) => json!({ "change": id }),
            SpecflowError::PullRequestNotFound(target) => json!({ "pull_request": target }),
            SpecflowError::NotReady { number, blockers } => {
                json!({ "number": number, "blockers": blockers })
            }
            SpecflowError::MergeConflict { branch, detail } => {
                json!({ "branch": branch, "detail": detail })
            }
            SpecflowError::PartialCleanup {
                branch,
                worktree,
                worktree_present,
                branch_deleted,
                detail,
            } => json!({
                "branch": branch,
                "worktree": worktree,
                "worktree_present": worktree_present,
                "branch_deleted": branch_deleted,
                "detail": detail,
            }),
            SpecflowError::InvalidBranch { branch, reason } => {
                json!({ "branch": branch, "reason": reason })
            }
            SpecflowError::InvalidProposal { id, errors } => json!({ "id": id, "errors": errors }),
            SpecflowError::CommitTypeRequired(branch) => json!({ "branch": branch }),
            SpecflowError::InvalidTransition { from, to } => json!({ "from": from, "to": to }),
            SpecflowError::Command { command, stderr } => {
                json!({ "command": command, "stderr": stderr })
            }
            _ => serde_json::Value::Null,
        }
    }
}
