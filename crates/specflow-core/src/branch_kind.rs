//! Branch classification.
//!
//! Classification looks only at the branch name: a `spec/x` branch without a
//! worktree is still managed, and an ad-hoc branch never becomes managed just
//! because someone made a worktree for it.

use crate::config::BranchingConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchKind {
    /// Created by `start`; carries a change id and proposal artifacts.
    Managed { branch: String, id: String },
    /// Any other non-base branch. `commit_type` is the inferred type, if any.
    AdHoc {
        branch: String,
        commit_type: Option<String>,
    },
    /// The base branch itself. Lifecycle operations refuse to run here.
    Invalid { branch: String },
}

impl BranchKind {
    pub fn branch(&self) -> &str {
        match self {
            BranchKind::Managed { branch, .. }
            | BranchKind::AdHoc { branch, .. }
            | BranchKind::Invalid { branch } => branch,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BranchKind::Managed { .. } => "managed",
            BranchKind::AdHoc { .. } => "ad-hoc",
            BranchKind::Invalid { .. } => "invalid",
        }
    }

    pub fn change_id(&self) -> Option<&str> {
        match self {
            BranchKind::Managed { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub fn classify(branching: &BranchingConfig, branch: &str) -> BranchKind {
    if branch == branching.base {
        return BranchKind::Invalid {
            branch: branch.to_string(),
        };
    }
    if let Some(id) = branching.id_for_branch(branch) {
        return BranchKind::Managed {
            branch: branch.to_string(),
            id: id.to_string(),
        };
    }
    BranchKind::AdHoc {
        branch: branch.to_string(),
        commit_type: infer_commit_type(branch).map(str::to_string),
    }
}

/// Branch prefix → conventional-commit type. First match wins.
const COMMIT_TYPE_TABLE: &[(&str, &str)] = &[
    ("fix/", "fix"),
    ("bugfix/", "fix"),
    ("hotfix/", "fix"),
    ("feat/", "feat"),
    ("feature/", "feat"),
    ("docs/", "docs"),
    ("doc/", "docs"),
    ("chore/", "chore"),
    ("deps/", "chore"),
    ("refactor/", "refactor"),
    ("perf/", "perf"),
    ("test/", "test"),
    ("tests/", "test"),
    ("ci/", "ci"),
    ("build/", "build"),
    ("style/", "style"),
];

/// Infer a commit type from an ad-hoc branch name; `None` means ask the caller.
pub fn infer_commit_type(branch: &str) -> Option<&'static str> {
    let lowered = branch.to_ascii_lowercase();
    COMMIT_TYPE_TABLE
        .iter()
        .find(|(prefix, _)| lowered.starts_with(prefix))
        .map(|(_, ty)| *ty)
}

/// Readable subject from the last path segment of a branch name.
pub fn subject_from_branch(branch: &str) -> String {
    let tail = branch.rsplit('/').next().unwrap_or(branch);
    crate::naming::humanize(tail)
}
