use crate::error::{Result, SpecflowError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SPECFLOW_DIR: &str = ".specflow";
pub const CHANGES_DIR: &str = ".specflow/changes";
pub const ARCHIVE_DIR: &str = ".specflow/archive";

pub const CONFIG_FILE: &str = ".specflow/config.yaml";

pub const PROPOSAL_FILE: &str = "proposal.md";
pub const TASKS_FILE: &str = "tasks.md";

/// Operator-local state lives under the git common directory so that every
/// worktree of a repository shares it.
pub const STATE_DIR: &str = "specflow";
pub const STATE_CHANGES_DIR: &str = "changes";
pub const STATE_ARCHIVE_DIR: &str = "archive";

/// Names that can never be used as a change id.
pub const RESERVED_IDS: &[&str] = &["main", "archive"];

// ---------------------------------------------------------------------------
// Path helpers (checkout-relative)
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn specflow_dir(root: &Path) -> PathBuf {
    root.join(SPECFLOW_DIR)
}

pub fn proposal_dir(checkout: &Path, id: &str) -> PathBuf {
    checkout.join(CHANGES_DIR).join(id)
}

pub fn proposal_path(checkout: &Path, id: &str) -> PathBuf {
    proposal_dir(checkout, id).join(PROPOSAL_FILE)
}

pub fn tasks_path(checkout: &Path, id: &str) -> PathBuf {
    proposal_dir(checkout, id).join(TASKS_FILE)
}

pub fn archived_proposal_dir(checkout: &Path, id: &str) -> PathBuf {
    checkout.join(ARCHIVE_DIR).join(id)
}

pub fn worktree_path(main_root: &Path, worktree_dir: &str, id: &str) -> PathBuf {
    main_root.join(worktree_dir).join(id)
}

// ---------------------------------------------------------------------------
// Path helpers (state directory)
// ---------------------------------------------------------------------------

pub fn state_dir(git_common_dir: &Path) -> PathBuf {
    git_common_dir.join(STATE_DIR)
}

pub fn change_record(state_dir: &Path, id: &str) -> PathBuf {
    state_dir.join(STATE_CHANGES_DIR).join(format!("{id}.yaml"))
}

pub fn archived_change_record(state_dir: &Path, id: &str) -> PathBuf {
    state_dir.join(STATE_ARCHIVE_DIR).join(format!("{id}.yaml"))
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SpecflowError::InvalidIdentifier {
            id: id.to_string(),
            reason: "identifier is empty".to_string(),
        });
    }
    if id.len() > 64 || !id_re().is_match(id) || id.contains("--") {
        return Err(SpecflowError::InvalidIdentifier {
            id: id.to_string(),
            reason: "must be lowercase alphanumeric words joined by single hyphens".to_string(),
        });
    }
    if RESERVED_IDS.contains(&id) {
        return Err(SpecflowError::InvalidIdentifier {
            id: id.to_string(),
            reason: "reserved name".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
