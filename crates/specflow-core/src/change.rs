use crate::error::{Result, SpecflowError};
use crate::paths;
use crate::types::ChangeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// StateTransition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: ChangeState,
    pub entered: DateTime<Utc>,
    pub exited: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// Operator-local record of a change. Stored under `<git-common-dir>/specflow`
/// so the main checkout and every worktree share one copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub title: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<PathBuf>,
    pub state: ChangeState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_history: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_version: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Change {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        branch: impl Into<String>,
        worktree: Option<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            branch: branch.into(),
            worktree,
            state: ChangeState::Created,
            created_at: now,
            updated_at: now,
            state_history: vec![StateTransition {
                state: ChangeState::Created,
                entered: now,
                exited: None,
            }],
            pr: None,
            released_version: None,
            archived: false,
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn create(state_dir: &Path, change: Change) -> Result<Self> {
        paths::validate_id(&change.id)?;
        if Self::exists(state_dir, &change.id) {
            return Err(SpecflowError::InvalidIdentifier {
                id: change.id.clone(),
                reason: "a change with this id already exists".to_string(),
            });
        }
        change.save(state_dir)?;
        Ok(change)
    }

    pub fn exists(state_dir: &Path, id: &str) -> bool {
        paths::change_record(state_dir, id).exists()
            || paths::archived_change_record(state_dir, id).exists()
    }

    /// Load an active change record.
    pub fn load(state_dir: &Path, id: &str) -> Result<Self> {
        Self::read(&paths::change_record(state_dir, id), id)
    }

    /// Load a change record whether it is active or archived.
    pub fn find(state_dir: &Path, id: &str) -> Result<Self> {
        match Self::load(state_dir, id) {
            Err(SpecflowError::ChangeNotFound(_)) => {
                Self::read(&paths::archived_change_record(state_dir, id), id)
            }
            other => other,
        }
    }

    fn read(path: &Path, id: &str) -> Result<Self> {
        if !path.exists() {
            return Err(SpecflowError::ChangeNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let change: Change = serde_yaml::from_str(&data)?;
        Ok(change)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = if self.archived {
            paths::archived_change_record(state_dir, &self.id)
        } else {
            paths::change_record(state_dir, &self.id)
        };
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn list(state_dir: &Path) -> Result<Vec<Self>> {
        Self::list_in(&state_dir.join(paths::STATE_CHANGES_DIR))
    }

    pub fn list_archived(state_dir: &Path) -> Result<Vec<Self>> {
        Self::list_in(&state_dir.join(paths::STATE_ARCHIVE_DIR))
    }

    fn list_in(dir: &Path) -> Result<Vec<Self>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut changes = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            changes.push(serde_yaml::from_str::<Change>(&data)?);
        }
        changes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(changes)
    }

    /// Move the record to the archive. Idempotent.
    pub fn archive(&mut self, state_dir: &Path) -> Result<()> {
        if self.archived {
            return self.save(state_dir);
        }
        self.archived = true;
        self.updated_at = Utc::now();
        self.save(state_dir)?;
        let active = paths::change_record(state_dir, &self.id);
        if active.exists() {
            std::fs::remove_file(active)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Move forward to `target`, recording every state passed on the way.
    ///
    /// Re-entering the current state is a no-op so that lifecycle operations
    /// stay idempotent; moving backwards is an error.
    pub fn advance_to(&mut self, target: ChangeState) -> Result<bool> {
        if target == self.state {
            return Ok(false);
        }
        if target < self.state {
            return Err(SpecflowError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        while self.state < target {
            let Some(next) = self.state.next() else { break };
            if let Some(last) = self.state_history.last_mut() {
                last.exited = Some(now);
            }
            self.state = next;
            self.state_history.push(StateTransition {
                state: next,
                entered: now,
                exited: None,
            });
        }
        self.updated_at = now;
        Ok(true)
    }

    pub fn set_pr(&mut self, number: u64) {
        self.pr = Some(number);
        self.updated_at = Utc::now();
    }

    pub fn mark_released(&mut self, version: &semver::Version) -> Result<()> {
        self.advance_to(ChangeState::Released)?;
        self.released_version = Some(version.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
