//! Worktree management: one isolated checkout per change branch.
//!
//! The registry is owned by git. Every lookup lists worktrees fresh and
//! matches on branch name, so the result is the same whether the caller sits
//! in the main checkout or inside the worktree being removed.

use crate::config::BranchingConfig;
use crate::error::{Result, SpecflowError};
use crate::git::{Vcs, WorktreeEntry};
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What a cleanup actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub branch: String,
    pub worktree_removed: Option<PathBuf>,
    pub branch_deleted: bool,
    /// The main checkout was on the branch and was moved to the base branch.
    pub switched_to_base: bool,
}

impl CleanupReport {
    pub fn was_noop(&self) -> bool {
        self.worktree_removed.is_none() && !self.branch_deleted && !self.switched_to_base
    }
}

pub struct WorktreeManager<'a, V: Vcs> {
    vcs: &'a V,
    main_root: &'a Path,
    branching: &'a BranchingConfig,
}

impl<'a, V: Vcs> WorktreeManager<'a, V> {
    pub fn new(vcs: &'a V, main_root: &'a Path, branching: &'a BranchingConfig) -> Self {
        Self {
            vcs,
            main_root,
            branching,
        }
    }

    /// Deterministic location of the worktree for `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        paths::worktree_path(self.main_root, &self.branching.worktree_dir, id)
    }

    pub fn list(&self) -> Result<Vec<WorktreeEntry>> {
        Ok(self
            .vcs
            .list_worktrees(self.main_root)?
            .into_iter()
            .filter(|w| !w.bare)
            .collect())
    }

    /// The worktree bound to `branch`, if any (the main checkout included).
    pub fn find_for_branch(&self, branch: &str) -> Result<Option<WorktreeEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|w| w.branch.as_deref() == Some(branch)))
    }

    pub fn is_main_checkout(&self, path: &Path) -> bool {
        same_path(path, self.main_root)
    }

    pub fn check_available(&self, id: &str) -> Result<String> {
        let branch = self.branching.branch_for(id);
        if let Some(existing) = self.find_for_branch(&branch)? {
            return Err(SpecflowError::BranchExists {
                branch,
                worktree: Some(existing.path),
            });
        }
        if self.vcs.branch_exists(self.main_root, &branch)? {
            return Err(SpecflowError::BranchExists {
                branch,
                worktree: None,
            });
        }
        Ok(branch)
    }

    /// Create `spec/<id>` from `base` with its own checkout.
    pub fn create(&self, id: &str, base: &str) -> Result<WorktreeEntry> {
        let branch = self.check_available(id)?;
        let path = self.path_for(id);
        if path.exists() {
            return Err(SpecflowError::InvalidIdentifier {
                id: id.to_string(),
                reason: format!("{} already exists on disk", path.display()),
            });
        }

        self.vcs.create_worktree(self.main_root, &path, &branch, base)?;
        tracing::info!(%branch, path = %path.display(), "created worktree");
        Ok(WorktreeEntry {
            head: self.vcs.head_sha(&path)?,
            path,
            branch: Some(branch),
            bare: false,
        })
    }

    /// Branch-only mode: create `spec/<id>` and switch `checkout` to it.
    pub fn create_branch_only(&self, checkout: &Path, id: &str, base: &str) -> Result<String> {
        let branch = self.check_available(id)?;
        self.vcs.create_branch(self.main_root, &branch, base)?;
        if let Err(e) = self.vcs.switch_branch(checkout, &branch) {
            self.vcs.delete_branch(self.main_root, &branch)?;
            return Err(e);
        }
        tracing::info!(%branch, "created branch");
        Ok(branch)
    }

    /// Remove the worktree of change `id`. No worktree is not an error.
    pub fn remove(&self, id: &str) -> Result<Option<PathBuf>> {
        let branch = self.branching.branch_for(id);
        self.remove_for_branch(&branch)
    }

    /// Remove the worktree bound to `branch`, never the main checkout.
    pub fn remove_for_branch(&self, branch: &str) -> Result<Option<PathBuf>> {
        let Some(entry) = self.find_for_branch(branch)? else {
            tracing::debug!(branch, "no worktree bound, nothing to remove");
            return Ok(None);
        };
        if self.is_main_checkout(&entry.path) {
            return Ok(None);
        }

        if let Err(e) = self.vcs.remove_worktree(self.main_root, &entry.path) {
            return Err(SpecflowError::PartialCleanup {
                branch: branch.to_string(),
                worktree_present: entry.path.exists(),
                worktree: Some(entry.path),
                branch_deleted: false,
                detail: e.to_string(),
            });
        }
        if entry.path.exists() {
            return Err(SpecflowError::PartialCleanup {
                branch: branch.to_string(),
                worktree: Some(entry.path),
                worktree_present: true,
                branch_deleted: false,
                detail: "git unregistered the worktree but its directory remains".to_string(),
            });
        }
        tracing::info!(branch, path = %entry.path.display(), "removed worktree");
        Ok(Some(entry.path))
    }

    /// Post-merge cleanup for `branch`: drop its worktree, move the main
    /// checkout off it if needed, then delete the local branch. Anything
    /// already gone is skipped; a step failing halfway is `PartialCleanup`.
    pub fn cleanup_branch(&self, branch: &str) -> Result<CleanupReport> {
        let mut report = CleanupReport {
            branch: branch.to_string(),
            ..CleanupReport::default()
        };

        report.worktree_removed = self.remove_for_branch(branch)?;

        if self.vcs.current_branch(self.main_root)?.as_deref() == Some(branch) {
            self.vcs
                .switch_branch(self.main_root, &self.branching.base)
                .map_err(|e| partial(&report, e))?;
            report.switched_to_base = true;
        }

        if self.vcs.branch_exists(self.main_root, branch)? {
            self.vcs
                .delete_branch(self.main_root, branch)
                .map_err(|e| partial(&report, e))?;
            report.branch_deleted = true;
        }

        if report.was_noop() {
            tracing::warn!(branch, "nothing to clean up; already removed");
        }
        Ok(report)
    }
}

fn partial(report: &CleanupReport, cause: SpecflowError) -> SpecflowError {
    SpecflowError::PartialCleanup {
        branch: report.branch.clone(),
        worktree: report.worktree_removed.clone(),
        worktree_present: false,
        branch_deleted: false,
        detail: cause.to_string(),
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
