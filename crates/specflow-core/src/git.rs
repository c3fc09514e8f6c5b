//! Version-control collaborator.
//!
//! [`Vcs`] is the seam the lifecycle operates through; [`SystemGit`] drives
//! the system `git` binary. Every method names the directory it runs in so
//! that results never depend on the process's current directory.

use crate::error::{Result, SpecflowError};
use crate::runner;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
    pub bare: bool,
}

/// A commit as read from history, before conventional-commit parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCommit {
    pub sha: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Vcs
// ---------------------------------------------------------------------------

pub trait Vcs {
    /// Root of the checkout containing `dir`.
    fn toplevel(&self, dir: &Path) -> Result<PathBuf>;
    /// The repository's shared git directory (same for every worktree).
    fn common_dir(&self, dir: &Path) -> Result<PathBuf>;
    /// Root of the main checkout, the one owning the common git directory.
    fn main_root(&self, dir: &Path) -> Result<PathBuf> {
        let common = self.common_dir(dir)?;
        Ok(common.parent().map(Path::to_path_buf).unwrap_or(common))
    }

    /// Current branch, `None` when HEAD is detached.
    fn current_branch(&self, dir: &Path) -> Result<Option<String>>;
    fn branch_exists(&self, dir: &Path, name: &str) -> Result<bool>;
    fn create_branch(&self, dir: &Path, name: &str, base: &str) -> Result<()>;
    fn switch_branch(&self, dir: &Path, name: &str) -> Result<()>;
    fn delete_branch(&self, dir: &Path, name: &str) -> Result<()>;

    fn list_worktrees(&self, dir: &Path) -> Result<Vec<WorktreeEntry>>;
    fn create_worktree(&self, dir: &Path, path: &Path, branch: &str, base: &str) -> Result<()>;
    fn remove_worktree(&self, dir: &Path, path: &Path) -> Result<()>;

    fn is_clean(&self, dir: &Path) -> Result<bool>;
    fn stage_all(&self, dir: &Path) -> Result<()>;
    /// Commit the staged changes and return the new commit's SHA.
    fn commit(&self, dir: &Path, message: &str) -> Result<String>;
    fn head_sha(&self, dir: &Path) -> Result<String>;
    /// Whether `rev` names a commit.
    fn resolves(&self, dir: &Path, rev: &str) -> Result<bool>;
    /// Full message of the commit at `rev`.
    fn commit_message(&self, dir: &Path, rev: &str) -> Result<String>;
    /// Contents of `path` (relative to the repository root) at `rev`, `None`
    /// when the file is not there.
    fn file_at(&self, dir: &Path, rev: &str, path: &Path) -> Result<Option<String>>;

    fn fetch(&self, dir: &Path, remote: &str) -> Result<()>;
    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<()>;
    /// Delete `branch` on `remote`; a branch that is already gone is not an error.
    fn delete_remote_branch(&self, dir: &Path, remote: &str, branch: &str) -> Result<()>;
    /// Number of commits on `head` that `upstream` does not have; `None`
    /// when `upstream` does not resolve (never pushed).
    fn commits_ahead(&self, dir: &Path, upstream: &str, head: &str) -> Result<Option<usize>>;
    /// Bring the local `branch` up to date with `remote/branch`, fast-forward only.
    fn fast_forward(&self, dir: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Most recent tag matching `<prefix>*` reachable from `rev`.
    fn latest_tag(&self, dir: &Path, prefix: &str, rev: &str) -> Result<Option<String>>;
    /// Commits reachable from `rev` but not from `since` (all history when `None`).
    fn commits_since(&self, dir: &Path, since: Option<&str>, rev: &str) -> Result<Vec<RawCommit>>;
}

// ---------------------------------------------------------------------------
// SystemGit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

fn git(args: &[&str], dir: &Path) -> Result<String> {
    runner::run_checked("git", args, dir)
}

fn git_bool(args: &[&str], dir: &Path) -> Result<bool> {
    runner::run_bool("git", args, dir)
}

impl Vcs for SystemGit {
    fn toplevel(&self, dir: &Path) -> Result<PathBuf> {
        Ok(PathBuf::from(git(&["rev-parse", "--show-toplevel"], dir)?))
    }

    fn common_dir(&self, dir: &Path) -> Result<PathBuf> {
        let raw = PathBuf::from(git(&["rev-parse", "--git-common-dir"], dir)?);
        let path = if raw.is_absolute() { raw } else { dir.join(raw) };
        Ok(path.canonicalize().unwrap_or(path))
    }

    fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = runner::run("git", &args, dir)?;
        if !output.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    fn branch_exists(&self, dir: &Path, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        git_bool(&["show-ref", "--verify", "--quiet", &refname], dir)
    }

    fn create_branch(&self, dir: &Path, name: &str, base: &str) -> Result<()> {
        git(&["branch", name, base], dir).map(drop)
    }

    fn switch_branch(&self, dir: &Path, name: &str) -> Result<()> {
        git(&["switch", name], dir).map(drop)
    }

    fn delete_branch(&self, dir: &Path, name: &str) -> Result<()> {
        git(&["branch", "-D", name], dir).map(drop)
    }

    fn list_worktrees(&self, dir: &Path) -> Result<Vec<WorktreeEntry>> {
        let out = git(&["worktree", "list", "--porcelain"], dir)?;
        Ok(parse_worktree_list(&out))
    }

    fn create_worktree(&self, dir: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        git(&["worktree", "add", "-b", branch, &path_str, base], dir).map(drop)
    }

    fn remove_worktree(&self, dir: &Path, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        git(&["worktree", "remove", &path_str], dir)?;
        git(&["worktree", "prune"], dir).map(drop)
    }

    fn is_clean(&self, dir: &Path) -> Result<bool> {
        Ok(git(&["status", "--porcelain"], dir)?.is_empty())
    }

    fn stage_all(&self, dir: &Path) -> Result<()> {
        git(&["add", "--all"], dir).map(drop)
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<String> {
        git(&["commit", "--quiet", "-m", message], dir)?;
        self.head_sha(dir)
    }

    fn head_sha(&self, dir: &Path) -> Result<String> {
        git(&["rev-parse", "HEAD"], dir)
    }

    fn resolves(&self, dir: &Path, rev: &str) -> Result<bool> {
        let verify = format!("{rev}^{{commit}}");
        git_bool(&["rev-parse", "--verify", "--quiet", &verify], dir)
    }

    fn commit_message(&self, dir: &Path, rev: &str) -> Result<String> {
        git(&["log", "-1", "--format=%B", rev], dir)
    }

    fn file_at(&self, dir: &Path, rev: &str, path: &Path) -> Result<Option<String>> {
        let spec = format!("{rev}:{}", path.to_string_lossy().replace('\\', "/"));
        let output = runner::run("git", &["show", &spec], dir)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn fetch(&self, dir: &Path, remote: &str) -> Result<()> {
        git(&["fetch", "--quiet", "--tags", remote], dir).map(drop)
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("{branch}:refs/heads/{branch}");
        git(&["push", "--quiet", "--set-upstream", remote, &refspec], dir).map(drop)
    }

    fn delete_remote_branch(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let args = ["push", "--quiet", remote, "--delete", branch];
        let output = runner::run("git", &args, dir)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("remote ref does not exist") {
            return Ok(());
        }
        Err(runner::command_error("git", &args, &output))
    }

    fn commits_ahead(&self, dir: &Path, upstream: &str, head: &str) -> Result<Option<usize>> {
        if !self.resolves(dir, upstream)? {
            return Ok(None);
        }
        let range = format!("{upstream}..{head}");
        let count = git(&["rev-list", "--count", &range], dir)?;
        count
            .parse::<usize>()
            .map(Some)
            .map_err(|e| SpecflowError::Parse(format!("rev-list count '{count}': {e}")))
    }

    fn fast_forward(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        // A checked-out branch can only move through a merge in that checkout;
        // anything else can be updated by fetching straight into the ref.
        if self.current_branch(dir)?.as_deref() == Some(branch) {
            git(&["merge", "--ff-only", "--quiet", &format!("{remote}/{branch}")], dir)
                .map(drop)
        } else {
            let refspec = format!("{branch}:{branch}");
            git(&["fetch", "--quiet", remote, &refspec], dir).map(drop)
        }
    }

    fn latest_tag(&self, dir: &Path, prefix: &str, rev: &str) -> Result<Option<String>> {
        let pattern = format!("{prefix}*");
        let args = ["describe", "--tags", "--abbrev=0", "--match", &pattern, rev];
        let output = runner::run("git", &args, dir)?;
        if output.status.success() {
            let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok((!tag.is_empty()).then_some(tag));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No names found")
            || stderr.contains("No tags can describe")
            || stderr.contains("cannot describe")
        {
            return Ok(None);
        }
        Err(runner::command_error("git", &args, &output))
    }

    fn commits_since(&self, dir: &Path, since: Option<&str>, rev: &str) -> Result<Vec<RawCommit>> {
        let range = match since {
            Some(tag) => format!("{tag}..{rev}"),
            None => rev.to_string(),
        };
        let out = git(&["log", "--format=%H%x1f%B%x1e", &range], dir)?;
        Ok(parse_log(&out))
    }
}

// ---------------------------------------------------------------------------
// Porcelain parsers
// ---------------------------------------------------------------------------

/// Parse `git worktree list --porcelain` output.
///
/// ```text
/// worktree /home/user/repo
/// HEAD abc123def456
/// branch refs/heads/main
///
/// worktree /home/user/repo/worktrees/add-oauth-login
/// HEAD def789abc012
/// branch refs/heads/spec/add-oauth-login
/// ```
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                head: String::new(),
                branch: None,
                bare: false,
            });
            continue;
        }
        let Some(entry) = current.as_mut() else { continue };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            entry.branch = Some(name.to_string());
        } else if line == "bare" {
            entry.bare = true;
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

/// Parse `git log --format=%H%x1f%B%x1e` output.
pub fn parse_log(output: &str) -> Vec<RawCommit> {
    output
        .split('\x1e')
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            let (sha, message) = record.split_once('\x1f')?;
            let sha = sha.trim();
            if sha.is_empty() {
                return None;
            }
            Some(RawCommit {
                sha: sha.to_string(),
                message: message.trim().to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
