//! The change lifecycle: `start`, `ship`, `land` and `release`.
//!
//! Each operation runs to completion or returns a structured error, and each
//! can be re-invoked after a failure: state is re-read from git, the code
//! host and the filesystem on every call, never cached. No remote action
//! (push, merge) happens before the local preconditions for it have passed.

use crate::branch_kind::{self, BranchKind};
use crate::change::Change;
use crate::config::Config;
use crate::error::{Result, SpecflowError};
use crate::git::{RawCommit, Vcs};
use crate::hosting::{CodeHost, MergeRequest, NewPullRequest, PrRef, PrState, PullRequest};
use crate::proposal::{Proposals, TaskProgress};
use crate::readiness::{self, Readiness};
use crate::types::{BumpTier, ChangeState};
use crate::version::{self, CommitInfo, VersionAnalysis};
use crate::worktree::{CleanupReport, WorktreeManager};
use crate::{io, naming, paths, version_file};
use semver::Version;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Options and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Explicit id instead of one derived from the description.
    pub id: Option<String>,
    /// Branch to start from; defaults to the configured base.
    pub base: Option<String>,
    /// Create the branch and switch the current checkout instead of adding a worktree.
    pub no_worktree: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub id: String,
    pub title: String,
    pub branch: String,
    pub base: String,
    pub worktree: Option<PathBuf>,
    pub checkout: PathBuf,
    pub state: ChangeState,
}

#[derive(Debug, Clone, Default)]
pub struct ShipOptions {
    pub commit_type: Option<String>,
    pub message: Option<String>,
    pub draft: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipOutcome {
    pub branch: String,
    pub kind: BranchKind,
    pub commit: Option<String>,
    pub commit_message: Option<String>,
    pub pushed: bool,
    pub pull_request: PullRequest,
    pub created: bool,
    pub proposal_archived: bool,
    pub change_state: Option<ChangeState>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LandOptions {
    /// Never auto-release, whatever the policy says.
    pub no_release: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseDecision {
    /// The bump was committed to the source branch before the merge.
    Applied {
        bump: BumpTier,
        previous: String,
        version: String,
        commit: String,
    },
    Declined { bump: BumpTier, reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LandOutcome {
    pub number: u64,
    pub branch: String,
    pub kind: BranchKind,
    pub already_merged: bool,
    pub analysis: Option<VersionAnalysis>,
    pub release: ReleaseDecision,
    pub cleanup: CleanupReport,
    pub change_state: Option<ChangeState>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    pub version: String,
    pub previous: Option<String>,
    pub bump: Option<BumpTier>,
    pub explicit: bool,
    pub analysis: Option<VersionAnalysis>,
    pub commit: String,
    pub files: Vec<PathBuf>,
    pub released_changes: Vec<String>,
    /// HEAD already carried the marker; it only needed pushing.
    pub pushed_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub current_version: String,
    pub since_tag: Option<String>,
    pub commits: Vec<CommitInfo>,
    pub analysis: VersionAnalysis,
    pub next_version: String,
    pub auto_release: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub checkout: PathBuf,
    pub branch: Option<String>,
    pub kind: Option<BranchKind>,
    pub worktree: Option<PathBuf>,
    pub change: Option<Change>,
    pub tasks: Option<TaskProgress>,
    pub pull_request: Option<PullRequest>,
    pub readiness: Option<Readiness>,
    /// Why the pull request could not be looked up, if it could not.
    pub host_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub root: PathBuf,
    pub config_created: bool,
    pub gitignore_updated: bool,
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Write the default config and artifact directories under `root`.
/// Idempotent: an existing config is kept.
pub fn init(root: &Path) -> Result<InitOutcome> {
    let config_path = paths::config_path(root);
    let config_created = if config_path.exists() {
        false
    } else {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        Config::new(name).save(root)?;
        true
    };
    let config = Config::load(root)?;

    for dir in [paths::CHANGES_DIR, paths::ARCHIVE_DIR] {
        io::ensure_dir(&root.join(dir))?;
        io::write_if_missing(&root.join(dir).join(".gitkeep"), b"")?;
    }
    let entry = format!("/{}/", config.branching.worktree_dir.trim_matches('/'));
    let gitignore_updated = io::ensure_gitignore_entry(root, &entry)?;

    tracing::info!(root = %root.display(), config_created, "initialized");
    Ok(InitOutcome {
        root: root.to_path_buf(),
        config_created,
        gitignore_updated,
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct Lifecycle<V: Vcs, H: CodeHost, P: Proposals> {
    vcs: V,
    host: H,
    proposals: P,
    config: Config,
    main_root: PathBuf,
    state_dir: PathBuf,
}

impl<V: Vcs, H: CodeHost, P: Proposals> Lifecycle<V, H, P> {
    /// Open the repository containing `dir`. Config and change records come
    /// from the main checkout, wherever `dir` is.
    pub fn open(vcs: V, host: H, proposals: P, dir: &Path) -> Result<Self> {
        let main_root = vcs.main_root(dir)?;
        let state_dir = paths::state_dir(&vcs.common_dir(dir)?);
        let config = Config::load(&main_root)?;
        Ok(Self {
            vcs,
            host,
            proposals,
            config,
            main_root,
            state_dir,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn main_root(&self) -> &Path {
        &self.main_root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn worktrees(&self) -> WorktreeManager<'_, V> {
        WorktreeManager::new(&self.vcs, &self.main_root, &self.config.branching)
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    pub fn start(&self, dir: &Path, description: &str, opts: &StartOptions) -> Result<StartOutcome> {
        let id = match &opts.id {
            Some(id) => {
                paths::validate_id(id)?;
                id.clone()
            }
            None => naming::resolve_id(description)?,
        };
        let base = opts
            .base
            .clone()
            .unwrap_or_else(|| self.config.branching.base.clone());
        let manager = self.worktrees();

        manager.check_available(&id)?;
        if Change::exists(&self.state_dir, &id) {
            return Err(SpecflowError::InvalidIdentifier {
                id,
                reason: "a change with this id was already started".to_string(),
            });
        }

        let (branch, worktree, checkout, previous) = if opts.no_worktree {
            let checkout = self.vcs.toplevel(dir)?;
            let previous = self.vcs.current_branch(&checkout)?;
            let branch = manager.create_branch_only(&checkout, &id, &base)?;
            (branch, None, checkout, previous)
        } else {
            let entry = manager.create(&id, &base)?;
            let branch = entry.branch.unwrap_or_else(|| self.config.branching.branch_for(&id));
            (branch, Some(entry.path.clone()), entry.path, None)
        };

        if let Err(e) = self.proposals.scaffold(&checkout, &id, description) {
            self.rollback_start(&id, &branch, &checkout, worktree.is_some(), previous.as_deref());
            return Err(e);
        }

        let title = self
            .proposals
            .proposal(&checkout, &id)
            .map(|p| p.title)
            .unwrap_or_else(|_| naming::humanize(&id));
        let change = Change::create(
            &self.state_dir,
            Change::new(&id, &title, &branch, worktree.clone()),
        )?;
        tracing::info!(%id, %branch, "change started");

        Ok(StartOutcome {
            id,
            title,
            branch,
            base,
            worktree,
            checkout,
            state: change.state,
        })
    }

    fn rollback_start(
        &self,
        id: &str,
        branch: &str,
        checkout: &Path,
        has_worktree: bool,
        previous: Option<&str>,
    ) {
        let proposal = paths::proposal_dir(checkout, id);
        if let Err(e) = std::fs::remove_dir_all(&proposal) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %proposal.display(), error = %e, "could not remove proposal");
            }
        }
        let result = if has_worktree {
            self.worktrees().cleanup_branch(branch).map(drop)
        } else {
            previous
                .map(|p| self.vcs.switch_branch(checkout, p))
                .unwrap_or(Ok(()))
                .and_then(|_| self.vcs.delete_branch(&self.main_root, branch))
        };
        if let Err(e) = result {
            tracing::warn!(branch, error = %e, "could not roll back start");
        }
    }

    // -----------------------------------------------------------------------
    // ship
    // -----------------------------------------------------------------------

    pub fn ship(&self, dir: &Path, opts: &ShipOptions) -> Result<ShipOutcome> {
        let checkout = self.vcs.toplevel(dir)?;
        let branch = self.current_branch(&checkout)?;
        let kind = branch_kind::classify(&self.config.branching, &branch);
        let remote = &self.config.branching.remote;
        let mut warnings = Vec::new();
        let mut proposal_archived = false;

        let (commit_type, subject, body) = match &kind {
            BranchKind::Invalid { .. } => {
                return Err(SpecflowError::InvalidBranch {
                    branch,
                    reason: "ship runs on a change branch, not the base branch".to_string(),
                })
            }
            BranchKind::Managed { id, .. } => {
                // Archive before committing so the archive rides in the same PR.
                if !self.proposals.is_archived(&checkout, id) {
                    let report = self.proposals.validate(&checkout, id)?;
                    if !report.is_valid() {
                        return Err(SpecflowError::InvalidProposal {
                            id: id.clone(),
                            errors: report.errors,
                        });
                    }
                    warnings.extend(report.warnings);
                    proposal_archived = self.proposals.archive(&checkout, id)?;
                }
                let summary = self.proposals.proposal(&checkout, id)?;
                let ty = opts
                    .commit_type
                    .clone()
                    .or(summary.commit_type)
                    .unwrap_or_else(|| "feat".to_string());
                let body = format!("{}\n\nChange: `{id}`", summary.summary);
                (Some(ty), summary.title, body)
            }
            BranchKind::AdHoc { commit_type, .. } => {
                let ty = opts.commit_type.clone().or_else(|| commit_type.clone());
                let body = format!("Branch: `{branch}`");
                (ty, branch_kind::subject_from_branch(&branch), body)
            }
        };

        let message = match &opts.message {
            Some(m) if is_conventional(m) => Some(m.clone()),
            Some(m) => commit_type.as_ref().map(|ty| format!("{ty}: {m}")),
            None => commit_type.as_ref().map(|ty| format!("{ty}: {subject}")),
        };

        let commit = if self.vcs.is_clean(&checkout)? {
            None
        } else {
            let message = message
                .clone()
                .ok_or_else(|| SpecflowError::CommitTypeRequired(branch.clone()))?;
            self.vcs.stage_all(&checkout)?;
            Some(self.vcs.commit(&checkout, &message)?)
        };

        let upstream = format!("{remote}/{branch}");
        let ahead = self.vcs.commits_ahead(&checkout, &upstream, &branch)?;
        let found = self
            .host
            .find_pull_request(&checkout, &PrRef::Branch(branch.clone()))?;
        if let Some(pr) = found.as_ref().filter(|pr| pr.state == PrState::Merged) {
            if commit.is_none() && ahead == Some(0) {
                return Err(SpecflowError::InvalidBranch {
                    branch,
                    reason: format!(
                        "pull request #{} is already merged; run 'specflow land' to clean up",
                        pr.number
                    ),
                });
            }
        }
        let existing = found.filter(|pr| pr.state == PrState::Open);

        let needs_push = ahead != Some(0);
        if let Some(pr) = &existing {
            if !needs_push {
                return Err(SpecflowError::NothingToCommit(format!(
                    "'{branch}' is clean and pull request #{} is up to date",
                    pr.number
                )));
            }
        } else {
            let base_rev = self.base_rev()?;
            if self.vcs.commits_ahead(&checkout, &base_rev, &branch)? == Some(0) {
                return Err(SpecflowError::NothingToCommit(format!(
                    "'{branch}' has no commits beyond {base_rev}"
                )));
            }
        }

        if needs_push {
            self.vcs.push(&checkout, remote, &branch)?;
        }

        let (pull_request, created) = match existing {
            Some(pr) => {
                let refreshed = self
                    .host
                    .find_pull_request(&checkout, &PrRef::Number(pr.number))?
                    .unwrap_or(pr);
                (refreshed, false)
            }
            None => {
                let title = match &message {
                    Some(m) => header(m).to_string(),
                    None => header(&self.vcs.commit_message(&checkout, "HEAD")?).to_string(),
                };
                let request = NewPullRequest {
                    title,
                    body,
                    head: branch.clone(),
                    base: self.config.branching.base.clone(),
                    draft: opts.draft,
                };
                (self.host.create_pull_request(&checkout, &request)?, true)
            }
        };

        let mut change_state = None;
        if let Some(id) = kind.change_id() {
            match Change::load(&self.state_dir, id) {
                Ok(mut change) => {
                    if change.state < ChangeState::Submitted {
                        change.advance_to(ChangeState::Submitted)?;
                    }
                    change.set_pr(pull_request.number);
                    change.save(&self.state_dir)?;
                    change_state = Some(change.state);
                }
                Err(SpecflowError::ChangeNotFound(_)) => {
                    warnings.push(format!("no change record for '{id}'"));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            %branch,
            number = pull_request.number,
            created,
            pushed = needs_push,
            "shipped"
        );
        Ok(ShipOutcome {
            branch,
            kind,
            commit_message: commit.as_ref().and(message),
            commit,
            pushed: needs_push,
            pull_request,
            created,
            proposal_archived,
            change_state,
            warnings,
        })
    }

    // -----------------------------------------------------------------------
    // land
    // -----------------------------------------------------------------------

    pub fn land(&self, dir: &Path, target: Option<PrRef>, opts: &LandOptions) -> Result<LandOutcome> {
        let target = match target {
            Some(t) => t,
            None => {
                let branch = self.current_branch(dir)?;
                if branch == self.config.branching.base {
                    return Err(SpecflowError::InvalidBranch {
                        branch,
                        reason: "on the base branch; pass the pull request to land".to_string(),
                    });
                }
                PrRef::Branch(branch)
            }
        };
        let remote = self.config.branching.remote.clone();
        let base = self.config.branching.base.clone();

        self.vcs.fetch(&self.main_root, &remote)?;
        let pr = self
            .host
            .find_pull_request(&self.main_root, &target)?
            .ok_or_else(|| SpecflowError::PullRequestNotFound(target.to_string()))?;
        let kind = branch_kind::classify(&self.config.branching, &pr.head_branch);
        if let BranchKind::Invalid { branch } = &kind {
            return Err(SpecflowError::InvalidBranch {
                branch: branch.clone(),
                reason: "pull request head is the base branch".to_string(),
            });
        }
        if pr.state == PrState::Closed {
            return Err(SpecflowError::InvalidBranch {
                branch: pr.head_branch.clone(),
                reason: format!("pull request #{} was closed without merging", pr.number),
            });
        }

        let already_merged = pr.state == PrState::Merged;
        let mut warnings = Vec::new();
        let mut analysis = None;
        let release = if already_merged {
            tracing::info!(number = pr.number, "already merged; finishing cleanup");
            ReleaseDecision::Skipped {
                reason: "pull request was already merged".to_string(),
            }
        } else {
            let verdict = readiness::evaluate(&pr, &self.config.readiness);
            if !verdict.ready {
                return Err(SpecflowError::NotReady {
                    number: pr.number,
                    blockers: verdict.blockers,
                });
            }

            let checkout = self.local_checkout(&pr)?;
            let version_dir = checkout.clone().unwrap_or_else(|| self.main_root.clone());
            let base_rev = self.base_rev()?;
            let (tag, commits) =
                self.unreleased_commits(&self.main_root, &base_rev, pr.commits.clone())?;
            let on_base = self.version_at(&version_dir, &base_rev)?;
            let pending = pending_release(&pr);
            let current = if pending.is_some() {
                // The branch already carries its bump; measure from the base.
                on_base.unwrap_or_else(|| {
                    tag.as_deref()
                        .and_then(|t| version::version_from_tag(t, &self.config.release.tag_prefix))
                        .unwrap_or_else(|| Version::new(0, 0, 0))
                })
            } else {
                let own = self.version_or_fallback(&version_dir, tag.as_deref());
                on_base.filter(|b| *b > own).unwrap_or(own)
            };
            let found = version::suggest_bump(&commits, &current);
            let bump = found.bump;
            analysis = Some(found);

            let (expected_head, body, decision) = if let Some((version, commit)) = pending {
                if version <= current {
                    return Err(SpecflowError::MergeConflict {
                        branch: pr.head_branch.clone(),
                        detail: format!(
                            "the branch carries v{version} but '{base}' is already at v{current}"
                        ),
                    });
                }
                tracing::info!(number = pr.number, %version, "release bump already on the branch");
                let applied = ReleaseDecision::Applied {
                    bump,
                    previous: current.to_string(),
                    version: version.to_string(),
                    commit,
                };
                (pr.head_sha.clone(), Some(version::release_marker(&version)), applied)
            } else {
                match self.decide_release(&pr, bump, checkout.as_deref(), opts) {
                    Ok(checkout) => {
                        let (version, commit) =
                            self.bump_source_branch(&checkout, &pr, &current, bump)?;
                        let marker = version::release_marker(&version);
                        let applied = ReleaseDecision::Applied {
                            bump,
                            previous: current.to_string(),
                            version: version.to_string(),
                            commit: commit.clone(),
                        };
                        (commit, Some(marker), applied)
                    }
                    Err(reason) => {
                        tracing::info!(number = pr.number, %bump, %reason, "auto-release declined");
                        (pr.head_sha.clone(), None, ReleaseDecision::Declined { bump, reason })
                    }
                }
            };

            self.host.merge_pull_request(
                &self.main_root,
                &MergeRequest {
                    number: pr.number,
                    head_branch: pr.head_branch.clone(),
                    method: self.config.merge.method,
                    expected_head: (!expected_head.is_empty()).then_some(expected_head),
                    body,
                },
            )?;
            tracing::info!(number = pr.number, "merged");
            decision
        };

        // The merge is done; record it before anything else can fail.
        let change_state = self.record_landing(&kind, pr.number, &release)?;

        self.vcs.fetch(&self.main_root, &remote)?;
        self.vcs
            .fast_forward(&self.main_root, &remote, &base)
            .map_err(|e| SpecflowError::MergeConflict {
                branch: base.clone(),
                detail: format!("could not fast-forward local '{base}': {e}"),
            })?;

        if self.config.merge.delete_remote_branch && !pr.is_cross_repository {
            if let Err(e) = self
                .vcs
                .delete_remote_branch(&self.main_root, &remote, &pr.head_branch)
            {
                warnings.push(format!("remote branch not deleted: {e}"));
            }
        }

        let cleanup = self.worktrees().cleanup_branch(&pr.head_branch)?;

        Ok(LandOutcome {
            number: pr.number,
            branch: pr.head_branch,
            kind,
            already_merged,
            analysis,
            release,
            cleanup,
            change_state,
            warnings,
        })
    }

    /// Checkout holding the PR's head branch, when there is one on this machine.
    fn local_checkout(&self, pr: &PullRequest) -> Result<Option<PathBuf>> {
        if pr.is_cross_repository {
            return Ok(None);
        }
        Ok(self
            .worktrees()
            .find_for_branch(&pr.head_branch)?
            .map(|w| w.path))
    }

    /// `Ok(checkout)` when the bump should be applied there, `Err(reason)` otherwise.
    fn decide_release(
        &self,
        pr: &PullRequest,
        bump: BumpTier,
        checkout: Option<&Path>,
        opts: &LandOptions,
    ) -> std::result::Result<PathBuf, String> {
        if opts.no_release {
            return Err("--no-release given".to_string());
        }
        if !version::is_auto_release_allowed(bump, &self.config.release.auto) {
            return Err(format!("{bump} bumps are not auto-released; run 'specflow release'"));
        }
        if pr.is_cross_repository {
            return Err("head branch lives in a fork; run 'specflow release' after landing".into());
        }
        match checkout {
            Some(path) => Ok(path.to_path_buf()),
            None => Err(format!(
                "no local checkout of '{}'; run 'specflow release' after landing",
                pr.head_branch
            )),
        }
    }

    /// Commit the version bump on the PR branch and push it. Returns the new
    /// version and the SHA the merge must include.
    fn bump_source_branch(
        &self,
        checkout: &Path,
        pr: &PullRequest,
        current: &Version,
        bump: BumpTier,
    ) -> Result<(Version, String)> {
        let own = version_file::current(checkout, &self.config.release.version_files)?;
        if own < *current {
            return Err(SpecflowError::MergeConflict {
                branch: pr.head_branch.clone(),
                detail: format!(
                    "'{}' is already at v{current} but the branch still has v{own}",
                    self.config.branching.base
                ),
            });
        }
        if !self.vcs.is_clean(checkout)? {
            return Err(SpecflowError::InvalidBranch {
                branch: pr.head_branch.clone(),
                reason: format!("uncommitted changes in {}; ship them first", checkout.display()),
            });
        }
        if self.vcs.head_sha(checkout)? != pr.head_sha {
            return Err(SpecflowError::InvalidBranch {
                branch: pr.head_branch.clone(),
                reason: "local branch differs from the pull request head; ship first".to_string(),
            });
        }

        let next = bump.apply(current);
        version_file::set(checkout, &self.config.release.version_files, &next)?;
        self.vcs.stage_all(checkout)?;
        let sha = self.vcs.commit(checkout, &version::release_marker(&next))?;
        self.vcs
            .push(checkout, &self.config.branching.remote, &pr.head_branch)?;
        tracing::info!(branch = %pr.head_branch, version = %next, "version bumped before merge");
        Ok((next, sha))
    }

    fn record_landing(
        &self,
        kind: &BranchKind,
        number: u64,
        release: &ReleaseDecision,
    ) -> Result<Option<ChangeState>> {
        let Some(id) = kind.change_id() else {
            return Ok(None);
        };
        let mut change = match Change::find(&self.state_dir, id) {
            Ok(change) => change,
            Err(SpecflowError::ChangeNotFound(_)) => {
                tracing::warn!(id, "no change record; nothing to archive");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if change.state < ChangeState::Merged {
            change.advance_to(ChangeState::Merged)?;
        }
        change.set_pr(number);
        change.archive(&self.state_dir)?;

        if let ReleaseDecision::Applied { version, .. } = release {
            self.mark_released(&Version::parse(version)?)?;
            change = Change::find(&self.state_dir, id)?;
        }
        Ok(Some(change.state))
    }

    /// Move every merged change record to `Released`.
    fn mark_released(&self, version: &Version) -> Result<Vec<String>> {
        let mut released = Vec::new();
        let records = Change::list(&self.state_dir)?
            .into_iter()
            .chain(Change::list_archived(&self.state_dir)?);
        for mut change in records.filter(|c| c.state == ChangeState::Merged) {
            change.mark_released(version)?;
            change.save(&self.state_dir)?;
            released.push(change.id);
        }
        Ok(released)
    }

    // -----------------------------------------------------------------------
    // release
    // -----------------------------------------------------------------------

    pub fn release(&self, dir: &Path, explicit: Option<BumpTier>) -> Result<ReleaseOutcome> {
        let checkout = self.vcs.toplevel(dir)?;
        let base = &self.config.branching.base;
        let remote = &self.config.branching.remote;

        let branch = self.vcs.current_branch(&checkout)?;
        if branch.as_deref() != Some(base.as_str()) {
            return Err(SpecflowError::InvalidBranch {
                branch: branch.unwrap_or_else(|| "HEAD".to_string()),
                reason: format!("release runs on '{base}'"),
            });
        }
        if !self.vcs.is_clean(&checkout)? {
            return Err(SpecflowError::InvalidBranch {
                branch: base.clone(),
                reason: "working tree has uncommitted changes".to_string(),
            });
        }

        self.vcs.fetch(&checkout, remote)?;
        self.vcs
            .fast_forward(&checkout, remote, base)
            .map_err(|e| SpecflowError::MergeConflict {
                branch: base.clone(),
                detail: e.to_string(),
            })?;

        let head_message = self.vcs.commit_message(&checkout, "HEAD")?;
        if let Some(released) = version::parse_release_marker(&head_message) {
            let upstream = format!("{remote}/{base}");
            if self.vcs.commits_ahead(&checkout, &upstream, base)?.unwrap_or(1) == 0 {
                return Err(SpecflowError::NothingToCommit(format!(
                    "v{released} is already released; land a change first"
                )));
            }
            self.vcs.push(&checkout, remote, base)?;
            return Ok(ReleaseOutcome {
                version: released.to_string(),
                previous: None,
                bump: None,
                explicit: false,
                analysis: None,
                commit: self.vcs.head_sha(&checkout)?,
                files: Vec::new(),
                released_changes: self.mark_released(&released)?,
                pushed_only: true,
            });
        }

        let current = version_file::current(&checkout, &self.config.release.version_files)?;
        let (_, commits) = self.unreleased_commits(&checkout, "HEAD", Vec::new())?;
        let analysis = version::suggest_bump(&commits, &current);
        let bump = match explicit {
            Some(bump) => bump,
            None if analysis.bump == BumpTier::Major => {
                return Err(SpecflowError::PolicyViolation(format!(
                    "{}; a major release needs an explicit --bump major",
                    analysis.reasoning
                )))
            }
            None => analysis.bump,
        };

        let next = bump.apply(&current);
        let files = version_file::set(&checkout, &self.config.release.version_files, &next)?;
        self.vcs.stage_all(&checkout)?;
        let commit = self.vcs.commit(&checkout, &version::release_marker(&next))?;
        self.vcs.push(&checkout, remote, base)?;
        let released_changes = self.mark_released(&next)?;
        tracing::info!(version = %next, %bump, "release committed");

        Ok(ReleaseOutcome {
            version: next.to_string(),
            previous: Some(current.to_string()),
            bump: Some(bump),
            explicit: explicit.is_some(),
            analysis: Some(analysis),
            commit,
            files,
            released_changes,
            pushed_only: false,
        })
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// Dry-run version analysis for the base branch plus, optionally, a PR.
    pub fn analyze(&self, dir: &Path, target: Option<&PrRef>) -> Result<AnalyzeReport> {
        let checkout = self.vcs.toplevel(dir)?;
        let base_rev = self.base_rev()?;
        let extra = match target {
            Some(target) => {
                self.host
                    .find_pull_request(&checkout, target)?
                    .ok_or_else(|| SpecflowError::PullRequestNotFound(target.to_string()))?
                    .commits
            }
            None => match self.vcs.current_branch(&checkout)? {
                Some(b) if b != self.config.branching.base => {
                    self.vcs.commits_since(&checkout, Some(&base_rev), "HEAD")?
                }
                _ => Vec::new(),
            },
        };

        let (tag, commits) = self.unreleased_commits(&self.main_root, &base_rev, extra)?;
        let own = self.version_or_fallback(&checkout, tag.as_deref());
        let current = self
            .version_at(&checkout, &base_rev)?
            .filter(|b| *b > own)
            .unwrap_or(own);
        let analysis = version::suggest_bump(&commits, &current);
        Ok(AnalyzeReport {
            current_version: current.to_string(),
            next_version: analysis.bump.apply(&current).to_string(),
            auto_release: version::is_auto_release_allowed(analysis.bump, &self.config.release.auto),
            since_tag: tag,
            commits,
            analysis,
        })
    }

    pub fn status(&self, dir: &Path) -> Result<StatusReport> {
        let checkout = self.vcs.toplevel(dir)?;
        let branch = self.vcs.current_branch(&checkout)?;
        let kind = branch
            .as_deref()
            .map(|b| branch_kind::classify(&self.config.branching, b));

        let mut report = StatusReport {
            checkout: checkout.clone(),
            branch: branch.clone(),
            kind: kind.clone(),
            worktree: None,
            change: None,
            tasks: None,
            pull_request: None,
            readiness: None,
            host_error: None,
        };
        let (Some(branch), Some(kind)) = (branch, kind) else {
            return Ok(report);
        };
        if matches!(kind, BranchKind::Invalid { .. }) {
            return Ok(report);
        }

        let manager = self.worktrees();
        report.worktree = manager
            .find_for_branch(&branch)?
            .map(|w| w.path)
            .filter(|p| !manager.is_main_checkout(p));
        if let Some(id) = kind.change_id() {
            report.change = Change::find(&self.state_dir, id).ok();
            report.tasks = self.proposals.read_tasks(&checkout, id).ok();
        }
        match self
            .host
            .find_pull_request(&checkout, &PrRef::Branch(branch))
        {
            Ok(pr) => {
                report.readiness = pr
                    .as_ref()
                    .filter(|pr| pr.state == PrState::Open)
                    .map(|pr| readiness::evaluate(pr, &self.config.readiness));
                report.pull_request = pr;
            }
            Err(e) => report.host_error = Some(e.to_string()),
        }
        Ok(report)
    }

    pub fn list_changes(&self, include_archived: bool) -> Result<Vec<Change>> {
        let mut changes = Change::list(&self.state_dir)?;
        if include_archived {
            changes.extend(Change::list_archived(&self.state_dir)?);
            changes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        Ok(changes)
    }

    pub fn change(&self, id: &str) -> Result<Change> {
        Change::find(&self.state_dir, id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn current_branch(&self, dir: &Path) -> Result<String> {
        self.vcs
            .current_branch(dir)?
            .ok_or_else(|| SpecflowError::InvalidBranch {
                branch: "HEAD".to_string(),
                reason: "HEAD is detached".to_string(),
            })
    }

    /// `origin/<base>` when the remote-tracking ref exists, else the local base.
    fn base_rev(&self) -> Result<String> {
        let branching = &self.config.branching;
        let tracking = format!("{}/{}", branching.remote, branching.base);
        if self.vcs.resolves(&self.main_root, &tracking)? {
            Ok(tracking)
        } else {
            Ok(branching.base.clone())
        }
    }

    /// Commits on `rev` since the last release (tag or marker commit), plus
    /// `extra` commits not already among them.
    fn unreleased_commits(
        &self,
        dir: &Path,
        rev: &str,
        extra: Vec<RawCommit>,
    ) -> Result<(Option<String>, Vec<CommitInfo>)> {
        let tag = self
            .vcs
            .latest_tag(dir, &self.config.release.tag_prefix, rev)?;
        let mut raw: Vec<RawCommit> = self
            .vcs
            .commits_since(dir, tag.as_deref(), rev)?
            .into_iter()
            .take_while(|c| version::parse_release_marker(&c.message).is_none())
            .collect();
        for commit in extra {
            if !raw.iter().any(|c| c.sha == commit.sha) {
                raw.push(commit);
            }
        }
        Ok((tag, version::parse_commits(&raw)))
    }

    /// Version recorded in the checkout's version file as of `rev`.
    fn version_at(&self, checkout: &Path, rev: &str) -> Result<Option<Version>> {
        let Ok(files) = version_file::resolve(checkout, &self.config.release.version_files) else {
            return Ok(None);
        };
        let Some(file) = files.first() else {
            return Ok(None);
        };
        Ok(self
            .vcs
            .file_at(&self.main_root, rev, &file.path)?
            .and_then(|content| file.parse(&content).ok()))
    }

    /// Version from the version file, else the tag, else 0.0.0.
    fn version_or_fallback(&self, checkout: &Path, tag: Option<&str>) -> Version {
        version_file::current(checkout, &self.config.release.version_files)
            .ok()
            .or_else(|| tag.and_then(|t| version::version_from_tag(t, &self.config.release.tag_prefix)))
            .unwrap_or_else(|| Version::new(0, 0, 0))
    }
}

/// Release bump an earlier, interrupted `land` already pushed to the branch.
fn pending_release(pr: &PullRequest) -> Option<(Version, String)> {
    pr.commits.iter().rev().find_map(|c| {
        version::parse_release_marker(&c.message).map(|v| (v, c.sha.clone()))
    })
}

fn header(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim()
}

fn is_conventional(message: &str) -> bool {
    version::parse_conventional_commit("", message).commit_type != version::UNKNOWN_TYPE
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
