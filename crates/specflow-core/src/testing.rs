//! In-memory git repository and code host for unit tests.
//!
//! Branches, remote refs, tags and pull requests live in memory. Checkouts
//! are real temp directories so proposal and version files go through the
//! normal filesystem code; cleanliness is a comparison of the directory
//! against what was last committed there.

use crate::config::Config;
use crate::error::{Result, SpecflowError};
use crate::git::{RawCommit, Vcs, WorktreeEntry};
use crate::hosting::{
    ChecksStatus, CodeHost, MergeRequest, Mergeable, NewPullRequest, PrRef, PrState,
    PullRequest, ReviewDecision,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug, Clone)]
pub struct FakePr {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub state: PrState,
    pub is_draft: bool,
    pub is_cross_repository: bool,
    pub review_decision: ReviewDecision,
    pub checks: ChecksStatus,
    pub mergeable: Mergeable,
    merged: Option<(String, Vec<RawCommit>)>,
}

struct Checkout {
    path: PathBuf,
    branch: Option<String>,
    committed: Snapshot,
}

struct World {
    root: PathBuf,
    messages: HashMap<String, String>,
    trees: HashMap<String, Snapshot>,
    branches: BTreeMap<String, Vec<String>>,
    remote: BTreeMap<String, Vec<String>>,
    tags: Vec<(String, String)>,
    checkouts: Vec<Checkout>,
    prs: Vec<FakePr>,
    next_sha: u64,
    fail_remove: bool,
    log: Vec<String>,
}

fn git_error(command: &str, stderr: impl Into<String>) -> SpecflowError {
    SpecflowError::Command {
        command: format!("git {command}"),
        stderr: stderr.into(),
    }
}

fn scan(dir: &Path) -> Snapshot {
    let mut out = Snapshot::new();
    scan_into(dir, dir, &mut out);
    out
}

fn scan_into(base: &Path, dir: &Path, out: &mut Snapshot) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if name == ".git" || name == "worktrees" {
            continue;
        }
        if path.is_dir() {
            scan_into(base, &path, out);
        } else if let Ok(data) = std::fs::read(&path) {
            let rel = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
            out.insert(rel, data);
        }
    }
}

/// Make `dir` hold `new` where it previously held `old`.
fn materialize(dir: &Path, old: &Snapshot, new: &Snapshot) {
    for rel in old.keys().filter(|k| !new.contains_key(*k)) {
        let _ = std::fs::remove_file(dir.join(rel));
    }
    for (rel, data) in new {
        let target = dir.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(target, data).unwrap();
    }
}

impl World {
    fn checkout_index(&self, dir: &Path) -> Result<usize> {
        self.checkouts
            .iter()
            .enumerate()
            .filter(|(_, c)| dir.starts_with(&c.path))
            .max_by_key(|(_, c)| c.path.components().count())
            .map(|(i, _)| i)
            .ok_or_else(|| git_error("rev-parse", "not a git repository"))
    }

    fn new_commit(&mut self, message: &str, tree: Snapshot) -> String {
        self.next_sha += 1;
        let sha = format!("{:040x}", self.next_sha);
        self.messages.insert(sha.clone(), message.to_string());
        self.trees.insert(sha.clone(), tree);
        sha
    }

    fn tree_of(&self, sha: Option<&String>) -> Snapshot {
        sha.and_then(|s| self.trees.get(s)).cloned().unwrap_or_default()
    }

    /// Commits reachable from `rev`, oldest first.
    fn resolve(&self, dir: &Path, rev: &str) -> Option<Vec<String>> {
        if rev == "HEAD" {
            let idx = self.checkout_index(dir).ok()?;
            let branch = self.checkouts[idx].branch.as_ref()?;
            return self.branches.get(branch).cloned();
        }
        if let Some(name) = rev.strip_prefix("origin/") {
            return self.remote.get(name).cloned();
        }
        if let Some(commits) = self.branches.get(rev) {
            return Some(commits.clone());
        }
        let sha = self
            .tags
            .iter()
            .find(|(name, _)| name == rev)
            .map(|(_, sha)| sha.clone())
            .unwrap_or_else(|| rev.to_string());
        self.branches
            .values()
            .chain(self.remote.values())
            .find_map(|list| {
                list.iter()
                    .position(|s| *s == sha)
                    .map(|pos| list[..=pos].to_vec())
            })
    }

    fn raw(&self, sha: &str) -> RawCommit {
        RawCommit {
            sha: sha.to_string(),
            message: self.messages.get(sha).cloned().unwrap_or_default(),
        }
    }

    fn pr_snapshot(&self, pr: &FakePr) -> PullRequest {
        let (head_sha, commits) = match &pr.merged {
            Some((sha, commits)) => (sha.clone(), commits.clone()),
            None => {
                let head = self.remote.get(&pr.head).cloned().unwrap_or_default();
                let base = self.remote.get(&pr.base).cloned().unwrap_or_default();
                let commits = head
                    .iter()
                    .filter(|s| !base.contains(s))
                    .map(|s| self.raw(s))
                    .collect();
                (head.last().cloned().unwrap_or_default(), commits)
            }
        };
        PullRequest {
            number: pr.number,
            title: pr.title.clone(),
            url: format!("https://example.test/pull/{}", pr.number),
            head_branch: pr.head.clone(),
            base_branch: pr.base.clone(),
            head_sha,
            state: pr.state,
            is_draft: pr.is_draft,
            is_cross_repository: pr.is_cross_repository,
            review_decision: pr.review_decision,
            checks: pr.checks,
            failing_checks: if pr.checks == ChecksStatus::Failure {
                vec!["ci".to_string()]
            } else {
                Vec::new()
            },
            mergeable: pr.mergeable,
            commits,
        }
    }
}

/// Shared handle to the fake repository, remote and host.
pub struct FakeWorld {
    world: Rc<RefCell<World>>,
    _dir: TempDir,
}

impl FakeWorld {
    /// A repository with config, `VERSION` 0.4.2 and one commit on `main`,
    /// pushed to `origin`.
    pub fn new() -> Self {
        Self::with_version("0.4.2")
    }

    pub fn with_version(version: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        Config::new("demo").save(&root).unwrap();
        std::fs::write(root.join("VERSION"), format!("{version}\n")).unwrap();

        let mut world = World {
            root: root.clone(),
            messages: HashMap::new(),
            trees: HashMap::new(),
            branches: BTreeMap::new(),
            remote: BTreeMap::new(),
            tags: Vec::new(),
            checkouts: vec![Checkout {
                path: root.clone(),
                branch: Some("main".to_string()),
                committed: scan(&root),
            }],
            prs: Vec::new(),
            next_sha: 0,
            fail_remove: false,
            log: Vec::new(),
        };
        let initial = world.new_commit("chore: initial commit", scan(&root));
        world.branches.insert("main".into(), vec![initial.clone()]);
        world.remote.insert("main".into(), vec![initial]);

        Self {
            world: Rc::new(RefCell::new(world)),
            _dir: dir,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.world.borrow().root.clone()
    }

    pub fn vcs(&self) -> FakeVcs {
        FakeVcs {
            world: Rc::clone(&self.world),
        }
    }

    pub fn host(&self) -> FakeHost {
        FakeHost {
            world: Rc::clone(&self.world),
        }
    }

    pub fn fail_worktree_removal(&self) {
        self.world.borrow_mut().fail_remove = true;
    }

    /// Operations performed so far, in order (`commit`, `push`, `merge`, ...).
    pub fn log(&self) -> Vec<String> {
        self.world.borrow().log.clone()
    }

    pub fn tag(&self, name: &str, branch: &str) {
        let mut w = self.world.borrow_mut();
        let sha = w.branches[branch].last().cloned().unwrap();
        w.tags.push((name.to_string(), sha));
    }

    pub fn remote_head(&self, branch: &str) -> Option<String> {
        self.world
            .borrow()
            .remote
            .get(branch)
            .and_then(|c| c.last().cloned())
    }

    pub fn message(&self, sha: &str) -> String {
        self.world.borrow().messages[sha].clone()
    }

    pub fn pr(&self, number: u64) -> FakePr {
        self.world.borrow().prs[(number - 1) as usize].clone()
    }

    pub fn pr_count(&self) -> usize {
        self.world.borrow().prs.len()
    }

    pub fn edit_pr(&self, number: u64, edit: impl FnOnce(&mut FakePr)) {
        edit(&mut self.world.borrow_mut().prs[(number - 1) as usize]);
    }

    /// Approve, pass checks and mark mergeable.
    pub fn approve(&self, number: u64) {
        self.edit_pr(number, |pr| {
            pr.review_decision = ReviewDecision::Approved;
            pr.checks = ChecksStatus::Success;
            pr.mergeable = Mergeable::Mergeable;
        });
    }

    /// A green pull request from a fork: the head exists only on the remote.
    pub fn external_pr(&self, head: &str, messages: &[&str]) -> u64 {
        let mut w = self.world.borrow_mut();
        let mut commits = w.remote["main"].clone();
        let tree = w.tree_of(commits.last());
        for message in messages {
            let sha = w.new_commit(message, tree.clone());
            commits.push(sha);
        }
        w.remote.insert(head.to_string(), commits);
        let number = w.prs.len() as u64 + 1;
        w.prs.push(FakePr {
            number,
            title: messages.first().copied().unwrap_or("external").to_string(),
            body: String::new(),
            head: head.to_string(),
            base: "main".to_string(),
            state: PrState::Open,
            is_draft: false,
            is_cross_repository: true,
            review_decision: ReviewDecision::Approved,
            checks: ChecksStatus::Success,
            mergeable: Mergeable::Mergeable,
            merged: None,
        });
        number
    }
}

// ---------------------------------------------------------------------------
// FakeVcs
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeVcs {
    world: Rc<RefCell<World>>,
}

impl Vcs for FakeVcs {
    fn toplevel(&self, dir: &Path) -> Result<PathBuf> {
        let w = self.world.borrow();
        let idx = w.checkout_index(dir)?;
        Ok(w.checkouts[idx].path.clone())
    }

    fn common_dir(&self, dir: &Path) -> Result<PathBuf> {
        let w = self.world.borrow();
        w.checkout_index(dir)?;
        Ok(w.root.join(".git"))
    }

    fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let w = self.world.borrow();
        let idx = w.checkout_index(dir)?;
        Ok(w.checkouts[idx].branch.clone())
    }

    fn branch_exists(&self, _dir: &Path, name: &str) -> Result<bool> {
        Ok(self.world.borrow().branches.contains_key(name))
    }

    fn create_branch(&self, dir: &Path, name: &str, base: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        if w.branches.contains_key(name) {
            return Err(git_error("branch", format!("a branch named '{name}' already exists")));
        }
        let commits = w
            .resolve(dir, base)
            .ok_or_else(|| git_error("branch", format!("not a valid object name: '{base}'")))?;
        w.branches.insert(name.to_string(), commits);
        Ok(())
    }

    fn switch_branch(&self, dir: &Path, name: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        if !w.branches.contains_key(name) {
            return Err(git_error("switch", format!("invalid reference: {name}")));
        }
        let idx = w.checkout_index(dir)?;
        if w.checkouts
            .iter()
            .enumerate()
            .any(|(i, c)| i != idx && c.branch.as_deref() == Some(name))
        {
            return Err(git_error("switch", format!("'{name}' is already checked out")));
        }
        w.checkouts[idx].branch = Some(name.to_string());
        Ok(())
    }

    fn delete_branch(&self, _dir: &Path, name: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        if w.checkouts.iter().any(|c| c.branch.as_deref() == Some(name)) {
            return Err(git_error(
                "branch -D",
                format!("cannot delete branch '{name}' checked out"),
            ));
        }
        w.branches
            .remove(name)
            .map(drop)
            .ok_or_else(|| git_error("branch -D", format!("branch '{name}' not found")))
    }

    fn list_worktrees(&self, _dir: &Path) -> Result<Vec<WorktreeEntry>> {
        let w = self.world.borrow();
        Ok(w.checkouts
            .iter()
            .map(|c| WorktreeEntry {
                path: c.path.clone(),
                head: c
                    .branch
                    .as_ref()
                    .and_then(|b| w.branches.get(b))
                    .and_then(|l| l.last().cloned())
                    .unwrap_or_default(),
                branch: c.branch.clone(),
                bare: false,
            })
            .collect())
    }

    fn create_worktree(&self, dir: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
        self.create_branch(dir, branch, base)?;
        let mut w = self.world.borrow_mut();
        std::fs::create_dir_all(path)?;
        let tree = w.tree_of(w.branches[branch].last());
        materialize(path, &Snapshot::new(), &tree);
        w.checkouts.push(Checkout {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
            committed: tree,
        });
        Ok(())
    }

    fn remove_worktree(&self, _dir: &Path, path: &Path) -> Result<()> {
        let mut w = self.world.borrow_mut();
        if w.fail_remove {
            return Err(git_error("worktree remove", "Permission denied"));
        }
        let idx = w
            .checkouts
            .iter()
            .position(|c| c.path == path)
            .ok_or_else(|| git_error("worktree remove", "not a working tree"))?;
        if scan(path) != w.checkouts[idx].committed {
            return Err(git_error(
                "worktree remove",
                "contains modified or untracked files, use --force to delete it",
            ));
        }
        std::fs::remove_dir_all(path)?;
        w.checkouts.remove(idx);
        w.log.push(format!("remove-worktree {}", path.display()));
        Ok(())
    }

    fn is_clean(&self, dir: &Path) -> Result<bool> {
        let w = self.world.borrow();
        let idx = w.checkout_index(dir)?;
        let checkout = &w.checkouts[idx];
        Ok(scan(&checkout.path) == checkout.committed)
    }

    fn stage_all(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<String> {
        let mut w = self.world.borrow_mut();
        let idx = w.checkout_index(dir)?;
        let current = scan(&w.checkouts[idx].path);
        if current == w.checkouts[idx].committed {
            return Err(git_error("commit", "nothing to commit, working tree clean"));
        }
        let branch = w.checkouts[idx]
            .branch
            .clone()
            .ok_or_else(|| git_error("commit", "detached HEAD"))?;
        let sha = w.new_commit(message, current.clone());
        w.branches.entry(branch.clone()).or_default().push(sha.clone());
        w.checkouts[idx].committed = current;
        w.log.push(format!("commit {branch} {message}"));
        Ok(sha)
    }

    fn head_sha(&self, dir: &Path) -> Result<String> {
        let w = self.world.borrow();
        w.resolve(dir, "HEAD")
            .and_then(|c| c.last().cloned())
            .ok_or_else(|| git_error("rev-parse", "unknown revision HEAD"))
    }

    fn resolves(&self, dir: &Path, rev: &str) -> Result<bool> {
        Ok(self.world.borrow().resolve(dir, rev).is_some())
    }

    fn commit_message(&self, dir: &Path, rev: &str) -> Result<String> {
        let w = self.world.borrow();
        let sha = w
            .resolve(dir, rev)
            .and_then(|c| c.last().cloned())
            .ok_or_else(|| git_error("log", format!("unknown revision {rev}")))?;
        Ok(w.messages[&sha].clone())
    }

    fn file_at(&self, dir: &Path, rev: &str, path: &Path) -> Result<Option<String>> {
        let w = self.world.borrow();
        let tree = w.tree_of(w.resolve(dir, rev).and_then(|c| c.last().cloned()).as_ref());
        Ok(tree
            .get(path)
            .map(|data| String::from_utf8_lossy(data).into_owned()))
    }

    fn fetch(&self, _dir: &Path, remote: &str) -> Result<()> {
        self.world.borrow_mut().log.push(format!("fetch {remote}"));
        Ok(())
    }

    fn push(&self, _dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        let commits = w
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("push", format!("src refspec {branch} does not match any")))?;
        if let Some(existing) = w.remote.get(branch) {
            if !existing.iter().all(|s| commits.contains(s)) {
                return Err(git_error("push", "rejected (non-fast-forward)"));
            }
        }
        w.remote.insert(branch.to_string(), commits);
        w.log.push(format!("push {remote} {branch}"));
        Ok(())
    }

    fn delete_remote_branch(&self, _dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        w.remote.remove(branch);
        w.log.push(format!("delete-remote {remote} {branch}"));
        Ok(())
    }

    fn commits_ahead(&self, dir: &Path, upstream: &str, head: &str) -> Result<Option<usize>> {
        let w = self.world.borrow();
        let Some(up) = w.resolve(dir, upstream) else {
            return Ok(None);
        };
        let head = w
            .resolve(dir, head)
            .ok_or_else(|| git_error("rev-list", format!("unknown revision {head}")))?;
        Ok(Some(head.iter().filter(|s| !up.contains(s)).count()))
    }

    fn fast_forward(&self, _dir: &Path, remote: &str, branch: &str) -> Result<()> {
        let mut w = self.world.borrow_mut();
        let upstream = w
            .remote
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("merge", format!("{remote}/{branch} not found")))?;
        let local = w.branches.get(branch).cloned().unwrap_or_default();
        if upstream.iter().all(|s| local.contains(s)) {
            // Already up to date, or ahead of the remote.
            w.log.push(format!("sync {branch}"));
            return Ok(());
        }
        if !local.iter().all(|s| upstream.contains(s)) {
            return Err(git_error("merge --ff-only", "Not possible to fast-forward, aborting."));
        }
        let new_tree = w.tree_of(upstream.last());
        if let Some(idx) = w
            .checkouts
            .iter()
            .position(|c| c.branch.as_deref() == Some(branch))
        {
            let checkout = &mut w.checkouts[idx];
            if scan(&checkout.path) != checkout.committed {
                return Err(git_error("merge --ff-only", "local changes would be overwritten"));
            }
            materialize(&checkout.path, &checkout.committed, &new_tree);
            checkout.committed = new_tree;
        }
        w.branches.insert(branch.to_string(), upstream);
        w.log.push(format!("sync {branch}"));
        Ok(())
    }

    fn latest_tag(&self, dir: &Path, prefix: &str, rev: &str) -> Result<Option<String>> {
        let w = self.world.borrow();
        let reachable = w.resolve(dir, rev).unwrap_or_default();
        Ok(w.tags
            .iter()
            .rev()
            .find(|(name, sha)| name.starts_with(prefix) && reachable.contains(sha))
            .map(|(name, _)| name.clone()))
    }

    fn commits_since(&self, dir: &Path, since: Option<&str>, rev: &str) -> Result<Vec<RawCommit>> {
        let w = self.world.borrow();
        let all = w
            .resolve(dir, rev)
            .ok_or_else(|| git_error("log", format!("unknown revision {rev}")))?;
        let exclude = since.and_then(|s| w.resolve(dir, s)).unwrap_or_default();
        Ok(all
            .iter()
            .rev()
            .filter(|s| !exclude.contains(s))
            .map(|s| w.raw(s))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeHost {
    world: Rc<RefCell<World>>,
}

impl CodeHost for FakeHost {
    fn find_pull_request(&self, _dir: &Path, target: &PrRef) -> Result<Option<PullRequest>> {
        let w = self.world.borrow();
        let found = match target {
            PrRef::Number(n) => w.prs.iter().find(|p| p.number == *n),
            PrRef::Branch(b) => w.prs.iter().rev().find(|p| &p.head == b),
        };
        Ok(found.map(|pr| w.pr_snapshot(pr)))
    }

    fn create_pull_request(&self, _dir: &Path, request: &NewPullRequest) -> Result<PullRequest> {
        let mut w = self.world.borrow_mut();
        if !w.remote.contains_key(&request.head) {
            return Err(SpecflowError::Command {
                command: "gh pr create".into(),
                stderr: format!("head branch '{}' has not been pushed", request.head),
            });
        }
        let number = w.prs.len() as u64 + 1;
        let pr = FakePr {
            number,
            title: request.title.clone(),
            body: request.body.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            state: PrState::Open,
            is_draft: request.draft,
            is_cross_repository: false,
            review_decision: ReviewDecision::ReviewRequired,
            checks: ChecksStatus::Pending,
            mergeable: Mergeable::Unknown,
            merged: None,
        };
        w.prs.push(pr);
        w.log.push(format!("create-pr #{number}"));
        let snapshot = w.pr_snapshot(&w.prs[(number - 1) as usize]);
        Ok(snapshot)
    }

    fn merge_pull_request(&self, _dir: &Path, request: &MergeRequest) -> Result<()> {
        let mut w = self.world.borrow_mut();
        let idx = w
            .prs
            .iter()
            .position(|p| p.number == request.number)
            .ok_or_else(|| SpecflowError::PullRequestNotFound(format!("#{}", request.number)))?;
        let snapshot = w.pr_snapshot(&w.prs[idx]);
        if snapshot.state != PrState::Open {
            return Err(SpecflowError::Command {
                command: "gh pr merge".into(),
                stderr: "pull request is not open".into(),
            });
        }
        if snapshot.mergeable == Mergeable::Conflicting {
            return Err(SpecflowError::MergeConflict {
                branch: snapshot.head_branch,
                detail: "not mergeable".into(),
            });
        }
        if let Some(expected) = &request.expected_head {
            if *expected != snapshot.head_sha {
                return Err(SpecflowError::Command {
                    command: "gh pr merge".into(),
                    stderr: "head branch was modified".into(),
                });
            }
        }

        let mut message = format!("{} (#{})", snapshot.title, snapshot.number);
        if let Some(body) = &request.body {
            message.push_str("\n\n");
            message.push_str(body);
        }
        let tree = w.tree_of(Some(&snapshot.head_sha));
        let squash = w.new_commit(&message, tree);
        let base = snapshot.base_branch.clone();
        w.remote.entry(base).or_default().push(squash);
        w.prs[idx].state = PrState::Merged;
        w.prs[idx].merged = Some((snapshot.head_sha.clone(), snapshot.commits));
        w.log.push(format!("merge #{} {}", snapshot.number, snapshot.head_sha));
        Ok(())
    }
}
