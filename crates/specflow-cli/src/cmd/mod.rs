pub mod analyze;
pub mod change;
pub mod config;
pub mod init;
pub mod land;
pub mod release;
pub mod ship;
pub mod start;
pub mod status;
pub mod worktree;

use anyhow::Context;
use specflow_core::git::SystemGit;
use specflow_core::hosting::GhCli;
use specflow_core::lifecycle::Lifecycle;
use specflow_core::proposal::FsProposals;
use std::path::Path;

pub type Flow = Lifecycle<SystemGit, GhCli, FsProposals>;

/// Open the lifecycle for the repository containing `root`.
pub fn open(root: &Path) -> anyhow::Result<Flow> {
    Lifecycle::open(SystemGit, GhCli, FsProposals, root)
        .with_context(|| format!("failed to open repository at {}", root.display()))
}
