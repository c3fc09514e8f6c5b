pub mod branch_kind;
pub mod change;
pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod io;
pub mod lifecycle;
pub mod naming;
pub mod paths;
pub mod proposal;
pub mod readiness;
pub mod runner;
pub mod types;
pub mod version;
pub mod version_file;
pub mod worktree;

#[cfg(test)]
mod testing;

pub use error::{Result, SpecflowError};
