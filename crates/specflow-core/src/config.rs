use crate::error::{Result, SpecflowError};
use crate::paths;
use crate::types::BumpTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BranchingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchingConfig {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_worktree_dir")]
    pub worktree_dir: String,
    #[serde(default = "default_remote")]
    pub remote: String,
}

fn default_base() -> String {
    "main".to_string()
}

fn default_prefix() -> String {
    "spec/".to_string()
}

fn default_worktree_dir() -> String {
    "worktrees".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Default for BranchingConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            prefix: default_prefix(),
            worktree_dir: default_worktree_dir(),
            remote: default_remote(),
        }
    }
}

impl BranchingConfig {
    pub fn branch_for(&self, id: &str) -> String {
        crate::naming::branch_for(&self.prefix, id)
    }

    pub fn id_for_branch<'a>(&self, branch: &'a str) -> Option<&'a str> {
        crate::naming::id_for_branch(&self.prefix, branch)
    }
}

// ---------------------------------------------------------------------------
// ReleasePolicy
// ---------------------------------------------------------------------------

/// Which bump tiers may be released automatically when a change lands.
/// A tier missing from the config is never auto-released.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleasePolicy {
    #[serde(default)]
    pub patch: bool,
    #[serde(default)]
    pub minor: bool,
    #[serde(default)]
    pub major: bool,
}

impl ReleasePolicy {
    pub fn allows(&self, tier: BumpTier) -> bool {
        match tier {
            BumpTier::Patch => self.patch,
            BumpTier::Minor => self.minor,
            BumpTier::Major => self.major,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub auto: ReleasePolicy,
    /// Files carrying the project version, relative to the checkout root.
    /// Empty means autodetect.
    #[serde(default)]
    pub version_files: Vec<String>,
    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            auto: ReleasePolicy::default(),
            version_files: Vec::new(),
            tag_prefix: default_tag_prefix(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadinessConfig / MergeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// When false, a pull request with no checks configured is accepted.
    #[serde(default = "default_true")]
    pub require_checks: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            require_checks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    #[default]
    Squash,
    Merge,
    Rebase,
}

impl MergeMethod {
    pub fn as_flag(self) -> &'static str {
        match self {
            MergeMethod::Squash => "--squash",
            MergeMethod::Merge => "--merge",
            MergeMethod::Rebase => "--rebase",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub method: MergeMethod,
    #[serde(default = "default_true")]
    pub delete_remote_branch: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            method: MergeMethod::Squash,
            delete_remote_branch: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub branching: BranchingConfig,
    #[serde(default)]
    pub release: ReleaseConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    /// A fresh config as written by `specflow init`: patch and minor bumps
    /// release automatically, major stays manual.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            branching: BranchingConfig::default(),
            release: ReleaseConfig {
                auto: ReleasePolicy {
                    patch: true,
                    minor: true,
                    major: false,
                },
                ..ReleaseConfig::default()
            },
            readiness: ReadinessConfig::default(),
            merge: MergeConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SpecflowError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let b = &self.branching;

        if b.base.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "branching.base is empty".to_string(),
            });
        }

        if b.prefix.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "branching.prefix is empty; every branch would be managed".to_string(),
            });
        } else if !b.prefix.ends_with('/') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "branching.prefix '{}' does not end with '/'; branches will read '{}my-change'",
                    b.prefix, b.prefix
                ),
            });
        }

        if b.base.starts_with(&b.prefix) && !b.prefix.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "base branch '{}' matches the managed prefix '{}'",
                    b.base, b.prefix
                ),
            });
        }

        if Path::new(&b.worktree_dir).is_absolute() || b.worktree_dir.contains("..") {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "branching.worktree_dir '{}' must be a relative path inside the repository",
                    b.worktree_dir
                ),
            });
        }

        if self.release.auto.major {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "release.auto.major is enabled; breaking changes will release without review"
                    .to_string(),
            });
        }

        if self.merge.method != MergeMethod::Squash {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "merge.method is {:?}; only squash merges fold the version bump into a single commit",
                    self.merge.method
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
