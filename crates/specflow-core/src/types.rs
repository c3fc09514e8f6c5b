use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ChangeState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Created,
    Implementing,
    Submitted,
    Merged,
    Released,
}

impl ChangeState {
    pub fn all() -> &'static [ChangeState] {
        &[
            ChangeState::Created,
            ChangeState::Implementing,
            ChangeState::Submitted,
            ChangeState::Merged,
            ChangeState::Released,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<ChangeState> {
        Self::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeState::Created => "created",
            ChangeState::Implementing => "implementing",
            ChangeState::Submitted => "submitted",
            ChangeState::Merged => "merged",
            ChangeState::Released => "released",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeState::Merged | ChangeState::Released)
    }
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeState {
    type Err = crate::error::SpecflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| crate::error::SpecflowError::Parse(format!("unknown change state: {s}")))
    }
}

// ---------------------------------------------------------------------------
// BumpTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpTier {
    Patch,
    Minor,
    Major,
}

impl BumpTier {
    pub fn as_str(self) -> &'static str {
        match self {
            BumpTier::Patch => "patch",
            BumpTier::Minor => "minor",
            BumpTier::Major => "major",
        }
    }

    /// Apply the bump to `version`, dropping any pre-release or build metadata.
    pub fn apply(self, version: &semver::Version) -> semver::Version {
        match self {
            BumpTier::Major => semver::Version::new(version.major + 1, 0, 0),
            BumpTier::Minor => semver::Version::new(version.major, version.minor + 1, 0),
            BumpTier::Patch => {
                semver::Version::new(version.major, version.minor, version.patch + 1)
            }
        }
    }
}

impl fmt::Display for BumpTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BumpTier {
    type Err = crate::error::SpecflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(BumpTier::Patch),
            "minor" => Ok(BumpTier::Minor),
            "major" => Ok(BumpTier::Major),
            other => Err(crate::error::SpecflowError::Parse(format!(
                "unknown bump tier: {other} (expected patch, minor or major)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
