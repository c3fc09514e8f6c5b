//! Version policy: conventional-commit parsing, bump suggestion and the
//! release-marker commit convention.

use crate::config::ReleasePolicy;
use crate::git::RawCommit;
use crate::types::BumpTier;
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Type assigned to commits whose header is not conventional.
pub const UNKNOWN_TYPE: &str = "unknown";

const RELEASE_MARKER_PREFIX: &str = "chore(release): v";

// ---------------------------------------------------------------------------
// CommitInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    #[serde(rename = "type")]
    pub commit_type: String,
    pub scope: Option<String>,
    pub is_breaking: bool,
}

static HEADER_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)(?:\(([^()\r\n]*)\))?(!)?:\s*\S").expect("static regex")
    })
}

/// Parse a commit message. Never fails: non-conventional headers get type
/// [`UNKNOWN_TYPE`] and are not breaking, whatever their footers say.
pub fn parse_conventional_commit(sha: &str, message: &str) -> CommitInfo {
    let mut lines = message.lines();
    let header = lines.next().unwrap_or("").trim();

    let Some(caps) = header_re().captures(header) else {
        return CommitInfo {
            sha: sha.to_string(),
            message: message.to_string(),
            commit_type: UNKNOWN_TYPE.to_string(),
            scope: None,
            is_breaking: false,
        };
    };

    let footer_breaking = lines.any(|line| {
        line.split_once(':').is_some_and(|(key, _)| {
            let key = key.trim();
            key == "BREAKING CHANGE" || key == "BREAKING-CHANGE"
        })
    });

    CommitInfo {
        sha: sha.to_string(),
        message: message.to_string(),
        commit_type: caps[1].to_ascii_lowercase(),
        scope: caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        is_breaking: caps.get(3).is_some() || footer_breaking,
    }
}

/// Parse raw history, dropping release-marker commits.
pub fn parse_commits(raw: &[RawCommit]) -> Vec<CommitInfo> {
    raw.iter()
        .filter(|c| parse_release_marker(&c.message).is_none())
        .map(|c| parse_conventional_commit(&c.sha, &c.message))
        .collect()
}

// ---------------------------------------------------------------------------
// Bump suggestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionAnalysis {
    pub bump: BumpTier,
    pub reasoning: String,
    /// Commit count per type, e.g. `{"feat": 2, "fix": 1}`.
    pub type_counts: BTreeMap<String, usize>,
    pub breaking: usize,
}

pub fn suggest_bump(commits: &[CommitInfo], current: &Version) -> VersionAnalysis {
    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    for commit in commits {
        *type_counts.entry(commit.commit_type.clone()).or_default() += 1;
    }
    let breaking = commits.iter().filter(|c| c.is_breaking).count();
    let count = |ty: &str| type_counts.get(ty).copied().unwrap_or(0);

    let (bump, rule) = if breaking > 0 && current.major >= 1 {
        (BumpTier::Major, format!("{breaking} breaking change(s)"))
    } else if breaking > 0 {
        (
            BumpTier::Minor,
            format!("{breaking} breaking change(s) while pre-1.0 ({current})"),
        )
    } else if count("feat") > 0 {
        (BumpTier::Minor, format!("{} feat commit(s)", count("feat")))
    } else if count("fix") + count("perf") > 0 {
        (
            BumpTier::Patch,
            format!("{} fix/perf commit(s)", count("fix") + count("perf")),
        )
    } else {
        (BumpTier::Patch, "no feat or fix commits; default patch".to_string())
    };

    let reasoning = match dominant_type(&type_counts) {
        Some((ty, n)) => format!("{bump}: {rule}; dominant type {ty} ({n} of {})", commits.len()),
        None => format!("{bump}: {rule}; no commits since last release"),
    };

    VersionAnalysis {
        bump,
        reasoning,
        type_counts,
        breaking,
    }
}

/// Most frequent type; ties go to the alphabetically first.
fn dominant_type(counts: &BTreeMap<String, usize>) -> Option<(&str, usize)> {
    counts
        .iter()
        .fold(None, |best: Option<(&str, usize)>, (ty, &n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((ty.as_str(), n)),
        })
}

pub fn is_auto_release_allowed(bump: BumpTier, policy: &ReleasePolicy) -> bool {
    policy.allows(bump)
}

// ---------------------------------------------------------------------------
// Release marker
// ---------------------------------------------------------------------------

/// Commit message that tells CI to tag and publish `version`.
pub fn release_marker(version: &Version) -> String {
    format!("{RELEASE_MARKER_PREFIX}{version}")
}

/// The version named by a release marker anywhere in `message`.
///
/// A squash merge carries the marker in its body, so every line is checked.
pub fn parse_release_marker(message: &str) -> Option<Version> {
    message.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(RELEASE_MARKER_PREFIX)?;
        Version::parse(rest.trim()).ok()
    })
}

/// Version encoded in a tag such as `v1.4.0`.
pub fn version_from_tag(tag: &str, prefix: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix(prefix).unwrap_or(tag)).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> CommitInfo {
        parse_conventional_commit("0000000", message)
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parses_type_scope_and_bang() {
        let c = commit("feat(auth)!: drop legacy tokens");
        assert_eq!(c.commit_type, "feat");
        assert_eq!(c.scope.as_deref(), Some("auth"));
        assert!(c.is_breaking);

        let c = commit("fix: handle empty config");
        assert_eq!(c.commit_type, "fix");
        assert!(!c.is_breaking);
    }

    #[test]
    fn breaking_footer_marks_breaking() {
        assert!(commit("feat: new api\n\nBREAKING CHANGE: old api removed").is_breaking);
        assert!(commit("refactor: x\n\nBREAKING-CHANGE: y").is_breaking);
        assert!(!commit("feat: x\n\nMentions a BREAKING CHANGE in prose").is_breaking);
    }

    #[test]
    fn noisy_messages_are_unknown() {
        for msg in ["", "Merge branch 'main'", "WIP", "feat:", "fix(: broken", "feat : spaced"] {
            let c = commit(msg);
            assert_eq!(c.commit_type, UNKNOWN_TYPE, "{msg:?}");
            assert!(!c.is_breaking);
        }
        assert!(!commit("oops\n\nBREAKING CHANGE: ignored").is_breaking);
    }

    #[test]
    fn unrecognized_types_are_kept() {
        assert_eq!(commit("wip: stuff").commit_type, "wip");
        assert_eq!(commit("Feat: caps").commit_type, "feat");
    }

    #[test]
    fn breaking_before_1_0_is_minor() {
        let analysis = suggest_bump(&[commit("feat!: redesign")], &v("0.4.2"));
        assert_eq!(analysis.bump, BumpTier::Minor);
        assert!(analysis.reasoning.contains("pre-1.0"));
    }

    #[test]
    fn breaking_after_1_0_is_major() {
        let analysis = suggest_bump(&[commit("feat!: redesign")], &v("1.2.0"));
        assert_eq!(analysis.bump, BumpTier::Major);
    }

    #[test]
    fn feat_is_minor_fix_is_patch() {
        let commits = [commit("fix: a"), commit("feat: b"), commit("fix: c")];
        let analysis = suggest_bump(&commits, &v("1.0.0"));
        assert_eq!(analysis.bump, BumpTier::Minor);
        assert!(analysis.reasoning.contains("dominant type fix (2 of 3)"));

        assert_eq!(
            suggest_bump(&[commit("perf: faster")], &v("1.0.0")).bump,
            BumpTier::Patch
        );
    }

    #[test]
    fn silence_still_bumps_patch() {
        let analysis = suggest_bump(&[commit("docs: readme"), commit("noise")], &v("2.3.4"));
        assert_eq!(analysis.bump, BumpTier::Patch);
        assert!(analysis.reasoning.contains("default patch"));

        let empty = suggest_bump(&[], &v("2.3.4"));
        assert_eq!(empty.bump, BumpTier::Patch);
    }

    #[test]
    fn policy_lookup() {
        let policy = ReleasePolicy {
            patch: true,
            minor: true,
            major: false,
        };
        assert!(is_auto_release_allowed(BumpTier::Minor, &policy));
        assert!(!is_auto_release_allowed(BumpTier::Major, &policy));
        assert!(!is_auto_release_allowed(
            BumpTier::Patch,
            &ReleasePolicy::default()
        ));
    }

    #[test]
    fn release_marker_roundtrip_and_filtering() {
        let marker = release_marker(&v("0.5.0"));
        assert_eq!(marker, "chore(release): v0.5.0");
        assert_eq!(parse_release_marker(&marker), Some(v("0.5.0")));
        assert_eq!(parse_release_marker("chore(release): vnext"), None);
        assert_eq!(
            parse_release_marker("feat: add login (#4)\n\nchore(release): v0.5.0"),
            Some(v("0.5.0"))
        );

        let raw = vec![
            RawCommit {
                sha: "a".into(),
                message: marker,
            },
            RawCommit {
                sha: "b".into(),
                message: "feat: x".into(),
            },
        ];
        let parsed = parse_commits(&raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sha, "b");
    }

    #[test]
    fn tag_versions() {
        assert_eq!(version_from_tag("v1.4.0", "v"), Some(v("1.4.0")));
        assert_eq!(version_from_tag("1.4.0", "v"), Some(v("1.4.0")));
        assert_eq!(version_from_tag("release-x", "v"), None);
    }
}
