//! Pull-request readiness.
//!
//! [`evaluate`] turns a [`PullRequest`] snapshot into a verdict. It never
//! talks to the host; every unmet predicate becomes its own blocker line.

use crate::config::ReadinessConfig;
use crate::hosting::{ChecksStatus, Mergeable, PrState, PullRequest, ReviewDecision};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub blockers: Vec<String>,
}

pub fn evaluate(pr: &PullRequest, config: &ReadinessConfig) -> Readiness {
    let mut blockers = Vec::new();

    match pr.state {
        PrState::Open => {}
        PrState::Closed => blockers.push("pull request is closed".to_string()),
        PrState::Merged => blockers.push("pull request is already merged".to_string()),
    }
    if pr.is_draft {
        blockers.push("pull request is a draft".to_string());
    }

    match pr.review_decision {
        ReviewDecision::Approved | ReviewDecision::NoneRequired => {}
        ReviewDecision::ChangesRequested => {
            blockers.push("review: changes requested".to_string())
        }
        ReviewDecision::ReviewRequired => {
            blockers.push("review: approval required".to_string())
        }
    }

    match pr.checks {
        ChecksStatus::Success => {}
        ChecksStatus::None if !config.require_checks => {}
        ChecksStatus::None => blockers.push("checks: none reported".to_string()),
        ChecksStatus::Pending => blockers.push("checks: still running".to_string()),
        ChecksStatus::Failure if pr.failing_checks.is_empty() => {
            blockers.push("checks: failing".to_string())
        }
        ChecksStatus::Failure => blockers.push(format!(
            "checks: failing ({})",
            pr.failing_checks.join(", ")
        )),
    }

    match pr.mergeable {
        Mergeable::Mergeable => {}
        Mergeable::Conflicting => {
            blockers.push("mergeable: conflicts with the base branch".to_string())
        }
        Mergeable::Unknown => {
            blockers.push("mergeable: not yet computed by the host".to_string())
        }
    }

    Readiness {
        ready: blockers.is_empty(),
        blockers,
    }
}
