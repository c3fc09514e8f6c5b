//! Canonical change identifiers and the id ↔ branch mapping.
//!
//! Every component that needs a branch name for a change goes through
//! [`branch_for`] (usually via `BranchingConfig::branch_for`); nothing else
//! formats managed branch names.

use crate::error::Result;
use crate::paths::validate_id;

/// Maximum number of words kept when deriving an id from a description.
pub const MAX_ID_WORDS: usize = 5;

/// Derive a kebab-case id from a free-form description.
///
/// Lowercases, turns every run of non-alphanumeric characters into a single
/// hyphen and keeps the first [`MAX_ID_WORDS`] words. Ids are ASCII only:
/// non-ASCII letters are separators, so pass `--id` for such descriptions.
/// The verb prefix ("add-", "fix-") is a caller convention and is not
/// enforced here.
pub fn derive_id(description: &str) -> Result<String> {
    let lowered = description.to_lowercase();
    let id = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(MAX_ID_WORDS)
        .collect::<Vec<_>>()
        .join("-");
    validate_id(&id)?;
    Ok(id)
}

/// Accept either an already-canonical id or a description to derive one from.
pub fn resolve_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if validate_id(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }
    derive_id(trimmed)
}

pub fn branch_for(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}")
}

/// Inverse of [`branch_for`]: the change id when `branch` is a managed branch.
pub fn id_for_branch<'a>(prefix: &str, branch: &'a str) -> Option<&'a str> {
    branch
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
}

/// Turn an id back into a readable title ("add-oauth-login" → "Add oauth login").
pub fn humanize(id: &str) -> String {
    let words = id.replace(['-', '_', '/'], " ");
    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
