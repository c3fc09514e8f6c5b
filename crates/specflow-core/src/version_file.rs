//! Reading and rewriting the project version.
//!
//! Supported files: `Cargo.toml` (`[package]` or `[workspace.package]`),
//! `package.json` (top-level `"version"`) and a plain `VERSION` file. Edits
//! keep the surrounding formatting intact.

use crate::error::{Result, SpecflowError};
use regex::Regex;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use toml_edit::DocumentMut;

const CANDIDATES: &[&str] = &["Cargo.toml", "package.json", "VERSION"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFormat {
    Cargo,
    PackageJson,
    Plain,
}

impl VersionFormat {
    fn for_path(path: &Path) -> VersionFormat {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("Cargo.toml") => VersionFormat::Cargo,
            Some("package.json") => VersionFormat::PackageJson,
            _ => VersionFormat::Plain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    /// Path relative to the checkout root.
    pub path: PathBuf,
    pub format: VersionFormat,
}

impl VersionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = VersionFormat::for_path(&path);
        Self { path, format }
    }

    pub fn read(&self, checkout: &Path) -> Result<Version> {
        let content = std::fs::read_to_string(checkout.join(&self.path))?;
        self.parse(&content)
    }

    /// Version carried by `content`, as this file's format lays it out.
    pub fn parse(&self, content: &str) -> Result<Version> {
        let raw = match self.format {
            VersionFormat::Cargo => cargo_version(content)?,
            VersionFormat::PackageJson => json_version(content),
            VersionFormat::Plain => Some(content.trim().to_string()),
        };
        let raw = raw.ok_or_else(|| {
            SpecflowError::Parse(format!("no version field in {}", self.path.display()))
        })?;
        Ok(Version::parse(&raw)?)
    }

    pub fn write(&self, checkout: &Path, version: &Version) -> Result<()> {
        let path = checkout.join(&self.path);
        let content = std::fs::read_to_string(&path)?;
        let updated = match self.format {
            VersionFormat::Cargo => set_cargo_version(&content, version)?,
            VersionFormat::PackageJson => set_json_version(&content, version)?,
            VersionFormat::Plain => format!("{version}\n"),
        };
        crate::io::atomic_write(&path, updated.as_bytes())?;
        tracing::debug!(file = %self.path.display(), %version, "version updated");
        Ok(())
    }
}

/// Version files for a checkout: the configured ones, or the first
/// autodetected file that carries a version.
pub fn resolve(checkout: &Path, configured: &[String]) -> Result<Vec<VersionFile>> {
    if !configured.is_empty() {
        let files: Vec<VersionFile> = configured.iter().map(VersionFile::new).collect();
        if let Some(missing) = files.iter().find(|f| !checkout.join(&f.path).exists()) {
            return Err(SpecflowError::VersionFileNotFound(
                missing.path.display().to_string(),
            ));
        }
        return Ok(files);
    }

    CANDIDATES
        .iter()
        .map(VersionFile::new)
        .find(|f| checkout.join(&f.path).exists() && f.read(checkout).is_ok())
        .map(|f| vec![f])
        .ok_or_else(|| SpecflowError::VersionFileNotFound(CANDIDATES.join(", ")))
}

/// Current version: the first resolved file wins.
pub fn current(checkout: &Path, configured: &[String]) -> Result<Version> {
    let files = resolve(checkout, configured)?;
    match files.first() {
        Some(file) => file.read(checkout),
        None => Err(SpecflowError::VersionFileNotFound(CANDIDATES.join(", "))),
    }
}

/// Write `version` to every resolved file, returning the touched paths.
pub fn set(checkout: &Path, configured: &[String], version: &Version) -> Result<Vec<PathBuf>> {
    let files = resolve(checkout, configured)?;
    for file in &files {
        file.write(checkout, version)?;
    }
    Ok(files.into_iter().map(|f| f.path).collect())
}

// ---------------------------------------------------------------------------
// Cargo.toml
// ---------------------------------------------------------------------------

fn cargo_version(content: &str) -> Result<Option<String>> {
    let doc: DocumentMut = content.parse()?;
    let package = doc
        .get("package")
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str());
    let workspace = doc
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str());
    Ok(package.or(workspace).map(str::to_string))
}

fn set_cargo_version(content: &str, version: &Version) -> Result<String> {
    let mut doc: DocumentMut = content.parse()?;
    let new_value = version.to_string();

    // `version.workspace = true` in [package] defers to [workspace.package].
    let package_has_literal = doc
        .get("package")
        .and_then(|p| p.get("version"))
        .is_some_and(|v| v.is_str());

    let slot = if package_has_literal {
        doc.get_mut("package").and_then(|p| p.get_mut("version"))
    } else {
        doc.get_mut("workspace")
            .and_then(|w| w.get_mut("package"))
            .and_then(|p| p.get_mut("version"))
    };
    let Some(value) = slot.and_then(|item| item.as_value_mut()) else {
        return Err(SpecflowError::Parse("no version field in Cargo.toml".into()));
    };

    let decor = value.decor().clone();
    *value = toml_edit::Value::from(new_value);
    *value.decor_mut() = decor;
    Ok(doc.to_string())
}

// ---------------------------------------------------------------------------
// package.json
// ---------------------------------------------------------------------------

static JSON_VERSION_RE: OnceLock<Regex> = OnceLock::new();

fn json_version_re() -> &'static Regex {
    JSON_VERSION_RE
        .get_or_init(|| Regex::new(r#""version"\s*:\s*"([^"]*)""#).expect("static regex"))
}

fn json_version(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value.get("version")?.as_str().map(str::to_string)
}

fn set_json_version(content: &str, version: &Version) -> Result<String> {
    // Validate first so a broken file is reported rather than half-edited.
    serde_json::from_str::<serde_json::Value>(content)?;
    let current = json_version(content)
        .ok_or_else(|| SpecflowError::Parse("no version field in package.json".into()))?;

    let re = json_version_re();
    let target = re
        .captures_iter(content)
        .find(|c| c[1] == current)
        .and_then(|c| c.get(1))
        .ok_or_else(|| SpecflowError::Parse("cannot locate version in package.json".into()))?;

    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..target.start()]);
    out.push_str(&version.to_string());
    out.push_str(&content[target.end()..]);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
