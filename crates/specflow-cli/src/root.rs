use specflow_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the directory commands operate from.
///
/// Priority:
/// 1. `--root` flag / `SPECFLOW_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.specflow/`
/// 3. Walk upward from `cwd` looking for `.git` (a directory, or the file a
///    linked worktree has)
/// 4. Fall back to `cwd`
///
/// Inside a worktree this is the worktree; the main checkout is asked from
/// git by the lifecycle itself.
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, |dir| dir.join(paths::SPECFLOW_DIR).is_dir())
        .or_else(|| find_upward(&cwd, |dir| dir.join(".git").exists()))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, matches: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| matches(dir)).map(Path::to_path_buf)
}
