// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory and config file resolution.

use std::path::{Path, PathBuf};

use printdock_core::config::CONFIG_PATH_ENV;

/// Return the agent's data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = base_dir(|key| std::env::var(key).ok()).join("printdock");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "data directory not created");
    }
    dir
}

/// Config file: `$PRINTDOCK_CONFIG`, else `printdock.json` in `data_dir`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    config_path_from(data_dir, |key| std::env::var(key).ok())
}

/// Resolve a relative path from the config against the data directory.
pub fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        data_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

fn config_path_from<F>(data_dir: &Path, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(CONFIG_PATH_ENV)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("printdock.json"))
}

fn base_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    // XDG data dir, then ~/.local/share
    if let Some(xdg) = lookup("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = lookup("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/var/lib")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn xdg_takes_precedence_over_home() {
        let lookup = env(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/op")]);
        assert_eq!(base_dir(lookup), PathBuf::from("/xdg"));
        assert_eq!(
            base_dir(env(&[("HOME", "/home/op")])),
            PathBuf::from("/home/op/.local/share")
        );
        assert_eq!(base_dir(env(&[])), PathBuf::from("/var/lib"));
    }

    #[test]
    fn config_path_honours_the_environment() {
        let dir = Path::new("/data/printdock");
        assert_eq!(
            config_path_from(dir, env(&[])),
            PathBuf::from("/data/printdock/printdock.json")
        );
        assert_eq!(
            config_path_from(dir, env(&[(CONFIG_PATH_ENV, "/etc/printdock.json")])),
            PathBuf::from("/etc/printdock.json")
        );
    }

    #[test]
    fn relative_paths_land_in_the_data_dir() {
        let dir = Path::new("/data/printdock");
        assert_eq!(
            resolve(dir, Path::new("printdock.db")),
            PathBuf::from("/data/printdock/printdock.db")
        );
        assert_eq!(resolve(dir, Path::new("/srv/db")), PathBuf::from("/srv/db"));
    }
}
