// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// Loaded from a JSON file (every field optional, defaults below), then
// patched from a handful of `PRINTDOCK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PrintDockError, Result};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "PRINTDOCK_CONFIG";

/// Persistent agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub watch: WatchConfig,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    pub probe: ProbeConfig,
    pub cups: CupsConfig,
    pub companion: CompanionConfig,
    pub fleet: FleetConfig,
    /// Delay before a printed file is removed from disk.
    pub print_cleanup_delay_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            database_path: PathBuf::from("printdock.db"),
            listen_addr: "0.0.0.0:8095".into(),
            probe: ProbeConfig::default(),
            cups: CupsConfig::default(),
            companion: CompanionConfig::default(),
            fleet: FleetConfig::default(),
            print_cleanup_delay_secs: 30,
        }
    }
}

/// Shared-folder ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root of the watched tree.
    pub root: PathBuf,
    /// Reject files dropped directly into `root` (one subfolder per tenant).
    pub require_subdirectory: bool,
    /// Quiet period before a changed path is classified.
    pub debounce_ms: u64,
    pub full_sweep_interval_secs: u64,
    pub retention_sweep_interval_secs: u64,
    /// Files older than this many days are removed by the retention sweep.
    pub retention_days: u64,
    /// Lifetime of an in-flight claim on a path.
    pub in_flight_ttl_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/srv/printdock/shared"),
            require_subdirectory: true,
            debounce_ms: 1500,
            full_sweep_interval_secs: 30,
            retention_sweep_interval_secs: 3600,
            retention_days: 7,
            in_flight_ttl_secs: 120,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn full_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.full_sweep_interval_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }

    pub fn retention_age(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub tcp_timeout_ms: u64,
    pub http_timeout_ms: u64,
    /// IPP endpoint paths tried in order.
    pub ipp_paths: Vec<String>,
    pub verified_path_ttl_secs: u64,
    /// Parallel pings during a subnet sweep.
    pub sweep_concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tcp_timeout_ms: 1500,
            http_timeout_ms: 2000,
            ipp_paths: vec![
                "/ipp/print".into(),
                "/ipp/printer".into(),
                "/ipp".into(),
                "/printers/ipp".into(),
                "/".into(),
            ],
            verified_path_ttl_secs: 600,
            sweep_concurrency: 32,
        }
    }
}

impl ProbeConfig {
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Locations of the CUPS command-line tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CupsConfig {
    pub lpadmin: String,
    pub lp: String,
    pub lpinfo: String,
}

impl Default for CupsConfig {
    fn default() -> Self {
        Self {
            lpadmin: "lpadmin".into(),
            lp: "lp".into(),
            lpinfo: "lpinfo".into(),
        }
    }
}

/// Companion API notified whenever a file is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub enabled: bool,
    /// Fixed base URL; skips mDNS discovery when set.
    pub url: Option<String>,
    /// mDNS service type advertised by the companion.
    pub mdns_service: String,
    pub notify_path: String,
    pub cache_ttl_secs: u64,
    pub timeout_ms: u64,
    pub browse_timeout_ms: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            mdns_service: "_printdock-api._tcp.local.".into(),
            notify_path: "/api/files/notify".into(),
            cache_ttl_secs: 300,
            timeout_ms: 2000,
            browse_timeout_ms: 3000,
        }
    }
}

/// Fleet reconciliation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Treat every sync batch as the complete fleet: printers missing from
    /// the batch are removed.
    pub full_sync: bool,
}

impl AgentConfig {
    /// Load the config file at `path` if it exists, otherwise defaults, then
    /// apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|e| {
                PrintDockError::Config(format!("read {}: {e}", path.display()))
            })?;
            let parsed: Self = serde_json::from_str(&data).map_err(|e| {
                PrintDockError::Config(format!("parse {}: {e}", path.display()))
            })?;
            info!(path = %path.display(), "configuration loaded");
            parsed
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PRINTDOCK_*` overrides from `lookup` (normally the process
    /// environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("PRINTDOCK_WATCH_ROOT") {
            self.watch.root = PathBuf::from(root);
        }
        if let Some(db) = lookup("PRINTDOCK_DATABASE") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup("PRINTDOCK_LISTEN") {
            self.listen_addr = addr;
        }
        if let Some(url) = lookup("PRINTDOCK_COMPANION_URL") {
            self.companion.url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(flag) = lookup("PRINTDOCK_FULL_SYNC") {
            self.fleet.full_sync = matches!(flag.trim(), "1" | "true" | "yes");
        }
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.watch.root.as_os_str().is_empty() {
            return Err(PrintDockError::Config("watch.root must not be empty".into()));
        }
        let intervals = [
            ("watch.full_sweep_interval_secs", self.watch.full_sweep_interval_secs),
            (
                "watch.retention_sweep_interval_secs",
                self.watch.retention_sweep_interval_secs,
            ),
            ("watch.retention_days", self.watch.retention_days),
            ("watch.in_flight_ttl_secs", self.watch.in_flight_ttl_secs),
            ("probe.tcp_timeout_ms", self.probe.tcp_timeout_ms),
            ("probe.http_timeout_ms", self.probe.http_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(PrintDockError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.probe.ipp_paths.is_empty() {
            return Err(PrintDockError::Config("probe.ipp_paths must not be empty".into()));
        }
        Ok(())
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        AgentConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig::load(&dir.path().join("absent.json")).expect("load");
        assert_eq!(config.watch.retention_days, 7);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("printdock.json");
        std::fs::write(&path, r#"{"watch":{"retention_days":2},"fleet":{"full_sync":true}}"#)
            .expect("write");

        let config = AgentConfig::load(&path).expect("load");
        assert_eq!(config.watch.retention_days, 2);
        assert_eq!(config.watch.debounce_ms, 1500);
        assert!(config.fleet.full_sync);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = AgentConfig::default();
        config.watch.full_sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_in_flight_ttl_is_rejected() {
        let mut config = AgentConfig::default();
        config.watch.in_flight_ttl_secs = 0;
        let err = config.validate().expect_err("zero ttl");
        assert!(err.to_string().contains("watch.in_flight_ttl_secs"));
    }

    #[test]
    fn overrides_patch_fields() {
        let env: HashMap<&str, &str> = [
            ("PRINTDOCK_WATCH_ROOT", "/tmp/share"),
            ("PRINTDOCK_COMPANION_URL", "http://10.0.0.2:8080"),
            ("PRINTDOCK_FULL_SYNC", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = AgentConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.watch.root, PathBuf::from("/tmp/share"));
        assert_eq!(config.companion.url.as_deref(), Some("http://10.0.0.2:8080"));
        assert!(config.fleet.full_sync);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("printdock.json");
        let mut config = AgentConfig::default();
        config.listen_addr = "127.0.0.1:9000".into();
        config.save(&path).expect("save");

        let loaded = AgentConfig::load(&path).expect("load");
        assert_eq!(loaded.listen_addr, "127.0.0.1:9000");
    }
}
