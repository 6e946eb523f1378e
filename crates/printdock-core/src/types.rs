// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Printdock print agent.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrintDockError, Result};

/// Identifier of a tracked file.
///
/// UUIDv7, so identifiers sort by creation time.  The canonical on-disk name
/// of a materialized file is `<id>.pdf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse a file stem back into an identifier.  Returns `None` for any name
    /// the pipeline did not issue.
    pub fn parse(stem: &str) -> Option<Self> {
        Uuid::parse_str(stem.trim()).ok().map(Self)
    }

    /// Canonical file name for this identifier (`<id>.pdf`).
    pub fn canonical_file_name(&self) -> String {
        format!("{}.pdf", self.0)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a printer, assigned by the upstream authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(pub String);

impl PrinterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrinterId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for PrinterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Soft-delete lifecycle of a stored record.
///
/// Deleted records stay in the database for auditing but never surface in
/// the store's normal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Lifecycle {
    /// Build from the nullable `deleted_at` column.
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Deleted { at },
            None => Self::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(*at),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A dropped file that the ingestion pipeline has registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    /// Printer the file was sent to; `None` until printed.
    pub asset_id: Option<PrinterId>,
    /// Sanitized human display name.
    pub file_name: String,
    pub pages: u32,
    /// Canonical on-disk location (`<dir>/<id>.pdf`).
    pub path: PathBuf,
    pub printed: bool,
    pub synced: bool,
    pub created_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl FileRecord {
    pub fn new(id: FileId, file_name: String, pages: u32, path: PathBuf) -> Self {
        Self {
            id,
            asset_id: None,
            file_name,
            pages,
            path,
            printed: false,
            synced: false,
            created_at: Utc::now(),
            lifecycle: Lifecycle::Active,
        }
    }
}

/// Operational status reported by the upstream authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    #[default]
    Functional,
    Maintenance,
    OutOfService,
    Unknown,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functional => "functional",
            Self::Maintenance => "maintenance",
            Self::OutOfService => "out_of_service",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for PrinterStatus {
    type Err = PrintDockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "functional" => Ok(Self::Functional),
            "maintenance" => Ok(Self::Maintenance),
            "out_of_service" | "broken" => Ok(Self::OutOfService),
            "unknown" => Ok(Self::Unknown),
            other => Err(PrintDockError::Validation(format!(
                "unknown printer status '{other}'"
            ))),
        }
    }
}

/// Device protocol used to reach a printer (the scheme of its CUPS URI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Socket,
    Ipp,
    Ipps,
    Lpd,
    Http,
    Https,
    Smb,
    Dnssd,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Ipp => "ipp",
            Self::Ipps => "ipps",
            Self::Lpd => "lpd",
            Self::Http => "http",
            Self::Https => "https",
            Self::Smb => "smb",
            Self::Dnssd => "dnssd",
        }
    }

    /// Port used when the descriptor does not name one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Socket => Some(9100),
            Self::Ipp | Self::Ipps => Some(631),
            Self::Lpd => Some(515),
            Self::Http => Some(80),
            Self::Https => Some(443),
            Self::Smb => Some(445),
            Self::Dnssd => None,
        }
    }

    /// Whether reachability is verified by probing IPP endpoint paths.
    pub fn is_ipp(&self) -> bool {
        matches!(self, Self::Ipp | Self::Ipps)
    }
}

impl FromStr for Protocol {
    type Err = PrintDockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" | "raw" | "jetdirect" => Ok(Self::Socket),
            "ipp" => Ok(Self::Ipp),
            "ipps" => Ok(Self::Ipps),
            "lpd" | "lpr" => Ok(Self::Lpd),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "smb" => Ok(Self::Smb),
            "dnssd" => Ok(Self::Dnssd),
            other => Err(PrintDockError::Validation(format!(
                "unsupported protocol '{other}'"
            ))),
        }
    }
}

/// Driver used when neither the descriptor nor the existing record names one.
pub const DEFAULT_DRIVER: &str = "generic";

/// A printer known to the agent and configured as a CUPS queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterRecord {
    pub id: PrinterId,
    /// CUPS queue name.
    pub name: String,
    pub status: PrinterStatus,
    pub protocol: Protocol,
    pub driver: String,
    /// Device URI handed to CUPS.
    pub uri: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub mac_address: Option<String>,
    pub port: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl PrinterRecord {
    /// Explicit port, or the protocol's default.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.protocol.default_port())
    }

    /// The configuration handed to the printer control adapter.
    pub fn spec(&self) -> PrinterSpec {
        PrinterSpec {
            name: self.name.clone(),
            uri: self.uri.clone().unwrap_or_default(),
            driver: self.driver.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
        }
    }
}

/// What the printer control adapter needs to create or reconfigure a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterSpec {
    pub name: String,
    pub uri: String,
    pub driver: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A printer definition as received from the upstream authority.
///
/// Every field is optional on the wire so that one malformed entry becomes a
/// per-item validation error instead of rejecting the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "ipAddress")]
    pub ip_address: Option<String>,
    #[serde(default, alias = "macAddress")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Connectivity as already verified by the caller, if it did so.
    #[serde(default)]
    pub reachable: Option<bool>,
}

/// A descriptor whose required fields are present and whose enumerations and
/// addresses parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidDescriptor {
    pub id: PrinterId,
    pub name: String,
    pub status: Option<PrinterStatus>,
    pub protocol: Option<Protocol>,
    pub driver: Option<String>,
    pub uri: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub mac_address: Option<String>,
    pub port: Option<u16>,
    pub reachable: Option<bool>,
}

impl ValidDescriptor {
    /// Protocol named by the descriptor, or the socket default.
    pub fn protocol_or_default(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }
}

impl PrinterDescriptor {
    /// Best-effort identifier for error reporting, even when invalid.
    pub fn display_id(&self) -> String {
        non_blank(&self.id).unwrap_or_else(|| "<missing id>".into())
    }

    /// Check required fields and parse typed values.
    ///
    /// `id` and `name` are mandatory, plus at least one way of reaching the
    /// device: an IP address, a URI, or a MAC address to resolve.
    pub fn validate(&self) -> Result<ValidDescriptor> {
        let id = non_blank(&self.id)
            .ok_or_else(|| PrintDockError::Validation("missing required field 'id'".into()))?;
        let name = non_blank(&self.name)
            .ok_or_else(|| PrintDockError::Validation("missing required field 'name'".into()))?;

        let ip_address = match non_blank(&self.ip_address) {
            Some(raw) => Some(raw.parse::<IpAddr>().map_err(|_| {
                PrintDockError::Validation(format!("invalid ip_address '{raw}'"))
            })?),
            None => None,
        };

        let mac_address = match non_blank(&self.mac_address) {
            Some(raw) => Some(normalize_mac(&raw).ok_or_else(|| {
                PrintDockError::Validation(format!("invalid mac_address '{raw}'"))
            })?),
            None => None,
        };

        let uri = non_blank(&self.uri);
        if ip_address.is_none() && uri.is_none() && mac_address.is_none() {
            return Err(PrintDockError::Validation(
                "one of 'ip_address', 'uri' or 'mac_address' is required".into(),
            ));
        }

        let protocol = non_blank(&self.protocol)
            .map(|p| p.parse::<Protocol>())
            .transpose()?;
        let status = non_blank(&self.status)
            .map(|s| s.parse::<PrinterStatus>())
            .transpose()?;

        if self.port == Some(0) {
            return Err(PrintDockError::Validation("port must be non-zero".into()));
        }

        Ok(ValidDescriptor {
            id: PrinterId(id),
            name,
            status,
            protocol,
            driver: non_blank(&self.driver),
            uri,
            description: non_blank(&self.description),
            location: non_blank(&self.location),
            ip_address,
            mac_address,
            port: self.port,
            reachable: self.reachable,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Normalise a MAC address to lowercase, colon-separated, zero-padded form.
///
/// Accepts `:` or `-` separators (with single-digit octets as printed by
/// some `arp` implementations) and bare 12-digit hex strings.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.contains([':', '-']) && raw.split([':', '-']).any(|p| p.is_empty() || p.len() > 2) {
        return None;
    }
    let octets: Vec<String> = if raw.contains([':', '-']) {
        raw.split([':', '-'])
            .map(|part| format!("{:0>2}", part.to_ascii_lowercase()))
            .collect()
    } else if raw.len() == 12 {
        raw.as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).to_ascii_lowercase())
            .collect()
    } else {
        return None;
    };

    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    valid.then(|| octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> PrinterDescriptor {
        PrinterDescriptor {
            id: Some("p1".into()),
            name: Some("HP-Floor2".into()),
            ip_address: Some("10.0.0.5".into()),
            protocol: Some("socket".into()),
            ..Default::default()
        }
    }

    #[test]
    fn file_id_round_trips_through_canonical_name() {
        let id = FileId::new();
        let name = id.canonical_file_name();
        let stem = name.trim_end_matches(".pdf");
        assert_eq!(FileId::parse(stem), Some(id));
    }

    #[test]
    fn file_ids_are_time_ordered() {
        let first = FileId::new();
        let second = FileId::new();
        assert!(first <= second);
    }

    #[test]
    fn arbitrary_names_are_not_file_ids() {
        assert!(FileId::parse("report").is_none());
        assert!(FileId::parse("").is_none());
    }

    #[test]
    fn lifecycle_maps_nullable_timestamp() {
        assert!(Lifecycle::from_deleted_at(None).is_active());
        let now = Utc::now();
        let deleted = Lifecycle::from_deleted_at(Some(now));
        assert!(!deleted.is_active());
        assert_eq!(deleted.deleted_at(), Some(now));
    }

    #[test]
    fn valid_descriptor_parses() {
        let valid = descriptor().validate().expect("valid");
        assert_eq!(valid.id, PrinterId::from("p1"));
        assert_eq!(valid.protocol, Some(Protocol::Socket));
        assert_eq!(valid.ip_address, Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut d = descriptor();
        d.id = Some("   ".into());
        assert!(matches!(d.validate(), Err(PrintDockError::Validation(_))));
    }

    #[test]
    fn descriptor_without_any_address_is_rejected() {
        let mut d = descriptor();
        d.ip_address = None;
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("ip_address"));
    }

    #[test]
    fn mac_only_descriptor_is_accepted() {
        let mut d = descriptor();
        d.ip_address = None;
        d.mac_address = Some("AA-BB-CC-01-02-03".into());
        let valid = d.validate().expect("valid");
        assert_eq!(valid.mac_address.as_deref(), Some("aa:bb:cc:01:02:03"));
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let mut d = descriptor();
        d.protocol = Some("carrier-pigeon".into());
        assert!(d.validate().is_err());
    }

    #[test]
    fn descriptor_accepts_camel_case_fields() {
        let d: PrinterDescriptor = serde_json::from_str(
            r#"{"id":"p9","name":"Lab","ipAddress":"10.1.1.9","macAddress":"aabbccddeeff"}"#,
        )
        .expect("parse");
        assert_eq!(d.ip_address.as_deref(), Some("10.1.1.9"));
        assert_eq!(d.mac_address.as_deref(), Some("aabbccddeeff"));
    }

    #[test]
    fn normalize_mac_variants() {
        assert_eq!(normalize_mac("0:1b:a9:c:d:e").as_deref(), Some("00:1b:a9:0c:0d:0e"));
        assert_eq!(normalize_mac("001BA90C0D0E").as_deref(), Some("00:1b:a9:0c:0d:0e"));
        assert_eq!(normalize_mac("zz:zz:zz:zz:zz:zz"), None);
        assert_eq!(normalize_mac("00:11:22"), None);
    }

    #[test]
    fn protocol_defaults() {
        assert_eq!(Protocol::default(), Protocol::Socket);
        assert_eq!(Protocol::Socket.default_port(), Some(9100));
        assert_eq!(Protocol::Ipps.default_port(), Some(631));
        assert!(Protocol::Ipp.is_ipp());
        assert_eq!("LPR".parse::<Protocol>().unwrap(), Protocol::Lpd);
    }
}
