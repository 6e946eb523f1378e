// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS service lookup.
//
// The companion API advertises itself over mDNS-SD (by default as
// `_printdock-api._tcp.local.`).  A browse runs on a blocking thread until
// the first service resolves or the timeout expires; the daemon is shut down
// afterwards.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use printdock_core::error::{PrintDockError, Result};

/// A resolved service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub fullname: String,
    pub addr: SocketAddr,
    /// TXT `path` record, if the service advertises a base path.
    pub base_path: Option<String>,
}

impl DiscoveredService {
    /// `http://<addr><base_path>` without a trailing slash.
    pub fn base_url(&self) -> String {
        let path = self.base_path.as_deref().unwrap_or("").trim_end_matches('/');
        format!("http://{}{}", self.addr, path)
    }
}

/// One-shot browser for a single service type.
#[derive(Debug, Clone)]
pub struct ServiceBrowser {
    service_type: String,
    timeout: Duration,
}

impl ServiceBrowser {
    pub fn new(service_type: impl Into<String>, timeout: Duration) -> Self {
        Self {
            service_type: service_type.into(),
            timeout,
        }
    }

    /// Browse until the first instance resolves.  `Ok(None)` when nothing
    /// answered in time.
    pub async fn find_first(&self) -> Result<Option<DiscoveredService>> {
        let service_type = self.service_type.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || browse_blocking(&service_type, timeout))
            .await
            .map_err(|e| PrintDockError::Discovery(format!("browse task failed: {e}")))?
    }
}

fn browse_blocking(service_type: &str, timeout: Duration) -> Result<Option<DiscoveredService>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| PrintDockError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
    let receiver = daemon
        .browse(service_type)
        .map_err(|e| PrintDockError::Discovery(format!("browse {service_type}: {e}")))?;

    let deadline = Instant::now() + timeout;
    let mut found = None;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(service)) => match service_from_info(&service) {
                Some(resolved) => {
                    info!(name = %resolved.fullname, addr = %resolved.addr, "service resolved");
                    found = Some(resolved);
                    break;
                }
                None => debug!(name = %service.get_fullname(), "resolved service has no address"),
            },
            Ok(_) => {}
            Err(_) => break,
        }
    }

    if let Err(e) = daemon.shutdown() {
        warn!(error = %e, "mDNS daemon did not shut down cleanly");
    }
    if found.is_none() {
        debug!(service_type, ?timeout, "no service answered");
    }
    Ok(found)
}

/// First address of the resolved service, IPv4 preferred.
fn service_from_info(service: &ServiceInfo) -> Option<DiscoveredService> {
    let ip: IpAddr = service
        .get_addresses()
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| service.get_addresses().iter().next())
        .copied()?;

    Some(DiscoveredService {
        fullname: service.get_fullname().to_owned(),
        addr: SocketAddr::new(ip, service.get_port()),
        base_path: service
            .get_property_val_str("path")
            .filter(|p| !p.is_empty())
            .map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn base_url_joins_address_and_path() {
        let service = DiscoveredService {
            fullname: "agent._printdock-api._tcp.local.".into(),
            addr: "192.168.1.5:8080".parse().expect("addr"),
            base_path: Some("/v1/".into()),
        };
        assert_eq!(service.base_url(), "http://192.168.1.5:8080/v1");

        let bare = DiscoveredService {
            base_path: None,
            ..service
        };
        assert_eq!(bare.base_url(), "http://192.168.1.5:8080");
    }

    #[test]
    fn service_info_conversion_reads_txt_path() {
        let properties: HashMap<String, String> =
            [("path".to_string(), "/api".to_string())].into_iter().collect();
        let info = ServiceInfo::new(
            "_printdock-api._tcp.local.",
            "companion",
            "companion.local.",
            "192.168.1.9",
            8080,
            properties,
        )
        .expect("service info");

        let service = service_from_info(&info).expect("address");
        assert_eq!(service.addr, "192.168.1.9:8080".parse().expect("addr"));
        assert_eq!(service.base_url(), "http://192.168.1.9:8080/api");
    }
}
