// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network probe: can the agent actually reach a printer?
//
// The helpers here are independent of each other.  None of them returns an
// error; a failed check is simply a negative answer, and the fleet
// reconciler turns negative answers into warnings rather than aborting.
//
// MAC → IP resolution tries, in order:
//   1. the kernel ARP table (`/proc/net/arp`, or `arp -an` elsewhere)
//   2. the neighbour table (`ip neigh show`)
//   3. a ping sweep of the local /24 followed by a second ARP lookup

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use printdock_core::cache::{Clock, SystemClock, TtlCache};
use printdock_core::config::ProbeConfig;
use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{Protocol, ValidDescriptor, normalize_mac};

use crate::ipp_client::IppClient;

/// Outcome of a reachability assessment for one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub reachable: bool,
    /// The address probed: the descriptor's own, or one resolved from its MAC.
    pub ip: Option<IpAddr>,
    /// IPP resource path that answered, for ipp/ipps printers.
    pub verified_path: Option<String>,
    pub resolved_from_mac: bool,
    /// Human-readable notes collected while probing.
    pub detail: String,
}

/// Result of testing one protocol endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCheck {
    pub valid: bool,
    pub path: Option<String>,
    pub error: Option<String>,
}

/// Result of one ICMP echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub alive: bool,
    pub output: String,
}

/// Coarse online/offline signal plus whatever the printer told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub online: bool,
    pub detail: String,
}

/// Decides whether a printer can be reached before it is configured.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn assess(&self, descriptor: &ValidDescriptor) -> Connectivity;
}

/// Probe backed by the real network and the host's `ping`/`arp`/`ip` tools.
pub struct NetworkProbe {
    config: ProbeConfig,
    http: reqwest::Client,
    /// Verified IPP paths keyed by `ip:port`.
    verified_paths: TtlCache<SocketAddr, String>,
}

impl NetworkProbe {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ProbeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = probe_http_client(&config)?;
        let ttl = Duration::from_secs(config.verified_path_ttl_secs);
        Ok(Self {
            config,
            http,
            verified_paths: TtlCache::with_clock(ttl, clock),
        })
    }

    // -- MAC resolution -----------------------------------------------------

    /// Find the IP currently bound to `mac`.  First match wins.
    #[instrument(skip(self))]
    pub async fn resolve_ip_from_mac(&self, mac: &str) -> Option<IpAddr> {
        let mac = normalize_mac(mac)?;

        if let Some(ip) = arp_lookup(&mac).await {
            debug!(%ip, "MAC found in ARP table");
            return Some(ip);
        }
        if let Some(ip) = neighbor_lookup(&mac).await {
            debug!(%ip, "MAC found in neighbour table");
            return Some(ip);
        }

        let Some(local) = local_ipv4() else {
            warn!("no local IPv4 address, skipping subnet sweep");
            return None;
        };
        info!(subnet = %subnet_label(local), "sweeping subnet to populate ARP table");
        self.sweep_subnet(local).await;

        let found = match arp_lookup(&mac).await {
            Some(ip) => Some(ip),
            None => neighbor_lookup(&mac).await,
        };
        if found.is_none() {
            warn!(%mac, "MAC address not found on the local network");
        }
        found
    }

    async fn sweep_subnet(&self, local: Ipv4Addr) {
        let hosts = subnet_hosts(local);
        let concurrency = self.config.sweep_concurrency.max(1);
        let alive = stream::iter(hosts)
            .map(|ip| async move { ping(IpAddr::V4(ip)).await.alive })
            .buffer_unordered(concurrency)
            .filter(|alive| std::future::ready(*alive))
            .count()
            .await;
        debug!(alive, "subnet sweep finished");
    }

    // -- Individual checks --------------------------------------------------

    /// TCP connect with the configured timeout.
    pub async fn test_port(&self, ip: IpAddr, port: u16) -> bool {
        test_port(ip, port, self.config.tcp_timeout()).await
    }

    /// IPP Get-Printer-Attributes for ipp/ipps, otherwise (or on failure) a
    /// TCP connect.
    #[instrument(skip(self))]
    pub async fn query_status(&self, ip: IpAddr, port: u16, protocol: Protocol) -> StatusReport {
        if protocol.is_ipp() {
            let path = self
                .verified_paths
                .get(&SocketAddr::new(ip, port))
                .unwrap_or_else(|| "/ipp/print".into());
            let uri = format!("{}://{}{}", protocol.as_str(), SocketAddr::new(ip, port), path);
            let state = match IppClient::new(&uri, self.config.http_timeout()) {
                Ok(client) => client.printer_state().await,
                Err(e) => Err(e),
            };
            match state {
                Ok(state) => {
                    return StatusReport {
                        online: true,
                        detail: state.summary(),
                    };
                }
                Err(e) => debug!(error = %e, "IPP status query failed, falling back to TCP"),
            }
        }

        let online = self.test_port(ip, port).await;
        StatusReport {
            online,
            detail: if online {
                format!("port {port} open")
            } else {
                format!("port {port} closed")
            },
        }
    }

    /// Probe the configured IPP paths; the first answer below 500 is cached.
    pub async fn verify_ipp_path(&self, protocol: Protocol, ip: IpAddr, port: u16) -> Option<String> {
        let key = SocketAddr::new(ip, port);
        if let Some(path) = self.verified_paths.get(&key) {
            debug!(%key, %path, "verified IPP path from cache");
            return Some(path);
        }
        let path = probe_ipp_paths(&self.http, &self.config.ipp_paths, protocol, ip, port).await?;
        self.verified_paths.insert(key, path.clone());
        Some(path)
    }
}

#[async_trait]
impl ConnectivityProbe for NetworkProbe {
    #[instrument(skip_all, fields(printer_id = %descriptor.id))]
    async fn assess(&self, descriptor: &ValidDescriptor) -> Connectivity {
        let protocol = descriptor.protocol_or_default();
        let mut notes: Vec<String> = Vec::new();

        let mut ip = descriptor.ip_address;
        let mut port = descriptor.port.or_else(|| protocol.default_port());
        if ip.is_none() {
            if let Some((uri_ip, uri_port)) = descriptor.uri.as_deref().and_then(host_from_uri) {
                ip = Some(uri_ip);
                port = descriptor.port.or(uri_port).or_else(|| protocol.default_port());
            }
        }

        let mut resolved_from_mac = false;
        if ip.is_none() {
            if let Some(mac) = descriptor.mac_address.as_deref() {
                ip = self.resolve_ip_from_mac(mac).await;
                resolved_from_mac = ip.is_some();
                match ip {
                    Some(found) => notes.push(format!("resolved {mac} to {found}")),
                    None => notes.push(format!("could not resolve {mac} to an IP address")),
                }
            }
        }

        let mut verified_path = None;
        let reachable = if let Some(reachable) = descriptor.reachable {
            notes.push("reachability supplied by caller".into());
            if let (Some(ip), Some(port)) = (ip, port) {
                verified_path = self.verified_paths.get(&SocketAddr::new(ip, port));
            }
            reachable
        } else {
            match (ip, port) {
                (Some(ip), Some(port)) if protocol.is_ipp() => {
                    verified_path = self.verify_ipp_path(protocol, ip, port).await;
                    if verified_path.is_none() {
                        notes.push(format!("no IPP endpoint answered on {ip}:{port}"));
                    }
                    verified_path.is_some()
                }
                (Some(ip), Some(port)) => {
                    let open = self.test_port(ip, port).await;
                    if !open {
                        notes.push(format!("{ip}:{port} did not accept a connection"));
                    }
                    open
                }
                (Some(ip), None) => {
                    let pinged = ping(ip).await;
                    if !pinged.alive {
                        notes.push(format!("{ip} did not answer ping"));
                    }
                    pinged.alive
                }
                (None, _) => {
                    notes.push("no address to probe".into());
                    false
                }
            }
        };

        if resolved_from_mac {
            if let Some(ip) = ip {
                let pinged = ping(ip).await;
                notes.push(format!("ping {}", if pinged.alive { "ok" } else { "failed" }));
                if let Some(port) = port {
                    let status = self.query_status(ip, port, protocol).await;
                    notes.push(format!("status: {}", status.detail));
                }
            }
        }

        let connectivity = Connectivity {
            reachable,
            ip,
            verified_path,
            resolved_from_mac,
            detail: notes.join("; "),
        };
        debug!(?connectivity, "connectivity assessed");
        connectivity
    }
}

// ---------------------------------------------------------------------------
// Free-standing helpers
// ---------------------------------------------------------------------------

/// HTTP client for IPP path probing.  Printers ship self-signed certificates.
pub fn probe_http_client(config: &ProbeConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .connect_timeout(config.tcp_timeout())
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| PrintDockError::Probe(format!("http client: {e}")))
}

/// True iff a TCP connection completes before `timeout`.
pub async fn test_port(ip: IpAddr, port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::new(ip, port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "connect failed");
            false
        }
        Err(_) => {
            debug!(%addr, ?timeout, "connect timed out");
            false
        }
    }
}

/// One ICMP echo through the system `ping`.
pub async fn ping(ip: IpAddr) -> PingResult {
    let target = ip.to_string();
    match Command::new("ping")
        .args(["-c", "1", "-W", "1", target.as_str()])
        .output()
        .await
    {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            PingResult {
                alive: output.status.success(),
                output: text,
            }
        }
        Err(e) => PingResult {
            alive: false,
            output: format!("ping could not run: {e}"),
        },
    }
}

/// Try each path over HTTP (ipp) or HTTPS (ipps); first status below 500 wins.
pub async fn probe_ipp_paths(
    http: &reqwest::Client,
    paths: &[String],
    protocol: Protocol,
    ip: IpAddr,
    port: u16,
) -> Option<String> {
    let scheme = if protocol == Protocol::Ipps { "https" } else { "http" };
    let authority = SocketAddr::new(ip, port);
    for path in paths {
        let url = format!("{scheme}://{authority}{path}");
        match http.get(&url).send().await {
            Ok(response) if response.status().as_u16() < 500 => {
                debug!(%url, status = %response.status(), "IPP path answered");
                return Some(path.clone());
            }
            Ok(response) => debug!(%url, status = %response.status(), "IPP path rejected"),
            Err(e) => debug!(%url, error = %e, "IPP path unreachable"),
        }
    }
    None
}

/// Check an endpoint: IPP path probing for ipp/ipps, TCP connect otherwise.
pub async fn check_endpoint(
    http: &reqwest::Client,
    config: &ProbeConfig,
    protocol: Protocol,
    ip: IpAddr,
    port: u16,
) -> EndpointCheck {
    if protocol.is_ipp() {
        return match probe_ipp_paths(http, &config.ipp_paths, protocol, ip, port).await {
            Some(path) => EndpointCheck {
                valid: true,
                path: Some(path),
                error: None,
            },
            None => EndpointCheck {
                valid: false,
                path: None,
                error: Some(format!("no IPP endpoint answered on {ip}:{port}")),
            },
        };
    }

    if test_port(ip, port, config.tcp_timeout()).await {
        EndpointCheck {
            valid: true,
            path: None,
            error: None,
        }
    } else {
        EndpointCheck {
            valid: false,
            path: None,
            error: Some(format!("{ip}:{port} did not accept a connection")),
        }
    }
}

/// IP and port of a device URI whose host is a literal address.
fn host_from_uri(uri: &str) -> Option<(IpAddr, Option<u16>)> {
    let rest = uri.split_once("://")?.1;
    let authority = rest.split('/').next()?;
    let authority = authority.rsplit('@').next()?;

    if let Ok(addr) = authority.parse::<SocketAddr>() {
        return Some((addr.ip(), Some(addr.port())));
    }
    let host = authority.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().ok().map(|ip| (ip, None))
}

/// Local IPv4 address of the default route.  Connecting a UDP socket sends no
/// packets.
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Every host address in `local`'s /24 except `local` itself.
fn subnet_hosts(local: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own] = local.octets();
    (1..=254u8)
        .filter(|host| *host != own)
        .map(|host| Ipv4Addr::new(a, b, c, host))
        .collect()
}

fn subnet_label(local: Ipv4Addr) -> String {
    let [a, b, c, _] = local.octets();
    format!("{a}.{b}.{c}.0/24")
}

async fn arp_lookup(mac: &str) -> Option<IpAddr> {
    if let Ok(table) = tokio::fs::read_to_string("/proc/net/arp").await {
        if let Some(ip) = find_mac(&parse_arp_table(&table), mac) {
            return Some(ip);
        }
    }
    let output = run_tool("arp", &["-an"]).await?;
    find_mac(&parse_arp_an(&output), mac)
}

async fn neighbor_lookup(mac: &str) -> Option<IpAddr> {
    let output = run_tool("ip", &["neigh", "show"]).await?;
    find_mac(&parse_neighbor_table(&output), mac)
}

async fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output().await {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            debug!(program, status = %output.status, "lookup tool failed");
            None
        }
        Err(e) => {
            debug!(program, error = %e, "lookup tool unavailable");
            None
        }
    }
}

fn find_mac(entries: &[(IpAddr, String)], mac: &str) -> Option<IpAddr> {
    entries
        .iter()
        .find(|(_, entry_mac)| entry_mac == mac)
        .map(|(ip, _)| *ip)
}

/// Parse `/proc/net/arp`.  Incomplete entries (flags 0x0) are skipped.
pub fn parse_arp_table(table: &str) -> Vec<(IpAddr, String)> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[2] == "0x0" {
                return None;
            }
            let ip = fields[0].parse::<IpAddr>().ok()?;
            let mac = normalize_mac(fields[3])?;
            (mac != "00:00:00:00:00:00").then_some((ip, mac))
        })
        .collect()
}

/// Parse BSD-style `arp -an` lines:
/// `? (192.168.1.20) at 0:1b:a9:c:d:e [ether] on en0`.
pub fn parse_arp_an(output: &str) -> Vec<(IpAddr, String)> {
    output
        .lines()
        .filter_map(|line| {
            let open = line.find('(')?;
            let close = line[open..].find(')')? + open;
            let ip = line[open + 1..close].parse::<IpAddr>().ok()?;
            let after = line[close..].split_once(" at ")?.1;
            let mac = normalize_mac(after.split_whitespace().next()?)?;
            Some((ip, mac))
        })
        .collect()
}

/// Parse `ip neigh show`:
/// `192.168.1.20 dev eth0 lladdr 00:1b:a9:0c:0d:0e REACHABLE`.
pub fn parse_neighbor_table(output: &str) -> Vec<(IpAddr, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = fields.next()?.parse::<IpAddr>().ok()?;
            let mut fields = fields.skip_while(|f| *f != "lladdr");
            fields.next()?;
            let mac = normalize_mac(fields.next()?)?;
            Some((ip, mac))
        })
        .collect()
}
