// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Companion notification.
//
// After a file is registered the companion API gets a POST with the new
// record.  Its base URL is either configured or found over mDNS; a
// discovered address is cached for `cache_ttl_secs` and forgotten as soon as
// a request to it fails.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use printdock_core::cache::TtlCache;
use printdock_core::config::CompanionConfig;
use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::FileRecord;
use printdock_print::ServiceBrowser;

/// Receives every newly registered file.
#[async_trait]
pub trait PeerNotifier: Send + Sync {
    async fn notify(&self, record: &FileRecord) -> Result<()>;
}

/// HTTP notifier for the companion API.
pub struct CompanionNotifier {
    config: CompanionConfig,
    http: reqwest::Client,
    browser: ServiceBrowser,
    address: TtlCache<(), String>,
}

impl CompanionNotifier {
    pub fn new(config: CompanionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PrintDockError::Http(format!("failed to build HTTP client: {e}")))?;
        let browser = ServiceBrowser::new(
            config.mdns_service.clone(),
            Duration::from_millis(config.browse_timeout_ms),
        );
        let address = TtlCache::new(Duration::from_secs(config.cache_ttl_secs));
        Ok(Self {
            config,
            http,
            browser,
            address,
        })
    }

    /// Base URL of the companion, or `None` when nobody answered.
    async fn base_url(&self) -> Result<Option<String>> {
        if let Some(url) = &self.config.url {
            return Ok(Some(url.trim_end_matches('/').to_owned()));
        }
        if let Some(cached) = self.address.get(&()) {
            return Ok(Some(cached));
        }
        let Some(service) = self.browser.find_first().await? else {
            return Ok(None);
        };
        let url = service.base_url();
        info!(%url, "companion discovered");
        self.address.insert((), url.clone());
        Ok(Some(url))
    }
}

#[async_trait]
impl PeerNotifier for CompanionNotifier {
    #[instrument(skip(self, record), fields(file_id = %record.id))]
    async fn notify(&self, record: &FileRecord) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let Some(base) = self.base_url().await? else {
            debug!("no companion found, skipping notification");
            return Ok(());
        };

        let url = format!("{base}{}", self.config.notify_path);
        let result = self
            .http
            .post(&url)
            .json(record)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                debug!(%url, "companion notified");
                Ok(())
            }
            Err(e) => {
                self.address.remove(&());
                Err(PrintDockError::Http(format!("POST {url}: {e}")))
            }
        }
    }
}
