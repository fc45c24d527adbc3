//! Plain HTTP fetching of company websites, with a private-address guard and
//! bounded retries.

use std::net::IpAddr;
use std::time::Duration;

use orgenrich_shared::{EnrichError, Result, ScraperConfig};
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

/// Maximum number of redirects followed for a company website.
const MAX_REDIRECTS: usize = 5;

/// Largest page body accepted (5 MB).
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

/// Fetches raw HTML with a desktop browser User-Agent.
pub struct StaticFetcher {
    client: Client,
    max_retries: u32,
    retry_backoff: Duration,
    allow_private_hosts: bool,
    max_body_bytes: usize,
}

impl StaticFetcher {
    /// Build a fetcher from the `[scraper]` config section.
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            allow_private_hosts: config.allow_private_hosts,
            max_body_bytes: MAX_BODY_SIZE,
        })
    }

    /// GET `url` and return the body. Transport errors and 5xx answers are
    /// retried up to `max_retries` times; any other non-2xx fails at once.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        check_target(url, self.allow_private_hosts)?;

        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries = self.max_retries, "fetch failed, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<String> {
        debug!(%url, "fetching page");

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: String::new(),
            });
        }

        // Counted while streaming; Content-Length is absent on chunked bodies.
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: body read failed: {e}")))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(EnrichError::validation(format!(
                    "{url}: response too large (max {} bytes)",
                    self.max_body_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Target guard
// ---------------------------------------------------------------------------

/// Refuse non-HTTP schemes always, and private/loopback targets unless allowed.
pub(crate) fn check_target(url: &Url, allow_private_hosts: bool) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(EnrichError::validation(format!(
                "{url}: unsupported scheme '{other}'"
            )));
        }
    }

    if !allow_private_hosts && is_private_target(url) {
        return Err(EnrichError::validation(format!(
            "{url}: refusing to fetch a private or local address"
        )));
    }

    Ok(())
}

/// Check if a URL points at loopback, private, or local-only hosts.
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
