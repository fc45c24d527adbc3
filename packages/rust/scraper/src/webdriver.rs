//! Minimal W3C WebDriver client for rendering JavaScript-heavy sites in a
//! headless Chrome controlled by chromedriver.
//!
//! Only the handful of endpoints the finder needs are implemented:
//! `POST /session`, `POST /session/{id}/timeouts`, `POST /session/{id}/url`,
//! `GET /session/{id}/source`, `DELETE /session/{id}` and `GET /status`.

use std::time::{Duration, Instant};

use orgenrich_shared::{BrowserConfig, EnrichError, Result};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Timeout for WebDriver commands that do not load pages.
const COMMAND_TIMEOUT_SECS: u64 = 60;

/// Poll period while waiting for the driver to report ready.
const READY_POLL: Duration = Duration::from_millis(100);

/// W3C error codes meaning the session cannot serve further commands.
const SESSION_LOST_ERRORS: &[&str] = &["invalid session id", "no such window"];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Every WebDriver response wraps its payload in `{"value": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    value: T,
}

/// Error payload (`{"value": {"error": "...", "message": "..."}}`).
#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct DriverStatus {
    ready: bool,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// WebDriver
// ---------------------------------------------------------------------------

/// Handle to a WebDriver endpoint; creates [`BrowserSession`]s.
#[derive(Debug, Clone)]
pub struct WebDriver {
    client: Client,
    base_url: Url,
    chrome_args: Vec<String>,
    page_load_timeout: Duration,
    render_wait: Duration,
}

impl WebDriver {
    /// Build a client for `config.webdriver_url`.
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let base_url = Url::parse(&config.webdriver_url).map_err(|e| {
            EnrichError::config(format!(
                "invalid WebDriver URL '{}': {e}",
                config.webdriver_url
            ))
        })?;

        let page_load_timeout = Duration::from_secs(config.page_load_timeout_secs);

        // Navigation blocks until page load, so the HTTP timeout must outlast it.
        let client = Client::builder()
            .timeout(page_load_timeout + Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            chrome_args: config.chrome_args.clone(),
            page_load_timeout,
            render_wait: Duration::from_millis(config.render_wait_ms),
        })
    }

    /// Poll `GET /status` until the driver reports ready or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match call::<DriverStatus>(&self.client, &self.base_url, Method::GET, "status", None)
                .await
            {
                Ok(status) if status.ready => {
                    debug!(message = %status.message, "WebDriver ready");
                    return Ok(());
                }
                Ok(status) => debug!(message = %status.message, "WebDriver not ready yet"),
                Err(e) => debug!(error = %e, "WebDriver not reachable yet"),
            }

            if Instant::now() >= deadline {
                return Err(EnrichError::Browser(format!(
                    "WebDriver at {} not ready after {}s",
                    self.base_url,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// Start a headless Chrome session.
    #[instrument(skip(self), fields(webdriver = %self.base_url))]
    pub async fn new_session(&self) -> Result<BrowserSession> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.chrome_args }
                }
            }
        });

        let created: NewSession = call(
            &self.client,
            &self.base_url,
            Method::POST,
            "session",
            Some(capabilities),
        )
        .await?;

        let session = BrowserSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            id: created.session_id,
            render_wait: self.render_wait,
            closed: false,
        };

        let page_load_ms = u64::try_from(self.page_load_timeout.as_millis()).unwrap_or(u64::MAX);
        session
            .command::<Value>(Method::POST, "timeouts", Some(json!({ "pageLoad": page_load_ms })))
            .await?;

        info!(session_id = %session.id, "browser session started");
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// BrowserSession
// ---------------------------------------------------------------------------

/// One live browser session, reused across page renders until [`close`](Self::close).
///
/// Dropping an unclosed session schedules a best-effort `DELETE` on the
/// current tokio runtime.
#[derive(Debug)]
pub struct BrowserSession {
    client: Client,
    base_url: Url,
    id: String,
    render_wait: Duration,
    closed: bool,
}

impl BrowserSession {
    /// WebDriver session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Navigate to `url`, wait for client-side rendering, return the page source.
    #[instrument(skip_all, fields(session_id = %self.id, url = %url))]
    pub async fn render(&self, url: &Url) -> Result<String> {
        self.command::<Value>(Method::POST, "url", Some(json!({ "url": url.as_str() })))
            .await?;

        if !self.render_wait.is_zero() {
            tokio::time::sleep(self.render_wait).await;
        }

        let source: String = self.command(Method::GET, "source", None).await?;
        debug!(bytes = source.len(), "rendered page source");
        Ok(source)
    }

    /// End the session and shut its browser down.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let path = format!("session/{}", self.id);
        call::<Value>(&self.client, &self.base_url, Method::DELETE, &path, None).await?;
        info!(session_id = %self.id, "browser session closed");
        Ok(())
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        command: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let path = format!("session/{}/{command}", self.id);
        call(&self.client, &self.base_url, method, &path, body).await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        warn!(session_id = %self.id, "browser session dropped without close, deleting");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let base_url = self.base_url.clone();
            let path = format!("session/{}", self.id);
            handle.spawn(async move {
                if let Err(e) = call::<Value>(&client, &base_url, Method::DELETE, &path, None).await
                {
                    warn!(error = %e, "failed to delete abandoned browser session");
                }
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Issue one WebDriver command and unwrap the `value` envelope.
async fn call<T: DeserializeOwned>(
    client: &Client,
    base_url: &Url,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<T> {
    let url = join(base_url, path)?;

    let mut request = client.request(method.clone(), url.clone());
    if let Some(body) = body {
        request = request.json(&body);
    } else if method == Method::POST {
        request = request.json(&json!({}));
    }

    let response = request
        .send()
        .await
        .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| EnrichError::Network(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        let wire = serde_json::from_str::<Envelope<WireError>>(&text).ok();
        let detail = match &wire {
            Some(env) => format!("{}: {}", env.value.error, env.value.message),
            None => text,
        };
        let message = format!("{method} {path} failed with HTTP {status}: {detail}");

        let lost = wire
            .as_ref()
            .is_some_and(|env| SESSION_LOST_ERRORS.contains(&env.value.error.as_str()));
        return Err(if lost {
            EnrichError::SessionLost(message)
        } else {
            EnrichError::Browser(message)
        });
    }

    serde_json::from_str::<Envelope<T>>(&text)
        .map(|env| env.value)
        .map_err(|e| EnrichError::Browser(format!("{method} {path}: unexpected response: {e}")))
}

/// Append `path` to the driver base URL, keeping any base path prefix.
fn join(base_url: &Url, path: &str) -> Result<Url> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| EnrichError::Browser(format!("invalid WebDriver path '{path}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn driver_for(server: &MockServer) -> WebDriver {
        let config = BrowserConfig {
            webdriver_url: server.uri(),
            render_wait_ms: 0,
            page_load_timeout_secs: 5,
            ..BrowserConfig::default()
        };
        WebDriver::new(&config).unwrap()
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc123", "capabilities": {} }
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/timeouts"))
            .and(body_json(json!({ "pageLoad": 5000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;
    }

    #[test]
    fn join_keeps_base_path() {
        let base = Url::parse("http://grid.test/wd/hub").unwrap();
        assert_eq!(
            join(&base, "session/1/url").unwrap().as_str(),
            "http://grid.test/wd/hub/session/1/url"
        );

        let root = Url::parse("http://localhost:9515").unwrap();
        assert_eq!(join(&root, "status").unwrap().as_str(), "http://localhost:9515/status");
    }

    #[tokio::test]
    async fn render_navigates_then_reads_source() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/url"))
            .and(body_json(json!({ "url": "http://example.com/" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/abc123/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "<html><a href=\"https://linkedin.com/company/x\">in</a></html>"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/session/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let driver = driver_for(&server);
        let session = driver.new_session().await.unwrap();
        assert_eq!(session.id(), "abc123");

        let html = session
            .render(&Url::parse("http://example.com").unwrap())
            .await
            .unwrap();
        assert!(html.contains("linkedin.com/company/x"));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn driver_errors_are_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {
                    "error": "session not created",
                    "message": "Chrome failed to start"
                }
            })))
            .mount(&server)
            .await;

        let err = driver_for(&server).new_session().await.unwrap_err();
        assert!(matches!(err, EnrichError::Browser(_)));
        assert!(err.to_string().contains("Chrome failed to start"));
    }

    #[tokio::test]
    async fn invalid_session_is_reported_as_lost() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc123/url"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "invalid session id", "message": "session deleted" }
            })))
            .mount(&server)
            .await;

        let session = driver_for(&server).new_session().await.unwrap();
        let err = session
            .render(&Url::parse("http://example.com").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::SessionLost(_)));
        assert!(err.invalidates_session());
    }

    #[tokio::test]
    async fn wait_ready_polls_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "ready": false, "message": "starting" }
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "ready": true, "message": "ChromeDriver ready" }
            })))
            .mount(&server)
            .await;

        driver_for(&server)
            .wait_ready(Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_ready_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "ready": false }
            })))
            .mount(&server)
            .await;

        let err = driver_for(&server)
            .wait_ready(Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }
}
