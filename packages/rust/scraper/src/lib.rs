//! LinkedIn profile discovery on company websites.
//!
//! This crate provides:
//! - [`find_linkedin_in_html`]: first-match anchor scan over an HTML document
//! - [`StaticFetcher`]: plain HTTP fetch with retries and a private-address guard
//! - [`WebDriver`] / [`BrowserSession`]: headless Chrome rendering over WebDriver
//! - [`LinkedinFinder`] / [`FinderSession`]: strategy selection and the
//!   per-pass browser session lifecycle (lazy start, replaced when lost)

mod anchors;
mod driver;
mod fetch;
mod webdriver;

use orgenrich_shared::{AppConfig, BrowserConfig, Result, ScraperConfig, Strategy};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

pub use anchors::{LINKEDIN_MARKER, find_linkedin_in_html};
pub use driver::DriverProcess;
pub use fetch::StaticFetcher;
pub use webdriver::{BrowserSession, WebDriver};

// ---------------------------------------------------------------------------
// LinkedinFinder
// ---------------------------------------------------------------------------

/// Looks up a company's LinkedIn URL with the configured fetch strategy.
pub struct LinkedinFinder {
    strategy: Strategy,
    fetcher: StaticFetcher,
    webdriver: Option<WebDriver>,
    allow_private_hosts: bool,
}

impl LinkedinFinder {
    /// Build a finder; the WebDriver client is only created for the rendered strategy.
    pub fn new(scraper: &ScraperConfig, browser: &BrowserConfig) -> Result<Self> {
        let webdriver = match scraper.strategy {
            Strategy::Static => None,
            Strategy::Rendered => Some(WebDriver::new(browser)?),
        };

        Ok(Self {
            strategy: scraper.strategy,
            fetcher: StaticFetcher::new(scraper)?,
            webdriver,
            allow_private_hosts: scraper.allow_private_hosts,
        })
    }

    /// Build a finder from the full application config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.scraper, &config.browser)
    }

    /// Active strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// WebDriver client, present for the rendered strategy.
    pub fn webdriver(&self) -> Option<&WebDriver> {
        self.webdriver.as_ref()
    }

    /// Open a per-pass lookup handle. For the rendered strategy the browser
    /// session is started on the first lookup and reused until
    /// [`FinderSession::finish`].
    pub fn start(&self) -> FinderSession<'_> {
        FinderSession {
            finder: self,
            browser: Mutex::new(None),
        }
    }
}

// ---------------------------------------------------------------------------
// FinderSession
// ---------------------------------------------------------------------------

/// Per-pass lookup handle. Call [`finish`](Self::finish) to release the browser.
pub struct FinderSession<'a> {
    finder: &'a LinkedinFinder,
    browser: Mutex<Option<BrowserSession>>,
}

impl FinderSession<'_> {
    /// Fetch `website` and return the first LinkedIn href on it, if any.
    ///
    /// Fetch and browser failures are returned as `Err` so the caller decides
    /// how to log them; a page without a LinkedIn link is `Ok(None)`.
    #[instrument(skip_all, fields(website = %website, strategy = %self.finder.strategy))]
    pub async fn find_linkedin(&self, website: &Url) -> Result<Option<String>> {
        let html = match &self.finder.webdriver {
            Some(webdriver) => {
                fetch::check_target(website, self.finder.allow_private_hosts)?;
                self.render(webdriver, website).await?
            }
            None => self.finder.fetcher.fetch(website).await?,
        };

        let found = find_linkedin_in_html(&html);
        debug!(found = found.is_some(), "scanned anchors");
        Ok(found)
    }

    /// Render through the pass's browser session, starting one if needed.
    /// A session that fails at session level is dropped so the next lookup
    /// starts a fresh one.
    async fn render(&self, webdriver: &WebDriver, website: &Url) -> Result<String> {
        let mut slot = self.browser.lock().await;
        let browser = match slot.take() {
            Some(browser) => browser,
            None => webdriver.new_session().await?,
        };

        match browser.render(website).await {
            Err(e) if e.invalidates_session() => {
                warn!(session_id = %browser.id(), error = %e, "browser session lost, replacing on next lookup");
                if let Err(close_err) = browser.close().await {
                    debug!(error = %close_err, "closing lost session failed");
                }
                Err(e)
            }
            result => {
                *slot = Some(browser);
                result
            }
        }
    }

    /// Release the browser session, if one was started.
    pub async fn finish(self) {
        if let Some(browser) = self.browser.into_inner() {
            let session_id = browser.id().to_string();
            if let Err(e) = browser.close().await {
                warn!(%session_id, error = %e, "failed to close browser session");
            }
        }
    }
}
