//! The enrichment loop: contacts → website guess → LinkedIn lookup → organization PATCH.

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use orgenrich_crm::CrmClient;
use orgenrich_scraper::{FinderSession, LinkedinFinder};
use orgenrich_shared::{Contact, EnrichmentConfig, Result};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::website::{Website, website_for_email};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Something that can find a LinkedIn URL for a website.
///
/// Implemented by [`FinderSession`]; tests substitute their own.
pub trait LinkedinLookup {
    fn lookup(&self, website: &Url) -> impl Future<Output = Result<Option<String>>>;
}

impl LinkedinLookup for FinderSession<'_> {
    fn lookup(&self, website: &Url) -> impl Future<Output = Result<Option<String>>> {
        self.find_linkedin(website)
    }
}

/// Progress callback for reporting pass status.
pub trait PassProgress: Send + Sync {
    /// Called once the contact page has been fetched.
    fn pass_started(&self, contacts: usize);
    /// Called after each contact has been handled.
    fn contact_done(&self, outcome: &ContactOutcome, current: usize, total: usize);
    /// Called when the pass completes.
    fn pass_finished(&self, report: &PassReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PassProgress for SilentProgress {
    fn pass_started(&self, _contacts: usize) {}
    fn contact_done(&self, _outcome: &ContactOutcome, _current: usize, _total: usize) {}
    fn pass_finished(&self, _report: &PassReport) {}
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a contact was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The contact has no organization relationship.
    NoOrganization,
    /// Another contact already updated this organization during the pass.
    AlreadyUpdated,
    /// No usable website could be derived from the email.
    NoWebsite(String),
}

/// What happened to one contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Updated {
        contact_id: String,
        organization_id: String,
        website: String,
        linkedin_url: Option<String>,
    },
    Skipped {
        contact_id: String,
        reason: SkipReason,
    },
    Failed {
        contact_id: String,
        error: String,
    },
}

/// Summary of one pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub contacts_seen: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub linkedin_found: usize,
    pub duration: Duration,
}

impl PassReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            contacts_seen: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            linkedin_found: 0,
            duration: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: &ContactOutcome) {
        self.contacts_seen += 1;
        match outcome {
            ContactOutcome::Updated { linkedin_url, .. } => {
                self.updated += 1;
                if linkedin_url.is_some() {
                    self.linkedin_found += 1;
                }
            }
            ContactOutcome::Skipped { .. } => self.skipped += 1,
            ContactOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Drives enrichment passes against the CRM.
pub struct Enricher {
    crm: CrmClient,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(crm: CrmClient, config: EnrichmentConfig) -> Self {
        Self { crm, config }
    }

    /// Repeat passes until `shutdown` fires, sleeping `poll_interval_secs`
    /// between them. Pass failures are logged and never end the loop.
    pub async fn run(
        &self,
        finder: &LinkedinFinder,
        shutdown: &CancellationToken,
        progress: &dyn PassProgress,
    ) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let mut passes: u64 = 0;

        info!(
            strategy = %finder.strategy(),
            interval_secs = interval.as_secs(),
            "enrichment loop started"
        );

        while !shutdown.is_cancelled() {
            passes += 1;
            match self.run_once(finder, shutdown, progress).await {
                Ok(report) => debug!(pass = passes, updated = report.updated, "pass complete"),
                Err(e) => error!(pass = passes, error = %e, "pass failed, no contacts processed; retrying after the interval"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(passes, "enrichment loop stopped");
    }

    /// One pass with its own finder session, released afterwards even when
    /// the pass fails. Browser problems surface per lookup, never here.
    pub async fn run_once(
        &self,
        finder: &LinkedinFinder,
        shutdown: &CancellationToken,
        progress: &dyn PassProgress,
    ) -> Result<PassReport> {
        let session = finder.start();
        let result = self.run_pass(&session, shutdown, progress).await;
        session.finish().await;
        result
    }

    /// Fetch one page of contacts and enrich them in order.
    ///
    /// Fails only when the contact list itself cannot be fetched. Cancellation
    /// is checked between contacts.
    #[instrument(skip_all)]
    pub async fn run_pass<L: LinkedinLookup>(
        &self,
        lookup: &L,
        shutdown: &CancellationToken,
        progress: &dyn PassProgress,
    ) -> Result<PassReport> {
        let started = Instant::now();
        let mut report = PassReport::new(Utc::now());

        let page = self
            .crm
            .fetch_contacts(&self.config.filters, &self.config.sort)
            .await?;

        let contacts = page.data;
        let total = contacts.len();
        info!(contacts = total, "starting pass");
        progress.pass_started(total);

        let mut updated_orgs = HashSet::new();
        for (i, contact) in contacts.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!(remaining = total - i, "shutdown requested; ending pass early");
                break;
            }

            let outcome = self.enrich_contact(contact, lookup, &mut updated_orgs).await;
            report.record(&outcome);
            progress.contact_done(&outcome, i + 1, total);
        }

        report.duration = started.elapsed();
        info!(
            seen = report.contacts_seen,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            linkedin_found = report.linkedin_found,
            elapsed_ms = report.duration.as_millis() as u64,
            "pass finished"
        );
        progress.pass_finished(&report);

        Ok(report)
    }

    /// Enrich a single contact's organization. `updated_orgs` holds the
    /// organizations already written during this pass.
    pub async fn enrich_contact<L: LinkedinLookup>(
        &self,
        contact: &Contact,
        lookup: &L,
        updated_orgs: &mut HashSet<String>,
    ) -> ContactOutcome {
        let contact_id = contact.id.clone();

        let Some(org_id) = contact.organization_id() else {
            debug!(%contact_id, "contact has no organization");
            return ContactOutcome::Skipped {
                contact_id,
                reason: SkipReason::NoOrganization,
            };
        };

        if updated_orgs.contains(org_id) {
            debug!(%contact_id, organization_id = %org_id, "organization already updated this pass");
            return ContactOutcome::Skipped {
                contact_id,
                reason: SkipReason::AlreadyUpdated,
            };
        }

        let email = contact.attributes.email.as_deref().unwrap_or_default();
        let website = match website_for_email(
            email,
            self.config.label_policy,
            &self.config.website_scheme,
        ) {
            Ok(website) => website,
            Err(e) => {
                warn!(%contact_id, error = %e, "skipping contact");
                return ContactOutcome::Skipped {
                    contact_id,
                    reason: SkipReason::NoWebsite(e.to_string()),
                };
            }
        };

        let linkedin_url = match lookup.lookup(&website.url).await {
            Ok(found) => found,
            Err(e) => {
                warn!(website = %website.address, error = %e, "LinkedIn lookup failed");
                None
            }
        };

        let attributes = self.organization_attributes(&website, linkedin_url.as_deref());
        if let Err(e) = self.crm.update_organization(org_id, &attributes).await {
            error!(%contact_id, organization_id = %org_id, error = %e, "organization update failed");
            return ContactOutcome::Failed {
                contact_id,
                error: e.to_string(),
            };
        }
        updated_orgs.insert(org_id.to_string());

        if let Some(field) = &self.config.mark_enriched_field {
            let mut flag = Map::new();
            flag.insert(field.clone(), Value::Bool(true));
            if let Err(e) = self.crm.update_contact(&contact_id, &flag).await {
                warn!(%contact_id, error = %e, "failed to mark contact as enriched");
            }
        }

        info!(
            name = %contact.display_name(),
            organization_id = %org_id,
            website = %website.address,
            linkedin = linkedin_url.as_deref().unwrap_or("-"),
            "enriched contact"
        );

        ContactOutcome::Updated {
            contact_id,
            organization_id: org_id.to_string(),
            website: website.address,
            linkedin_url,
        }
    }

    /// PATCH attributes for an organization.
    pub fn organization_attributes(
        &self,
        website: &Website,
        linkedin_url: Option<&str>,
    ) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert("website".into(), Value::String(website.address.clone()));

        match linkedin_url {
            Some(url) => {
                attributes.insert(self.config.linkedin_field.clone(), Value::String(url.into()));
            }
            None if self.config.overwrite_missing_linkedin => {
                attributes.insert(self.config.linkedin_field.clone(), Value::Null);
            }
            None => {}
        }

        attributes
    }
}
