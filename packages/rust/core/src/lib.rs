//! Enrichment orchestration for orgenrich.
//!
//! This crate ties together the CRM client and the LinkedIn finder:
//! - [`website`]: website guesses from contact emails
//! - [`enricher`]: the pass/polling loop that updates organizations

pub mod enricher;
pub mod website;

pub use enricher::{
    ContactOutcome, Enricher, LinkedinLookup, PassProgress, PassReport, SilentProgress, SkipReason,
};
pub use website::{Website, website_for_email, website_from_email, website_url};
