//! Shared types, error model, and configuration for orgenrich.
//!
//! This crate is the foundation depended on by all other orgenrich crates.
//! It provides:
//! - [`EnrichError`]: the unified error type
//! - JSON:API domain types ([`Contact`], [`Organization`], [`ContactPage`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, CrmConfig, DESKTOP_USER_AGENT, EnrichmentConfig, LabelPolicy,
    ScraperConfig, Strategy, api_key, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{EnrichError, Result};
pub use types::{
    CONTACT_TYPE, Contact, ContactAttributes, ContactPage, Document, ORGANIZATION_TYPE,
    Organization, OrganizationAttributes, Relationship, Relationships, Resource,
    ResourceIdentifier, UpdateDocument,
};
