//! Website guesses derived from contact email addresses.

use orgenrich_shared::{EnrichError, LabelPolicy, Result};
use url::Url;

/// A candidate company website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Website {
    /// Value written to the CRM, e.g. `http://example.com` (no trailing slash).
    pub address: String,
    /// Parsed form used for fetching.
    pub url: Url,
}

/// Reduce the domain of `email` to a website domain.
///
/// Returns `None` unless the address has exactly one `@` with non-empty
/// parts on both sides and a well-formed dotted domain. The first label is
/// stripped according to `policy`; subdomains are judged against the public
/// suffix list, so `acme.co.uk` is already a bare domain. A result that is
/// itself a public suffix (`com`, `co.uk`) is rejected.
pub fn website_from_email(email: &str, policy: LabelPolicy) -> Option<String> {
    let (local, domain) = email.trim().split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }

    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }

    let strip = match policy {
        LabelPolicy::SubdomainOnly => {
            let registrable = psl::domain_str(&domain)?;
            domain.len() > registrable.len()
        }
        LabelPolicy::Always => true,
    };

    let website = if strip { labels[1..].join(".") } else { domain.clone() };
    psl::domain_str(&website).is_some().then_some(website)
}

/// Build `<scheme>://<domain>` and check it parses as an HTTP(S) URL with a host.
pub fn website_url(domain: &str, scheme: &str) -> Result<Website> {
    let address = format!("{scheme}://{domain}");
    let url = Url::parse(&address)
        .map_err(|e| EnrichError::validation(format!("'{address}' is not a valid URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(EnrichError::validation(format!(
            "'{address}' is not an http(s) URL with a host"
        )));
    }

    Ok(Website { address, url })
}

/// Derive the website for a contact email, explaining any rejection.
pub fn website_for_email(email: &str, policy: LabelPolicy, scheme: &str) -> Result<Website> {
    let domain = website_from_email(email, policy).ok_or_else(|| {
        EnrichError::validation(format!("cannot derive a website from email '{email}'"))
    })?;
    website_url(&domain, scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_subdomain_label() {
        for policy in [LabelPolicy::SubdomainOnly, LabelPolicy::Always] {
            assert_eq!(
                website_from_email("a@mail.example.com", policy).as_deref(),
                Some("example.com")
            );
            assert_eq!(
                website_from_email("jane.doe@www.google.com", policy).as_deref(),
                Some("google.com")
            );
        }
    }

    #[test]
    fn strips_exactly_one_label() {
        assert_eq!(
            website_from_email("a@eu.mail.example.com", LabelPolicy::SubdomainOnly).as_deref(),
            Some("mail.example.com")
        );
    }

    #[test]
    fn bare_domain_kept_under_subdomain_only() {
        assert_eq!(
            website_from_email("a@example.com", LabelPolicy::SubdomainOnly).as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn multi_label_suffix_is_not_a_subdomain() {
        assert_eq!(
            website_from_email("john@acme.co.uk", LabelPolicy::SubdomainOnly).as_deref(),
            Some("acme.co.uk")
        );
        assert_eq!(
            website_from_email("john@mail.acme.co.uk", LabelPolicy::SubdomainOnly).as_deref(),
            Some("acme.co.uk")
        );
    }

    #[test]
    fn public_suffix_never_returned() {
        assert_eq!(website_from_email("john@acme.co.uk", LabelPolicy::Always), None);
        assert_eq!(website_from_email("john@co.uk", LabelPolicy::SubdomainOnly), None);
    }

    #[test]
    fn bare_domain_rejected_under_always() {
        // Stripping "example" leaves "com", which is not a usable website.
        assert_eq!(website_from_email("a@example.com", LabelPolicy::Always), None);
    }

    #[test]
    fn wrong_number_of_at_signs() {
        for email in ["no-at-sign.example.com", "a@b@example.com", "@@", ""] {
            assert_eq!(website_from_email(email, LabelPolicy::SubdomainOnly), None, "{email}");
            assert_eq!(website_from_email(email, LabelPolicy::Always), None, "{email}");
        }
    }

    #[test]
    fn malformed_domains() {
        for email in ["a@", "@example.com", "a@localhost", "a@example..com", "a@.example.com"] {
            assert_eq!(website_from_email(email, LabelPolicy::SubdomainOnly), None, "{email}");
        }
    }

    #[test]
    fn normalises_case_and_trailing_dot() {
        assert_eq!(
            website_from_email("  Ada@Mail.Example.COM. ", LabelPolicy::SubdomainOnly).as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn website_url_has_no_trailing_slash() {
        let website = website_url("example.com", "http").unwrap();
        assert_eq!(website.address, "http://example.com");
        assert_eq!(website.url.host_str(), Some("example.com"));
    }

    #[test]
    fn website_for_email_end_to_end() {
        let website =
            website_for_email("a@mail.example.com", LabelPolicy::SubdomainOnly, "http").unwrap();
        assert_eq!(website.address, "http://example.com");

        let err = website_for_email("broken", LabelPolicy::SubdomainOnly, "http").unwrap_err();
        assert!(err.to_string().contains("cannot derive a website"));
    }
}
