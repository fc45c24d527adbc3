//! JSON:API client for the CRM's contact and organization endpoints.
//!
//! Every call returns [`Result`]: transport failures map to
//! [`EnrichError::Network`], non-2xx answers to [`EnrichError::Http`] and
//! undecodable bodies to [`EnrichError::Parse`]. Nothing is retried here; the
//! enrichment loop decides what a failed call means for the current pass.

use std::time::Duration;

use orgenrich_shared::{
    CONTACT_TYPE, Contact, ContactPage, CrmConfig, Document, EnrichError, ORGANIZATION_TYPE,
    Organization, Result, UpdateDocument,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};
use url::Url;

/// Media type for every request and response body.
pub const JSON_API: &str = "application/vnd.api+json";

/// User-Agent string for CRM requests.
const USER_AGENT: &str = concat!("orgenrich/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`EnrichError::Http`].
const MAX_ERROR_BODY: usize = 2048;

// ---------------------------------------------------------------------------
// CrmClient
// ---------------------------------------------------------------------------

/// Authenticated client for the CRM REST API.
pub struct CrmClient {
    client: Client,
    base_url: Url,
    api_key: HeaderValue,
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CrmClient {
    /// Build a client for `config.base_url` authenticating with `api_key`.
    pub fn new(config: &CrmConfig, api_key: &str) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            EnrichError::config(format!("invalid CRM base URL '{}': {e}", config.base_url))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(EnrichError::config(format!(
                "CRM base URL '{base_url}' cannot carry a path"
            )));
        }

        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|_| EnrichError::config("CRM API key contains invalid header characters"))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// List contacts matching every predicate in `filters`, ordered by `sort`.
    ///
    /// Filters are joined with `,` into one `filter` parameter; a leading `-`
    /// on `sort` requests descending order. Empty inputs omit the parameter.
    #[instrument(skip(self))]
    pub async fn fetch_contacts(&self, filters: &[String], sort: &str) -> Result<ContactPage> {
        let url = self.endpoint(&["contacts"])?;

        let mut query: Vec<(&str, String)> = Vec::new();
        if !filters.is_empty() {
            query.push(("filter", filters.join(",")));
        }
        if !sort.is_empty() {
            query.push(("sort", sort.to_string()));
        }

        let request = self.authorized(self.client.get(url.clone())).query(&query);
        let page: ContactPage = self.send(request, &url).await?;

        info!(contacts = page.data.len(), "fetched contacts");
        Ok(page)
    }

    /// Fetch a single contact by ID.
    #[instrument(skip(self))]
    pub async fn get_contact(&self, id: &str) -> Result<Contact> {
        let url = self.endpoint(&["contacts", id])?;
        let request = self.authorized(self.client.get(url.clone()));
        let doc: Document<Contact> = self.send(request, &url).await?;
        Ok(doc.data)
    }

    /// Partially update an organization; only `attributes` are overwritten.
    #[instrument(skip(self, attributes), fields(fields = attributes.len()))]
    pub async fn update_organization(
        &self,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Organization> {
        let doc: Document<Organization> = self
            .patch(&["organizations", id], ORGANIZATION_TYPE, id, attributes)
            .await?;
        info!(organization_id = %doc.data.id, "organization updated");
        Ok(doc.data)
    }

    /// Partially update a contact (used to set the "enriched" marker).
    #[instrument(skip(self, attributes), fields(fields = attributes.len()))]
    pub async fn update_contact(
        &self,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Contact> {
        let doc: Document<Contact> = self
            .patch(&["contacts", id], CONTACT_TYPE, id, attributes)
            .await?;
        debug!(contact_id = %doc.data.id, "contact updated");
        Ok(doc.data)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn patch<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        kind: &str,
        id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let body = serde_json::to_vec(&UpdateDocument::new(kind, id, attributes))
            .map_err(|e| EnrichError::parse(format!("failed to encode {kind} update: {e}")))?;

        let request = self
            .authorized(self.client.patch(url.clone()))
            .header(CONTENT_TYPE, JSON_API)
            .body(body);

        self.send(request, &url).await
    }

    /// `base_url` with `segments` appended as percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| EnrichError::config("CRM base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.api_key.clone())
    }

    /// Send `request`, require a 2xx status and decode the JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        debug!(%url, "CRM request");

        let response = request
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(EnrichError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| EnrichError::parse(format!("{url}: unexpected response shape: {e}")))
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API_KEY: &str = "test-key";

    fn client_for(server: &MockServer) -> CrmClient {
        let config = CrmConfig {
            base_url: format!("{}/public/v1", server.uri()),
            timeout_secs: 5,
            ..CrmConfig::default()
        };
        CrmClient::new(&config, API_KEY).unwrap()
    }

    fn contact_json(id: &str, email: &str, org: &str) -> Value {
        json!({
            "id": id,
            "type": "contact",
            "attributes": { "email": email, "first_name": "Ada", "last_name": "Lovelace" },
            "relationships": { "organization": { "data": { "id": org, "type": "organization" } } }
        })
    }

    #[test]
    fn endpoint_joins_segments() {
        let config = CrmConfig {
            base_url: "https://crm.test/public/v1/".into(),
            ..CrmConfig::default()
        };
        let client = CrmClient::new(&config, API_KEY).unwrap();
        assert_eq!(
            client.endpoint(&["contacts", "a/b"]).unwrap().as_str(),
            "https://crm.test/public/v1/contacts/a%2Fb"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = CrmConfig {
            base_url: "mailto:crm@example.com".into(),
            ..CrmConfig::default()
        };
        assert!(CrmClient::new(&config, API_KEY).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let client = CrmClient::new(&CrmConfig::default(), "super-secret").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".into(), 2), "h");
        assert_eq!(truncate("short".into(), 64), "short");
    }

    #[tokio::test]
    async fn fetch_contacts_sends_filter_sort_and_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/public/v1/contacts"))
            .and(query_param("filter", "c_enriched:true,country:BE"))
            .and(query_param("sort", "-created_at"))
            .and(header("Authorization", API_KEY))
            .and(header("Accept", JSON_API))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    contact_json("1", "a@mail.example.com", "10"),
                    contact_json("2", "b@example.org", "11")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let filters = vec!["c_enriched:true".to_string(), "country:BE".to_string()];
        let page = client.fetch_contacts(&filters, "-created_at").await.unwrap();

        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].attributes.email.as_deref(), Some("a@mail.example.com"));
        assert_eq!(page.data[1].organization_id(), Some("11"));
    }

    #[tokio::test]
    async fn get_contact_by_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/public/v1/contacts/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": contact_json("42", "x@y.example.com", "9") })),
            )
            .mount(&server)
            .await;

        let contact = client_for(&server).get_contact("42").await.unwrap();
        assert_eq!(contact.id, "42");
        assert_eq!(contact.organization_id(), Some("9"));
    }

    #[tokio::test]
    async fn update_organization_sends_json_api_envelope() {
        let server = MockServer::start().await;

        let expected = json!({
            "data": {
                "id": "10",
                "type": "organization",
                "attributes": {
                    "website": "http://example.com",
                    "c_linkedin_url": "https://linkedin.com/company/x"
                }
            }
        });

        Mock::given(method("PATCH"))
            .and(path("/public/v1/organizations/10"))
            .and(header("Content-Type", JSON_API))
            .and(header("Authorization", API_KEY))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "10",
                    "type": "organization",
                    "attributes": {
                        "name": "Example",
                        "website": "http://example.com",
                        "c_linkedin_url": "https://linkedin.com/company/x"
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut attributes = Map::new();
        attributes.insert("website".into(), json!("http://example.com"));
        attributes.insert("c_linkedin_url".into(), json!("https://linkedin.com/company/x"));

        let org = client_for(&server)
            .update_organization("10", &attributes)
            .await
            .unwrap();
        assert_eq!(org.attributes.website.as_deref(), Some("http://example.com"));
        assert_eq!(org.custom_str("c_linkedin_url"), Some("https://linkedin.com/company/x"));
    }

    #[tokio::test]
    async fn update_contact_uses_contact_type() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/public/v1/contacts/1"))
            .and(body_json(json!({
                "data": { "id": "1", "type": "contact", "attributes": { "c_enriched": true } }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": contact_json("1", "a@b.example.com", "2") })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut attributes = Map::new();
        attributes.insert("c_enriched".into(), json!(true));
        let contact = client_for(&server).update_contact("1", &attributes).await.unwrap();
        assert_eq!(contact.id, "1");
    }

    #[tokio::test]
    async fn server_errors_become_err_on_every_call() {
        let server = MockServer::start().await;

        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let err = client.fetch_contacts(&[], "").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("internal error"));

        let err = client.get_contact("1").await.unwrap_err();
        assert_eq!(err.status(), Some(500));

        let err = client.update_organization("1", &Map::new()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/public/v1/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_contacts(&[], "").await.unwrap_err();
        assert!(matches!(err, EnrichError::Parse { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        drop(server);

        let err = client.get_contact("1").await.unwrap_err();
        assert!(matches!(err, EnrichError::Network(_)));
    }
}
