//! JSON:API domain types for CRM contacts and organizations.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// JSON:API `type` for organization resources.
pub const ORGANIZATION_TYPE: &str = "organization";

/// JSON:API `type` for contact resources.
pub const CONTACT_TYPE: &str = "contact";

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Top-level JSON:API document (`{"data": ..., "meta": ..., "links": ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<T> {
    /// Primary data: a single resource or a list of them.
    pub data: T,
    /// Non-standard meta information (pagination counters etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Pagination / self links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

/// A single JSON:API resource object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource<A> {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
    #[serde(default)]
    pub relationships: Relationships,
}

/// Relationship block of a resource. Only the links orgenrich follows are typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Relationship>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A to-one relationship (`{"data": {"id": .., "type": ..}}` or `{"data": null}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

/// Resource linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Outgoing PATCH body: `{"data": {"id", "type", "attributes"}}`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateDocument<'a> {
    pub data: UpdateResource<'a>,
}

/// Resource part of an [`UpdateDocument`].
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResource<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub attributes: &'a Map<String, Value>,
}

impl<'a> UpdateDocument<'a> {
    /// Build a partial-update body; only `attributes` are overwritten server-side.
    pub fn new(kind: &'a str, id: &'a str, attributes: &'a Map<String, Value>) -> Self {
        Self {
            data: UpdateResource {
                id,
                kind,
                attributes,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Contact / Organization
// ---------------------------------------------------------------------------

/// Attributes of a CRM contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactAttributes {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Everything else the CRM sends (custom fields included).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Attributes of a CRM organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A CRM person record.
pub type Contact = Resource<ContactAttributes>;

/// A CRM company record.
pub type Organization = Resource<OrganizationAttributes>;

/// One page of the contact list endpoint.
pub type ContactPage = Document<Vec<Contact>>;

impl Contact {
    /// ID of the organization this contact belongs to, if linked.
    pub fn organization_id(&self) -> Option<&str> {
        self.relationships
            .organization
            .as_ref()
            .and_then(|rel| rel.data.as_ref())
            .map(|data| data.id.as_str())
    }

    /// `first last` for log lines, with `N/A` for missing parts.
    pub fn display_name(&self) -> String {
        let first = self.attributes.first_name.as_deref().unwrap_or("N/A");
        let last = self.attributes.last_name.as_deref().unwrap_or("N/A");
        format!("{first} {last}")
    }
}

impl Organization {
    /// Read a custom attribute (e.g. `c_linkedin_url`) as a string.
    pub fn custom_str(&self, field: &str) -> Option<&str> {
        self.attributes.extra.get(field).and_then(Value::as_str)
    }
}

/// JSON:API ids are strings, but some CRMs emit integers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}
