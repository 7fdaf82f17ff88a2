//! Connector Framework type definitions
//!
//! The normalized resource/entitlement/grant model every connector emits,
//! plus the annotations (rate-limit telemetry) that travel alongside results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of connector for external system integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    /// Salesforce CRM connector
    Salesforce,
}

impl ConnectorType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::Salesforce => "salesforce",
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a normalized resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    User,
    Group,
    Role,
    Profile,
    #[serde(rename = "permission")]
    PermissionSet,
    PermissionSetGroup,
    ConnectedApplication,
}

impl ResourceKind {
    /// Stable identifier used in resource ids and grant payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::Role => "role",
            ResourceKind::Profile => "profile",
            ResourceKind::PermissionSet => "permission",
            ResourceKind::PermissionSetGroup => "permission_set_group",
            ResourceKind::ConnectedApplication => "connected_application",
        }
    }

    /// Human readable name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::User => "User",
            ResourceKind::Group => "Group",
            ResourceKind::Role => "Role",
            ResourceKind::Profile => "Profile",
            ResourceKind::PermissionSet => "Permission Set",
            ResourceKind::PermissionSetGroup => "Permission Set Group",
            ResourceKind::ConnectedApplication => "Connected Application",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseResourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ResourceKind::User),
            "group" => Ok(ResourceKind::Group),
            "role" => Ok(ResourceKind::Role),
            "profile" => Ok(ResourceKind::Profile),
            "permission" => Ok(ResourceKind::PermissionSet),
            "permission_set_group" => Ok(ResourceKind::PermissionSetGroup),
            "connected_application" => Ok(ResourceKind::ConnectedApplication),
            _ => Err(ParseResourceKindError(s.to_string())),
        }
    }
}

/// Error parsing a resource kind from string.
#[derive(Debug, Clone)]
pub struct ParseResourceKindError(String);

impl fmt::Display for ParseResourceKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid resource kind '{}'", self.0)
    }
}

impl std::error::Error for ParseResourceKindError {}

/// Identity of a resource: its kind plus the remote primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Account status exposed on user resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Enabled,
    Disabled,
}

/// Extra attributes carried by user resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTraits {
    pub status: UserStatus,
    pub email: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// A normalized resource derived from one remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub display_name: String,
    /// Free-form profile attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub profile: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserTraits>,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(kind, id),
            display_name: display_name.into(),
            profile: serde_json::Map::new(),
            user: None,
        }
    }

    /// Add a profile attribute.
    pub fn with_profile(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.profile.insert(key.to_string(), value.into());
        self
    }

    /// Attach user traits.
    pub fn with_user_traits(mut self, traits: UserTraits) -> Self {
        self.user = Some(traits);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }
}

/// A grantable capability exposed by a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub resource: ResourceId,
    pub slug: String,
    pub display_name: String,
    pub description: String,
    pub grantable_to: Vec<ResourceKind>,
}

impl Entitlement {
    /// Stable entitlement id: `<kind>:<resource id>:<slug>`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.resource, self.slug)
    }
}

/// An edge between a principal and an entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub entitlement: Entitlement,
    pub principal: ResourceId,
}

/// Rate-limit status reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitStatus {
    Ok,
    Overlimit,
    Unknown,
}

/// Rate-limit telemetry describing the most recent remote call only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDescriptor {
    pub status: RateLimitStatus,
    pub limit: i64,
    pub remaining: i64,
}

/// Side-channel data attached to a result.
///
/// An absent rate limit means "no information", not "within limits".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitDescriptor>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build annotations from zero or more optional descriptors.
    pub fn with_rate_limits<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = Option<RateLimitDescriptor>>,
    {
        Self {
            rate_limits: descriptors.into_iter().flatten().collect(),
        }
    }

    /// Append a descriptor if one was observed.
    pub fn push_rate_limit(&mut self, descriptor: Option<RateLimitDescriptor>) {
        if let Some(d) = descriptor {
            self.rate_limits.push(d);
        }
    }

    /// The most recently observed descriptor.
    #[must_use]
    pub fn latest_rate_limit(&self) -> Option<&RateLimitDescriptor> {
        self.rate_limits.last()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rate_limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_roundtrip_str() {
        for kind in [
            ResourceKind::User,
            ResourceKind::Group,
            ResourceKind::Role,
            ResourceKind::Profile,
            ResourceKind::PermissionSet,
            ResourceKind::PermissionSetGroup,
            ResourceKind::ConnectedApplication,
        ] {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("account".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_permission_set_serializes_as_permission() {
        let json = serde_json::to_string(&ResourceKind::PermissionSet).unwrap();
        assert_eq!(json, "\"permission\"");
    }

    #[test]
    fn test_entitlement_id() {
        let ent = Entitlement {
            resource: ResourceId::new(ResourceKind::Group, "00G1"),
            slug: "member".to_string(),
            display_name: "Sales Group Member".to_string(),
            description: String::new(),
            grantable_to: vec![ResourceKind::User],
        };
        assert_eq!(ent.id(), "group:00G1:member");
    }

    #[test]
    fn test_annotations_skip_absent_descriptors() {
        let ok = RateLimitDescriptor {
            status: RateLimitStatus::Ok,
            limit: 100,
            remaining: 5,
        };
        let annotations = Annotations::with_rate_limits([None, Some(ok)]);
        assert_eq!(annotations.rate_limits.len(), 1);
        assert_eq!(annotations.latest_rate_limit(), Some(&ok));

        assert!(Annotations::with_rate_limits([None]).is_empty());
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new(ResourceKind::ConnectedApplication, "0H41", "Slack")
            .with_profile("created_by_id", "0051");
        assert_eq!(resource.kind(), ResourceKind::ConnectedApplication);
        assert_eq!(resource.profile["created_by_id"], "0051");
        assert!(resource.user.is_none());
    }
}
