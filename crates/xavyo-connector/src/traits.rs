//! Connector Framework traits
//!
//! A connector exposes one [`ResourceSyncer`] per resource kind. Each syncer
//! lists its resources, describes their entitlements, enumerates the grants
//! on those entitlements and, when the kind supports it, mutates grant edges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::{Annotations, ConnectorType, Entitlement, Grant, Resource, ResourceId, ResourceKind};

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the type of this connector.
    fn connector_type(&self) -> ConnectorType;

    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the target system.
    ///
    /// Returns `Ok(())` if the connection is successful, or an error describing
    /// what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Dispose of connector resources.
    async fn dispose(&self) -> ConnectorResult<()>;
}

/// Request for one page of a listing.
///
/// An empty token starts a fresh listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub token: String,
    /// Requested page size; non-positive values select the connector default.
    pub size: i64,
}

impl PageRequest {
    /// First page of a listing.
    pub fn first(size: i64) -> Self {
        Self {
            token: String::new(),
            size,
        }
    }

    /// Continue from a cursor returned by a previous page.
    pub fn resume(token: impl Into<String>, size: i64) -> Self {
        Self {
            token: token.into(),
            size,
        }
    }
}

/// One page of results.
///
/// An empty `next_token` means there are no more pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: String,
    pub annotations: Annotations,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: impl Into<String>, annotations: Annotations) -> Self {
        Self {
            items,
            next_token: next_token.into(),
            annotations,
        }
    }

    /// A single terminal page.
    pub fn single(items: Vec<T>) -> Self {
        Self::new(items, "", Annotations::default())
    }

    /// A terminal page with nothing in it.
    pub fn empty() -> Self {
        Self::single(Vec::new())
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.next_token.is_empty()
    }
}

/// A requested change to one grant edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    /// Give `principal` the entitlement.
    Grant {
        principal: ResourceId,
        entitlement: Entitlement,
    },
    /// Remove an existing grant.
    Revoke(Grant),
}

impl EdgeChange {
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            EdgeChange::Grant { .. } => "grant",
            EdgeChange::Revoke(_) => "revoke",
        }
    }
}

/// What an edge mutation actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOutcome {
    /// The remote state was changed.
    Applied,
    /// Grant requested but the edge was already present.
    AlreadyExists,
    /// Revoke requested but the edge was already absent.
    AlreadyRevoked,
}

/// Result of an edge mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResult {
    pub outcome: EdgeOutcome,
    pub annotations: Annotations,
}

impl EdgeResult {
    pub fn new(outcome: EdgeOutcome, annotations: Annotations) -> Self {
        Self {
            outcome,
            annotations,
        }
    }

    pub fn applied(annotations: Annotations) -> Self {
        Self::new(EdgeOutcome::Applied, annotations)
    }
}

/// Per-kind sync component.
#[async_trait]
pub trait ResourceSyncer: Send + Sync {
    /// Resource kind this syncer handles.
    fn kind(&self) -> ResourceKind;

    /// List one page of resources.
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>>;

    /// Entitlements a resource exposes.
    async fn entitlements(
        &self,
        resource: &Resource,
        page: &PageRequest,
    ) -> ConnectorResult<Page<Entitlement>>;

    /// One page of grants on a resource's entitlements.
    async fn grants(&self, resource: &Resource, page: &PageRequest)
        -> ConnectorResult<Page<Grant>>;

    /// Grant or revoke one edge.
    ///
    /// Read-only kinds keep the default, which rejects the change.
    async fn apply(&self, change: EdgeChange) -> ConnectorResult<EdgeResult> {
        Err(ConnectorError::unsupported(
            self.kind().as_str(),
            change.operation(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnly;

    #[async_trait]
    impl ResourceSyncer for ReadOnly {
        fn kind(&self) -> ResourceKind {
            ResourceKind::ConnectedApplication
        }

        async fn list(&self, _page: &PageRequest) -> ConnectorResult<Page<Resource>> {
            Ok(Page::empty())
        }

        async fn entitlements(
            &self,
            _resource: &Resource,
            _page: &PageRequest,
        ) -> ConnectorResult<Page<Entitlement>> {
            Ok(Page::empty())
        }

        async fn grants(
            &self,
            _resource: &Resource,
            _page: &PageRequest,
        ) -> ConnectorResult<Page<Grant>> {
            Ok(Page::empty())
        }
    }

    #[tokio::test]
    async fn test_default_apply_is_unsupported() {
        let change = EdgeChange::Grant {
            principal: ResourceId::new(ResourceKind::User, "0051"),
            entitlement: Entitlement {
                resource: ResourceId::new(ResourceKind::ConnectedApplication, "0H41"),
                slug: "assigned".to_string(),
                display_name: String::new(),
                description: String::new(),
                grantable_to: vec![],
            },
        };

        let err = ReadOnly.apply(change).await.unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_RESOURCE_TYPE");
        assert!(err.to_string().contains("connected_application"));
    }

    #[test]
    fn test_page_has_more() {
        let page: Page<u8> = Page::new(vec![1], "/next", Annotations::default());
        assert!(page.has_more());
        assert!(!Page::<u8>::empty().has_more());
    }
}
