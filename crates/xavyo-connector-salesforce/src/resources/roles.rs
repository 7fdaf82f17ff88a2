//! User roles.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;
use xavyo_connector::error::ConnectorResult;
use xavyo_connector::traits::{EdgeChange, EdgeResult, Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{Annotations, Entitlement, Grant, Resource, ResourceKind};

use crate::query::{tables, Query};
use crate::reconcile::Reconciler;
use crate::record::Record;
use crate::resources::users::user_field_grants;
use crate::resources::{entitlement, ASSIGNED_SLUG};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesforceRole {
    pub id: String,
    pub name: String,
}

impl SalesforceRole {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceKind::Role, &self.id, &self.name)
    }
}

pub fn role_entitlement(resource: &Resource) -> Entitlement {
    entitlement(
        resource,
        ASSIGNED_SLUG,
        format!("{} User Role", resource.display_name),
        format!("Has the {} role in Salesforce", resource.display_name),
        &[ResourceKind::User],
    )
}

pub struct RoleSyncer {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
}

impl RoleSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }
}

#[async_trait]
impl ResourceSyncer for RoleSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&Query::new(tables::USER_ROLE), &page.token, page.size)
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforceRole::from_record(r).to_resource())
            .collect();
        Ok(Page::new(
            resources,
            result.next_cursor,
            Annotations::with_rate_limits([result.rate_limit]),
        ))
    }

    async fn entitlements(
        &self,
        resource: &Resource,
        _page: &PageRequest,
    ) -> ConnectorResult<Page<Entitlement>> {
        Ok(Page::single(vec![role_entitlement(resource)]))
    }

    async fn grants(&self, resource: &Resource, page: &PageRequest) -> ConnectorResult<Page<Grant>> {
        user_field_grants(
            self.store.as_ref(),
            "UserRoleId",
            &role_entitlement(resource),
            page,
        )
        .await
    }

    async fn apply(&self, change: EdgeChange) -> ConnectorResult<EdgeResult> {
        self.reconciler.apply(change).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_entitlement() {
        let resource = Resource::new(ResourceKind::Role, "00E1", "CEO");
        let ent = role_entitlement(&resource);
        assert_eq!(ent.id(), "role:00E1:assigned");
        assert_eq!(ent.display_name, "CEO User Role");
        assert_eq!(ent.description, "Has the CEO role in Salesforce");
        assert_eq!(ent.grantable_to, vec![ResourceKind::User]);
    }
}
