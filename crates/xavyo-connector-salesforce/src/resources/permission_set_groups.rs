//! Permission set groups.
//!
//! Grants run the other way round from the other kinds: the principal is a
//! permission set and the edge is a `PermissionSetGroupComponent` row.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use xavyo_connector::error::ConnectorResult;
use xavyo_connector::traits::{EdgeChange, EdgeResult, Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{Annotations, Entitlement, Grant, Resource, ResourceId, ResourceKind};

use crate::query::{tables, Query};
use crate::reconcile::Reconciler;
use crate::record::Record;
use crate::resources::{entitlement, ASSIGNED_SLUG};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesforcePermissionSetGroup {
    pub id: String,
    pub master_label: String,
    pub developer_name: String,
    pub description: String,
}

impl SalesforcePermissionSetGroup {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            master_label: record.str_or_empty("MasterLabel").to_string(),
            developer_name: record.str_or_empty("DeveloperName").to_string(),
            description: record.str_or_empty("Description").to_string(),
        }
    }

    pub fn to_resource(&self) -> Resource {
        let name = if self.master_label.is_empty() {
            &self.developer_name
        } else {
            &self.master_label
        };
        Resource::new(ResourceKind::PermissionSetGroup, &self.id, name)
            .with_profile("developer_name", self.developer_name.clone())
            .with_profile("description", self.description.clone())
    }
}

/// Typed view of a `PermissionSetGroupComponent` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSetGroupComponent {
    pub id: String,
    pub permission_set_group_id: String,
    pub permission_set_id: String,
    pub is_deleted: bool,
}

impl PermissionSetGroupComponent {
    pub fn from_record(record: &Record) -> ConnectorResult<Self> {
        Ok(Self {
            id: record.id().to_string(),
            permission_set_group_id: record.str_or_empty("PermissionSetGroupId").to_string(),
            permission_set_id: record.str_or_empty("PermissionSetId").to_string(),
            is_deleted: record.flag("IsDeleted")?,
        })
    }
}

pub fn permission_set_group_entitlement(resource: &Resource) -> Entitlement {
    entitlement(
        resource,
        ASSIGNED_SLUG,
        format!("{} Permission Set Group", resource.display_name),
        format!(
            "Has the {} permission set group in Salesforce",
            resource.display_name
        ),
        &[ResourceKind::PermissionSet],
    )
}

pub struct PermissionSetGroupSyncer {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
}

impl PermissionSetGroupSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }
}

#[async_trait]
impl ResourceSyncer for PermissionSetGroupSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PermissionSetGroup
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&Query::new(tables::PERMISSION_SET_GROUP), &page.token, page.size)
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforcePermissionSetGroup::from_record(r).to_resource())
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
        Ok(Page::single(vec![permission_set_group_entitlement(resource)]))
    }

    #[instrument(skip(self, resource, page), fields(permission_set_group_id = %resource.id.id))]
    async fn grants(&self, resource: &Resource, page: &PageRequest) -> ConnectorResult<Page<Grant>> {
        let query = Query::new(tables::PERMISSION_SET_GROUP_COMPONENT)
            .where_eq("PermissionSetGroupId", &resource.id.id);
        let result = self.store.query(&query, &page.token, page.size).await?;
        let assigned = permission_set_group_entitlement(resource);

        let mut grants = Vec::with_capacity(result.records.len());
        for record in &result.records {
            let component = PermissionSetGroupComponent::from_record(record)?;
            if component.is_deleted {
                debug!(component_id = %component.id, "skipping deleted component");
                continue;
            }
            grants.push(Grant {
                entitlement: assigned.clone(),
                principal: ResourceId::new(ResourceKind::PermissionSet, component.permission_set_id),
            });
        }

        Ok(Page::new(
            grants,
            result.next_cursor,
            Annotations::with_rate_limits([result.rate_limit]),
        ))
    }

    async fn apply(&self, change: EdgeChange) -> ConnectorResult<EdgeResult> {
        self.reconciler.apply(change).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_resource_uses_master_label() {
        let record = Record::from_value(
            tables::PERMISSION_SET_GROUP,
            json!({"Id": "0PG1", "MasterLabel": "Sales Bundle", "DeveloperName": "Sales_Bundle"}),
        )
        .unwrap();
        let resource = SalesforcePermissionSetGroup::from_record(&record).to_resource();
        assert_eq!(resource.display_name, "Sales Bundle");

        let ent = permission_set_group_entitlement(&resource);
        assert_eq!(ent.display_name, "Sales Bundle Permission Set Group");
        assert_eq!(ent.grantable_to, vec![ResourceKind::PermissionSet]);
    }

    #[test]
    fn test_component_from_record() {
        let record = Record::from_value(
            tables::PERMISSION_SET_GROUP_COMPONENT,
            json!({"Id": "0PH1", "PermissionSetGroupId": "0PG1", "PermissionSetId": "0PS1", "IsDeleted": false}),
        )
        .unwrap();
        let component = PermissionSetGroupComponent::from_record(&record).unwrap();
        assert_eq!(component.permission_set_id, "0PS1");
        assert!(!component.is_deleted);
    }
}
