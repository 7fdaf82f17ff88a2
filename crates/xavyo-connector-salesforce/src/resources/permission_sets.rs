//! Permission sets and their assignments.

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
pub struct SalesforcePermissionSet {
    pub id: String,
    pub name: String,
    pub label: String,
    pub set_type: String,
    pub profile_id: String,
    pub profile_name: Option<String>,
}

impl SalesforcePermissionSet {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
            label: record.str_or_empty("Label").to_string(),
            set_type: record.str_or_empty("Type").to_string(),
            profile_id: record.str_or_empty("ProfileId").to_string(),
            profile_name: record.related_string("Profile", "Name").map(str::to_string),
        }
    }

    /// `<Type> - <Name>`, named after the owning profile for profile-owned sets.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.profile_name.as_deref().unwrap_or(&self.name);
        if self.set_type.is_empty() {
            name.to_string()
        } else {
            format!("{} - {}", self.set_type, name)
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceKind::PermissionSet, &self.id, self.display_name())
            .with_profile("label", self.label.clone())
    }
}

/// Typed view of a `PermissionSetAssignment` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSetAssignment {
    pub id: String,
    pub permission_set_id: String,
    pub assignee_id: String,
    pub is_active: bool,
}

impl PermissionSetAssignment {
    /// An assignment without an `IsActive` value counts as active.
    pub fn from_record(record: &Record) -> ConnectorResult<Self> {
        Ok(Self {
            id: record.id().to_string(),
            permission_set_id: record.str_or_empty("PermissionSetId").to_string(),
            assignee_id: record.str_or_empty("AssigneeId").to_string(),
            is_active: record.flag_or("IsActive", true)?,
        })
    }
}

pub fn permission_set_entitlement(resource: &Resource) -> Entitlement {
    entitlement(
        resource,
        ASSIGNED_SLUG,
        format!("{} Permission Set", resource.display_name),
        format!(
            "Has the {} permission set in Salesforce",
            resource.display_name
        ),
        &[ResourceKind::User],
    )
}

pub struct PermissionSetSyncer {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
}

impl PermissionSetSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }
}

#[async_trait]
impl ResourceSyncer for PermissionSetSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PermissionSet
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&Query::new(tables::PERMISSION_SET), &page.token, page.size)
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforcePermissionSet::from_record(r).to_resource())
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
        Ok(Page::single(vec![permission_set_entitlement(resource)]))
    }

    #[instrument(skip(self, resource, page), fields(permission_set_id = %resource.id.id))]
    async fn grants(&self, resource: &Resource, page: &PageRequest) -> ConnectorResult<Page<Grant>> {
        let query =
            Query::new(tables::PERMISSION_SET_ASSIGNMENT).where_eq("PermissionSetId", &resource.id.id);
        let result = self.store.query(&query, &page.token, page.size).await?;
        let assigned = permission_set_entitlement(resource);

        let mut grants = Vec::with_capacity(result.records.len());
        for record in &result.records {
            let assignment = PermissionSetAssignment::from_record(record)?;
            if !assignment.is_active {
                debug!(assignment_id = %assignment.id, "skipping inactive assignment");
                continue;
            }
            grants.push(Grant {
                entitlement: assigned.clone(),
                principal: ResourceId::new(ResourceKind::User, assignment.assignee_id),
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
