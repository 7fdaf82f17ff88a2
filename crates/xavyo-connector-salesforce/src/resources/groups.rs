//! Public groups, queues and role-derived groups.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use xavyo_connector::error::ConnectorResult;
use xavyo_connector::traits::{EdgeChange, EdgeResult, Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{Annotations, Entitlement, Grant, Resource, ResourceId, ResourceKind};

use crate::principal::PrincipalKind;
use crate::query::{tables, Query};
use crate::reconcile::Reconciler;
use crate::record::Record;
use crate::resources::{entitlement, MEMBER_SLUG};
use crate::store::ObjectStore;

/// Typed view of a `Group` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesforceGroup {
    pub id: String,
    pub name: String,
    pub developer_name: String,
    pub group_type: String,
    pub related_id: String,
    pub related_name: Option<String>,
}

impl SalesforceGroup {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
            developer_name: record.str_or_empty("DeveloperName").to_string(),
            group_type: record.str_or_empty("Type").to_string(),
            related_id: record.str_or_empty("RelatedId").to_string(),
            related_name: record.related_string("Related", "Name").map(str::to_string),
        }
    }

    /// Name shown for the group.
    ///
    /// Role groups take the role's name, suffixed with the membership scope.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.related_name.as_deref().unwrap_or(&self.name);
        match self.group_type.as_str() {
            "Organization" => "All Internal Users".to_string(),
            "Role" => format!("{name} (role)"),
            "RoleAndSubordinates" => format!("{name} (role and subordinates)"),
            _ => name.to_string(),
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceKind::Group, &self.id, self.display_name())
            .with_profile("developer_name", self.developer_name.clone())
            .with_profile("type", self.group_type.clone())
    }
}

/// Membership entitlement of a group resource.
pub fn member_entitlement(resource: &Resource) -> Entitlement {
    entitlement(
        resource,
        MEMBER_SLUG,
        format!("{} Group Member", resource.display_name),
        format!(
            "Is member of the {} group in Salesforce",
            resource.display_name
        ),
        &[ResourceKind::User, ResourceKind::Group],
    )
}

pub struct GroupSyncer {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
}

impl GroupSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }
}

#[async_trait]
impl ResourceSyncer for GroupSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Group
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&Query::new(tables::GROUP), &page.token, page.size)
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforceGroup::from_record(r).to_resource())
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
        Ok(Page::single(vec![member_entitlement(resource)]))
    }

    #[instrument(skip(self, resource, page), fields(group_id = %resource.id.id))]
    async fn grants(&self, resource: &Resource, page: &PageRequest) -> ConnectorResult<Page<Grant>> {
        let query = Query::new(tables::GROUP_MEMBER).where_eq("GroupId", &resource.id.id);
        let result = self.store.query(&query, &page.token, page.size).await?;
        let member = member_entitlement(resource);

        let mut grants = Vec::with_capacity(result.records.len());
        for record in &result.records {
            let principal_id = record.str_or_empty("UserOrGroupId");
            let Some(kind) = PrincipalKind::from_id(principal_id) else {
                debug!(principal_id = %principal_id, "unknown member id prefix, skipping");
                continue;
            };
            grants.push(Grant {
                entitlement: member.clone(),
                principal: ResourceId::new(kind.resource_kind(), principal_id),
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

    fn group(value: serde_json::Value) -> SalesforceGroup {
        SalesforceGroup::from_record(&Record::from_value(tables::GROUP, value).unwrap())
    }

    #[test]
    fn test_display_names() {
        let org = group(json!({"Id": "00G1", "Name": "", "Type": "Organization"}));
        assert_eq!(org.display_name(), "All Internal Users");

        let role = group(json!({
            "Id": "00G2",
            "Name": "",
            "Type": "Role",
            "RelatedId": "00E1",
            "Related": {"Name": "CEO"}
        }));
        assert_eq!(role.display_name(), "CEO (role)");

        let subs = group(json!({
            "Id": "00G3",
            "Name": "Fallback",
            "Type": "RoleAndSubordinates",
            "Related": null
        }));
        assert_eq!(subs.display_name(), "Fallback (role and subordinates)");

        let regular = group(json!({"Id": "00G4", "Name": "Sales", "Type": "Regular"}));
        assert_eq!(regular.display_name(), "Sales");
    }

    #[test]
    fn test_member_entitlement() {
        let resource = Resource::new(ResourceKind::Group, "00G4", "Sales");
        let ent = member_entitlement(&resource);
        assert_eq!(ent.id(), "group:00G4:member");
        assert_eq!(ent.display_name, "Sales Group Member");
        assert_eq!(ent.description, "Is member of the Sales group in Salesforce");
    }
}
