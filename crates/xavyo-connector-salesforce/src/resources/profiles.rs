//! Profiles and the licenses behind them.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;
use xavyo_connector::error::ConnectorResult;
use xavyo_connector::traits::{EdgeChange, EdgeResult, Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{
    Annotations, Entitlement, Grant, RateLimitDescriptor, Resource, ResourceKind,
};

use crate::query::{tables, Query, PRIMARY_KEY};
use crate::reconcile::Reconciler;
use crate::record::Record;
use crate::resources::users::user_field_grants;
use crate::resources::{entitlement, ASSIGNED_SLUG};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesforceProfile {
    pub id: String,
    pub name: String,
    pub user_license_id: String,
}

impl SalesforceProfile {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
            user_license_id: record.str_or_empty("UserLicenseId").to_string(),
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceKind::Profile, &self.id, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLicense {
    pub id: String,
    pub name: String,
}

impl UserLicense {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
        }
    }
}

pub async fn get_profile_by_id(
    store: &dyn ObjectStore,
    profile_id: &str,
) -> ConnectorResult<(SalesforceProfile, Option<RateLimitDescriptor>)> {
    let query = Query::new(tables::PROFILE).where_eq(PRIMARY_KEY, profile_id);
    let (record, rate_limit) = store.get_single_object(&query).await?;
    Ok((SalesforceProfile::from_record(&record), rate_limit))
}

pub async fn get_profile_by_name(
    store: &dyn ObjectStore,
    name: &str,
) -> ConnectorResult<(SalesforceProfile, Option<RateLimitDescriptor>)> {
    let query = Query::new(tables::PROFILE).where_eq("Name", name);
    let (record, rate_limit) = store.get_single_object(&query).await?;
    Ok((SalesforceProfile::from_record(&record), rate_limit))
}

pub async fn get_user_license_by_id(
    store: &dyn ObjectStore,
    license_id: &str,
) -> ConnectorResult<(UserLicense, Option<RateLimitDescriptor>)> {
    let query = Query::new(tables::USER_LICENSE).where_eq(PRIMARY_KEY, license_id);
    let (record, rate_limit) = store.get_single_object(&query).await?;
    Ok((UserLicense::from_record(&record), rate_limit))
}

pub fn profile_entitlement(resource: &Resource) -> Entitlement {
    entitlement(
        resource,
        ASSIGNED_SLUG,
        format!("{} Profile", resource.display_name),
        format!("Has the {} profile in Salesforce", resource.display_name),
        &[ResourceKind::User],
    )
}

pub struct ProfileSyncer {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
}

impl ProfileSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }
}

#[async_trait]
impl ResourceSyncer for ProfileSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Profile
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&Query::new(tables::PROFILE), &page.token, page.size)
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforceProfile::from_record(r).to_resource())
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
        Ok(Page::single(vec![profile_entitlement(resource)]))
    }

    async fn grants(&self, resource: &Resource, page: &PageRequest) -> ConnectorResult<Page<Grant>> {
        user_field_grants(
            self.store.as_ref(),
            "ProfileId",
            &profile_entitlement(resource),
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
    use serde_json::json;

    #[test]
    fn test_profile_from_record() {
        let record = Record::from_value(
            tables::PROFILE,
            json!({"Id": "00e1", "Name": "Standard User", "UserLicenseId": "1001"}),
        )
        .unwrap();
        let profile = SalesforceProfile::from_record(&record);
        assert_eq!(profile.user_license_id, "1001");

        let ent = profile_entitlement(&profile.to_resource());
        assert_eq!(ent.display_name, "Standard User Profile");
        assert_eq!(ent.description, "Has the Standard User profile in Salesforce");
    }
}
