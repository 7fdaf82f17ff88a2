//! Connected applications. Listed for visibility only.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;
use xavyo_connector::error::ConnectorResult;
use xavyo_connector::traits::{Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{Annotations, Entitlement, Grant, Resource, ResourceKind};

use crate::query::{tables, Query};
use crate::record::Record;
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesforceConnectedApp {
    pub id: String,
    pub name: String,
    pub created_by_id: String,
    pub created_date: String,
    pub last_modified_date: String,
}

impl SalesforceConnectedApp {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.str_or_empty("Name").to_string(),
            created_by_id: record.str_or_empty("CreatedById").to_string(),
            created_date: record.str_or_empty("CreatedDate").to_string(),
            last_modified_date: record.str_or_empty("LastModifiedDate").to_string(),
        }
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceKind::ConnectedApplication, &self.id, &self.name)
            .with_profile("created_by_id", self.created_by_id.clone())
            .with_profile("created_date", self.created_date.clone())
            .with_profile("last_modified_date", self.last_modified_date.clone())
    }
}

pub struct ConnectedAppSyncer {
    store: Arc<dyn ObjectStore>,
}

impl ConnectedAppSyncer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceSyncer for ConnectedAppSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ConnectedApplication
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(
                &Query::new(tables::CONNECTED_APPLICATION),
                &page.token,
                page.size,
            )
            .await?;
        let resources = result
            .records
            .iter()
            .map(|r| SalesforceConnectedApp::from_record(r).to_resource())
            .collect();
        Ok(Page::new(
            resources,
            result.next_cursor,
            Annotations::with_rate_limits([result.rate_limit]),
        ))
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_app_profile() {
        let record = Record::from_value(
            tables::CONNECTED_APPLICATION,
            json!({
                "attributes": {"type": "ConnectedApplication"},
                "Id": "0H41",
                "Name": "Slack",
                "CreatedById": "0051",
                "CreatedDate": "2023-01-01T00:00:00.000+0000",
                "LastModifiedDate": "2023-06-01T00:00:00.000+0000"
            }),
        )
        .unwrap();
        let resource = SalesforceConnectedApp::from_record(&record).to_resource();
        assert_eq!(resource.display_name, "Slack");
        assert_eq!(resource.profile["created_by_id"], "0051");
        assert_eq!(resource.profile["last_modified_date"], "2023-06-01T00:00:00.000+0000");
    }
}
