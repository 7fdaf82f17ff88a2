//! Object access layer.
//!
//! [`ObjectStore`] is the single chokepoint for remote reads and writes.
//! Implementors supply the raw primitives; point lookups and single-field
//! writes are provided on top of them. Nothing at this layer retries.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::{Annotations, RateLimitDescriptor};

use crate::query::Query;
use crate::record::{Record, RecordUpdate};

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub records: Vec<Record>,
    /// Empty when there are no more pages.
    pub next_cursor: String,
    pub rate_limit: Option<RateLimitDescriptor>,
}

/// Identity the client is authenticated as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Generic create/read/update/delete over remote objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page. A non-empty cursor continues a previous listing and
    /// the query is ignored.
    async fn query(&self, query: &Query, cursor: &str, page_size: i64)
        -> ConnectorResult<QueryPage>;

    /// Fetch one object by primary key.
    async fn get_object(
        &self,
        table: &str,
        id: &str,
    ) -> ConnectorResult<(Record, Option<RateLimitDescriptor>)>;

    /// Create an object and return its new primary key.
    async fn create_object(
        &self,
        table: &str,
        fields: Map<String, Value>,
    ) -> ConnectorResult<(String, Option<RateLimitDescriptor>)>;

    async fn update_object(&self, update: &RecordUpdate)
        -> ConnectorResult<Option<RateLimitDescriptor>>;

    async fn delete_object(&self, table: &str, id: &str)
        -> ConnectorResult<Option<RateLimitDescriptor>>;

    /// Trigger the password-reset email for a user.
    async fn send_password_reset(&self, user_id: &str)
        -> ConnectorResult<Option<RateLimitDescriptor>>;

    async fn current_user(&self) -> ConnectorResult<CurrentUser>;

    /// Drop any locally cached responses.
    fn clear_caches(&self);

    /// Point lookup expecting at most one match.
    ///
    /// Zero matches is [`ConnectorError::NotFound`]. More than one is logged
    /// and the first record is returned.
    async fn get_single_object(
        &self,
        query: &Query,
    ) -> ConnectorResult<(Record, Option<RateLimitDescriptor>)> {
        let page = self.query(query, "", 2).await?;
        let count = page.records.len();
        let mut records = page.records.into_iter();
        let Some(first) = records.next() else {
            return Err(ConnectorError::not_found(query.table(), query.criteria()));
        };
        if count > 1 {
            warn!(
                table = %query.table(),
                criteria = %query.criteria(),
                "point lookup matched more than one record, using the first"
            );
        }
        Ok((first, page.rate_limit))
    }

    /// Strict lookup: `None` when absent, [`ConnectorError::AmbiguousResult`]
    /// when more than one record matches.
    async fn find_unique(
        &self,
        query: &Query,
    ) -> ConnectorResult<(Option<Record>, Option<RateLimitDescriptor>)> {
        let page = self.query(query, "", 2).await?;
        if page.records.len() > 1 {
            return Err(ConnectorError::AmbiguousResult {
                table: query.table().to_string(),
                count: page.records.len(),
            });
        }
        Ok((page.records.into_iter().next(), page.rate_limit))
    }

    /// Read-modify-write of one field through the copy-for-update path.
    async fn set_field(
        &self,
        table: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> ConnectorResult<Annotations> {
        let (record, read_limit) = self.get_object(table, id).await?;
        let update = record.copy_for_update(&[field]).set(field, value);
        debug!(table = %table, id = %id, field = %field, "setting field");
        let write_limit = self.update_object(&update).await?;
        Ok(Annotations::with_rate_limits([read_limit, write_limit]))
    }

    /// Clear one field, but only while it still holds `expected`.
    ///
    /// The check and the write are separate calls, so a concurrent change
    /// between them is not detected.
    async fn clear_field(
        &self,
        table: &str,
        id: &str,
        field: &str,
        expected: &str,
    ) -> ConnectorResult<Annotations> {
        let (record, read_limit) = self.get_object(table, id).await?;
        if record.string(field) != Some(expected) {
            return Err(ConnectorError::PreconditionFailed {
                field: field.to_string(),
                value: expected.to_string(),
            });
        }
        let update = record.copy_for_update(&[field]).set(field, Value::Null);
        debug!(table = %table, id = %id, field = %field, "clearing field");
        let write_limit = self.update_object(&update).await?;
        Ok(Annotations::with_rate_limits([read_limit, write_limit]))
    }
}
