//! Common test utilities for xavyo-connector-salesforce integration tests.
//!
//! [`InMemoryStore`] evaluates structured queries against seeded rows so the
//! syncers, the reconciler and provisioning can be driven without HTTP.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Once;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::{RateLimitDescriptor, RateLimitStatus};
use xavyo_connector_salesforce::pagination::effective_page_size;
use xavyo_connector_salesforce::query::{tables, Operator, Predicate, Query, PRIMARY_KEY};
use xavyo_connector_salesforce::{CurrentUser, ObjectStore, QueryPage, Record, RecordUpdate};

static TRACING: Once = Once::new();

/// Route test logs through the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Descriptor every in-memory call reports.
pub fn test_rate_limit() -> RateLimitDescriptor {
    RateLimitDescriptor {
        status: RateLimitStatus::Ok,
        limit: 15000,
        remaining: 42,
    }
}

/// Test data factory for standard users.
pub fn create_test_user(id: &str, email_prefix: &str) -> Value {
    json!({
        "Id": id,
        "FirstName": "Test",
        "LastName": format!("User {}", email_prefix),
        "Email": format!("{}@example.com", email_prefix),
        "Username": format!("{}@example.com.acme", email_prefix),
        "IsActive": true,
        "UserType": "Standard",
        "ProfileId": "",
        "UserRoleId": "",
        "LastLoginDate": "2024-03-01T09:15:00.000+0000"
    })
}

/// Test data factory for deactivated users.
pub fn create_inactive_user(id: &str, email_prefix: &str) -> Value {
    let mut user = create_test_user(id, email_prefix);
    user["IsActive"] = json!(false);
    user
}

/// Test data factory for users of a given `UserType`.
pub fn create_typed_user(id: &str, email_prefix: &str, user_type: &str) -> Value {
    let mut user = create_test_user(id, email_prefix);
    user["UserType"] = json!(user_type);
    user
}

pub fn create_user_login(id: &str, user_id: &str, frozen: bool) -> Value {
    json!({
        "Id": id,
        "UserId": user_id,
        "IsFrozen": frozen,
        "IsPasswordLocked": false
    })
}

pub fn create_test_group(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "DeveloperName": name.replace(' ', "_"),
        "Type": "Regular",
        "RelatedId": null,
        "Related": null
    })
}

pub fn create_group_member(id: &str, group_id: &str, member_id: &str) -> Value {
    json!({"Id": id, "GroupId": group_id, "UserOrGroupId": member_id})
}

pub fn create_test_role(id: &str, name: &str) -> Value {
    json!({"Id": id, "Name": name, "DeveloperName": name.replace(' ', "_")})
}

pub fn create_test_profile(id: &str, name: &str, license_id: &str) -> Value {
    json!({"Id": id, "Name": name, "UserLicenseId": license_id})
}

pub fn create_test_license(id: &str, name: &str) -> Value {
    json!({"Id": id, "Name": name})
}

pub fn create_test_permission_set(id: &str, label: &str) -> Value {
    json!({
        "Id": id,
        "Name": label.replace(' ', "_"),
        "Label": label,
        "Type": "Regular",
        "ProfileId": null,
        "Profile": null
    })
}

pub fn create_permission_set_assignment(id: &str, permission_set_id: &str, assignee_id: &str) -> Value {
    json!({
        "Id": id,
        "PermissionSetId": permission_set_id,
        "AssigneeId": assignee_id,
        "IsActive": true
    })
}

pub fn create_test_permission_set_group(id: &str, label: &str) -> Value {
    json!({
        "Id": id,
        "DeveloperName": label.replace(' ', "_"),
        "MasterLabel": label,
        "Description": format!("Test group: {}", label)
    })
}

pub fn create_permission_set_group_component(
    id: &str,
    group_id: &str,
    permission_set_id: &str,
) -> Value {
    json!({
        "Id": id,
        "PermissionSetGroupId": group_id,
        "PermissionSetId": permission_set_id,
        "IsDeleted": false
    })
}

pub fn create_test_connected_app(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "CreatedById": "0051",
        "CreatedDate": "2024-01-01T00:00:00.000+0000",
        "LastModifiedDate": "2024-02-01T00:00:00.000+0000"
    })
}

/// Id prefix the store assigns to rows it creates.
fn id_prefix(table: &str) -> &'static str {
    match table {
        tables::USER => "005",
        tables::GROUP => "00G",
        tables::GROUP_MEMBER => "011",
        tables::PERMISSION_SET_ASSIGNMENT => "0Pa",
        tables::PERMISSION_SET_GROUP_COMPONENT => "0PC",
        _ => "a00",
    }
}

/// Field value as compared by predicates.
fn as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// In-memory object store.
///
/// Rows are kept per table and returned ordered by primary key. Page tokens
/// are offsets into the re-evaluated query.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    next_id: AtomicU32,
    cache_clears: AtomicUsize,
    hidden_email_matches: AtomicU32,
    failing_table: Mutex<Option<String>>,
    password_resets: Mutex<Vec<String>>,
    updates: Mutex<Vec<RecordUpdate>>,
    queries: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Seed one row.
    pub fn insert(&self, table: &str, row: Value) {
        if let Value::Object(fields) = row {
            self.rows
                .lock()
                .entry(table.to_string())
                .or_default()
                .push(fields);
        }
    }

    pub fn with_rows(self, table: &str, rows: impl IntoIterator<Item = Value>) -> Self {
        for row in rows {
            self.insert(table, row);
        }
        self
    }

    /// Rows of a table, ordered by primary key.
    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        let mut rows = self.rows.lock().get(table).cloned().unwrap_or_default();
        rows.sort_by(|a, b| as_text(a.get(PRIMARY_KEY)).cmp(&as_text(b.get(PRIMARY_KEY))));
        rows
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Map<String, Value>> {
        self.rows(table)
            .into_iter()
            .find(|row| as_text(row.get(PRIMARY_KEY)) == id)
    }

    pub fn field(&self, table: &str, id: &str, field: &str) -> Value {
        self.row(table, id)
            .and_then(|row| row.get(field).cloned())
            .unwrap_or(Value::Null)
    }

    /// Make the next `count` matching user-by-email lookups come back empty,
    /// the way a freshly written user is not yet visible to queries.
    pub fn hide_email_matches(&self, count: u32) {
        self.hidden_email_matches.store(count, Ordering::SeqCst);
    }

    /// Fail every query against `table`.
    pub fn fail_queries_on(&self, table: &str) {
        *self.failing_table.lock() = Some(table.to_string());
    }

    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }

    pub fn password_resets(&self) -> Vec<String> {
        self.password_resets.lock().clone()
    }

    pub fn updates(&self) -> Vec<RecordUpdate> {
        self.updates.lock().clone()
    }

    /// Rendered text of every query run so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    fn matches(&self, row: &Map<String, Value>, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Compare { field, op, value } => {
                let actual = as_text(row.get(field));
                match op {
                    Operator::Eq => actual == *value,
                    Operator::NotEq => actual != *value,
                    Operator::LessThan => actual < *value,
                }
            }
            Predicate::InSubquery { field, subquery } => {
                let column = subquery
                    .columns()
                    .first()
                    .map_or(PRIMARY_KEY, String::as_str)
                    .to_string();
                let actual = as_text(row.get(field));
                self.evaluate(subquery)
                    .iter()
                    .any(|candidate| as_text(candidate.get(&column)) == actual)
            }
        }
    }

    fn evaluate(&self, query: &Query) -> Vec<Map<String, Value>> {
        self.rows(query.table())
            .into_iter()
            .filter(|row| query.predicates().iter().all(|p| self.matches(row, p)))
            .collect()
    }

    fn is_email_lookup(query: &Query) -> bool {
        query.table() == tables::USER
            && query.predicates().iter().any(|p| {
                matches!(p, Predicate::Compare { field, op: Operator::Eq, .. } if field == "Email")
            })
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn query(
        &self,
        query: &Query,
        cursor: &str,
        page_size: i64,
    ) -> ConnectorResult<QueryPage> {
        self.queries.lock().push(query.to_string());
        if self.failing_table.lock().as_deref() == Some(query.table()) {
            return Err(ConnectorError::remote_query(format!(
                "injected failure on {}",
                query.table()
            )));
        }

        let mut matched = self.evaluate(query);
        if !matched.is_empty()
            && Self::is_email_lookup(query)
            && self
                .hidden_email_matches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            matched.clear();
        }

        let offset: usize = if cursor.is_empty() {
            0
        } else {
            cursor
                .trim_start_matches("/query/offset-")
                .parse()
                .map_err(|_| ConnectorError::invalid_request(format!("bad cursor {cursor}")))?
        };
        let size = effective_page_size(page_size) as usize;
        let end = (offset + size).min(matched.len());
        let next_cursor = if end < matched.len() {
            format!("/query/offset-{end}")
        } else {
            String::new()
        };

        let records = matched
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|fields| Record::new(query.table(), fields.clone()))
            .collect();

        Ok(QueryPage {
            records,
            next_cursor,
            rate_limit: Some(test_rate_limit()),
        })
    }

    async fn get_object(
        &self,
        table: &str,
        id: &str,
    ) -> ConnectorResult<(Record, Option<RateLimitDescriptor>)> {
        let row = self
            .row(table, id)
            .ok_or_else(|| ConnectorError::not_found(table, format!("Id = '{id}'")))?;
        Ok((Record::new(table, row), Some(test_rate_limit())))
    }

    async fn create_object(
        &self,
        table: &str,
        mut fields: Map<String, Value>,
    ) -> ConnectorResult<(String, Option<RateLimitDescriptor>)> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}{:012}", id_prefix(table), n);
        fields.insert(PRIMARY_KEY.to_string(), json!(id));
        if table == tables::USER {
            fields.entry("IsActive").or_insert(json!(true));
            fields.entry("UserType").or_insert(json!("Standard"));
        }
        self.insert(table, Value::Object(fields));
        Ok((id, Some(test_rate_limit())))
    }

    async fn update_object(
        &self,
        update: &RecordUpdate,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(&update.table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| as_text(row.get(PRIMARY_KEY)) == update.id)
            })
            .ok_or_else(|| {
                ConnectorError::not_found(&update.table, format!("Id = '{}'", update.id))
            })?;
        for (field, value) in &update.fields {
            row.insert(field.clone(), value.clone());
        }
        drop(rows);
        self.updates.lock().push(update.clone());
        Ok(Some(test_rate_limit()))
    }

    async fn delete_object(
        &self,
        table: &str,
        id: &str,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        let mut rows = self.rows.lock();
        let table_rows = rows.entry(table.to_string()).or_default();
        let before = table_rows.len();
        table_rows.retain(|row| as_text(row.get(PRIMARY_KEY)) != id);
        if table_rows.len() == before {
            return Err(ConnectorError::not_found(table, format!("Id = '{id}'")));
        }
        Ok(Some(test_rate_limit()))
    }

    async fn send_password_reset(
        &self,
        user_id: &str,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        self.password_resets.lock().push(user_id.to_string());
        Ok(Some(test_rate_limit()))
    }

    async fn current_user(&self) -> ConnectorResult<CurrentUser> {
        Ok(CurrentUser {
            id: "005000000000001".to_string(),
            company_name: "Acme".to_string(),
            ..CurrentUser::default()
        })
    }

    fn clear_caches(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }
}
