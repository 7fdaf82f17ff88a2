//! Users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::traits::{Page, PageRequest, ResourceSyncer};
use xavyo_connector::types::{
    Annotations, Entitlement, Grant, RateLimitDescriptor, Resource, ResourceId, ResourceKind,
    UserStatus, UserTraits,
};

use crate::provisioning::validate_email;
use crate::query::{tables, Query};
use crate::record::Record;
use crate::store::ObjectStore;

/// `UserType` of regular internal users.
pub const STANDARD_USER_TYPE: &str = "Standard";

/// Portal, community and guest user types that are never synced.
pub const USER_TYPES_TO_SKIP: &[&str] = &[
    "CspLitePortal",
    "CustomerSuccess",
    "PowerCustomerSuccess",
    "CsnOnly",
    "Guest",
];

/// Typed view of a `User` record.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesforceUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub user_type: String,
    pub profile_id: String,
    pub user_role_id: String,
    pub last_login: Option<DateTime<Utc>>,
}

impl SalesforceUser {
    pub fn from_record(record: &Record) -> ConnectorResult<Self> {
        Ok(Self {
            id: record.id().to_string(),
            first_name: record.str_or_empty("FirstName").to_string(),
            last_name: record.str_or_empty("LastName").to_string(),
            email: record.str_or_empty("Email").to_string(),
            username: record.str_or_empty("Username").to_string(),
            is_active: record.flag("IsActive")?,
            user_type: record.str_or_empty("UserType").to_string(),
            profile_id: record.str_or_empty("ProfileId").to_string(),
            user_role_id: record.str_or_empty("UserRoleId").to_string(),
            last_login: record.datetime("LastLoginDate"),
        })
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Whether this user type is excluded from sync.
    #[must_use]
    pub fn is_skipped_type(&self) -> bool {
        USER_TYPES_TO_SKIP.contains(&self.user_type.as_str())
    }
}

/// Typed view of a `UserLogin` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLogin {
    pub id: String,
    pub user_id: String,
    pub is_frozen: bool,
    pub is_password_locked: bool,
}

impl UserLogin {
    pub fn from_record(record: &Record) -> ConnectorResult<Self> {
        Ok(Self {
            id: record.id().to_string(),
            user_id: record.str_or_empty("UserId").to_string(),
            is_frozen: record.flag("IsFrozen")?,
            is_password_locked: record.flag("IsPasswordLocked")?,
        })
    }
}

/// Login status of a user; `None` when the org has no login row for it.
pub async fn get_user_login(
    store: &dyn ObjectStore,
    user_id: &str,
) -> ConnectorResult<(Option<UserLogin>, Option<RateLimitDescriptor>)> {
    let query = Query::new(tables::USER_LOGIN).where_eq("UserId", user_id);
    let page = store.query(&query, "", 1).await?;
    let login = page
        .records
        .first()
        .map(UserLogin::from_record)
        .transpose()?;
    Ok((login, page.rate_limit))
}

/// Find a syncable user by email.
///
/// The email is validated first since it is interpolated into the query.
/// Users of skipped types never match.
#[instrument(skip(store))]
pub async fn get_user_by_email(
    store: &dyn ObjectStore,
    email: &str,
) -> ConnectorResult<(SalesforceUser, Option<RateLimitDescriptor>)> {
    validate_email(email)?;

    let query = Query::new(tables::USER).where_eq("Email", email);
    let page = store.query(&query, "", 0).await?;
    for record in &page.records {
        let user = SalesforceUser::from_record(record)?;
        if user.is_skipped_type() {
            debug!(user_id = %user.id, user_type = %user.user_type, "skipping user type");
            continue;
        }
        return Ok((user, page.rate_limit));
    }

    Err(ConnectorError::not_found(tables::USER, query.criteria()))
}

/// Normalized user resource.
pub fn user_resource(
    user: &SalesforceUser,
    login: Option<&UserLogin>,
    use_username_for_email: bool,
) -> Resource {
    let frozen = login.is_some_and(|l| l.is_frozen);
    let status = if user.is_active && !frozen {
        UserStatus::Enabled
    } else {
        UserStatus::Disabled
    };
    let email = if use_username_for_email {
        user.username.clone()
    } else {
        user.email.clone()
    };

    Resource::new(ResourceKind::User, &user.id, user.full_name())
        .with_profile("full_name", user.full_name())
        .with_profile("username", user.username.clone())
        .with_profile("account_type", user.user_type.clone())
        .with_profile("email", email.clone())
        .with_profile("id", user.id.clone())
        .with_user_traits(UserTraits {
            status,
            email,
            login: user.username.clone(),
            last_login: user.last_login,
        })
}

/// Standard users whose `field` equals `value`.
pub(crate) fn standard_users_where(field: &str, value: &str) -> Query {
    Query::with_columns(tables::USER, ["Id"])
        .where_eq("UserType", STANDARD_USER_TYPE)
        .where_eq(field, value)
}

/// One page of user grants for a single-valued user field (role, profile).
pub(crate) async fn user_field_grants(
    store: &dyn ObjectStore,
    field: &str,
    entitlement: &Entitlement,
    page: &PageRequest,
) -> ConnectorResult<Page<Grant>> {
    let query = standard_users_where(field, &entitlement.resource.id);
    let result = store.query(&query, &page.token, page.size).await?;
    let grants = result
        .records
        .iter()
        .map(|record| Grant {
            entitlement: entitlement.clone(),
            principal: ResourceId::new(ResourceKind::User, record.id()),
        })
        .collect();
    Ok(Page::new(
        grants,
        result.next_cursor,
        Annotations::with_rate_limits([result.rate_limit]),
    ))
}

/// Listing switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSyncOptions {
    pub use_username_for_email: bool,
    pub sync_deactivated_users: bool,
    pub sync_non_standard_users: bool,
}

impl Default for UserSyncOptions {
    fn default() -> Self {
        Self {
            use_username_for_email: false,
            sync_deactivated_users: true,
            sync_non_standard_users: false,
        }
    }
}

/// Lists users. Users carry no entitlements; activation is an action.
pub struct UserSyncer {
    store: Arc<dyn ObjectStore>,
    options: UserSyncOptions,
}

impl UserSyncer {
    pub fn new(store: Arc<dyn ObjectStore>, options: UserSyncOptions) -> Self {
        Self { store, options }
    }

    fn list_query(&self) -> Query {
        let query = Query::new(tables::USER);
        if self.options.sync_non_standard_users {
            query
        } else {
            query.where_eq("UserType", STANDARD_USER_TYPE)
        }
    }
}

#[async_trait]
impl ResourceSyncer for UserSyncer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    #[instrument(skip(self, page), fields(token = %page.token))]
    async fn list(&self, page: &PageRequest) -> ConnectorResult<Page<Resource>> {
        let result = self
            .store
            .query(&self.list_query(), &page.token, page.size)
            .await?;
        let mut annotations = Annotations::with_rate_limits([result.rate_limit]);

        let mut resources = Vec::with_capacity(result.records.len());
        for record in &result.records {
            let user = SalesforceUser::from_record(record)?;

            if user.user_type.is_empty() {
                error!(user_id = %user.id, "user has no type, skipping");
                continue;
            }
            if user.is_skipped_type() {
                debug!(user_id = %user.id, user_type = %user.user_type, "skipping user type");
                continue;
            }
            if !user.is_active && !self.options.sync_deactivated_users {
                debug!(user_id = %user.id, "skipping deactivated user");
                continue;
            }

            // one failed login lookup aborts the page
            let (login, rate_limit) = get_user_login(self.store.as_ref(), &user.id).await?;
            annotations.push_rate_limit(rate_limit);

            resources.push(user_resource(
                &user,
                login.as_ref(),
                self.options.use_username_for_email,
            ));
        }

        Ok(Page::new(resources, result.next_cursor, annotations))
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
