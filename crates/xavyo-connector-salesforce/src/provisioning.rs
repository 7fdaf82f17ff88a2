//! Account provisioning.
//!
//! Creating or reactivating a user is followed by a read-back by email. The
//! remote side is eventually consistent, so that read is retried with a
//! linear backoff and the local query cache is dropped before every attempt.

use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::{Annotations, RateLimitDescriptor, Resource};

use crate::config::RetrySettings;
use crate::query::tables;
use crate::reconcile::Reconciler;
use crate::resources::users::{get_user_by_email, get_user_login, user_resource, SalesforceUser};
use crate::store::ObjectStore;

/// Maximum email length (RFC 5321).
const MAX_EMAIL_LENGTH: usize = 254;

const RETRY_OPERATION: &str = "get user by email";

/// Validate an email address before it is used in a query or create call.
///
/// Quotes and backslashes are rejected because the value is embedded in
/// query text.
pub fn validate_email(email: &str) -> ConnectorResult<()> {
    let invalid = |reason: &str| ConnectorError::invalid_request(format!("invalid email '{email}': {reason}"));

    if email.is_empty() {
        return Err(invalid("email is empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid("exceeds maximum length"));
    }
    if email.contains(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    if email.contains(['\'', '"', '\\']) {
        return Err(invalid("contains quote or backslash"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid("must contain exactly one '@'"));
    };
    if domain.contains('@') {
        return Err(invalid("must contain exactly one '@'"));
    }
    if local.is_empty() {
        return Err(invalid("local part is empty"));
    }
    if domain.is_empty() {
        return Err(invalid("domain is empty"));
    }
    if !domain.contains('.') {
        return Err(invalid("domain must contain at least one '.'"));
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid("domain cannot start or end with '.'"));
    }
    if domain.starts_with('-') || domain.ends_with('-') {
        return Err(invalid("domain cannot start or end with '-'"));
    }

    Ok(())
}

/// Validate an IANA time zone name such as `America/New_York`.
pub fn validate_time_zone(time_zone: &str) -> ConnectorResult<()> {
    time_zone.parse::<Tz>().map(|_| ()).map_err(|_| {
        ConnectorError::invalid_request(format!("invalid time zone '{time_zone}'"))
    })
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRequest {
    pub email: String,
    pub alias: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_id: String,
    pub time_zone: String,
}

impl AccountRequest {
    /// Read a request from an account profile map.
    ///
    /// Keys: `email`, `alias`, `first_name`, `last_name`, `profileId`,
    /// `timezone`. Only `first_name` is optional.
    pub fn from_profile(profile: &Map<String, Value>) -> ConnectorResult<Self> {
        let get = |key: &str| -> ConnectorResult<String> {
            profile
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConnectorError::invalid_request(format!("missing {key}")))
        };

        Ok(Self {
            email: get("email")?,
            alias: get("alias")?,
            first_name: profile
                .get("first_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_name: get("last_name")?,
            profile_id: get("profileId")?,
            time_zone: get("timezone")?,
        })
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        validate_email(&self.email)?;
        validate_time_zone(&self.time_zone)?;
        if self.alias.is_empty() {
            return Err(ConnectorError::invalid_request("missing alias"));
        }
        if self.last_name.is_empty() {
            return Err(ConnectorError::invalid_request("missing last_name"));
        }
        if self.profile_id.is_empty() {
            return Err(ConnectorError::invalid_request("missing profileId"));
        }
        Ok(())
    }

    /// `User` fields for the create call. The username is the email.
    #[must_use]
    pub fn to_fields(&self) -> Map<String, Value> {
        let value = json!({
            "Username": self.email,
            "Alias": self.alias,
            "Email": self.email,
            "LastName": self.last_name,
            "FirstName": self.first_name,
            "TimeZoneSidKey": self.time_zone,
            "ProfileId": self.profile_id,
            "EmailEncodingKey": "UTF-8",
            "LocaleSidKey": "en_US",
            "LanguageLocaleKey": "en_US",
            "ContactId": null,
        });
        match value {
            Value::Object(fields) => fields,
            _ => Map::new(),
        }
    }
}

/// Create a user and return its id.
#[instrument(skip(store, request), fields(email = %request.email))]
pub async fn create_user(
    store: &dyn ObjectStore,
    request: &AccountRequest,
) -> ConnectorResult<(String, Option<RateLimitDescriptor>)> {
    request.validate()?;
    store.create_object(tables::USER, request.to_fields()).await
}

/// Read a user back by email, tolerating read-after-write lag.
///
/// Only "not found" is retried. Attempt `n` (0-based) is followed by a wait
/// of `(n + 1) * base_delay`; cancellation during that wait returns
/// [`ConnectorError::Cancelled`] immediately.
#[instrument(skip(store, retry, cancel))]
pub async fn get_user_by_email_with_retry(
    store: &dyn ObjectStore,
    email: &str,
    retry: &RetrySettings,
    cancel: &CancellationToken,
) -> ConnectorResult<(SalesforceUser, Option<RateLimitDescriptor>)> {
    for attempt in 0..retry.max_attempts {
        store.clear_caches();
        match get_user_by_email(store, email).await {
            Ok(found) => return Ok(found),
            Err(e) if e.is_not_found() => {
                debug!(attempt, "user not visible yet");
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < retry.max_attempts {
            let delay = retry.base_delay() * (attempt + 1);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(ConnectorError::Cancelled {
                        operation: RETRY_OPERATION.to_string(),
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(ConnectorError::RetriesExhausted {
        operation: RETRY_OPERATION.to_string(),
        attempts: retry.max_attempts,
    })
}

/// Runs the account creation flow.
pub struct Provisioner {
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
    retry: RetrySettings,
    use_username_for_email: bool,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reconciler: Arc<Reconciler>,
        retry: RetrySettings,
        use_username_for_email: bool,
    ) -> Self {
        Self {
            store,
            reconciler,
            retry,
            use_username_for_email,
        }
    }

    /// Create the account, or reactivate an existing inactive one with the
    /// same email, then send the password-reset email.
    #[instrument(skip(self, request, cancel), fields(email = %request.email))]
    pub async fn create_account(
        &self,
        request: &AccountRequest,
        cancel: &CancellationToken,
    ) -> ConnectorResult<(Resource, Annotations)> {
        request.validate()?;
        let store = self.store.as_ref();
        let mut annotations = Annotations::new();

        match get_user_by_email(store, &request.email).await {
            Ok((existing, rate_limit)) => {
                annotations.push_rate_limit(rate_limit);
                if existing.is_active {
                    info!(user_id = %existing.id, "user already exists");
                } else {
                    let written = self.reconciler.set_user_active(&existing.id, true).await?;
                    annotations.rate_limits.extend(written.rate_limits);
                    info!(user_id = %existing.id, "reactivated existing user");
                }
            }
            Err(e) if e.is_not_found() => {
                let (user_id, rate_limit) = create_user(store, request).await?;
                annotations.push_rate_limit(rate_limit);
                info!(user_id = %user_id, "created user");
            }
            Err(e) => return Err(e),
        }

        store.clear_caches();
        let (user, rate_limit) =
            get_user_by_email_with_retry(store, &request.email, &self.retry, cancel).await?;
        annotations.push_rate_limit(rate_limit);

        let rate_limit = store.send_password_reset(&user.id).await?;
        annotations.push_rate_limit(rate_limit);
        debug!(user_id = %user.id, "sent password reset email");

        let (login, rate_limit) = get_user_login(store, &user.id).await?;
        annotations.push_rate_limit(rate_limit);

        Ok((
            user_resource(&user, login.as_ref(), self.use_username_for_email),
            annotations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AccountRequest {
        AccountRequest {
            email: "jane@example.com".to_string(),
            alias: "jdoe".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            profile_id: "00e1".to_string(),
            time_zone: "America/New_York".to_string(),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("jane").is_err());
        assert!(validate_email("jane@@example.com").is_err());
        assert!(validate_email("jane@example").is_err());
        assert!(validate_email("jane@.example.com").is_err());
        assert!(validate_email("jane @example.com").is_err());
        assert!(validate_email("o'brien@example.com").is_err());
        assert!(validate_email("a\\b@example.com").is_err());
    }

    #[test]
    fn test_validate_time_zone() {
        assert!(validate_time_zone("Europe/Paris").is_ok());
        assert!(validate_time_zone("UTC").is_ok());
        let err = validate_time_zone("Mars/Olympus").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_from_profile() {
        let profile = serde_json::json!({
            "email": "jane@example.com",
            "alias": "jdoe",
            "last_name": "Doe",
            "profileId": "00e1",
            "timezone": "America/New_York"
        });
        let parsed = AccountRequest::from_profile(profile.as_object().unwrap()).unwrap();
        assert_eq!(parsed.first_name, "");
        assert_eq!(parsed.profile_id, "00e1");

        let missing = serde_json::json!({"email": "jane@example.com"});
        let err = AccountRequest::from_profile(missing.as_object().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "invalid request: missing alias");
    }

    #[test]
    fn test_to_fields() {
        let fields = request().to_fields();
        assert_eq!(fields["Username"], "jane@example.com");
        assert_eq!(fields["Email"], "jane@example.com");
        assert_eq!(fields["EmailEncodingKey"], "UTF-8");
        assert_eq!(fields["LocaleSidKey"], "en_US");
        assert_eq!(fields["LanguageLocaleKey"], "en_US");
        assert_eq!(fields["TimeZoneSidKey"], "America/New_York");
        assert!(fields["ContactId"].is_null());
    }

    #[test]
    fn test_request_validate() {
        assert!(request().validate().is_ok());
        let mut bad = request();
        bad.time_zone = "Nowhere".to_string();
        assert!(bad.validate().is_err());
    }
}
