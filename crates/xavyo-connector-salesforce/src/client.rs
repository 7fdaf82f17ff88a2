//! HTTP implementation of the object access layer.

use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::{header, Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;
use xavyo_connector::config::ConnectorConfig;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::RateLimitDescriptor;

use crate::config::{SalesforceConfig, SalesforceCredentials};
use crate::pagination::{resolve_query_target, FetchTarget, QueryResponse};
use crate::query::{tables, Query};
use crate::rate_limit::RateLimitInterceptor;
use crate::record::{Record, RecordUpdate};
use crate::store::{CurrentUser, ObjectStore, QueryPage};

const QUERY_CACHE_MAX_CAPACITY: u64 = 1_000;

/// An authenticated session.
#[derive(Clone)]
struct Session {
    access_token: SecretString,
    instance_url: String,
}

/// Lifecycle of the lazily established session.
enum SessionState {
    Uninitialized,
    Ready(Session),
    /// Last login attempt failed; the next call tries again.
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: String,
}

/// Pull a readable message out of an error body.
///
/// The API reports failures as `[{"message": .., "errorCode": ..}]`.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Vec<ApiError>>(body) {
        Ok(errors) if !errors.is_empty() => errors
            .iter()
            .map(|e| {
                if e.error_code.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.error_code, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.to_string(),
    }
}

/// Errors that mean the same thing for every endpoint.
fn classify_status(status: StatusCode, message: &str) -> Option<ConnectorError> {
    match status {
        StatusCode::UNAUTHORIZED => Some(ConnectorError::AuthenticationFailed {
            message: message.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Some(ConnectorError::TargetUnavailable {
            message: format!("Rate limited: {message}"),
        }),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            Some(ConnectorError::TargetUnavailable {
                message: message.to_string(),
            })
        }
        _ => None,
    }
}

/// REST client for one Salesforce org.
pub struct SalesforceClient {
    config: SalesforceConfig,
    http: Client,
    session: Mutex<SessionState>,
    interceptor: RateLimitInterceptor,
    cache: Option<Cache<String, Value>>,
}

impl std::fmt::Debug for SalesforceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceClient")
            .field("config", &self.config.redacted())
            .field("cache_enabled", &self.cache.is_some())
            .finish()
    }
}

impl SalesforceClient {
    /// Create a client. No network traffic happens until the first call.
    pub fn new(config: SalesforceConfig) -> ConnectorResult<Self> {
        let config = config.validated()?;

        let http = Client::builder()
            .timeout(config.connection.read_timeout())
            .connect_timeout(config.connection.connection_timeout())
            .build()
            .map_err(|e| {
                ConnectorError::invalid_configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        let cache = (config.query_cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(QUERY_CACHE_MAX_CAPACITY)
                .time_to_live(Duration::from_secs(config.query_cache_ttl_secs))
                .build()
        });

        Ok(Self {
            config,
            http,
            session: Mutex::new(SessionState::Uninitialized),
            interceptor: RateLimitInterceptor::new(),
            cache,
        })
    }

    pub fn config(&self) -> &SalesforceConfig {
        &self.config
    }

    /// Descriptor observed on the most recent remote call.
    pub fn last_rate_limit(&self) -> Option<RateLimitDescriptor> {
        self.interceptor.last()
    }

    /// Forget the current session; the next call logs in again.
    pub async fn reset_session(&self) {
        *self.session.lock().await = SessionState::Uninitialized;
    }

    /// Return the session, logging in on first use.
    ///
    /// The lock is held across the login so concurrent first callers share
    /// a single token exchange.
    async fn session(&self) -> ConnectorResult<Session> {
        let mut state = self.session.lock().await;
        match &*state {
            SessionState::Ready(session) => return Ok(session.clone()),
            SessionState::Failed(reason) => {
                debug!(reason = %reason, "retrying failed login");
            }
            SessionState::Uninitialized => {}
        }

        match self.login().await {
            Ok(session) => {
                *state = SessionState::Ready(session.clone());
                Ok(session)
            }
            Err(e) => {
                *state = SessionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn login(&self) -> ConnectorResult<Session> {
        match &self.config.credentials {
            SalesforceCredentials::AccessToken { token } => Ok(Session {
                access_token: token.clone(),
                instance_url: self.config.base_url(),
            }),
            SalesforceCredentials::Password {
                username,
                password,
                security_token,
                client_id,
                client_secret,
            } => {
                let token_url = format!("{}/services/oauth2/token", self.config.base_url());
                let mut secret = password.expose_secret().clone();
                if let Some(token) = security_token {
                    secret.push_str(token.expose_secret());
                }
                let params = [
                    ("grant_type", "password"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose_secret().as_str()),
                    ("username", username.as_str()),
                    ("password", secret.as_str()),
                ];

                let response = self
                    .http
                    .post(&token_url)
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| ConnectorError::AuthenticationFailed {
                        message: format!("token request failed: {e}"),
                    })?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(ConnectorError::AuthenticationFailed {
                        message: format!("HTTP {status}: {body}"),
                    });
                }

                let token: TokenResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| ConnectorError::AuthenticationFailed {
                            message: format!("invalid token response: {e}"),
                        })?;

                let instance_url = if token.instance_url.is_empty() {
                    self.config.base_url()
                } else {
                    token.instance_url.trim_end_matches('/').to_string()
                };
                info!(username = %username, instance_url = %instance_url, "logged in");

                Ok(Session {
                    access_token: SecretString::new(token.access_token),
                    instance_url,
                })
            }
        }
    }

    fn api_root(&self, session: &Session) -> String {
        format!(
            "{}/services/data/v{}",
            session.instance_url, self.config.api_version
        )
    }

    /// Resolve a page token against the session's instance.
    ///
    /// Absolute tokens must share scheme, host and port with the instance.
    fn cursor_url(session: &Session, cursor: &str) -> ConnectorResult<String> {
        if cursor.starts_with('/') && !cursor.starts_with("//") {
            return Ok(format!("{}{}", session.instance_url, cursor));
        }
        let foreign = || {
            ConnectorError::invalid_request(format!(
                "page token does not belong to this instance: {cursor}"
            ))
        };
        let instance = Url::parse(&session.instance_url).map_err(|_| foreign())?;
        let target = Url::parse(cursor).map_err(|_| foreign())?;
        if target.scheme() == instance.scheme()
            && target.host_str() == instance.host_str()
            && target.port_or_known_default() == instance.port_or_known_default()
        {
            Ok(cursor.to_string())
        } else {
            Err(foreign())
        }
    }

    /// Drop cached query pages after a write so later lookups see it.
    fn invalidate_queries(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Send one authenticated request through the rate-limit interceptor.
    async fn execute(
        &self,
        session: &Session,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> ConnectorResult<(Response, Option<RateLimitDescriptor>)> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(session.access_token.expose_secret())
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        self.interceptor.send(request).await
    }

    /// Read a failed response into its status and message.
    ///
    /// A 401 drops the session so the next call logs in again.
    async fn failure(&self, response: Response) -> (StatusCode, String) {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.reset_session().await;
        }
        let body = response.text().await.unwrap_or_default();
        (status, error_message(&body))
    }

    async fn read_json(response: Response) -> ConnectorResult<Value> {
        response.json().await.map_err(|e| ConnectorError::Serialization {
            message: format!("invalid response body: {e}"),
        })
    }
}

#[async_trait]
impl ObjectStore for SalesforceClient {
    #[instrument(skip(self, query), fields(table = %query.table()))]
    async fn query(
        &self,
        query: &Query,
        cursor: &str,
        page_size: i64,
    ) -> ConnectorResult<QueryPage> {
        let session = self.session().await?;
        let url = match resolve_query_target(query, cursor, page_size) {
            FetchTarget::Cursor(cursor) => Self::cursor_url(&session, &cursor)?,
            FetchTarget::Query(soql) => {
                debug!(soql = %soql, "running query");
                format!(
                    "{}/query?q={}",
                    self.api_root(&session),
                    urlencoding::encode(&soql)
                )
            }
        };

        let cached = self.cache.as_ref().and_then(|c| c.get(&url));
        let (body, rate_limit) = match cached {
            Some(body) => {
                debug!("serving query from cache");
                (body, None)
            }
            None => {
                let (response, rate_limit) =
                    self.execute(&session, Method::GET, &url, None).await?;
                if !response.status().is_success() {
                    let (status, message) = self.failure(response).await;
                    return Err(classify_status(status, &message).unwrap_or_else(|| {
                        ConnectorError::remote_query(format!("HTTP {status}: {message}"))
                    }));
                }
                let body = Self::read_json(response).await?;
                if let Some(cache) = &self.cache {
                    cache.insert(url, body.clone());
                }
                (body, rate_limit)
            }
        };

        let response: QueryResponse = serde_json::from_value(body).map_err(|e| {
            ConnectorError::remote_query_with_source("unexpected query response shape", e)
        })?;
        let next_cursor = response.continuation().into_token();
        let records = response
            .records
            .into_iter()
            .map(|value| Record::from_value(query.table(), value))
            .collect::<ConnectorResult<Vec<_>>>()?;

        debug!(count = records.len(), has_more = !next_cursor.is_empty(), "query page");
        Ok(QueryPage {
            records,
            next_cursor,
            rate_limit,
        })
    }

    #[instrument(skip(self))]
    async fn get_object(
        &self,
        table: &str,
        id: &str,
    ) -> ConnectorResult<(Record, Option<RateLimitDescriptor>)> {
        let session = self.session().await?;
        let url = format!("{}/sobjects/{}/{}", self.api_root(&session), table, id);
        let (response, rate_limit) = self.execute(&session, Method::GET, &url, None).await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            if status == StatusCode::NOT_FOUND {
                return Err(ConnectorError::not_found(table, format!("Id = '{id}'")));
            }
            return Err(classify_status(status, &message).unwrap_or_else(|| {
                ConnectorError::remote_query(format!("HTTP {status}: {message}"))
            }));
        }

        let body = Self::read_json(response).await?;
        Ok((Record::from_value(table, body)?, rate_limit))
    }

    #[instrument(skip(self, fields))]
    async fn create_object(
        &self,
        table: &str,
        fields: Map<String, Value>,
    ) -> ConnectorResult<(String, Option<RateLimitDescriptor>)> {
        let session = self.session().await?;
        let url = format!("{}/sobjects/{}", self.api_root(&session), table);
        let body = Value::Object(fields);
        let (response, rate_limit) = self
            .execute(&session, Method::POST, &url, Some(&body))
            .await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            return Err(classify_status(status, &message).unwrap_or_else(|| {
                ConnectorError::CreateFailed {
                    table: table.to_string(),
                    message: format!("HTTP {status}: {message}"),
                }
            }));
        }

        let created: CreateResponse =
            response
                .json()
                .await
                .map_err(|e| ConnectorError::CreateFailed {
                    table: table.to_string(),
                    message: format!("invalid create response: {e}"),
                })?;

        if !created.success || created.id.is_empty() {
            let message = if created.errors.is_empty() {
                "no id returned".to_string()
            } else {
                Value::Array(created.errors).to_string()
            };
            return Err(ConnectorError::CreateFailed {
                table: table.to_string(),
                message,
            });
        }

        self.invalidate_queries();
        debug!(id = %created.id, "created object");
        Ok((created.id, rate_limit))
    }

    #[instrument(skip(self, update), fields(table = %update.table, id = %update.id))]
    async fn update_object(
        &self,
        update: &RecordUpdate,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        let session = self.session().await?;
        let url = format!(
            "{}/sobjects/{}/{}",
            self.api_root(&session),
            update.table,
            update.id
        );
        let (response, rate_limit) = self
            .execute(&session, Method::PATCH, &url, Some(&update.payload()))
            .await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            return Err(classify_status(status, &message).unwrap_or_else(|| {
                ConnectorError::UpdateFailed {
                    table: update.table.clone(),
                    id: update.id.clone(),
                    message: format!("HTTP {status}: {message}"),
                }
            }));
        }
        self.invalidate_queries();
        Ok(rate_limit)
    }

    #[instrument(skip(self))]
    async fn delete_object(
        &self,
        table: &str,
        id: &str,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        let session = self.session().await?;
        let url = format!("{}/sobjects/{}/{}", self.api_root(&session), table, id);
        let (response, rate_limit) = self.execute(&session, Method::DELETE, &url, None).await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            if status == StatusCode::NOT_FOUND {
                return Err(ConnectorError::not_found(table, format!("Id = '{id}'")));
            }
            return Err(classify_status(status, &message).unwrap_or_else(|| {
                ConnectorError::DeleteFailed {
                    table: table.to_string(),
                    id: id.to_string(),
                    message: format!("HTTP {status}: {message}"),
                }
            }));
        }
        self.invalidate_queries();
        Ok(rate_limit)
    }

    #[instrument(skip(self))]
    async fn send_password_reset(
        &self,
        user_id: &str,
    ) -> ConnectorResult<Option<RateLimitDescriptor>> {
        let session = self.session().await?;
        let url = format!(
            "{}/sobjects/{}/{}/password",
            self.api_root(&session),
            tables::USER,
            user_id
        );
        let (response, rate_limit) = self.execute(&session, Method::DELETE, &url, None).await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            return Err(classify_status(status, &message).unwrap_or_else(|| {
                ConnectorError::UpdateFailed {
                    table: tables::USER.to_string(),
                    id: user_id.to_string(),
                    message: format!("password reset failed: HTTP {status}: {message}"),
                }
            }));
        }
        self.invalidate_queries();
        Ok(rate_limit)
    }

    #[instrument(skip(self))]
    async fn current_user(&self) -> ConnectorResult<CurrentUser> {
        let session = self.session().await?;
        let url = format!("{}/chatter/users/me", self.api_root(&session));
        let (response, _) = self.execute(&session, Method::GET, &url, None).await?;

        if !response.status().is_success() {
            let (status, message) = self.failure(response).await;
            return Err(match classify_status(status, &message) {
                Some(e) => e,
                None if status == StatusCode::FORBIDDEN => ConnectorError::AuthenticationFailed {
                    message: format!("HTTP {status}: {message}"),
                },
                None => ConnectorError::network(format!("HTTP {status}: {message}")),
            });
        }

        response.json().await.map_err(|e| ConnectorError::Serialization {
            message: format!("invalid current user response: {e}"),
        })
    }

    fn clear_caches(&self) {
        self.invalidate_queries();
    }
}
