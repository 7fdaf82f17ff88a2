//! Salesforce connector configuration
//!
//! # Security
//!
//! Instance URLs are checked against internal targets (loopback, private
//! ranges, metadata endpoints) unless `allow_localhost` is set for tests.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use xavyo_connector::config::{ConnectionSettings, ConnectorConfig};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::ConnectorType;

const REDACTED: &str = "***REDACTED***";

/// Reject URLs that point at internal services.
fn validate_url_ssrf(url: &url::Url) -> Result<(), String> {
    if url.scheme() != "https" {
        return Err(format!("Unsupported scheme: {}", url.scheme()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(format!(
                "Private/internal IP addresses are not allowed: {}",
                ip
            ));
        }
    }

    let lower_host = host.to_lowercase();
    let blocked_hosts = ["localhost", "metadata", "metadata.google.internal"];
    for blocked in blocked_hosts {
        if lower_host == blocked || lower_host.ends_with(&format!(".{}", blocked)) {
            return Err(format!("Blocked internal hostname: {}", host));
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&ipv4);
    }
    // Unique local (fc00::/7)
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// How the client obtains its session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SalesforceCredentials {
    /// Use an existing OAuth access token as-is.
    AccessToken { token: SecretString },

    /// OAuth2 username-password flow.
    Password {
        username: String,
        password: SecretString,
        #[serde(default)]
        security_token: Option<SecretString>,
        client_id: String,
        client_secret: SecretString,
    },
}

impl SalesforceCredentials {
    /// Create token-seeded credentials.
    pub fn access_token(token: impl Into<String>) -> Self {
        SalesforceCredentials::AccessToken {
            token: SecretString::new(token.into()),
        }
    }

    /// Create username-password credentials.
    pub fn password(
        username: impl Into<String>,
        password: impl Into<String>,
        security_token: Option<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        SalesforceCredentials::Password {
            username: username.into(),
            password: SecretString::new(password.into()),
            security_token: security_token.map(SecretString::new),
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }

    fn validate(&self) -> ConnectorResult<()> {
        match self {
            SalesforceCredentials::AccessToken { token } => {
                if token.expose_secret().is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "access token is required",
                    ));
                }
            }
            SalesforceCredentials::Password {
                username,
                client_id,
                ..
            } => {
                if username.is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "username is required",
                    ));
                }
                if client_id.is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "client_id is required for the password flow",
                    ));
                }
            }
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        match self {
            SalesforceCredentials::AccessToken { .. } => Self::access_token(REDACTED),
            SalesforceCredentials::Password {
                username,
                client_id,
                security_token,
                ..
            } => Self::password(
                username.clone(),
                REDACTED,
                security_token.as_ref().map(|_| REDACTED.to_string()),
                client_id.clone(),
                REDACTED,
            ),
        }
    }
}

/// Read-after-write retry used by account provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    /// Total lookups before giving up (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay; attempt `n` waits `(n + 1) * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Configuration for a Salesforce org.
#[derive(Debug, Clone, Deserialize)]
pub struct SalesforceConfig {
    /// Instance URL, e.g. `https://acme.my.salesforce.com`. A bare host is
    /// treated as https.
    pub instance_url: String,

    /// REST API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub credentials: SalesforceCredentials,

    /// Report the username instead of the email address on user resources.
    #[serde(default)]
    pub use_username_for_email: bool,

    /// Register the connected application syncer.
    #[serde(default)]
    pub sync_connected_apps: bool,

    /// Include inactive users in listings.
    #[serde(default = "default_true")]
    pub sync_deactivated_users: bool,

    /// Include users whose type is not `Standard`.
    #[serde(default)]
    pub sync_non_standard_users: bool,

    /// License name to least-privileged profile name, used when a profile
    /// is revoked.
    #[serde(default)]
    pub license_to_least_privileged_profile: HashMap<String, String>,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Lifetime of cached query responses; 0 disables the cache.
    #[serde(default = "default_query_cache_ttl")]
    pub query_cache_ttl_secs: u64,

    #[serde(default)]
    pub provisioning_retry: RetrySettings,

    /// Allow loopback and plain-http instance URLs (for testing only).
    #[serde(default)]
    pub allow_localhost: bool,
}

fn default_api_version() -> String {
    "64.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_query_cache_ttl() -> u64 {
    60
}

impl SalesforceConfig {
    /// Create a new configuration with defaults for everything but the
    /// instance and credentials.
    pub fn new(instance_url: impl Into<String>, credentials: SalesforceCredentials) -> Self {
        Self {
            instance_url: instance_url.into(),
            api_version: default_api_version(),
            credentials,
            use_username_for_email: false,
            sync_connected_apps: false,
            sync_deactivated_users: default_true(),
            sync_non_standard_users: false,
            license_to_least_privileged_profile: HashMap::new(),
            connection: ConnectionSettings::default(),
            query_cache_ttl_secs: default_query_cache_ttl(),
            provisioning_retry: RetrySettings::default(),
            allow_localhost: false,
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_username_for_email(mut self, enabled: bool) -> Self {
        self.use_username_for_email = enabled;
        self
    }

    pub fn with_connected_apps(mut self, enabled: bool) -> Self {
        self.sync_connected_apps = enabled;
        self
    }

    pub fn with_deactivated_users(mut self, enabled: bool) -> Self {
        self.sync_deactivated_users = enabled;
        self
    }

    pub fn with_non_standard_users(mut self, enabled: bool) -> Self {
        self.sync_non_standard_users = enabled;
        self
    }

    /// Add a license to least-privileged profile mapping.
    pub fn with_least_privileged_profile(
        mut self,
        license: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        self.license_to_least_privileged_profile
            .insert(license.into(), profile.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_query_cache_ttl(mut self, secs: u64) -> Self {
        self.query_cache_ttl_secs = secs;
        self
    }

    pub fn with_provisioning_retry(mut self, retry: RetrySettings) -> Self {
        self.provisioning_retry = retry;
        self
    }

    /// Allow localhost URLs (for testing only).
    ///
    /// # Warning
    ///
    /// This disables SSRF protection. Only use it for tests against mock
    /// servers.
    pub fn with_allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Instance URL with a scheme and without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        let trimmed = self.instance_url.trim().trim_end_matches('/');
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }

    /// Root of the versioned REST API.
    #[must_use]
    pub fn api_root(&self) -> String {
        format!("{}/services/data/v{}", self.base_url(), self.api_version)
    }
}

impl ConnectorConfig for SalesforceConfig {
    fn connector_type() -> ConnectorType {
        ConnectorType::Salesforce
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.instance_url.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "instance_url is required",
            ));
        }

        let url = url::Url::parse(&self.base_url()).map_err(|e| {
            ConnectorError::invalid_configuration(format!("invalid instance_url: {e}"))
        })?;

        if !self.allow_localhost {
            validate_url_ssrf(&url).map_err(|e| {
                ConnectorError::invalid_configuration(format!("SSRF protection: {e}"))
            })?;
        }

        if self.api_version.is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "api_version is required",
            ));
        }

        self.connection.validate()?;

        if self.provisioning_retry.max_attempts == 0 {
            return Err(ConnectorError::invalid_configuration(
                "provisioning_retry.max_attempts must be at least 1",
            ));
        }

        self.credentials.validate()
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.credentials = config.credentials.redacted();
        config
    }
}
