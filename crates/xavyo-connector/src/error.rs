//! Connector Framework error types
//!
//! Error definitions with transient/permanent classification. Every variant
//! carries enough context (table, field, relationship kind) to diagnose a
//! failure from the message alone.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Query errors
    /// The remote system rejected or failed to execute a query.
    #[error("remote query failed: {message}")]
    RemoteQuery {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Zero records matched where one was expected.
    #[error("{table} not found: {criteria}")]
    NotFound { table: String, criteria: String },

    /// More than one record matched a strict single-object fetch.
    #[error("expected 1 {table} record, got {count}")]
    AmbiguousResult { table: String, count: usize },

    // Mutation errors
    /// The remote system did not confirm a created identity.
    #[error("failed to create {table}: {message}")]
    CreateFailed { table: String, message: String },

    /// The remote system rejected an update.
    #[error("failed to update {table} {id}: {message}")]
    UpdateFailed {
        table: String,
        id: String,
        message: String,
    },

    /// The remote system rejected a delete.
    #[error("failed to delete {table} {id}: {message}")]
    DeleteFailed {
        table: String,
        id: String,
        message: String,
    },

    /// Compare-and-clear guard tripped: the field no longer holds the expected value.
    #[error("missing {field}: {value}")]
    PreconditionFailed { field: String, value: String },

    // Reconciliation errors
    /// A principal or target kind that the operation does not handle.
    #[error("unsupported resource type '{resource_type}' for {operation}")]
    UnsupportedResourceType {
        resource_type: String,
        operation: String,
    },

    /// Operator configuration is missing an entry the operation needs.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Connector settings are invalid (bad URL, missing credentials).
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Caller input is invalid (bad email, unknown time zone, missing argument).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    // Authentication errors
    /// Login or token exchange failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // Transport errors (usually transient)
    /// Target system is temporarily unavailable.
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Response body could not be decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    // Retry errors
    /// Eventually-consistent read never observed the expected record.
    #[error("failed to {operation} after {attempts} retries")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// The caller cancelled the operation.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::TargetUnavailable { .. } | ConnectorError::NetworkError { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Whether the error is the distinguished "zero records" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectorError::NotFound { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::RemoteQuery { .. } => "REMOTE_QUERY_FAILED",
            ConnectorError::NotFound { .. } => "NOT_FOUND",
            ConnectorError::AmbiguousResult { .. } => "AMBIGUOUS_RESULT",
            ConnectorError::CreateFailed { .. } => "CREATE_FAILED",
            ConnectorError::UpdateFailed { .. } => "UPDATE_FAILED",
            ConnectorError::DeleteFailed { .. } => "DELETE_FAILED",
            ConnectorError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            ConnectorError::UnsupportedResourceType { .. } => "UNSUPPORTED_RESOURCE_TYPE",
            ConnectorError::Configuration { .. } => "CONFIGURATION_ERROR",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::InvalidRequest { .. } => "INVALID_REQUEST",
            ConnectorError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            ConnectorError::Cancelled { .. } => "CANCELLED",
        }
    }

    // Convenience constructors

    /// Create a remote query error.
    pub fn remote_query(message: impl Into<String>) -> Self {
        ConnectorError::RemoteQuery {
            message: message.into(),
            source: None,
        }
    }

    /// Create a remote query error with source.
    pub fn remote_query_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::RemoteQuery {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(table: impl Into<String>, criteria: impl Into<String>) -> Self {
        ConnectorError::NotFound {
            table: table.into(),
            criteria: criteria.into(),
        }
    }

    /// Create an unsupported resource type error.
    pub fn unsupported(resource_type: impl Into<String>, operation: impl Into<String>) -> Self {
        ConnectorError::UnsupportedResourceType {
            resource_type: resource_type.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ConnectorError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::TargetUnavailable {
                message: "test".to_string(),
            },
            ConnectorError::network("test"),
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(!err.is_permanent());
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::remote_query("MALFORMED_QUERY"),
            ConnectorError::not_found("User", "Email = 'a@b.co'"),
            ConnectorError::PreconditionFailed {
                field: "UserRoleId".to_string(),
                value: "00E1".to_string(),
            },
            ConnectorError::Configuration {
                message: "missing mapping".to_string(),
            },
            ConnectorError::unsupported("group", "profile grant"),
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ConnectorError::remote_query("x").error_code(),
            "REMOTE_QUERY_FAILED"
        );
        assert_eq!(
            ConnectorError::not_found("User", "x").error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            ConnectorError::Cancelled {
                operation: "x".to_string()
            }
            .error_code(),
            "CANCELLED"
        );
    }

    #[test]
    fn test_error_display() {
        let err = ConnectorError::PreconditionFailed {
            field: "UserRoleId".to_string(),
            value: "00E000000000001".to_string(),
        };
        assert_eq!(err.to_string(), "missing UserRoleId: 00E000000000001");

        let err = ConnectorError::RetriesExhausted {
            operation: "get user by email".to_string(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "failed to get user by email after 3 retries"
        );

        let err = ConnectorError::AmbiguousResult {
            table: "PermissionSetGroupComponent".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "expected 1 PermissionSetGroupComponent record, got 2"
        );
    }

    #[test]
    fn test_not_found_is_distinguished() {
        assert!(ConnectorError::not_found("User", "x").is_not_found());
        assert!(!ConnectorError::remote_query("x").is_not_found());
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "underlying error");
        let err = ConnectorError::network_with_source("failed", source_err);

        assert!(err.is_transient());
        if let ConnectorError::NetworkError { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected NetworkError variant");
        }
    }
}
