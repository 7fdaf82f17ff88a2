//! # Connector Framework
//!
//! Core abstractions for syncing identity data out of external systems and
//! enacting access changes back onto them.
//!
//! ## Architecture
//!
//! - [`traits::Connector`] - Base trait all connectors implement
//! - [`traits::ResourceSyncer`] - One per resource kind: list, entitlements,
//!   grants and edge mutation
//!
//! Connectors emit a normalized model ([`types::Resource`],
//! [`types::Entitlement`], [`types::Grant`]) and attach rate-limit telemetry
//! to every result through [`types::Annotations`].
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_connector::prelude::*;
//!
//! let mut page = PageRequest::first(100);
//! loop {
//!     let result = syncer.list(&page).await?;
//!     for resource in &result.items {
//!         let entitlements = syncer.entitlements(resource, &PageRequest::first(0)).await?;
//!     }
//!     if !result.has_more() {
//!         break;
//!     }
//!     page = PageRequest::resume(result.next_token, 100);
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Resource model and annotations
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - Connector capability traits
//! - [`config`] - Configuration types and traits

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConnectionSettings, ConnectorConfig};
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::traits::{
        Connector, EdgeChange, EdgeOutcome, EdgeResult, Page, PageRequest, ResourceSyncer,
    };
    pub use crate::types::{
        Annotations, ConnectorType, Entitlement, Grant, RateLimitDescriptor, RateLimitStatus,
        Resource, ResourceId, ResourceKind, UserStatus, UserTraits,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
