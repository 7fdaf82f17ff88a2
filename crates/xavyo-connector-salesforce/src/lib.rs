//! # Salesforce Connector
//!
//! Syncs users, groups, roles, profiles, permission sets, permission set
//! groups and connected applications out of a Salesforce org, and applies
//! grants and revokes back onto it.
//!
//! ## Layers
//!
//! - [`query`] - SOQL text builder with per-table default columns
//! - [`pagination`] - maps `nextRecordsUrl` onto opaque page tokens
//! - [`rate_limit`] - observes `Sforce-Limit-Info` on every call
//! - [`store`] / [`client`] - object access layer and its HTTP implementation
//! - [`resources`] - one translator and syncer per resource kind
//! - [`reconcile`] - idempotent grant/revoke per relationship kind
//! - [`provisioning`] - account creation with read-after-write retry
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_connector::prelude::*;
//! use xavyo_connector_salesforce::{SalesforceConfig, SalesforceConnector, SalesforceCredentials};
//!
//! let config = SalesforceConfig::new(
//!     "https://acme.my.salesforce.com",
//!     SalesforceCredentials::access_token(token),
//! )
//! .with_least_privileged_profile("Salesforce", "Minimum Access - Salesforce");
//!
//! let connector = SalesforceConnector::new(config)?;
//! connector.test_connection().await?;
//!
//! for syncer in connector.resource_syncers() {
//!     let page = syncer.list(&PageRequest::first(100)).await?;
//! }
//! ```

pub mod actions;
pub mod client;
pub mod config;
pub mod connector;
pub mod pagination;
pub mod principal;
pub mod provisioning;
pub mod query;
pub mod rate_limit;
pub mod reconcile;
pub mod record;
pub mod resources;
pub mod store;

pub use client::SalesforceClient;
pub use config::{RetrySettings, SalesforceConfig, SalesforceCredentials};
pub use connector::SalesforceConnector;
pub use provisioning::AccountRequest;
pub use query::Query;
pub use reconcile::Reconciler;
pub use record::{Record, RecordUpdate};
pub use store::{CurrentUser, ObjectStore, QueryPage};
