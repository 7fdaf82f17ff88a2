//! Resource translators.
//!
//! One module per resource kind. Each holds the typed view of its table, the
//! mapping into the normalized model and a [`ResourceSyncer`] that lists,
//! describes and (where supported) mutates grants.
//!
//! [`ResourceSyncer`]: xavyo_connector::traits::ResourceSyncer

pub mod connected_apps;
pub mod groups;
pub mod permission_set_groups;
pub mod permission_sets;
pub mod profiles;
pub mod roles;
pub mod users;

use xavyo_connector::types::{Entitlement, Resource, ResourceKind};

pub use connected_apps::ConnectedAppSyncer;
pub use groups::GroupSyncer;
pub use permission_set_groups::PermissionSetGroupSyncer;
pub use permission_sets::PermissionSetSyncer;
pub use profiles::ProfileSyncer;
pub use roles::RoleSyncer;
pub use users::{UserSyncOptions, UserSyncer};

/// Entitlement slug for group membership.
pub const MEMBER_SLUG: &str = "member";

/// Entitlement slug for every assignment-style entitlement.
pub const ASSIGNED_SLUG: &str = "assigned";

/// Build the single entitlement a resource exposes.
pub(crate) fn entitlement(
    resource: &Resource,
    slug: &str,
    display_name: String,
    description: String,
    grantable_to: &[ResourceKind],
) -> Entitlement {
    Entitlement {
        resource: resource.id.clone(),
        slug: slug.to_string(),
        display_name,
        description,
        grantable_to: grantable_to.to_vec(),
    }
}
