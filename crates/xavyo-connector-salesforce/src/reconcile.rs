//! Grant/revoke reconciliation.
//!
//! Every relationship kind maps onto the object store's create/find/delete
//! primitives. Revoking an absent edge is reported as
//! [`EdgeOutcome::AlreadyRevoked`], never as an error.
//!
//! | Target | Principal | Edge |
//! |--------|-----------|------|
//! | group | user, group | `GroupMember` row |
//! | permission set | user | `PermissionSetAssignment` row |
//! | permission set group | permission set | `PermissionSetGroupComponent` row |
//! | role | user | `User.UserRoleId` |
//! | profile | user | `User.ProfileId` (revoke downgrades) |

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::traits::{EdgeChange, EdgeOutcome, EdgeResult};
use xavyo_connector::types::{Annotations, ResourceId, ResourceKind};

use crate::query::{tables, Query};
use crate::resources::profiles::{get_profile_by_id, get_profile_by_name, get_user_license_by_id};
use crate::store::ObjectStore;

/// Applies grant edges to the remote store.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    /// License name to least-privileged profile name.
    least_privileged_profiles: HashMap<String, String>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("least_privileged_profiles", &self.least_privileged_profiles)
            .finish()
    }
}

fn fields<const N: usize>(pairs: [(&str, &str); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn require_user(principal: &ResourceId, operation: &str) -> ConnectorResult<()> {
    if principal.kind == ResourceKind::User {
        Ok(())
    } else {
        warn!(principal = %principal, operation = %operation, "rejecting non-user principal");
        Err(ConnectorError::unsupported(principal.kind.as_str(), operation))
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        least_privileged_profiles: HashMap<String, String>,
    ) -> Self {
        Self {
            store,
            least_privileged_profiles,
        }
    }

    /// Route an edge change by the kind of resource it targets.
    pub async fn apply(&self, change: EdgeChange) -> ConnectorResult<EdgeResult> {
        match change {
            EdgeChange::Grant {
                principal,
                entitlement,
            } => {
                let target = &entitlement.resource;
                match target.kind {
                    ResourceKind::Group => {
                        self.grant_group_membership(&target.id, &principal).await
                    }
                    ResourceKind::PermissionSet => {
                        self.grant_permission_set(&target.id, &principal).await
                    }
                    ResourceKind::PermissionSetGroup => {
                        self.grant_permission_set_group(&target.id, &principal).await
                    }
                    ResourceKind::Role => self.grant_role(&target.id, &principal).await,
                    ResourceKind::Profile => self.grant_profile(&target.id, &principal).await,
                    other => Err(ConnectorError::unsupported(other.as_str(), "grant")),
                }
            }
            EdgeChange::Revoke(grant) => {
                let target = &grant.entitlement.resource;
                let principal = &grant.principal;
                match target.kind {
                    ResourceKind::Group => {
                        self.revoke_group_membership(&target.id, principal).await
                    }
                    ResourceKind::PermissionSet => {
                        self.revoke_permission_set(&target.id, principal).await
                    }
                    ResourceKind::PermissionSetGroup => {
                        self.revoke_permission_set_group(&target.id, principal).await
                    }
                    ResourceKind::Role => self.revoke_role(&target.id, principal).await,
                    ResourceKind::Profile => self.revoke_profile(&target.id, principal).await,
                    other => Err(ConnectorError::unsupported(other.as_str(), "revoke")),
                }
            }
        }
    }

    /// Add a user or group to a group.
    ///
    /// Duplicate memberships are not checked for; the remote side tolerates
    /// them.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn grant_group_membership(
        &self,
        group_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        if !matches!(principal.kind, ResourceKind::User | ResourceKind::Group) {
            warn!("rejecting group membership principal");
            return Err(ConnectorError::unsupported(
                principal.kind.as_str(),
                "group membership grant",
            ));
        }

        let (_, rate_limit) = self
            .store
            .create_object(
                tables::GROUP_MEMBER,
                fields([("GroupId", group_id), ("UserOrGroupId", principal.id.as_str())]),
            )
            .await?;
        Ok(EdgeResult::applied(Annotations::with_rate_limits([rate_limit])))
    }

    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn revoke_group_membership(
        &self,
        group_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        let query = Query::new(tables::GROUP_MEMBER)
            .where_eq("GroupId", group_id)
            .where_eq("UserOrGroupId", principal.id.as_str());
        self.find_and_delete(&query).await
    }

    /// Assign a permission set to a user unless already assigned.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn grant_permission_set(
        &self,
        permission_set_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        require_user(principal, "permission set grant")?;
        let query = Self::assignment_query(permission_set_id, &principal.id);
        self.create_if_absent(
            &query,
            fields([
                ("PermissionSetId", permission_set_id),
                ("AssigneeId", principal.id.as_str()),
            ]),
        )
        .await
    }

    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn revoke_permission_set(
        &self,
        permission_set_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        let query = Self::assignment_query(permission_set_id, &principal.id);
        self.find_and_delete(&query).await
    }

    /// Add a permission set to a permission set group.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn grant_permission_set_group(
        &self,
        group_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        match principal.kind {
            ResourceKind::PermissionSet => {
                let query = Self::component_query(group_id, &principal.id);
                self.create_if_absent(
                    &query,
                    fields([
                        ("PermissionSetGroupId", group_id),
                        ("PermissionSetId", principal.id.as_str()),
                    ]),
                )
                .await
            }
            other => Err(ConnectorError::unsupported(
                other.as_str(),
                "permission set group grant",
            )),
        }
    }

    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn revoke_permission_set_group(
        &self,
        group_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        match principal.kind {
            ResourceKind::PermissionSet => {
                let query = Self::component_query(group_id, &principal.id);
                let (existing, lookup_limit) = self.store.find_unique(&query).await?;
                let Some(component) = existing else {
                    debug!("component already absent");
                    return Ok(EdgeResult::new(
                        EdgeOutcome::AlreadyRevoked,
                        Annotations::with_rate_limits([lookup_limit]),
                    ));
                };
                let delete_limit = self
                    .store
                    .delete_object(tables::PERMISSION_SET_GROUP_COMPONENT, component.id())
                    .await?;
                Ok(EdgeResult::applied(Annotations::with_rate_limits([
                    lookup_limit,
                    delete_limit,
                ])))
            }
            other => Err(ConnectorError::unsupported(
                other.as_str(),
                "permission set group revoke",
            )),
        }
    }

    /// Overwrite the user's role.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn grant_role(
        &self,
        role_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        require_user(principal, "role grant")?;
        let annotations = self
            .store
            .set_field(tables::USER, &principal.id, "UserRoleId", json!(role_id))
            .await?;
        Ok(EdgeResult::applied(annotations))
    }

    /// Clear the user's role while it is still `role_id`.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn revoke_role(
        &self,
        role_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        require_user(principal, "role revoke")?;
        match self
            .store
            .clear_field(tables::USER, &principal.id, "UserRoleId", role_id)
            .await
        {
            Ok(annotations) => Ok(EdgeResult::applied(annotations)),
            Err(ConnectorError::PreconditionFailed { .. }) => {
                debug!("user no longer holds the role");
                Ok(EdgeResult::new(
                    EdgeOutcome::AlreadyRevoked,
                    Annotations::default(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Set the user's profile unconditionally.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn grant_profile(
        &self,
        profile_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        require_user(principal, "profile grant")?;
        let annotations = self
            .store
            .set_field(tables::USER, &principal.id, "ProfileId", json!(profile_id))
            .await?;
        Ok(EdgeResult::applied(annotations))
    }

    /// Move the user off `profile_id` onto the least-privileged profile for
    /// the same license. A user always has a profile, so this never clears.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn revoke_profile(
        &self,
        profile_id: &str,
        principal: &ResourceId,
    ) -> ConnectorResult<EdgeResult> {
        require_user(principal, "profile revoke")?;
        let store = self.store.as_ref();
        let mut annotations = Annotations::new();

        let (user, rate_limit) = store.get_object(tables::USER, &principal.id).await?;
        annotations.push_rate_limit(rate_limit);
        if user.string("ProfileId") != Some(profile_id) {
            debug!("user no longer holds the profile");
            return Ok(EdgeResult::new(EdgeOutcome::AlreadyRevoked, annotations));
        }

        let (profile, rate_limit) = get_profile_by_id(store, profile_id).await?;
        annotations.push_rate_limit(rate_limit);

        let (license, rate_limit) = get_user_license_by_id(store, &profile.user_license_id).await?;
        annotations.push_rate_limit(rate_limit);

        let fallback_name = self
            .least_privileged_profiles
            .get(&license.name)
            .ok_or_else(|| ConnectorError::Configuration {
                message: format!(
                    "no least privileged profile found for license {}. Please add a mapping in the connector configuration",
                    license.name
                ),
            })?;

        let (fallback, rate_limit) = get_profile_by_name(store, fallback_name).await?;
        annotations.push_rate_limit(rate_limit);
        if fallback.id == profile_id {
            return Err(ConnectorError::Configuration {
                message: format!(
                    "least privileged profile {} for license {} is the profile being revoked",
                    fallback.name, license.name
                ),
            });
        }

        info!(
            license = %license.name,
            from_profile = %profile.name,
            to_profile = %fallback.name,
            "downgrading user profile"
        );
        let written = store
            .set_field(tables::USER, &principal.id, "ProfileId", json!(fallback.id))
            .await?;
        annotations.rate_limits.extend(written.rate_limits);

        Ok(EdgeResult::applied(annotations))
    }

    /// Activate or deactivate a user.
    #[instrument(skip(self))]
    pub async fn set_user_active(&self, user_id: &str, active: bool) -> ConnectorResult<Annotations> {
        self.store
            .set_field(tables::USER, user_id, "IsActive", json!(active))
            .await
    }

    fn assignment_query(permission_set_id: &str, assignee_id: &str) -> Query {
        Query::new(tables::PERMISSION_SET_ASSIGNMENT)
            .where_eq("AssigneeId", assignee_id)
            .where_eq("PermissionSetId", permission_set_id)
    }

    fn component_query(group_id: &str, permission_set_id: &str) -> Query {
        Query::new(tables::PERMISSION_SET_GROUP_COMPONENT)
            .where_eq("PermissionSetGroupId", group_id)
            .where_eq("PermissionSetId", permission_set_id)
    }

    async fn create_if_absent(
        &self,
        query: &Query,
        values: Map<String, Value>,
    ) -> ConnectorResult<EdgeResult> {
        let (existing, lookup_limit) = self.store.find_unique(query).await?;
        if existing.is_some() {
            debug!(table = %query.table(), "edge already present");
            return Ok(EdgeResult::new(
                EdgeOutcome::AlreadyExists,
                Annotations::with_rate_limits([lookup_limit]),
            ));
        }
        let (_, create_limit) = self.store.create_object(query.table(), values).await?;
        Ok(EdgeResult::applied(Annotations::with_rate_limits([
            lookup_limit,
            create_limit,
        ])))
    }

    async fn find_and_delete(&self, query: &Query) -> ConnectorResult<EdgeResult> {
        let (record, lookup_limit) = match self.store.get_single_object(query).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                debug!(table = %query.table(), "edge already absent");
                return Ok(EdgeResult::new(
                    EdgeOutcome::AlreadyRevoked,
                    Annotations::default(),
                ));
            }
            Err(e) => return Err(e),
        };

        match self.store.delete_object(query.table(), record.id()).await {
            Ok(delete_limit) => Ok(EdgeResult::applied(Annotations::with_rate_limits([
                lookup_limit,
                delete_limit,
            ]))),
            Err(e) if e.is_not_found() => Ok(EdgeResult::new(
                EdgeOutcome::AlreadyRevoked,
                Annotations::with_rate_limits([lookup_limit]),
            )),
            Err(e) => Err(e),
        }
    }
}
