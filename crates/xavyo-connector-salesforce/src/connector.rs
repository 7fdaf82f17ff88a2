//! Salesforce Connector implementation
//!
//! Composes the client, the per-kind syncers, the reconciler and the
//! provisioning flow behind the framework's [`Connector`] trait.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use xavyo_connector::config::ConnectorConfig;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::traits::{Connector, ResourceSyncer};
use xavyo_connector::types::{Annotations, ConnectorType, Resource};

use crate::actions;
use crate::client::SalesforceClient;
use crate::config::SalesforceConfig;
use crate::provisioning::{AccountRequest, Provisioner};
use crate::reconcile::Reconciler;
use crate::resources::{
    ConnectedAppSyncer, GroupSyncer, PermissionSetGroupSyncer, PermissionSetSyncer, ProfileSyncer,
    RoleSyncer, UserSyncOptions, UserSyncer,
};
use crate::store::ObjectStore;

/// Salesforce connector for identity sync and access reconciliation.
pub struct SalesforceConnector {
    config: SalesforceConfig,
    display_name: String,
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<Reconciler>,
    provisioner: Provisioner,
    disposed: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for SalesforceConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceConnector")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl SalesforceConnector {
    /// Create a connector talking to the org over HTTP.
    pub fn new(config: SalesforceConfig) -> ConnectorResult<Self> {
        let client = SalesforceClient::new(config.clone())?;
        Self::with_store(config, Arc::new(client))
    }

    /// Create a connector over any object store.
    pub fn with_store(config: SalesforceConfig, store: Arc<dyn ObjectStore>) -> ConnectorResult<Self> {
        let config = config.validated()?;

        let display_name = format!("Salesforce: {}", config.base_url());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            config.license_to_least_privileged_profile.clone(),
        ));
        let provisioner = Provisioner::new(
            Arc::clone(&store),
            Arc::clone(&reconciler),
            config.provisioning_retry.clone(),
            config.use_username_for_email,
        );

        Ok(Self {
            config,
            display_name,
            store,
            reconciler,
            provisioner,
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &SalesforceConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    async fn check_disposed(&self) -> ConnectorResult<()> {
        if *self.disposed.read().await {
            return Err(ConnectorError::invalid_configuration(
                "Connector has been disposed",
            ));
        }
        Ok(())
    }

    /// The active syncers, one per resource kind.
    ///
    /// Connected applications are only included when enabled.
    pub fn resource_syncers(&self) -> Vec<Arc<dyn ResourceSyncer>> {
        let store = &self.store;
        let options = UserSyncOptions {
            use_username_for_email: self.config.use_username_for_email,
            sync_deactivated_users: self.config.sync_deactivated_users,
            sync_non_standard_users: self.config.sync_non_standard_users,
        };

        let mut syncers: Vec<Arc<dyn ResourceSyncer>> = vec![
            Arc::new(UserSyncer::new(Arc::clone(store), options)),
            Arc::new(GroupSyncer::new(Arc::clone(store), Arc::clone(&self.reconciler))),
            Arc::new(RoleSyncer::new(Arc::clone(store), Arc::clone(&self.reconciler))),
            Arc::new(ProfileSyncer::new(Arc::clone(store), Arc::clone(&self.reconciler))),
            Arc::new(PermissionSetSyncer::new(
                Arc::clone(store),
                Arc::clone(&self.reconciler),
            )),
            Arc::new(PermissionSetGroupSyncer::new(
                Arc::clone(store),
                Arc::clone(&self.reconciler),
            )),
        ];
        if self.config.sync_connected_apps {
            syncers.push(Arc::new(ConnectedAppSyncer::new(Arc::clone(store))));
        }
        debug!(count = syncers.len(), "resource syncers");
        syncers
    }

    /// Create (or reactivate) an account from a profile map.
    #[instrument(skip(self, profile, cancel))]
    pub async fn create_account(
        &self,
        profile: &serde_json::Map<String, Value>,
        cancel: &CancellationToken,
    ) -> ConnectorResult<(Resource, Annotations)> {
        self.check_disposed().await?;
        let request = AccountRequest::from_profile(profile)?;
        self.provisioner.create_account(&request, cancel).await
    }

    /// Run a named action.
    pub async fn invoke_action(&self, name: &str, args: Value) -> ConnectorResult<(Value, Annotations)> {
        self.check_disposed().await?;
        actions::invoke_action(&self.reconciler, name, args).await
    }
}

#[async_trait]
impl Connector for SalesforceConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Salesforce
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.check_disposed().await?;
        let me = self.store.current_user().await?;
        info!(
            user_id = %me.id,
            company = %me.company_name,
            "Salesforce connection test successful"
        );
        Ok(())
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        let mut disposed = self.disposed.write().await;
        *disposed = true;
        self.store.clear_caches();
        info!("Salesforce connector disposed");
        Ok(())
    }
}
