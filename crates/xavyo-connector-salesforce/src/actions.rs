//! Named actions invocable by the host.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::types::Annotations;

use crate::reconcile::Reconciler;

/// Activate or deactivate a user.
pub const UPDATE_USER_STATUS: &str = "update_user_status";

/// Arguments of [`UPDATE_USER_STATUS`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateUserStatusArgs {
    pub resource_id: String,
    pub is_active: bool,
}

/// Dispatch an action by name.
pub async fn invoke_action(
    reconciler: &Reconciler,
    name: &str,
    args: Value,
) -> ConnectorResult<(Value, Annotations)> {
    match name {
        UPDATE_USER_STATUS => {
            let args: UpdateUserStatusArgs = serde_json::from_value(args).map_err(|e| {
                ConnectorError::invalid_request(format!("invalid {UPDATE_USER_STATUS} arguments: {e}"))
            })?;
            if args.resource_id.is_empty() {
                return Err(ConnectorError::invalid_request("resource_id is required"));
            }
            let annotations = reconciler
                .set_user_active(&args.resource_id, args.is_active)
                .await?;
            info!(
                user_id = %args.resource_id,
                is_active = args.is_active,
                "updated user status"
            );
            Ok((json!({ "success": true }), annotations))
        }
        other => Err(ConnectorError::invalid_request(format!(
            "unknown action: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_deserialize() {
        let args: UpdateUserStatusArgs =
            serde_json::from_value(json!({"resource_id": "0051", "is_active": false})).unwrap();
        assert_eq!(args.resource_id, "0051");
        assert!(!args.is_active);

        assert!(serde_json::from_value::<UpdateUserStatusArgs>(json!({"resource_id": "0051"})).is_err());
    }
}
