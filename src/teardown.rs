//! The delete path: cluster first, then the role's policy attachments, then the role itself —
//! the reverse of dependency order. "Not found" means the entity is already gone and is treated
//! as success at every step, so teardown of a half-provisioned or never-provisioned environment
//! still completes. Cluster deletion is asynchronous and this path does not wait for it; callers
//! needing a synchronous guarantee must poll the cluster status themselves.

use crate::clients::{ClusterClient, IdentityClient};
use crate::config::ProvisionConfig;
use crate::error::{self, TeardownError};
use log::info;
use snafu::ResultExt;

/// Reverse the provisioning steps.
pub async fn teardown<I, C>(
    config: &ProvisionConfig,
    identity: &I,
    cluster: &C,
) -> Result<(), TeardownError>
where
    I: IdentityClient + Sync,
    C: ClusterClient + Sync,
{
    match cluster.delete_cluster(&config.cluster_id).await {
        Ok(()) => info!("Cluster '{}' deletion requested", config.cluster_id),
        Err(error) if error.is_not_found() => {
            info!("Cluster '{}' is already gone", config.cluster_id)
        }
        Err(error) => {
            return Err(error).context(error::ClusterDeleteSnafu {
                cluster_id: &config.cluster_id,
            })
        }
    }

    for policy_arn in &config.policy_arns {
        match identity.detach_policy(&config.role_name, policy_arn).await {
            Ok(()) => info!(
                "Detached policy '{}' from role '{}'",
                policy_arn, config.role_name
            ),
            Err(error) if error.is_not_found() => info!(
                "Policy '{}' was not attached to role '{}'",
                policy_arn, config.role_name
            ),
            Err(error) => {
                return Err(error).context(error::PolicyDetachSnafu {
                    role_name: &config.role_name,
                    policy_arn,
                })
            }
        }
    }

    match identity.delete_role(&config.role_name).await {
        Ok(()) => info!("Deleted role '{}'", config.role_name),
        Err(error) if error.is_not_found() => {
            info!("Role '{}' is already gone", config.role_name)
        }
        Err(error) => {
            return Err(error).context(error::RoleDeleteSnafu {
                role_name: &config.role_name,
            })
        }
    }

    Ok(())
}
