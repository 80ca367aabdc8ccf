//! The create path: role, cluster, then ingress. Strictly sequential because each step consumes
//! the previous step's output, and fail-fast because none of the mutations are safe to retry
//! blindly. There is no automatic rollback; a failed run reports which step and entity failed so
//! the caller can decide between re-running and tearing down.

use crate::clients::{ClusterClient, ClusterHandle, IdentityClient, IngressRule, NetworkClient};
use crate::config::ProvisionConfig;
use crate::error::{self, ProvisionError};
use log::info;
use snafu::{OptionExt, ResultExt};

const INGRESS_PROTOCOL: &str = "tcp";
const DEFAULT_GROUP_NAME: &str = "default";

/// The role created by the identity step. The ARN comes from the dedicated re-read of the role,
/// never from the creation response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityRole {
    pub name: String,
    pub arn: String,
}

/// Execute the create path end-to-end and return a handle to the cluster with its VPC id
/// resolved.
///
/// Re-running after a partial failure is not safe in general: the role and cluster creation
/// calls are not idempotent, and a leftover role from an earlier run surfaces as an error
/// here rather than being silently adopted. Tear down first, or remove the conflicting
/// entities by hand.
pub async fn provision<I, C, N>(
    config: &ProvisionConfig,
    identity: &I,
    cluster: &C,
    network: &N,
) -> Result<ClusterHandle, ProvisionError>
where
    I: IdentityClient + Sync,
    C: ClusterClient + Sync,
    N: NetworkClient + Sync,
{
    identity
        .create_role(&config.role_name, &config.trust_service)
        .await
        .context(error::IdentitySnafu {
            role_name: &config.role_name,
        })?;
    info!(
        "Created role '{}' trusting '{}'",
        config.role_name, config.trust_service
    );

    for policy_arn in &config.policy_arns {
        identity
            .attach_policy(&config.role_name, policy_arn)
            .await
            .context(error::PolicyAttachSnafu {
                role_name: &config.role_name,
                policy_arn,
            })?;
        info!(
            "Attached policy '{}' to role '{}'",
            policy_arn, config.role_name
        );
    }

    // The creation response is not guaranteed to carry the ARN, so read the role back.
    let role = IdentityRole {
        name: config.role_name.clone(),
        arn: identity
            .role_arn(&config.role_name)
            .await
            .context(error::RoleArnSnafu {
                role_name: &config.role_name,
            })?,
    };
    info!("Role '{}' has ARN '{}'", role.name, role.arn);

    let handle = cluster
        .create_cluster(config, &role.arn)
        .await
        .context(error::ClusterSnafu {
            cluster_id: &config.cluster_id,
        })?;
    info!(
        "Cluster '{}' creation started (status '{}')",
        handle.cluster_id, handle.status
    );

    // Cluster creation is asynchronous and the VPC id may not be assigned yet; poll the
    // description until it shows up, bounded by the configured maximum wait.
    let vpc_id = tokio::time::timeout(config.vpc_wait_max, wait_for_vpc_id(cluster, config))
        .await
        .ok()
        .context(error::TimeoutSnafu {
            cluster_id: &config.cluster_id,
        })??;
    info!("Cluster '{}' is in VPC '{}'", config.cluster_id, vpc_id);

    open_ingress(network, config, &vpc_id).await?;

    Ok(ClusterHandle {
        vpc_id: Some(vpc_id),
        ..handle
    })
}

async fn wait_for_vpc_id<C>(cluster: &C, config: &ProvisionConfig) -> Result<String, ProvisionError>
where
    C: ClusterClient + Sync,
{
    loop {
        let handle = cluster
            .describe_cluster(&config.cluster_id)
            .await
            .context(error::ClusterSnafu {
                cluster_id: &config.cluster_id,
            })?;
        if let Some(vpc_id) = handle.vpc_id {
            return Ok(vpc_id);
        }
        info!(
            "Cluster '{}' has no VPC id yet (status '{}')",
            config.cluster_id, handle.status
        );
        tokio::time::sleep(config.vpc_poll_interval).await;
    }
}

/// Authorize inbound TCP on the configured port through the VPC's default security group. An
/// exact duplicate of the rule counts as already satisfied; a conflicting rule on the same port
/// does not.
async fn open_ingress<N>(
    network: &N,
    config: &ProvisionConfig,
    vpc_id: &str,
) -> Result<(), ProvisionError>
where
    N: NetworkClient + Sync,
{
    let default_group = network
        .security_groups(vpc_id)
        .await
        .context(error::NetworkSnafu { vpc_id })?
        .into_iter()
        .find(|group| group.name == DEFAULT_GROUP_NAME)
        .context(error::DefaultSecurityGroupMissingSnafu { vpc_id })?;

    let rule = IngressRule {
        protocol: INGRESS_PROTOCOL.to_string(),
        port: config.ingress_port,
        source_cidr: config.ingress_cidr.clone(),
    };
    match network.authorize_ingress(&default_group.id, &rule).await {
        Ok(()) => info!(
            "Opened {}/{} from {} on group '{}'",
            rule.protocol, rule.port, rule.source_cidr, default_group.id
        ),
        Err(error) if error.is_duplicate_rule() => info!(
            "Ingress {}/{} from {} already in place on group '{}'",
            rule.protocol, rule.port, rule.source_cidr, default_group.id
        ),
        Err(error) => return Err(error).context(error::NetworkSnafu { vpc_id }),
    }
    Ok(())
}
