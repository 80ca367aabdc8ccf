/*!

AWS implementations of the capability traits: IAM for identity, Redshift for the warehouse
cluster, EC2 for security-group ingress. Region and credentials come from explicit configuration
through [`sdk_config`]; nothing here reads ambient global state beyond the standard SDK
environment fallbacks.

!*/

use crate::clients::{
    code, ClusterClient, ClusterHandle, ClusterStatus, IdentityClient, IngressRule, NetworkClient,
    SecurityGroup, ServiceError,
};
use crate::config::{AwsSettings, ProvisionConfig};
use async_trait::async_trait;
use aws_sdk_ec2::model::Filter;
use aws_sdk_iam::types::SdkError;
use aws_sdk_iam::Region;
use aws_sdk_redshift::model::Cluster;
use aws_smithy_types::retry::ProvideErrorKind;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_types::SdkConfig;
use serde_json::json;

/// Build the shared SDK config from our `[aws]` settings. Static credentials from the config
/// file take precedence; otherwise the SDK's default provider chain applies.
pub async fn sdk_config(aws: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::from_env().region(Region::new(aws.region.clone()));
    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(SharedCredentialsProvider::new(Credentials::new(
            key_id.clone(),
            secret.clone(),
            None,
            None,
            "warehouse-config",
        )));
    }
    loader.load().await
}

/// Reduce an SDK failure to the service's error code and message. Failures that never reached
/// the service (construction, dispatch, timeouts) get the `RequestFailure` code.
fn sdk_error<E>(error: SdkError<E>) -> ServiceError
where
    E: ProvideErrorKind + std::error::Error,
{
    match &error {
        SdkError::ServiceError(context) => {
            let service_error = context.err();
            ServiceError::new(
                service_error.code().unwrap_or(code::REQUEST_FAILURE),
                service_error.to_string(),
            )
        }
        _ => ServiceError::new(code::REQUEST_FAILURE, error.to_string()),
    }
}

pub struct AwsIdentityClient {
    iam: aws_sdk_iam::Client,
}

impl AwsIdentityClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityClient for AwsIdentityClient {
    async fn create_role(
        &self,
        role_name: &str,
        trust_service: &str,
    ) -> Result<(), ServiceError> {
        let trust_policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": trust_service },
                "Action": "sts:AssumeRole"
            }]
        });
        self.iam
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy.to_string())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn role_arn(&self, role_name: &str) -> Result<String, ServiceError> {
        let output = self
            .iam
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(sdk_error)?;
        output
            .role()
            .and_then(|role| role.arn())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::new(
                    code::REQUEST_FAILURE,
                    format!("get-role response for '{}' carried no ARN", role_name),
                )
            })
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError> {
        self.iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), ServiceError> {
        self.iam
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}

pub struct AwsClusterClient {
    redshift: aws_sdk_redshift::Client,
}

impl AwsClusterClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            redshift: aws_sdk_redshift::Client::new(config),
        }
    }
}

fn cluster_handle(cluster: Option<&Cluster>, requested_id: &str) -> ClusterHandle {
    ClusterHandle {
        cluster_id: cluster
            .and_then(|c| c.cluster_identifier())
            .unwrap_or(requested_id)
            .to_string(),
        status: cluster
            .and_then(|c| c.cluster_status())
            .and_then(|s| s.parse().ok())
            .unwrap_or(ClusterStatus::Unknown),
        vpc_id: cluster.and_then(|c| c.vpc_id()).map(str::to_string),
    }
}

#[async_trait]
impl ClusterClient for AwsClusterClient {
    async fn create_cluster(
        &self,
        config: &ProvisionConfig,
        role_arn: &str,
    ) -> Result<ClusterHandle, ServiceError> {
        let output = self
            .redshift
            .create_cluster()
            .cluster_type(&config.cluster_type)
            .node_type(&config.node_type)
            .number_of_nodes(config.node_count)
            .db_name(&config.database)
            .cluster_identifier(&config.cluster_id)
            .master_username(&config.master_username)
            .master_user_password(&config.master_password)
            .iam_roles(role_arn)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(cluster_handle(output.cluster(), &config.cluster_id))
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterHandle, ServiceError> {
        let output = self
            .redshift
            .describe_clusters()
            .cluster_identifier(cluster_id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(cluster_handle(
            output.clusters().unwrap_or_default().first(),
            cluster_id,
        ))
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError> {
        self.redshift
            .delete_cluster()
            .cluster_identifier(cluster_id)
            .skip_final_cluster_snapshot(true)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}

pub struct AwsNetworkClient {
    ec2: aws_sdk_ec2::Client,
}

impl AwsNetworkClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
        }
    }
}

#[async_trait]
impl NetworkClient for AwsNetworkClient {
    async fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ServiceError> {
        let output = self
            .ec2
            .describe_security_groups()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(output
            .security_groups()
            .unwrap_or_default()
            .iter()
            .map(|group| SecurityGroup {
                id: group.group_id().unwrap_or_default().to_string(),
                name: group.group_name().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> Result<(), ServiceError> {
        self.ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_protocol(&rule.protocol)
            .from_port(i32::from(rule.port))
            .to_port(i32::from(rule.port))
            .cidr_ip(&rule.source_cidr)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}
