/*!

Capability traits for the three external services the orchestrators drive, plus the wire types
they exchange. The AWS implementations live in [`aws`]; tests inject the in-memory fake instead,
so the orchestration logic never needs real cloud access.

!*/

use crate::config::ProvisionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

pub mod aws;
#[cfg(test)]
pub(crate) mod fake;

/// Service error codes the orchestrators make policy decisions on. Any other code is fatal.
pub mod code {
    /// IAM: the role (or policy attachment) does not exist.
    pub const NO_SUCH_ENTITY: &str = "NoSuchEntity";
    /// IAM: a role with the requested name already exists.
    pub const ENTITY_ALREADY_EXISTS: &str = "EntityAlreadyExists";
    /// Cluster service: no cluster with the requested identifier.
    pub const CLUSTER_NOT_FOUND: &str = "ClusterNotFound";
    /// EC2: the security group does not exist.
    pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
    /// EC2: the exact ingress rule is already present.
    pub const DUPLICATE_RULE: &str = "InvalidPermission.Duplicate";
    /// Anything that failed before the service produced an error code.
    pub const REQUEST_FAILURE: &str = "RequestFailure";
}

/// A failure reported by one of the capability clients, reduced to the provider's error code and
/// a human-readable message.
#[derive(Clone, Debug, Eq, PartialEq, Snafu)]
#[snafu(display("{} ({})", message, code))]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True if the entity the call addressed does not exist (in any service's vocabulary).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code.as_str(),
            code::NO_SUCH_ENTITY | code::CLUSTER_NOT_FOUND | code::GROUP_NOT_FOUND
        )
    }

    /// True if creation failed because the entity already exists.
    pub fn is_already_exists(&self) -> bool {
        self.code == code::ENTITY_ALREADY_EXISTS
    }

    /// True if an identical ingress rule is already in place.
    pub fn is_duplicate_rule(&self) -> bool {
        self.code == code::DUPLICATE_RULE
    }
}

/// Lifecycle state reported by the cluster service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Creating,
    Available,
    Deleting,
    Deleted,
    /// Any state this crate does not make decisions on.
    #[serde(other)]
    Unknown,
}

serde_plain::derive_fromstr_from_deserialize!(ClusterStatus);
serde_plain::derive_display_from_serialize!(ClusterStatus);

/// What we know about the provisioned cluster. The VPC id is populated asynchronously by the
/// service; it may be absent from the creation response and show up in a later describe.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHandle {
    pub cluster_id: String,
    pub status: ClusterStatus,
    pub vpc_id: Option<String>,
}

/// One security group of a VPC.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// An inbound firewall rule on a security group. `port` is both ends of the range; the warehouse
/// listens on a single port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    pub protocol: String,
    pub port: u16,
    pub source_cidr: String,
}

/// Role identity management: the capability behind the identity steps of both orchestrators.
#[async_trait]
pub trait IdentityClient {
    /// Create `role_name` with a trust policy restricted to the single service principal
    /// `trust_service`.
    async fn create_role(&self, role_name: &str, trust_service: &str)
        -> Result<(), ServiceError>;

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError>;

    /// Read the role back and return its ARN. The creation response is not guaranteed to carry
    /// the same fields, so resolution is a dedicated read.
    async fn role_arn(&self, role_name: &str) -> Result<String, ServiceError>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError>;

    async fn delete_role(&self, role_name: &str) -> Result<(), ServiceError>;
}

/// Warehouse cluster lifecycle.
#[async_trait]
pub trait ClusterClient {
    /// Start cluster creation with `role_arn` as the only attached IAM role. Creation is
    /// asynchronous; the returned handle usually reports `creating` and no VPC id yet.
    async fn create_cluster(
        &self,
        config: &ProvisionConfig,
        role_arn: &str,
    ) -> Result<ClusterHandle, ServiceError>;

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterHandle, ServiceError>;

    /// Request deletion, skipping the final snapshot. Returns as soon as deletion is underway.
    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError>;
}

/// VPC security-group ingress.
#[async_trait]
pub trait NetworkClient {
    async fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ServiceError>;

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> Result<(), ServiceError>;
}
