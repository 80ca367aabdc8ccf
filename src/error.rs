use crate::clients::ServiceError;
use snafu::Snafu;

/// Everything that can stop the create path. Each variant names the step that failed and the
/// entity it was acting on; the underlying service error keeps the provider's code.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    #[snafu(display("Unable to create identity role '{}': {}", role_name, source))]
    Identity {
        role_name: String,
        source: ServiceError,
    },

    #[snafu(display(
        "Unable to attach policy '{}' to role '{}': {}",
        policy_arn,
        role_name,
        source
    ))]
    PolicyAttach {
        role_name: String,
        policy_arn: String,
        source: ServiceError,
    },

    #[snafu(display("Unable to resolve ARN for role '{}': {}", role_name, source))]
    RoleArn {
        role_name: String,
        source: ServiceError,
    },

    #[snafu(display("Cluster step failed for '{}': {}", cluster_id, source))]
    Cluster {
        cluster_id: String,
        source: ServiceError,
    },

    #[snafu(display(
        "Timed-out waiting for cluster '{}' to report its VPC id",
        cluster_id
    ))]
    Timeout { cluster_id: String },

    #[snafu(display("VPC '{}' has no security group named 'default'", vpc_id))]
    DefaultSecurityGroupMissing { vpc_id: String },

    #[snafu(display("Unable to open ingress on VPC '{}': {}", vpc_id, source))]
    Network {
        vpc_id: String,
        source: ServiceError,
    },
}

/// Everything that can stop the delete path. "Not found" never appears here; the teardown
/// orchestrator treats it as already-torn-down at every step.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TeardownError {
    #[snafu(display("Unable to delete cluster '{}': {}", cluster_id, source))]
    ClusterDelete {
        cluster_id: String,
        source: ServiceError,
    },

    #[snafu(display(
        "Unable to detach policy '{}' from role '{}': {}",
        policy_arn,
        role_name,
        source
    ))]
    PolicyDetach {
        role_name: String,
        policy_arn: String,
        source: ServiceError,
    },

    #[snafu(display("Unable to delete role '{}': {}", role_name, source))]
    RoleDelete {
        role_name: String,
        source: ServiceError,
    },
}
