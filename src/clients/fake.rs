//! An in-memory stand-in for the three cloud services so the orchestrators can be exercised
//! without network access. Every call is recorded for ordering assertions, and a few knobs
//! inject the failures the orchestration policy has to handle.

use crate::clients::{
    code, ClusterClient, ClusterHandle, ClusterStatus, IdentityClient, IngressRule, NetworkClient,
    SecurityGroup, ServiceError,
};
use crate::config::ProvisionConfig;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

/// The VPC every fake cluster lands in.
pub const FAKE_VPC_ID: &str = "vpc-0123";
/// Group id of the VPC's default security group.
pub const DEFAULT_GROUP_ID: &str = "sg-default";
/// Group id of the VPC's other, non-default security group.
pub const EXTRA_GROUP_ID: &str = "sg-extra";

#[derive(Debug, Default)]
struct FakeRole {
    arn: String,
    policies: BTreeSet<String>,
}

#[derive(Debug)]
struct FakeCluster {
    status: ClusterStatus,
    vpc_id: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, FakeRole>,
    clusters: BTreeMap<String, FakeCluster>,
    rules: BTreeMap<String, Vec<IngressRule>>,
    calls: Vec<String>,
    describes: u32,
}

#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    attach_denied: bool,
    delete_cluster_denied: bool,
    role_vanishes_before_read: bool,
    default_group_missing: bool,
    vpc_ready_after: u32,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every attach-policy call.
    pub fn with_attach_denied(mut self) -> Self {
        self.attach_denied = true;
        self
    }

    /// Deny every delete-cluster call.
    pub fn with_delete_cluster_denied(mut self) -> Self {
        self.delete_cluster_denied = true;
        self
    }

    /// Delete the role out from under the run before the get-role read, as a concurrent actor
    /// could.
    pub fn with_role_vanishing_before_read(mut self) -> Self {
        self.role_vanishes_before_read = true;
        self
    }

    /// Leave the default security group out of every listing.
    pub fn with_default_group_missing(mut self) -> Self {
        self.default_group_missing = true;
        self
    }

    /// Hold the VPC id back for the first `polls` describe-cluster calls. `u32::MAX` means the
    /// id never shows up.
    pub fn with_vpc_ready_after(mut self, polls: u32) -> Self {
        self.vpc_ready_after = polls;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("poisoned").calls.clone()
    }

    /// True once no role, cluster, or ingress rule remains.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().expect("poisoned");
        state.roles.is_empty()
            && state.clusters.is_empty()
            && state.rules.values().all(|rules| rules.is_empty())
    }

    pub fn seed_role(&self, role_name: &str) {
        let mut state = self.state.lock().expect("poisoned");
        state.roles.insert(
            role_name.to_string(),
            FakeRole {
                arn: role_arn(role_name),
                policies: BTreeSet::new(),
            },
        );
    }

    pub fn seed_rule(&self, group_id: &str, rule: IngressRule) {
        let mut state = self.state.lock().expect("poisoned");
        state.rules.entry(group_id.to_string()).or_default().push(rule);
    }
}

fn role_arn(role_name: &str) -> String {
    format!("arn:aws:iam::123456789012:role/{}", role_name)
}

fn not_found(what: &str, which: &str) -> ServiceError {
    let code = match what {
        "cluster" => code::CLUSTER_NOT_FOUND,
        _ => code::NO_SUCH_ENTITY,
    };
    ServiceError::new(code, format!("{} '{}' does not exist", what, which))
}

#[async_trait]
impl IdentityClient for FakeCloud {
    async fn create_role(
        &self,
        role_name: &str,
        trust_service: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state
            .calls
            .push(format!("create-role {} trust={}", role_name, trust_service));
        if state.roles.contains_key(role_name) {
            return Err(ServiceError::new(
                code::ENTITY_ALREADY_EXISTS,
                format!("role '{}' already exists", role_name),
            ));
        }
        state.roles.insert(
            role_name.to_string(),
            FakeRole {
                arn: role_arn(role_name),
                policies: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state
            .calls
            .push(format!("attach-policy {} {}", role_name, policy_arn));
        if self.attach_denied {
            return Err(ServiceError::new("AccessDenied", "attach-policy denied"));
        }
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        role.policies.insert(policy_arn.to_string());
        Ok(())
    }

    async fn role_arn(&self, role_name: &str) -> Result<String, ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!("get-role {}", role_name));
        if self.role_vanishes_before_read {
            state.roles.remove(role_name);
        }
        state
            .roles
            .get(role_name)
            .map(|role| role.arn.clone())
            .ok_or_else(|| not_found("role", role_name))
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state
            .calls
            .push(format!("detach-policy {} {}", role_name, policy_arn));
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        if !role.policies.remove(policy_arn) {
            return Err(not_found("policy attachment", policy_arn));
        }
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!("delete-role {}", role_name));
        state
            .roles
            .remove(role_name)
            .map(|_| ())
            .ok_or_else(|| not_found("role", role_name))
    }
}

#[async_trait]
impl ClusterClient for FakeCloud {
    async fn create_cluster(
        &self,
        config: &ProvisionConfig,
        role_arn: &str,
    ) -> Result<ClusterHandle, ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!(
            "create-cluster {} nodes={} role={}",
            config.cluster_id, config.node_count, role_arn
        ));
        if state.clusters.contains_key(&config.cluster_id) {
            return Err(ServiceError::new(
                "ClusterAlreadyExists",
                format!("cluster '{}' already exists", config.cluster_id),
            ));
        }
        state.clusters.insert(
            config.cluster_id.clone(),
            FakeCluster {
                status: ClusterStatus::Creating,
                vpc_id: None,
            },
        );
        Ok(ClusterHandle {
            cluster_id: config.cluster_id.clone(),
            status: ClusterStatus::Creating,
            vpc_id: None,
        })
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterHandle, ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!("describe-cluster {}", cluster_id));
        let polls_so_far = state.describes;
        state.describes += 1;
        let ready = polls_so_far >= self.vpc_ready_after;
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found("cluster", cluster_id))?;
        if ready && cluster.vpc_id.is_none() {
            cluster.status = ClusterStatus::Available;
            cluster.vpc_id = Some(FAKE_VPC_ID.to_string());
        }
        Ok(ClusterHandle {
            cluster_id: cluster_id.to_string(),
            status: cluster.status.clone(),
            vpc_id: cluster.vpc_id.clone(),
        })
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!("delete-cluster {}", cluster_id));
        if self.delete_cluster_denied {
            return Err(ServiceError::new("AccessDenied", "delete-cluster denied"));
        }
        let cluster = state
            .clusters
            .remove(cluster_id)
            .ok_or_else(|| not_found("cluster", cluster_id))?;
        // Deletion also drops the ingress rules of the cluster's own VPC, like the real services
        // eventually do when the environment is dismantled. Other VPCs keep theirs.
        if cluster.vpc_id.as_deref() == Some(FAKE_VPC_ID) {
            state.rules.remove(DEFAULT_GROUP_ID);
            state.rules.remove(EXTRA_GROUP_ID);
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for FakeCloud {
    async fn security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!("security-groups {}", vpc_id));
        if vpc_id != FAKE_VPC_ID {
            return Ok(Vec::new());
        }
        let mut groups = vec![SecurityGroup {
            id: EXTRA_GROUP_ID.to_string(),
            name: "launch-wizard-1".to_string(),
        }];
        if !self.default_group_missing {
            groups.push(SecurityGroup {
                id: DEFAULT_GROUP_ID.to_string(),
                name: "default".to_string(),
            });
        }
        Ok(groups)
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rule: &IngressRule,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("poisoned");
        state.calls.push(format!(
            "authorize-ingress {} {}/{} {}",
            group_id, rule.protocol, rule.port, rule.source_cidr
        ));
        let rules = state.rules.entry(group_id.to_string()).or_default();
        if rules.contains(rule) {
            return Err(ServiceError::new(
                code::DUPLICATE_RULE,
                "the specified rule already exists",
            ));
        }
        if rules
            .iter()
            .any(|existing| existing.protocol == rule.protocol && existing.port == rule.port)
        {
            return Err(ServiceError::new(
                "InvalidPermission.Malformed",
                "a rule for this port exists with a different source",
            ));
        }
        rules.push(rule.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule() -> IngressRule {
        IngressRule {
            protocol: "tcp".to_string(),
            port: 5439,
            source_cidr: "0.0.0.0/0".to_string(),
        }
    }

    #[tokio::test]
    async fn delete_cluster_keeps_rules_of_other_vpcs() {
        let cloud = FakeCloud::new();
        let config = test_config();
        cloud.seed_rule("sg-elsewhere", rule());

        cloud.create_cluster(&config, "arn:fake").await.unwrap();
        cloud.describe_cluster(&config.cluster_id).await.unwrap();
        cloud
            .authorize_ingress(DEFAULT_GROUP_ID, &rule())
            .await
            .unwrap();
        cloud.delete_cluster(&config.cluster_id).await.unwrap();

        let state = cloud.state.lock().unwrap();
        assert!(!state.rules.contains_key(DEFAULT_GROUP_ID));
        assert_eq!(state.rules["sg-elsewhere"], vec![rule()]);
    }
}

/// The config the orchestrator tests share.
pub fn test_config() -> ProvisionConfig {
    ProvisionConfig {
        role_name: "myRole".to_string(),
        trust_service: "cluster.svc".to_string(),
        policy_arns: vec!["arn:policy:readonly".to_string()],
        cluster_type: "multi-node".to_string(),
        node_type: "dc2.large".to_string(),
        node_count: 2,
        database: "dwh".to_string(),
        cluster_id: "wh1".to_string(),
        master_username: "admin".to_string(),
        master_password: "Passw0rd".to_string(),
        ingress_port: 5439,
        ingress_cidr: "0.0.0.0/0".to_string(),
        vpc_wait_max: Duration::from_millis(250),
        vpc_poll_interval: Duration::from_millis(10),
    }
}
