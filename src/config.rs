use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How long to wait for the cluster's VPC id to become available if the config does not say.
const DEFAULT_VPC_WAIT_MAX_SECS: u64 = 600;
/// How long to sleep between describe-cluster polls if the config does not say.
const DEFAULT_VPC_POLL_INTERVAL_SECS: u64 = 15;
/// Ingress source if the config does not say. Open to the world for parity with common warehouse
/// setups; operators should narrow this to their own address range.
const DEFAULT_INGRESS_CIDR: &str = "0.0.0.0/0";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to read config file '{}': {}", path.display(), source))]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse config file '{}': {}", path.display(), source))]
    FileParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Invalid configuration: '{}' must not be empty", field))]
    EmptyField { field: String },

    #[snafu(display("Invalid configuration: '{}' value '{}' is not a number", field, value))]
    NotANumber { field: String, value: String },

    #[snafu(display("Invalid configuration: '{}' must be between {} and {}", field, min, max))]
    OutOfRange { field: String, min: u64, max: u64 },

    #[snafu(display("Invalid configuration: '{}' value '{}' is not an IPv4 CIDR", field, value))]
    BadCidr { field: String, value: String },

    #[snafu(display("Invalid configuration: at least one managed policy ARN is required"))]
    NoPolicies,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Region and optional static credentials for talking to the cloud provider. Passed explicitly to
/// the SDK config builder so nothing is baked into the orchestration code.
#[derive(Clone, Debug)]
pub struct AwsSettings {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Every parameter the provisioning pipeline needs, validated and frozen before the first
/// capability call. Read once from the config file and never mutated.
#[derive(Clone, Debug)]
pub struct ProvisionConfig {
    /// Name of the IAM role the warehouse will assume.
    pub role_name: String,
    /// Service principal allowed to assume the role, e.g. `redshift.amazonaws.com`.
    pub trust_service: String,
    /// Managed policies to attach to the role.
    pub policy_arns: Vec<String>,
    /// Cluster type, e.g. `multi-node`.
    pub cluster_type: String,
    /// Compute node type, e.g. `dc2.large`.
    pub node_type: String,
    pub node_count: i32,
    /// Name of the database created with the cluster.
    pub database: String,
    pub cluster_id: String,
    pub master_username: String,
    pub master_password: String,
    /// Database port to open on the VPC's default security group.
    pub ingress_port: u16,
    /// Source range the ingress rule admits.
    pub ingress_cidr: String,
    /// Upper bound on waiting for the cluster's VPC id.
    pub vpc_wait_max: Duration,
    /// Sleep between describe-cluster polls.
    pub vpc_poll_interval: Duration,
}

/// Top-level configuration: cloud settings plus the warehouse parameters.
#[derive(Clone, Debug)]
pub struct Config {
    pub aws: AwsSettings,
    pub warehouse: ProvisionConfig,
}

impl Config {
    /// Read, parse, and validate the config file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).context(FileReadSnafu { path })?;
        let raw: RawConfig = toml::from_str(&raw).context(FileParseSnafu { path })?;
        raw.validate()
    }
}

// The document keeps every leaf as a string (it is written by hand and shared with other tooling);
// numeric fields are parsed and range-checked here, not at the use site.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    aws: RawAws,
    warehouse: RawWarehouse,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAws {
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWarehouse {
    role_name: String,
    trust_service: String,
    policy_arns: Vec<String>,
    cluster_type: String,
    node_type: String,
    node_count: String,
    database: String,
    cluster_id: String,
    master_username: String,
    master_password: String,
    ingress_port: String,
    ingress_cidr: Option<String>,
    vpc_wait_max_secs: Option<String>,
    vpc_poll_interval_secs: Option<String>,
}

impl RawConfig {
    fn validate(self) -> Result<Config> {
        let aws = AwsSettings {
            region: non_empty("aws.region", self.aws.region)?,
            access_key_id: self.aws.access_key_id,
            secret_access_key: self.aws.secret_access_key,
        };

        let w = self.warehouse;
        ensure!(!w.policy_arns.is_empty(), NoPoliciesSnafu);
        let policy_arns = w
            .policy_arns
            .into_iter()
            .map(|arn| non_empty("warehouse.policy_arns", arn))
            .collect::<Result<Vec<_>>>()?;

        let node_count: i32 = parse_number("warehouse.node_count", &w.node_count)?;
        ensure!(
            node_count >= 1,
            OutOfRangeSnafu {
                field: "warehouse.node_count",
                min: 1u64,
                max: i32::MAX as u64,
            }
        );

        // Parsed wide so an out-of-range port reads as a range problem, not a parse problem.
        let ingress_port: u32 = parse_number("warehouse.ingress_port", &w.ingress_port)?;
        ensure!(
            (1..=u16::MAX as u32).contains(&ingress_port),
            OutOfRangeSnafu {
                field: "warehouse.ingress_port",
                min: 1u64,
                max: u16::MAX as u64,
            }
        );
        let ingress_port = ingress_port as u16;

        let ingress_cidr = match w.ingress_cidr {
            Some(cidr) => validated_cidr("warehouse.ingress_cidr", cidr)?,
            None => DEFAULT_INGRESS_CIDR.to_string(),
        };

        let vpc_wait_max_secs = match w.vpc_wait_max_secs {
            Some(secs) => parse_number("warehouse.vpc_wait_max_secs", &secs)?,
            None => DEFAULT_VPC_WAIT_MAX_SECS,
        };
        let vpc_poll_interval_secs = match w.vpc_poll_interval_secs {
            Some(secs) => parse_number("warehouse.vpc_poll_interval_secs", &secs)?,
            None => DEFAULT_VPC_POLL_INTERVAL_SECS,
        };

        let warehouse = ProvisionConfig {
            role_name: non_empty("warehouse.role_name", w.role_name)?,
            trust_service: non_empty("warehouse.trust_service", w.trust_service)?,
            policy_arns,
            cluster_type: non_empty("warehouse.cluster_type", w.cluster_type)?,
            node_type: non_empty("warehouse.node_type", w.node_type)?,
            node_count,
            database: non_empty("warehouse.database", w.database)?,
            cluster_id: non_empty("warehouse.cluster_id", w.cluster_id)?,
            master_username: non_empty("warehouse.master_username", w.master_username)?,
            master_password: non_empty("warehouse.master_password", w.master_password)?,
            ingress_port,
            ingress_cidr,
            vpc_wait_max: Duration::from_secs(vpc_wait_max_secs),
            vpc_poll_interval: Duration::from_secs(vpc_poll_interval_secs),
        };

        Ok(Config { aws, warehouse })
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    ensure!(!value.trim().is_empty(), EmptyFieldSnafu { field });
    Ok(value)
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().ok().context(NotANumberSnafu {
        field,
        value: value.to_string(),
    })
}

fn validated_cidr(field: &str, value: String) -> Result<String> {
    let (addr, prefix) = value.split_once('/').context(BadCidrSnafu {
        field,
        value: value.clone(),
    })?;
    let prefix_ok = prefix.parse::<u8>().map(|p| p <= 32).unwrap_or(false);
    ensure!(
        addr.parse::<Ipv4Addr>().is_ok() && prefix_ok,
        BadCidrSnafu { field, value }
    );
    Ok(value)
}
