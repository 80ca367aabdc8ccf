/*!

`dwh-provisioner` creates and deletes the cloud resources needed to run a
data warehouse: an IAM role the warehouse can assume, the compute cluster
itself, and an ingress rule on the cluster's VPC so clients can reach the
database port.

The orchestration is a strictly linear pipeline because each step consumes
the previous step's output: the role's ARN feeds cluster creation, and the
cluster's VPC id feeds the firewall rule. All cloud access goes through the
capability traits in [`clients`], so the orchestrators in [`provision`] and
[`teardown`] can be exercised against an in-memory fake.

!*/

use env_logger::Builder;
use log::LevelFilter;
use std::env;

pub mod clients;
pub mod config;
pub mod error;
pub mod provision;
pub mod teardown;

pub use config::ProvisionConfig;
pub use error::{ProvisionError, TeardownError};

/// Extract the value of `RUST_LOG` if it exists, otherwise log this application at `log_level` and
/// silence everything else (the AWS SDK is chatty at `info`).
pub fn init_logger(log_level: LevelFilter) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            Builder::new()
                .filter_level(LevelFilter::Error)
                .filter(Some("dwh_provisioner"), log_level)
                .init();
        }
    }
}
