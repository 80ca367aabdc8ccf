/*!

Command line interface for provisioning and tearing down the data-warehouse environment
described by a config file.

!*/

use dwh_provisioner::clients::aws::{
    sdk_config, AwsClusterClient, AwsIdentityClient, AwsNetworkClient,
};
use dwh_provisioner::config::{self, Config};
use dwh_provisioner::provision::provision;
use dwh_provisioner::teardown::teardown;
use dwh_provisioner::{init_logger, ProvisionError, TeardownError};
use log::{info, LevelFilter};
use snafu::Snafu;
use std::path::PathBuf;
use structopt::StructOpt;

/// Create or delete the warehouse role, cluster, and ingress rule.
#[derive(Debug, StructOpt)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable
    /// `RUST_LOG` is present, it overrides this flag.
    #[structopt(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// Path to the warehouse config file.
    #[structopt(long = "config", default_value = "dwh.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Create the role, cluster, and ingress rule.
    Provision,
    /// Delete the cluster and role; missing entities are treated as already gone.
    Teardown,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(context(false), display("{}", source))]
    Config { source: config::Error },

    #[snafu(context(false), display("{}", source))]
    Provision { source: ProvisionError },

    #[snafu(context(false), display("{}", source))]
    Teardown { source: TeardownError },
}

#[tokio::main]
async fn main() {
    let args = Args::from_args();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let Config { aws, warehouse } = Config::load(&args.config)?;
    let sdk = sdk_config(&aws).await;
    match args.command {
        Command::Provision => {
            let identity = AwsIdentityClient::new(&sdk);
            let cluster = AwsClusterClient::new(&sdk);
            let network = AwsNetworkClient::new(&sdk);
            let handle = provision(&warehouse, &identity, &cluster, &network).await?;
            info!(
                "Warehouse '{}' is provisioning in VPC '{}'; port {} is open",
                handle.cluster_id,
                handle.vpc_id.as_deref().unwrap_or("unknown"),
                warehouse.ingress_port
            );
        }
        Command::Teardown => {
            let identity = AwsIdentityClient::new(&sdk);
            let cluster = AwsClusterClient::new(&sdk);
            teardown(&warehouse, &identity, &cluster).await?;
            info!(
                "Warehouse '{}' teardown requested; cluster deletion continues in the background",
                warehouse.cluster_id
            );
        }
    }
    Ok(())
}
