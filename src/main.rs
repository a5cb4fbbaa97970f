use anyhow::Context;
use clap::Parser;
use funcapp_provisioner::{
    configuration::{get_configuration, Overrides},
    provisioner::Provisioner,
    telemetry::{get_subscriber, init_subscriber},
};

/// Provisions the multi-region function app topology (resource group,
/// storage account, two regional function apps behind a traffic manager
/// profile, application insights) for an application/environment pair.
#[derive(Parser)]
#[command(name = "funcapp-provisioner", version)]
struct Cli {
    /// Target environment, either 'test' or 'prod'
    #[arg(long)]
    environment: String,

    /// Application name the resource names are derived from
    #[arg(long)]
    app_name: Option<String>,

    /// Primary region (defaults to WestUS2)
    #[arg(long)]
    primary_location: Option<String>,

    /// Secondary region (defaults to WestCentralUS)
    #[arg(long)]
    secondary_location: Option<String>,

    /// Subscription used for the test environment
    #[arg(long)]
    subscription_test: Option<String>,

    /// Subscription used for the prod environment
    #[arg(long)]
    subscription_prod: Option<String>,

    /// Override the derived resource group name
    #[arg(long)]
    resource_group: Option<String>,

    /// Override the derived storage account name
    #[arg(long)]
    storage_account: Option<String>,

    /// Override the derived traffic manager profile name
    #[arg(long)]
    traffic_manager: Option<String>,

    /// Override the derived application insights name
    #[arg(long)]
    app_insights: Option<String>,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Overrides {
            environment: Some(cli.environment),
            app_name: cli.app_name,
            primary_location: cli.primary_location,
            secondary_location: cli.secondary_location,
            subscription_test: cli.subscription_test,
            subscription_prod: cli.subscription_prod,
            resource_group: cli.resource_group,
            storage_account: cli.storage_account,
            traffic_manager: cli.traffic_manager,
            app_insights: cli.app_insights,
            // The API token is never taken on the command line; it reaches
            // the configuration through PROVISIONER_CONTROL_PLANE__API_TOKEN.
            api_token: None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("funcapp-provisioner", "info", std::io::stdout);
    init_subscriber(subscriber);

    let cli = Cli::parse();
    let configuration =
        get_configuration(cli.into()).context("failed to assemble the configuration")?;
    let provisioner =
        Provisioner::build(&configuration).context("failed to build the provisioner")?;
    provisioner
        .run()
        .await
        .context("provisioning aborted; already created resources were left behind")?;
    Ok(())
}
