//! The ten-step provisioning sequence.
//!
//! Steps run strictly in order and the first failure aborts the run. No
//! compensating teardown is attempted: whatever was created before the
//! failure stays behind in the resource group for the operator to remove.

use secrecy::ExposeSecret;
use tracing::info;

use crate::{
    configuration::Settings,
    control_plane::ControlPlaneClient,
    error::ProvisionerError,
    naming,
};

/// Function app runtime pinned for both regions.
pub const FUNCTIONS_EXTENSION_VERSION: &str = "~4";
pub const EXTENSION_VERSION_SETTING: &str = "FUNCTIONS_EXTENSION_VERSION";
pub const INSTRUMENTATION_KEY_SETTING: &str = "APPINSIGHTS_INSTRUMENTATIONKEY";

/// Every name and location the sequence needs, resolved once up front.
/// All cross-references between steps go through this value, so the
/// derived names cannot diverge mid-run.
pub struct DeploymentPlan {
    pub subscription: String,
    pub resource_group: String,
    pub storage_account: String,
    pub traffic_manager: String,
    pub dns_label: String,
    pub app_insights: String,
    pub primary_location: String,
    pub secondary_location: String,
    pub primary_function_app: String,
    pub secondary_function_app: String,
}

impl DeploymentPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        let deployment = &settings.deployment;
        Self {
            subscription: deployment.subscription().to_string(),
            resource_group: deployment.resource_group(),
            storage_account: deployment.storage_account(),
            traffic_manager: deployment.traffic_manager(),
            dns_label: naming::dns_label(&deployment.app_name, deployment.environment),
            app_insights: deployment.app_insights(),
            primary_location: deployment.primary_location.clone(),
            secondary_location: deployment.secondary_location.clone(),
            primary_function_app: naming::function_app(
                &deployment.app_name,
                deployment.environment,
                &deployment.primary_location,
            ),
            secondary_function_app: naming::function_app(
                &deployment.app_name,
                deployment.environment,
                &deployment.secondary_location,
            ),
        }
    }

    /// Function apps paired with their region, in provisioning order.
    fn function_apps(&self) -> [(&str, &str); 2] {
        [
            (self.primary_function_app.as_str(), self.primary_location.as_str()),
            (
                self.secondary_function_app.as_str(),
                self.secondary_location.as_str(),
            ),
        ]
    }
}

pub struct Provisioner {
    client: ControlPlaneClient,
    plan: DeploymentPlan,
}

impl Provisioner {
    pub fn build(settings: &Settings) -> Result<Self, ProvisionerError> {
        let client = ControlPlaneClient::new(
            &settings.control_plane.base_url,
            settings.control_plane.api_token.clone(),
            settings.control_plane.timeout(),
        )?;
        let plan = DeploymentPlan::from_settings(settings);
        Ok(Self { client, plan })
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    #[tracing::instrument(
        name = "provisioning deployment",
        skip(self),
        fields(
            resource_group = %self.plan.resource_group,
            subscription = %self.plan.subscription
        )
    )]
    pub async fn run(&self) -> Result<(), ProvisionerError> {
        let plan = &self.plan;
        let client = &self.client;

        info!(name = %plan.resource_group, location = %plan.primary_location, "creating resource group");
        client
            .create_resource_group(&plan.subscription, &plan.resource_group, &plan.primary_location)
            .await?;

        info!(name = %plan.storage_account, "creating storage account");
        client
            .create_storage_account(
                &plan.subscription,
                &plan.resource_group,
                &plan.storage_account,
                &plan.primary_location,
            )
            .await?;

        info!(name = %plan.traffic_manager, dns = %plan.dns_label, "creating traffic manager profile");
        client
            .create_traffic_manager_profile(
                &plan.subscription,
                &plan.resource_group,
                &plan.traffic_manager,
                &plan.dns_label,
            )
            .await?;

        // Primary region first; the secondary is never attempted if the
        // primary fails.
        for (app, location) in plan.function_apps() {
            info!(name = %app, location = %location, "creating function app");
            client
                .create_function_app(
                    &plan.subscription,
                    &plan.resource_group,
                    app,
                    location,
                    &plan.storage_account,
                )
                .await?;
        }

        let mut endpoints = Vec::new();
        for (app, _) in plan.function_apps() {
            let id = client
                .function_app_id(&plan.subscription, &plan.resource_group, app)
                .await?;
            info!(name = %app, id = %id, "resolved function app resource id");
            endpoints.push((app.to_string(), id));
        }

        for (app, id) in &endpoints {
            info!(endpoint = %app, profile = %plan.traffic_manager, "creating traffic manager endpoint");
            client
                .create_traffic_manager_endpoint(
                    &plan.subscription,
                    &plan.resource_group,
                    &plan.traffic_manager,
                    app,
                    id,
                )
                .await?;
        }

        info!(name = %plan.app_insights, "creating application insights component");
        client
            .create_app_insights(
                &plan.subscription,
                &plan.resource_group,
                &plan.app_insights,
                &plan.primary_location,
            )
            .await?;

        let instrumentation_key = client
            .instrumentation_key(&plan.subscription, &plan.resource_group, &plan.app_insights)
            .await?;
        info!(component = %plan.app_insights, "retrieved instrumentation key");

        // Both apps receive the identical key and runtime pin.
        for (app, _) in plan.function_apps() {
            client
                .set_app_setting(
                    &plan.subscription,
                    &plan.resource_group,
                    app,
                    INSTRUMENTATION_KEY_SETTING,
                    instrumentation_key.expose_secret(),
                )
                .await?;
            client
                .set_app_setting(
                    &plan.subscription,
                    &plan.resource_group,
                    app,
                    EXTENSION_VERSION_SETTING,
                    FUNCTIONS_EXTENSION_VERSION,
                )
                .await?;
            info!(name = %app, "applied instrumentation key and runtime version");
        }

        info!(
            resource_group = %plan.resource_group,
            traffic_manager = %plan.traffic_manager,
            "deployment provisioned"
        );
        Ok(())
    }
}
