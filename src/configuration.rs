use std::time::Duration;

use secrecy::Secret;

use crate::naming;

#[derive(Debug, serde::Deserialize)]
pub struct Settings {
    pub deployment: DeploymentSettings,
    pub control_plane: ControlPlaneSettings,
}

#[derive(Debug, serde::Deserialize)]
pub struct DeploymentSettings {
    pub app_name: String,
    pub environment: Environment,
    pub primary_location: String,
    pub secondary_location: String,
    pub subscription_test: String,
    pub subscription_prod: String,
    /// Overrides for the derived names. When absent the name is computed by
    /// the corresponding `naming` function.
    pub resource_group: Option<String>,
    pub storage_account: Option<String>,
    pub traffic_manager: Option<String>,
    pub app_insights: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ControlPlaneSettings {
    pub base_url: String,
    pub api_token: Secret<String>,
    pub timeout_milliseconds: u64,
}

impl ControlPlaneSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

impl DeploymentSettings {
    /// Static environment→subscription lookup.
    pub fn subscription(&self) -> &str {
        match self.environment {
            Environment::Test => &self.subscription_test,
            Environment::Prod => &self.subscription_prod,
        }
    }

    pub fn resource_group(&self) -> String {
        self.resource_group
            .clone()
            .unwrap_or_else(|| naming::resource_group(&self.app_name, self.environment))
    }

    pub fn storage_account(&self) -> String {
        self.storage_account
            .clone()
            .unwrap_or_else(|| naming::storage_account(&self.app_name, self.environment))
    }

    pub fn traffic_manager(&self) -> String {
        self.traffic_manager
            .clone()
            .unwrap_or_else(|| naming::traffic_manager(&self.app_name, self.environment))
    }

    pub fn app_insights(&self) -> String {
        self.app_insights
            .clone()
            .unwrap_or_else(|| naming::app_insights(&self.app_name, self.environment))
    }
}

/// Values layered on top of the defaults and the `PROVISIONER_*`
/// environment variables; the CLI populates everything except `api_token`,
/// which only ever arrives via the environment. `environment` and
/// `api_token` have no defaults.
#[derive(Default)]
pub struct Overrides {
    pub environment: Option<String>,
    pub app_name: Option<String>,
    pub primary_location: Option<String>,
    pub secondary_location: Option<String>,
    pub subscription_test: Option<String>,
    pub subscription_prod: Option<String>,
    pub resource_group: Option<String>,
    pub storage_account: Option<String>,
    pub traffic_manager: Option<String>,
    pub app_insights: Option<String>,
    pub api_token: Option<String>,
}

pub fn get_configuration(overrides: Overrides) -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .set_default("deployment.app_name", "helloworld")?
        .set_default("deployment.primary_location", "WestUS2")?
        .set_default("deployment.secondary_location", "WestCentralUS")?
        .set_default(
            "deployment.subscription_test",
            "7f1b91d7-587c-4f04-a3b6-1e2a44e7dc65",
        )?
        .set_default(
            "deployment.subscription_prod",
            "3a95c67f-8e6d-4b20-9f7a-5cd08be21f44",
        )?
        .set_default("control_plane.base_url", "https://management.azure.com")?
        .set_default("control_plane.timeout_milliseconds", 10_000_i64)?
        .add_source(
            config::Environment::with_prefix("PROVISIONER")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("deployment.environment", overrides.environment)?
        .set_override_option("deployment.app_name", overrides.app_name)?
        .set_override_option("deployment.primary_location", overrides.primary_location)?
        .set_override_option(
            "deployment.secondary_location",
            overrides.secondary_location,
        )?
        .set_override_option("deployment.subscription_test", overrides.subscription_test)?
        .set_override_option("deployment.subscription_prod", overrides.subscription_prod)?
        .set_override_option("deployment.resource_group", overrides.resource_group)?
        .set_override_option("deployment.storage_account", overrides.storage_account)?
        .set_override_option("deployment.traffic_manager", overrides.traffic_manager)?
        .set_override_option("deployment.app_insights", overrides.app_insights)?
        .set_override_option("control_plane.api_token", overrides.api_token)?
        .build()?;
    settings.try_deserialize()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum Environment {
    Test,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            other => Err(format!(
                "{other} is not a supported environment. Use either 'test' or 'prod'"
            )),
        }
    }
}
