//! Derivation of every remote resource name from the deployment inputs.
//!
//! Each name is a pure function of `(app_name, environment, location)`.
//! The provisioning steps cross-reference resources by these names, so all
//! of them must be derived here and nowhere else.

use crate::configuration::Environment;

pub fn resource_group(app_name: &str, environment: Environment) -> String {
    format!("{app_name}-{env}-group", env = environment.as_str())
}

/// Storage account names must satisfy the provider's global charset rule:
/// lowercase alphanumeric only, so hyphens are stripped from the
/// concatenation.
pub fn storage_account(app_name: &str, environment: Environment) -> String {
    format!("{app_name}{env}", env = environment.as_str())
        .replace('-', "")
        .to_lowercase()
}

pub fn traffic_manager(app_name: &str, environment: Environment) -> String {
    format!(
        "{app_name}-{env}-trafficmanager",
        env = environment.as_str()
    )
}

/// Relative DNS label of the traffic manager profile. Must be globally
/// unique; a collision surfaces as a provisioning error.
pub fn dns_label(app_name: &str, environment: Environment) -> String {
    format!("{app_name}-{env}", env = environment.as_str())
}

pub fn function_app(app_name: &str, environment: Environment, location: &str) -> String {
    format!(
        "{app_name}-{env}-{location}-functionapp",
        env = environment.as_str()
    )
}

pub fn app_insights(app_name: &str, environment: Environment) -> String {
    format!("{app_name}-{env}-appinsights", env = environment.as_str())
}
