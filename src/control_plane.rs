//! HTTP client for the cloud management API.
//!
//! One method per resource kind the provisioning sequence touches. Every
//! request is a synchronous (from the caller's point of view) PUT or GET
//! against an ARM-style REST surface; the provider is responsible for
//! idempotency of repeated creates.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ProvisionerError;

const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const STORAGE_API_VERSION: &str = "2023-01-01";
const TRAFFIC_MANAGER_API_VERSION: &str = "2022-04-01";
const WEB_API_VERSION: &str = "2022-03-01";
const INSIGHTS_API_VERSION: &str = "2020-02-02";

pub struct ControlPlaneClient {
    http_client: Client,
    base_url: String,
    api_token: Secret<String>,
}

impl ControlPlaneClient {
    pub fn new(
        base_url: &str,
        api_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, ProvisionerError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    #[tracing::instrument(name = "creating resource group", skip(self))]
    pub async fn create_resource_group(
        &self,
        subscription: &str,
        name: &str,
        location: &str,
    ) -> Result<(), ProvisionerError> {
        let path = format!("/subscriptions/{subscription}/resourcegroups/{name}");
        self.put(
            &path,
            RESOURCE_GROUP_API_VERSION,
            &ResourceGroupRequest { location },
            &format!("resource group {name}"),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "creating storage account", skip(self))]
    pub async fn create_storage_account(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<(), ProvisionerError> {
        let path = format!(
            "/subscriptions/{subscription}/resourcegroups/{resource_group}\
             /providers/Microsoft.Storage/storageAccounts/{name}"
        );
        // File and blob encryption are policy-mandated defaults, not options.
        let body = StorageAccountRequest {
            location,
            kind: "StorageV2",
            sku: Sku {
                name: "Standard_LRS",
            },
            properties: StorageAccountProperties {
                encryption: Encryption {
                    services: EncryptionServices {
                        file: EncryptionService { enabled: true },
                        blob: EncryptionService { enabled: true },
                    },
                    key_source: "Microsoft.Storage",
                },
            },
        };
        self.put(
            &path,
            STORAGE_API_VERSION,
            &body,
            &format!("storage account {name}"),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "creating traffic manager profile", skip(self))]
    pub async fn create_traffic_manager_profile(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        dns_label: &str,
    ) -> Result<(), ProvisionerError> {
        let path = format!(
            "/subscriptions/{subscription}/resourcegroups/{resource_group}\
             /providers/Microsoft.Network/trafficmanagerprofiles/{name}"
        );
        let body = TrafficManagerRequest {
            location: "global",
            properties: TrafficManagerProperties {
                traffic_routing_method: "Performance",
                dns_config: DnsConfig {
                    relative_name: dns_label,
                },
                monitor_config: MonitorConfig {
                    protocol: "HTTPS",
                    port: 443,
                    path: "/",
                },
            },
        };
        self.put(
            &path,
            TRAFFIC_MANAGER_API_VERSION,
            &body,
            &format!("traffic manager profile {name}"),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "creating function app", skip(self))]
    pub async fn create_function_app(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        location: &str,
        storage_account: &str,
    ) -> Result<(), ProvisionerError> {
        let path = function_app_path(subscription, resource_group, name);
        // Consumption hosting: no server farm is referenced, the platform
        // allocates capacity per execution.
        let body = FunctionAppRequest {
            location,
            kind: "functionapp",
            properties: FunctionAppProperties {
                site_config: SiteConfig {
                    app_settings: vec![NameValuePair {
                        name: "AzureWebJobsStorage",
                        value: storage_account,
                    }],
                },
            },
        };
        self.put(&path, WEB_API_VERSION, &body, &format!("function app {name}"))
            .await?;
        Ok(())
    }

    /// Reads back the resource ID of a previously created function app.
    /// A 404 here means the create has not become visible yet.
    #[tracing::instrument(name = "reading function app resource id", skip(self))]
    pub async fn function_app_id(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<String, ProvisionerError> {
        let path = function_app_path(subscription, resource_group, name);
        let response = self
            .get(&path, WEB_API_VERSION, &format!("function app {name}"))
            .await?;
        let body: ResourceIdResponse = response.json().await?;
        Ok(body.id)
    }

    #[tracing::instrument(name = "creating traffic manager endpoint", skip(self, target_resource_id))]
    pub async fn create_traffic_manager_endpoint(
        &self,
        subscription: &str,
        resource_group: &str,
        profile: &str,
        name: &str,
        target_resource_id: &str,
    ) -> Result<(), ProvisionerError> {
        let path = format!(
            "/subscriptions/{subscription}/resourcegroups/{resource_group}\
             /providers/Microsoft.Network/trafficmanagerprofiles/{profile}\
             /azureEndpoints/{name}"
        );
        let body = EndpointRequest {
            properties: EndpointProperties {
                target_resource_id,
                endpoint_status: "Enabled",
            },
        };
        self.put(
            &path,
            TRAFFIC_MANAGER_API_VERSION,
            &body,
            &format!("traffic manager endpoint {name}"),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(name = "creating application insights component", skip(self))]
    pub async fn create_app_insights(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<(), ProvisionerError> {
        let path = app_insights_path(subscription, resource_group, name);
        let body = AppInsightsRequest {
            location,
            kind: "web",
            properties: AppInsightsProperties {
                application_type: "web",
            },
        };
        self.put(
            &path,
            INSIGHTS_API_VERSION,
            &body,
            &format!("application insights component {name}"),
        )
        .await?;
        Ok(())
    }

    /// Reads back the instrumentation key of a created insights component.
    #[tracing::instrument(name = "reading instrumentation key", skip(self))]
    pub async fn instrumentation_key(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<Secret<String>, ProvisionerError> {
        let path = app_insights_path(subscription, resource_group, name);
        let response = self
            .get(
                &path,
                INSIGHTS_API_VERSION,
                &format!("application insights component {name}"),
            )
            .await?;
        let body: ComponentResponse = response.json().await?;
        Ok(Secret::new(body.properties.instrumentation_key))
    }

    /// Applies a single key/value pair to a function app's settings. The
    /// call is idempotent on the provider side.
    #[tracing::instrument(name = "applying function app setting", skip(self, value))]
    pub async fn set_app_setting(
        &self,
        subscription: &str,
        resource_group: &str,
        app: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ProvisionerError> {
        let path = format!(
            "{site}/config/appsettings",
            site = function_app_path(subscription, resource_group, app)
        );
        let mut properties = BTreeMap::new();
        properties.insert(key.to_string(), value.to_string());
        self.put(
            &path,
            WEB_API_VERSION,
            &AppSettingsRequest { properties },
            &format!("app setting {key} on {app}"),
        )
        .await?;
        Ok(())
    }

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &impl Serialize,
        resource: &str,
    ) -> Result<Response, ProvisionerError> {
        let response = self
            .request(Method::PUT, path, api_version)
            .json(body)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let reason = response.text().await.unwrap_or_default();
        Err(ProvisionerError::Provision {
            resource: resource.to_string(),
            reason: format!("{status}: {reason}"),
        })
    }

    async fn get(
        &self,
        path: &str,
        api_version: &str,
        resource: &str,
    ) -> Result<Response, ProvisionerError> {
        let response = self.request(Method::GET, path, api_version).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ProvisionerError::NotFound {
                resource: resource.to_string(),
            }),
            status => {
                let reason = response.text().await.unwrap_or_default();
                Err(ProvisionerError::Provision {
                    resource: resource.to_string(),
                    reason: format!("{status}: {reason}"),
                })
            }
        }
    }

    fn request(&self, method: Method, path: &str, api_version: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{base}{path}?api-version={api_version}",
            base = self.base_url
        );
        self.http_client
            .request(method, url)
            .bearer_auth(self.api_token.expose_secret())
            .header("x-ms-client-request-id", Uuid::new_v4().to_string())
    }
}

fn function_app_path(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription}/resourcegroups/{resource_group}\
         /providers/Microsoft.Web/sites/{name}"
    )
}

fn app_insights_path(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription}/resourcegroups/{resource_group}\
         /providers/microsoft.insights/components/{name}"
    )
}

#[derive(Serialize)]
struct ResourceGroupRequest<'a> {
    location: &'a str,
}

#[derive(Serialize)]
struct Sku<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct StorageAccountRequest<'a> {
    location: &'a str,
    kind: &'a str,
    sku: Sku<'a>,
    properties: StorageAccountProperties<'a>,
}

#[derive(Serialize)]
struct StorageAccountProperties<'a> {
    encryption: Encryption<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Encryption<'a> {
    services: EncryptionServices,
    key_source: &'a str,
}

#[derive(Serialize)]
struct EncryptionServices {
    file: EncryptionService,
    blob: EncryptionService,
}

#[derive(Serialize)]
struct EncryptionService {
    enabled: bool,
}

#[derive(Serialize)]
struct TrafficManagerRequest<'a> {
    location: &'a str,
    properties: TrafficManagerProperties<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrafficManagerProperties<'a> {
    traffic_routing_method: &'a str,
    dns_config: DnsConfig<'a>,
    monitor_config: MonitorConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DnsConfig<'a> {
    relative_name: &'a str,
}

#[derive(Serialize)]
struct MonitorConfig<'a> {
    protocol: &'a str,
    port: u16,
    path: &'a str,
}

#[derive(Serialize)]
struct FunctionAppRequest<'a> {
    location: &'a str,
    kind: &'a str,
    properties: FunctionAppProperties<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionAppProperties<'a> {
    site_config: SiteConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteConfig<'a> {
    app_settings: Vec<NameValuePair<'a>>,
}

#[derive(Serialize)]
struct NameValuePair<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct EndpointRequest<'a> {
    properties: EndpointProperties<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndpointProperties<'a> {
    target_resource_id: &'a str,
    endpoint_status: &'a str,
}

#[derive(Serialize)]
struct AppInsightsRequest<'a> {
    location: &'a str,
    kind: &'a str,
    properties: AppInsightsProperties<'a>,
}

#[derive(Serialize)]
struct AppInsightsProperties<'a> {
    #[serde(rename = "Application_Type")]
    application_type: &'a str,
}

#[derive(Serialize)]
struct AppSettingsRequest {
    properties: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ResourceIdResponse {
    id: String,
}

#[derive(serde::Deserialize)]
struct ComponentResponse {
    properties: ComponentProperties,
}

#[derive(serde::Deserialize)]
struct ComponentProperties {
    #[serde(rename = "InstrumentationKey")]
    instrumentation_key: String,
}
