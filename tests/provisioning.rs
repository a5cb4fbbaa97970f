use claim::{assert_err, assert_ok};
use funcapp_provisioner::{
    configuration::{
        get_configuration, ControlPlaneSettings, DeploymentSettings, Environment, Overrides,
        Settings,
    },
    error::ProvisionerError,
    provisioner::{
        DeploymentPlan, Provisioner, EXTENSION_VERSION_SETTING, FUNCTIONS_EXTENSION_VERSION,
        INSTRUMENTATION_KEY_SETTING,
    },
    telemetry::{get_subscriber, init_subscriber},
};
use once_cell::sync::Lazy;
use secrecy::Secret;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber("provisioning-tests", "debug", std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber("provisioning-tests", "debug", std::io::sink);
        init_subscriber(subscriber);
    }
});

struct TestHarness {
    server: MockServer,
    provisioner: Provisioner,
}

impl TestHarness {
    fn plan(&self) -> &DeploymentPlan {
        self.provisioner.plan()
    }

    fn resource_group_path(&self) -> String {
        let plan = self.plan();
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            plan.subscription, plan.resource_group
        )
    }

    fn storage_account_path(&self) -> String {
        let plan = self.plan();
        format!(
            "{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.resource_group_path(),
            plan.storage_account
        )
    }

    fn traffic_manager_path(&self) -> String {
        format!(
            "{}/providers/Microsoft.Network/trafficmanagerprofiles/{}",
            self.resource_group_path(),
            self.plan().traffic_manager
        )
    }

    fn endpoint_path(&self, app: &str) -> String {
        format!("{}/azureEndpoints/{app}", self.traffic_manager_path())
    }

    fn site_path(&self, app: &str) -> String {
        format!(
            "{}/providers/Microsoft.Web/sites/{app}",
            self.resource_group_path()
        )
    }

    fn app_settings_path(&self, app: &str) -> String {
        format!("{}/config/appsettings", self.site_path(app))
    }

    fn app_insights_path(&self) -> String {
        format!(
            "{}/providers/microsoft.insights/components/{}",
            self.resource_group_path(),
            self.plan().app_insights
        )
    }
}

async fn spawn_harness() -> TestHarness {
    Lazy::force(&TRACING);
    let server = MockServer::start().await;
    let settings = Settings {
        deployment: DeploymentSettings {
            app_name: "helloworld".to_string(),
            environment: Environment::Test,
            primary_location: "WestUS2".to_string(),
            secondary_location: "WestCentralUS".to_string(),
            subscription_test: "sub-test".to_string(),
            subscription_prod: "sub-prod".to_string(),
            resource_group: None,
            storage_account: None,
            traffic_manager: None,
            app_insights: None,
        },
        control_plane: ControlPlaneSettings {
            base_url: server.uri(),
            api_token: Secret::new("test-token".to_string()),
            timeout_milliseconds: 2_000,
        },
    };
    let provisioner = Provisioner::build(&settings).expect("failed to build the provisioner");
    TestHarness {
        server,
        provisioner,
    }
}

/// Mounts 200 responses for every create call and the read-backs, up to but
/// excluding the app-settings calls.
async fn mount_resource_mocks(harness: &TestHarness, instrumentation_key: &str) {
    Mock::given(method("PUT"))
        .and(path(harness.resource_group_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(harness.storage_account_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(harness.traffic_manager_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;

    let plan = harness.plan();
    let apps = [
        plan.primary_function_app.clone(),
        plan.secondary_function_app.clone(),
    ];
    for app in &apps {
        Mock::given(method("PUT"))
            .and(path(harness.site_path(app)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&harness.server)
            .await;
        Mock::given(method("GET"))
            .and(path(harness.site_path(app)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("/subscriptions/sub-test/resourceGroups/x/providers/Microsoft.Web/sites/{app}")
            })))
            .expect(1)
            .mount(&harness.server)
            .await;
        Mock::given(method("PUT"))
            .and(path(harness.endpoint_path(app)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&harness.server)
            .await;
    }

    Mock::given(method("PUT"))
        .and(path(harness.app_insights_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(harness.app_insights_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": { "InstrumentationKey": instrumentation_key }
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
}

#[tokio::test]
async fn a_full_run_provisions_every_resource() {
    let harness = spawn_harness().await;
    mount_resource_mocks(&harness, "00000000-aaaa-bbbb-cccc-000000000000").await;

    let plan = harness.plan();
    for app in [
        plan.primary_function_app.clone(),
        plan.secondary_function_app.clone(),
    ] {
        Mock::given(method("PUT"))
            .and(path(harness.app_settings_path(&app)))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&harness.server)
            .await;
    }

    assert_ok!(harness.provisioner.run().await);
}

#[tokio::test]
async fn both_apps_receive_the_identical_key_and_runtime_version() {
    let harness = spawn_harness().await;
    let key = "3f8a5c1e-7d2b-4a90-b1c6-9e04d7f25a88";
    mount_resource_mocks(&harness, key).await;

    let plan = harness.plan();
    for app in [
        plan.primary_function_app.clone(),
        plan.secondary_function_app.clone(),
    ] {
        Mock::given(method("PUT"))
            .and(path(harness.app_settings_path(&app)))
            .and(body_partial_json(json!({
                "properties": { (INSTRUMENTATION_KEY_SETTING): key }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&harness.server)
            .await;
        Mock::given(method("PUT"))
            .and(path(harness.app_settings_path(&app)))
            .and(body_partial_json(json!({
                "properties": { (EXTENSION_VERSION_SETTING): FUNCTIONS_EXTENSION_VERSION }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&harness.server)
            .await;
    }

    assert_ok!(harness.provisioner.run().await);
}

#[tokio::test]
async fn a_failed_primary_function_app_stops_the_run_before_the_secondary() {
    let harness = spawn_harness().await;

    Mock::given(method("PUT"))
        .and(path(harness.resource_group_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(harness.storage_account_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(harness.traffic_manager_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;

    let plan = harness.plan();
    let primary = plan.primary_function_app.clone();
    let secondary = plan.secondary_function_app.clone();
    Mock::given(method("PUT"))
        .and(path(harness.site_path(&primary)))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&harness.server)
        .await;
    // The secondary region must never be attempted after the primary fails.
    Mock::given(method("PUT"))
        .and(path(harness.site_path(&secondary)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let error = harness.provisioner.run().await.unwrap_err();
    assert!(matches!(error, ProvisionerError::Provision { .. }));
}

#[tokio::test]
async fn a_missing_function_app_read_back_is_reported_as_not_found() {
    let harness = spawn_harness().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&harness.server)
        .await;

    let plan = harness.plan();
    let primary = plan.primary_function_app.clone();
    let secondary = plan.secondary_function_app.clone();
    Mock::given(method("GET"))
        .and(path(harness.site_path(&primary)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path(harness.site_path(&secondary)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let error = harness.provisioner.run().await.unwrap_err();
    assert!(matches!(error, ProvisionerError::NotFound { .. }));
}

#[test]
fn an_unknown_environment_is_rejected_before_any_remote_call() {
    // No mock server exists here: rejection happens while assembling the
    // configuration, before a client is ever constructed. The same
    // configuration with a valid environment assembles fine, so the
    // rejection below is attributable to the environment value alone.
    let valid = Overrides {
        environment: Some("test".to_string()),
        api_token: Some("a-token".to_string()),
        ..Default::default()
    };
    let settings = get_configuration(valid).expect("a valid environment should assemble");
    assert_eq!(settings.deployment.environment, Environment::Test);

    let invalid = Overrides {
        environment: Some("staging".to_string()),
        api_token: Some("a-token".to_string()),
        ..Default::default()
    };
    assert_err!(get_configuration(invalid));
}
