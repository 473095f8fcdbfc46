mod common;

use common::{TestEnvironment, RESOURCE_GROUP};
use std::time::Duration;
use workload_provisioner::domain::{Capability, Context, ContextProperties};
use workload_provisioner::AppError;

const NEW_CAPABILITY: &str = "sdkexamples-shampoo-4242";

#[tokio::test]
async fn test_full_run_from_empty_context() {
    let env = TestEnvironment::with_vars(&[
        ("WO_CONTEXT_PROPAGATION_WAIT_SECS", "30"),
        ("WO_TEMPLATE_SETTLE_WAIT_SECS", "10"),
    ]);

    let report = env.orchestrator().run().await.unwrap();

    assert!(report.is_complete(), "degraded: {:?}", report.degraded);
    assert_eq!(report.capability, NEW_CAPABILITY);
    assert!(report.capability_added);

    let capabilities = env.context_capabilities();
    assert_eq!(capabilities.len(), 1);
    assert_eq!(capabilities[0].name, NEW_CAPABILITY);
    assert_eq!(
        capabilities[0].description,
        "SDK generated shampoo manufacturing capability"
    );

    assert_eq!(report.schema_name, "sdkexamples-schema-v1.4.42");
    assert_eq!(report.template_name, "sdkexamples-solution1");
    assert_eq!(report.target_name, "sdkbox-mk71-2");
    let target = env.client.target(RESOURCE_GROUP, &report.target_name).unwrap();
    assert_eq!(target.properties.capabilities, vec![NEW_CAPABILITY.to_string()]);
    assert_eq!(target.properties.context_id, env.config.context_id());

    assert!(!report.template_version_id.is_empty());
    assert!(env
        .client
        .template_version_ids()
        .contains(&report.template_version_id));
    assert!(!report.solution_version_id.is_empty());
    assert_ne!(report.solution_version_id, report.template_version_id);

    assert!(report.configuration_set);
    assert!(report.configuration_verified);
    assert_eq!(report.configuration_name, "sdkbox-mk71-2Config");
    let requests = env.transport.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert!(
            request.url.contains("/configurations/sdkbox-mk71-2Config/DynamicConfigurations/sdkexamples-solution1/"),
            "{}",
            request.url
        );
    }
    assert_eq!(env.client.published(), vec![report.solution_version_id.clone()]);
    assert_eq!(env.client.installed(), vec![report.solution_version_id.clone()]);

    assert_eq!(
        env.sleeper.recorded(),
        vec![Duration::from_secs(30), Duration::from_secs(10)]
    );

    let saved = std::fs::read_to_string(&env.capabilities_file).unwrap();
    let saved: Vec<Capability> = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved, capabilities);
}

#[tokio::test]
async fn test_existing_capabilities_survive_the_run() {
    let env = TestEnvironment::new();
    let seeded = Context::new(ContextProperties {
        capabilities: vec![
            Capability::new("line-a-capability", "kept as written"),
            Capability::new("", "broken entry"),
            Capability::new("line-b-capability", "also kept"),
        ],
        ..Default::default()
    });
    env.client
        .seed_context(&env.config.context_resource_group, &env.config.context_name, seeded);

    let report = env.orchestrator().run().await.unwrap();

    let names: Vec<String> = env
        .context_capabilities()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(
        names,
        vec!["line-a-capability", "line-b-capability", NEW_CAPABILITY]
    );
    assert_eq!(env.context_capabilities()[0].description, "kept as written");
    assert_eq!(report.capability, NEW_CAPABILITY);
}

#[tokio::test]
async fn test_capability_appended_by_another_writer_is_selected() {
    let env = TestEnvironment::new();
    env.client
        .add_concurrent_capability(Capability::new("other-run-soap-7777", "from another run"));

    let report = env.orchestrator().run().await.unwrap();

    assert!(report.capability_added);
    assert_eq!(report.capability, "other-run-soap-7777");
    let target = env.client.target(RESOURCE_GROUP, &report.target_name).unwrap();
    assert_eq!(target.properties.capabilities, vec!["other-run-soap-7777".to_string()]);
    assert_eq!(env.context_capabilities().len(), 2);
}

#[tokio::test]
async fn test_configuration_failure_degrades_but_finishes() {
    let env = TestEnvironment::new();
    env.transport.fail_with(500);

    let report = env.orchestrator().run().await.unwrap();

    assert!(!report.configuration_set);
    assert!(!report.configuration_verified);
    assert_eq!(report.degraded.len(), 1);
    assert!(report.degraded[0].starts_with("configuration:"));
    assert!(report.published);
    assert!(report.installed);
}

#[tokio::test]
async fn test_target_creation_retries_while_in_progress() {
    let env = TestEnvironment::new();
    let in_progress = || AppError::OperationInProgress {
        resource: "target".to_string(),
        status: "Provisioning".to_string(),
    };
    env.client
        .fail_next("create_target", vec![in_progress(), in_progress()]);

    let report = env.orchestrator().run().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(env.client.call_count("create_target"), 3);
    assert_eq!(env.client.call_count("get_target"), 2);
    let waits: Vec<Duration> = env
        .sleeper
        .recorded()
        .into_iter()
        .filter(|d| !d.is_zero())
        .collect();
    assert_eq!(waits, vec![Duration::from_secs(60), Duration::from_secs(120)]);
}

#[tokio::test]
async fn test_invisible_capability_aborts_before_any_resource() {
    let env = TestEnvironment::new();
    // update lands, re-read sees it, verification read does not
    let visible = Context::new(ContextProperties {
        capabilities: vec![Capability::new(NEW_CAPABILITY, "")],
        ..Default::default()
    });
    env.client.script_context_reads(vec![
        None,
        Some(visible),
        Some(Context::new(ContextProperties::default())),
    ]);

    let failure = env.orchestrator().run().await.unwrap_err();

    assert_eq!(failure.step, "reconcile capabilities");
    assert!(matches!(failure.error, AppError::ConsistencyError(_)));
    assert_eq!(
        failure.context.identifiers["resource_name"],
        env.config.context_name
    );
    assert_eq!(env.client.call_count("create_schema"), 0);
}
