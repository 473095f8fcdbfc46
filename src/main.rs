use anyhow::Context as _;
use std::sync::Arc;
use tracing::{info, warn};

use workload_provisioner::config::Config;
use workload_provisioner::core::init_structured_logging;
use workload_provisioner::domain::{
    FileVersionSource, NameGenerator, RandomNameGenerator, SequenceVersionSource, VersionSource,
};
use workload_provisioner::error::{RetryExecutor, Sleeper, TokioSleeper};
use workload_provisioner::infrastructure::{
    ArmClient, ArmEndpoint, ChainedCredential, HttpTransport, LroPoller, ManagementClient,
    ReqwestTransport, StaticTokenCredential, TokenCredential,
};
use workload_provisioner::provisioning::{
    Collaborators, ConfigurationPublisher, WorkflowOrchestrator,
};
use workload_provisioner::testing::{InMemoryManagementClient, InMemoryTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init().context("Failed to load configuration")?;
    init_structured_logging(config.log_format).context("Failed to initialize logging")?;

    info!(
        subscription_id = %config.subscription_id,
        resource_group = %config.resource_group,
        location = %config.location,
        dry_run = config.dry_run,
        "🔧 Configuration loaded"
    );

    let collaborators = if config.dry_run {
        warn!("Dry run: using the in-memory management API, nothing leaves this process");
        dry_run_collaborators(&config)?
    } else {
        live_collaborators(&config)?
    };

    let report = WorkflowOrchestrator::new(&config, collaborators)
        .run()
        .await
        .context("Provisioning workflow aborted")?;

    if report.is_complete() {
        info!(
            target = %report.target_name,
            solution_version_id = %report.solution_version_id,
            "✅ Workload provisioned and installed"
        );
    } else {
        warn!(degraded = ?report.degraded, "⚠️ Workflow finished with degraded steps");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn live_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);
    let credential: Arc<dyn TokenCredential> =
        Arc::new(ChainedCredential::default_chain(config, transport.clone()));
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let endpoint = ArmEndpoint::new(&config.management_endpoint, &config.subscription_id)
        .context("Invalid management endpoint")?;

    let poller = LroPoller::new(
        transport.clone(),
        sleeper.clone(),
        config.timings.lro_poll_interval,
        config.timings.lro_max_polls,
    );
    let client: Arc<dyn ManagementClient> = Arc::new(ArmClient::new(
        endpoint.clone(),
        &config.api_version,
        config.management_scope(),
        transport.clone(),
        credential.clone(),
        poller,
    ));
    let versions: Arc<dyn VersionSource> =
        Arc::new(FileVersionSource::new(config.version_file.clone()));
    let names: Arc<dyn NameGenerator> = Arc::new(RandomNameGenerator);

    Ok(Collaborators {
        client,
        publisher: ConfigurationPublisher::new(
            transport,
            credential,
            endpoint,
            &config.resource_group,
            &config.config_api_version,
            config.management_scope(),
        ),
        retry: RetryExecutor::new(sleeper),
        names,
        versions,
    })
}

fn dry_run_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let endpoint = ArmEndpoint::new(&config.management_endpoint, &config.subscription_id)
        .context("Invalid management endpoint")?;

    Ok(Collaborators {
        client: Arc::new(InMemoryManagementClient::new(&config.subscription_id)),
        publisher: ConfigurationPublisher::new(
            Arc::new(InMemoryTransport::new()),
            Arc::new(StaticTokenCredential::new("dry-run")),
            endpoint,
            &config.resource_group,
            &config.config_api_version,
            config.management_scope(),
        ),
        retry: RetryExecutor::new(Arc::new(TokioSleeper)),
        names: Arc::new(RandomNameGenerator),
        versions: Arc::new(SequenceVersionSource::default()),
    })
}
