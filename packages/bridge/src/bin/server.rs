//! Meridian bridge server.
//!
//! Wires the gateways, pipelines, and HTTP surface from environment
//! configuration. An encryption-enabled configuration with an unreachable
//! key service is a startup failure, never a silent downgrade.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meridian_bridge::{
    api, AppState, BridgeConfig, BridgeMetrics, BrokerGateway, DeadLetterListener,
    DeadLetterSettings, ExclusionSeed, InMemoryBroker, InMemoryObjectStore, RecordStore,
    RetryService, SendPipeline, StorageWorkerPool, TransformationPipeline, TransformerSettings,
};
use meridian_crypto::{
    EncryptionService, KeyVaultClient, LocalKeyProvider, RemoteKeyProvider,
};
use meridian_exclusion::ExclusionEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env().context("loading configuration")?;

    // Gateways. The in-memory pair backs the development profile; swap in
    // deployment gateways behind the same traits for production.
    let broker: Arc<dyn BrokerGateway> = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryObjectStore::new());

    let crypto = build_encryption(&config).await.context("initialising encryption")?;
    let records = Arc::new(RecordStore::new(
        store,
        crypto,
        config.store.container.clone(),
    ));
    records.init().await.context("provisioning store container")?;

    let metrics = Arc::new(BridgeMetrics::new());
    let workers = Arc::new(StorageWorkerPool::new(
        config.workers.max_concurrency,
        config.workers.queue_capacity,
        metrics.clone(),
    ));

    let exclusion = Arc::new(ExclusionEngine::new());
    if let Some(rules_json) = &config.exclusion_rules_json {
        let seeded = ExclusionSeed::load(&exclusion, rules_json).context("seeding exclusion rules")?;
        tracing::info!(rules = seeded, "Exclusion rules seeded from configuration");
    }

    let pipeline = Arc::new(SendPipeline::new(
        exclusion.clone(),
        broker.clone(),
        workers.clone(),
        records.clone(),
        metrics.clone(),
    ));

    let retry = Arc::new(RetryService::new(config.transformer.retry_policy()));
    if config.transformer.enabled {
        let transformer = Arc::new(TransformationPipeline::new(
            broker.clone(),
            records.clone(),
            retry.clone(),
            metrics.clone(),
            TransformerSettings {
                input_queue: config.transformer.input_queue.clone(),
                output_queue: config.transformer.output_queue.clone(),
                transformation_type: config.transformer.transformation_type,
                dead_letter_destination: config.transformer.dead_letter_destination.clone(),
            },
        ));
        transformer.start().await.context("starting transformer")?;

        let dlq = Arc::new(DeadLetterListener::new(
            records.clone(),
            metrics.clone(),
            DeadLetterSettings {
                destination: config.transformer.dead_letter_destination.clone(),
                warn_threshold: config.transformer.dlq_warn_threshold,
                critical_threshold: config.transformer.dlq_critical_threshold,
            },
        ));
        dlq.start(&broker).await.context("starting dead-letter listener")?;
    }

    let state = Arc::new(AppState {
        pipeline,
        records,
        exclusion,
        metrics,
    });
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    tracing::info!(addr = %addr, "Meridian bridge listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // Drain in-flight work before exit: cancel pending retries, let the
    // storage pool finish what it accepted.
    retry.shutdown();
    workers.shutdown().await;
    tracing::info!("Bridge stopped");
    Ok(())
}

/// Build the envelope-encryption service named by configuration.
///
/// Remote mode probes the vault and refuses to start when it is
/// unreachable; `None` means records are stored unencrypted.
async fn build_encryption(config: &BridgeConfig) -> anyhow::Result<Option<Arc<EncryptionService>>> {
    let settings = &config.encryption;
    if !settings.enabled {
        tracing::warn!("Encryption at rest is DISABLED; records will be stored in plaintext");
        return Ok(None);
    }

    let service = if settings.local_mode {
        let key = settings
            .local_master_key
            .as_deref()
            .context("ENCRYPTION_LOCAL_MASTER_KEY is required in local mode")?;
        let provider = Arc::new(LocalKeyProvider::from_base64(key)?);
        tracing::warn!("Encryption uses the LOCAL master key; development only");
        EncryptionService::initialise(provider).await?
    } else {
        let uri = settings
            .key_service_uri
            .as_deref()
            .context("KEY_SERVICE_URI is required in remote mode")?;
        let vault = Arc::new(KeyVaultClient::new(uri, settings.key_name.clone())?);
        let provider = Arc::new(RemoteKeyProvider::connect(vault).await?);
        EncryptionService::initialise(provider).await?
    };

    Ok(Some(Arc::new(service)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
