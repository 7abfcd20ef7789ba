mod auth;
mod config;
mod dto;
mod error;
mod monitor;
mod routes;
mod state;

use std::sync::Arc;

use ph_core::notify::{NoDelivery, WebhookNotifier};
use ph_core::{AdminSet, NotificationSink, Orchestrator, OrchestratorConfig};
use ph_db::{MemoryRegistry, PgRegistry, RegistryStore};
use ph_infra::docker::DockerRuntime;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, RegistryBackend};
use crate::monitor::spawn_reconciler;
use crate::routes::api_router;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    // Registry
    let registry: Arc<dyn RegistryStore> = match config.registry_backend {
        RegistryBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let db = ph_db::create_pool(url)
                .await
                .expect("failed to connect to database");
            ph_db::run_migrations(&db)
                .await
                .expect("failed to run migrations");
            Arc::new(PgRegistry::new(db))
        }
        RegistryBackend::Memory => {
            tracing::warn!("using in-memory registry, records will not survive a restart");
            Arc::new(MemoryRegistry::new())
        }
    };

    // Container runtime
    let runtime = Arc::new(DockerRuntime::from_env().expect("failed to connect to docker"));

    // Credential delivery
    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set, credentials will be reported undelivered");
            Arc::new(NoDelivery)
        }
    };

    let admins = AdminSet::parse(&config.admin_ids);
    if admins.is_empty() {
        tracing::warn!("ADMIN_IDS is empty, nobody can create or delete instances");
    }

    let orchestrator = Orchestrator::new(
        registry,
        runtime,
        notifier,
        admins,
        OrchestratorConfig {
            base_image: config.default_os_image.clone(),
            hostname_prefix: config.hostname_prefix.clone(),
            owner_only_power: config.enforce_owner_on_power,
        },
    );

    spawn_reconciler(orchestrator.clone(), config.reconcile_interval_secs);

    let state = AppState {
        orchestrator,
        config: config.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "starting powerhost intent API");

    axum::serve(listener, app).await.expect("server error");
}
