use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_qualify_api::config::Config;
use lead_qualify_api::db::Database;
use lead_qualify_api::db_storage::{PgStore, PipelineStore};
use lead_qualify_api::handlers;
use lead_qualify_api::pipeline::PipelineOrchestrator;
use lead_qualify_api::services::{
    CompanySearchClient, EnrichmentProvider, KnowledgeGraphClient, MailboxValidationClient,
    TechDetectClient,
};
use lead_qualify_api::verification::{
    CascadeVerifier, HickoryMxResolver, MailboxValidator, MxResolver,
};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, provider clients
/// and the HTTP routes with their middleware, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_qualify_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let store: Arc<dyn PipelineStore> = Arc::new(PgStore::new(db.pool.clone()));

    // Enrichment provider clients
    let providers: Vec<Arc<dyn EnrichmentProvider>> = vec![
        Arc::new(TechDetectClient::new(&config)),
        Arc::new(CompanySearchClient::new(&config)),
        Arc::new(KnowledgeGraphClient::new(&config)),
    ];
    tracing::info!("Enrichment providers initialized");

    // Verification cascade: MX resolution plus optional paid mailbox validation
    let mx_resolver: Arc<dyn MxResolver> = Arc::new(HickoryMxResolver::from_system_conf()?);
    let mailbox_validator: Option<Arc<dyn MailboxValidator>> =
        match MailboxValidationClient::from_config(&config) {
            Some(client) => {
                tracing::info!("Mailbox validation client initialized");
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("Mailbox validation not configured - cascade stops after pass 2");
                None
            }
        };
    let verifier = CascadeVerifier::new(mx_resolver, mailbox_validator);

    let orchestrator = PipelineOrchestrator::new(store.clone(), providers, verifier);

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        config: config.clone(),
        store,
        orchestrator,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads/process", post(handlers::process_lead))
        .route("/api/v1/leads/batch", post(handlers::process_batch))
        .route(
            "/api/v1/tenants/:tenant_id/stats",
            get(handlers::tenant_stats),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
