use actix_web::middleware::{from_fn, Logger};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prim_core::{
    config::PrimConfig, feedback::augment_response, metrics::register_metrics, routes,
    AllowlistRegistry, AppState, PayerHeaderVerifier, PaymentGate,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PrimConfig::from_env().expect("Failed to load configuration");
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let feedback = config
        .feedback_channel()
        .expect("FEEDBACK_URL validated at load");

    tracing::info!("Starting {} on port {}", config.service_name, port);
    tracing::info!("Feedback URL: {}", config.feedback_url);
    tracing::info!(
        "Allowlist: {} (denial: {:?})",
        if config.allowlist_enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.allowlist_denial
    );
    tracing::warn!("Using header-trusting payment verifier; do not expose this binary publicly");

    // One registry per process; every consumer of a location shares its connection
    let registry = AllowlistRegistry::new();
    let state = AppState::new(config, registry).expect("Failed to open allowlist store");
    tracing::info!("Allowlist store opened at: {}", state.config.allowlist_db_path);

    let allowlist_gate = state
        .allowlist_gate()
        .expect("Failed to build allowlist gate");

    register_metrics().expect("Failed to register metrics");

    let state_data = web::Data::new(state);
    let gate_data = web::Data::new(allowlist_gate);
    let payment_data = web::Data::new(PaymentGate::new(PayerHeaderVerifier));
    let feedback_data = web::Data::new(feedback);

    HttpServer::new(move || {
        let cors = prim_core::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .app_data(gate_data.clone())
            .app_data(payment_data.clone())
            .app_data(feedback_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            // Outermost: sees every response, including CORS and routing rejections
            .wrap(from_fn(augment_response))
            .configure(routes::health::configure)
            .configure(routes::admin::configure)
            .configure(routes::whoami::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
