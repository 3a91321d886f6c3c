use actix_web::{web, HttpRequest, HttpResponse};

use super::{bearer_token, constant_time_eq};
use crate::error::{ApiError, ApiResult};
use crate::metrics::REGISTRY;
use crate::state::AppState;

/// GET /health - Health check endpoint
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let mut response = serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "allowlist_enabled": state.config.allowlist_enabled,
    });

    match state.allowlist.ping().await {
        Ok(()) => response["allowlist_status"] = serde_json::json!("ok"),
        Err(e) => {
            tracing::error!(error = %e, "Allowlist store unreachable");
            response["status"] = serde_json::json!("degraded");
            response["allowlist_status"] = serde_json::json!("unreachable");
        }
    }

    if response["status"] == "degraded" {
        HttpResponse::ServiceUnavailable().json(response)
    } else {
        HttpResponse::Ok().json(response)
    }
}

/// GET /metrics - Prometheus metrics endpoint (optionally auth-gated)
pub async fn metrics(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    if let Some(ref expected_token) = state.config.metrics_token {
        let authorized = bearer_token(&req)
            .map(|token| constant_time_eq(token.as_bytes(), expected_token.as_bytes()))
            .unwrap_or(false);

        if !authorized {
            return Err(ApiError::unauthorized(
                "Valid Bearer token required for /metrics",
            ));
        }
    }

    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ApiError::unknown(format!("failed to encode metrics: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
