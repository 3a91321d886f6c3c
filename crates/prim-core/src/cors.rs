//! CORS configuration for prim services.

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};

use crate::feedback::FEEDBACK_HEADER;

/// Build the CORS middleware from allowed origins. `*` allows any origin.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin_str)
        })
        .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("payment-signature"),
            HeaderName::from_static("x-admin-address"),
        ])
        // Browsers only hand exposed headers to scripts
        .expose_headers(vec![HeaderName::from_static(FEEDBACK_HEADER)])
        .max_age(3600)
}
