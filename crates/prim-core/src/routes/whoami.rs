use actix_web::{web, HttpResponse};

use crate::caller::Caller;
use crate::pipeline::gated;

/// GET /v1/whoami - Echo the verified, allowlisted caller
pub async fn whoami(caller: Caller) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "wallet_address": caller.0,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(gated(web::scope("/v1")).route("/whoami", web::get().to(whoami)));
}
