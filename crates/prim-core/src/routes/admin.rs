use actix_web::{web, HttpRequest, HttpResponse};

use super::{bearer_token, constant_time_eq};
use crate::allowlist::is_valid_address;
use crate::caller::parse_json_body;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const ADMIN_ADDRESS_HEADER: &str = "x-admin-address";

/// Body of POST /admin/allowlist
#[derive(Debug, serde::Deserialize)]
pub struct AddAllowlistEntry {
    pub address: String,
    pub note: Option<String>,
}

/// Check the admin bearer token. Returns the acting admin's address, if supplied.
fn require_admin(req: &HttpRequest, state: &AppState) -> ApiResult<Option<String>> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or_else(|| ApiError::not_configured("Admin token is not configured"))?;

    let token =
        bearer_token(req).ok_or_else(|| ApiError::forbidden("Admin bearer token required"))?;
    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    match req
        .headers()
        .get(ADMIN_ADDRESS_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(addr) if is_valid_address(addr) => Ok(Some(addr.to_string())),
        Some(_) => Err(ApiError::invalid_request("Invalid admin address")),
        None => Ok(None),
    }
}

fn validated_address(address: &str) -> ApiResult<&str> {
    if is_valid_address(address) {
        Ok(address.trim())
    } else {
        Err(ApiError::invalid_request("Invalid wallet address"))
    }
}

/// GET /admin/allowlist - List allowlisted wallets
pub async fn list_entries(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    require_admin(&req, &state)?;
    let entries = state.allowlist.list().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

/// POST /admin/allowlist - Grant (or re-grant) access to a wallet
pub async fn add_entry(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let admin = require_admin(&req, &state)?;
    let body: AddAllowlistEntry = parse_json_body(&body, "admin.allowlist.add")?;
    let address = validated_address(&body.address)?;

    let entry = state
        .allowlist
        .add(address, admin.as_deref(), body.note.as_deref())
        .await?;

    tracing::info!(
        address = %entry.address,
        added_by = ?entry.added_by,
        "Wallet added to allowlist"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "entry": entry })))
}

/// GET /admin/allowlist/{address} - Look up one wallet
pub async fn get_entry(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    require_admin(&req, &state)?;
    let address = path.into_inner();
    let address = validated_address(&address)?;

    let entry = state
        .allowlist
        .get(address)
        .await?
        .ok_or_else(|| ApiError::not_found("Wallet is not on the allowlist"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "entry": entry })))
}

/// DELETE /admin/allowlist/{address} - Revoke access. Absent wallets are not an error.
pub async fn remove_entry(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    require_admin(&req, &state)?;
    let address = path.into_inner();
    let address = validated_address(&address)?;

    let removed = state.allowlist.remove(address).await?;
    if removed {
        tracing::info!(address = %address.to_ascii_lowercase(), "Wallet removed from allowlist");
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "address": address.to_ascii_lowercase(),
        "removed": removed,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/allowlist")
            .route("", web::get().to(list_entries))
            .route("", web::post().to(add_entry))
            .route("/{address}", web::get().to(get_entry))
            .route("/{address}", web::delete().to(remove_entry)),
    );
}
