use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use serde::de::DeserializeOwned;
use std::future::{ready, Ready};

use crate::error::{ApiError, ApiResult};

pub const NO_WALLET_MESSAGE: &str = "No wallet address in payment";
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON body";

/// Wallet attributed to the payer by the payment verifier.
///
/// Lives in the request extensions. Its absence on a gated route means the
/// pipeline was wired without a verifier in front, not that payment was optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub wallet_address: String,
}

impl CallerIdentity {
    pub fn new(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
        }
    }
}

/// Attach the caller identity to a request.
pub fn set_caller(req: &HttpRequest, identity: CallerIdentity) {
    req.extensions_mut().insert(identity);
}

/// Wallet address of the verified caller, or 403 `forbidden`.
pub fn require_caller(req: &HttpRequest) -> ApiResult<String> {
    req.extensions()
        .get::<CallerIdentity>()
        .map(|identity| identity.wallet_address.trim())
        .filter(|address| !address.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::forbidden(NO_WALLET_MESSAGE))
}

/// Extractor form of [`require_caller`].
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(require_caller(req).map(Caller))
    }
}

/// Decode a JSON request body into `T`.
///
/// Syntax errors and schema mismatches (missing fields, wrong types) both become
/// 400 `invalid_request`; the cause is logged under `label` for operators.
pub fn parse_json_body<T: DeserializeOwned>(body: &[u8], label: &str) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(label = %label, error = %e, "Invalid JSON body");
        ApiError::invalid_request(INVALID_JSON_MESSAGE)
    })
}
