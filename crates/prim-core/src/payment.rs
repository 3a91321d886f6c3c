//! Boundary to the external payment verifier (pipeline stage 1).
//!
//! Settlement is not done here. A verifier either attributes the request to a
//! wallet or produces the rejection response (typically 402) that is sent as-is.

use actix_web::{HttpRequest, HttpResponse};
use base64::Engine;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::allowlist::is_valid_address;
use crate::caller::CallerIdentity;

pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
const X402_VERSION: u32 = 1;

pub type VerifyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CallerIdentity, HttpResponse>> + 'a>>;

/// Authenticates the paying wallet for a request.
pub trait PaymentVerifier: Send + Sync + 'static {
    /// `Ok` attaches the identity and continues; `Err` short-circuits with the response.
    fn verify<'a>(&'a self, req: &'a HttpRequest) -> VerifyFuture<'a>;
}

/// Shared verifier handle, registered as app data for the payment stage.
#[derive(Clone)]
pub struct PaymentGate {
    verifier: Arc<dyn PaymentVerifier>,
}

impl PaymentGate {
    pub fn new(verifier: impl PaymentVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    pub async fn verify(&self, req: &HttpRequest) -> Result<CallerIdentity, HttpResponse> {
        self.verifier.verify(req).await
    }
}

/// Build a 402 Payment Required response.
pub fn payment_required_response(message: &str) -> HttpResponse {
    HttpResponse::PaymentRequired().json(serde_json::json!({
        "error": "payment_required",
        "message": message,
        "x402_version": X402_VERSION,
    }))
}

#[derive(Debug, serde::Deserialize)]
struct SignedPayment {
    payload: SignedAuthorization,
}

#[derive(Debug, serde::Deserialize)]
struct SignedAuthorization {
    from: String,
}

/// Extract the payer address from the `PAYMENT-SIGNATURE` header without settling.
pub fn extract_payer_from_header(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get(PAYMENT_SIGNATURE_HEADER)?;
    let header_str = header.to_str().ok()?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(header_str.trim())
        .ok()?;
    let payment: SignedPayment = serde_json::from_slice(&decoded).ok()?;

    is_valid_address(&payment.payload.from).then_some(payment.payload.from)
}

/// Attributes the payer named in the `PAYMENT-SIGNATURE` payload.
///
/// Trusts the header without checking the signature or settling, so it is only
/// suitable for local development and tests. Production services plug in a
/// facilitator-backed verifier instead.
#[derive(Debug, Clone, Default)]
pub struct PayerHeaderVerifier;

impl PaymentVerifier for PayerHeaderVerifier {
    fn verify<'a>(&'a self, req: &'a HttpRequest) -> VerifyFuture<'a> {
        Box::pin(async move {
            if !req.headers().contains_key(PAYMENT_SIGNATURE_HEADER) {
                return Err(payment_required_response(
                    "Payment required to access this resource",
                ));
            }
            match extract_payer_from_header(req) {
                Some(payer) => Ok(CallerIdentity::new(payer)),
                None => {
                    tracing::warn!("Malformed {} header", PAYMENT_SIGNATURE_HEADER);
                    Err(payment_required_response("Malformed payment signature"))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const PAYER: &str = "0x1234567890123456789012345678901234567890";

    fn signature_for(from: &str) -> String {
        let payment = serde_json::json!({
            "x402Version": 1,
            "payload": { "from": from, "nonce": "0x01" },
        });
        base64::engine::general_purpose::STANDARD.encode(payment.to_string())
    }

    #[test]
    fn test_extract_payer_from_header() {
        let req = TestRequest::default()
            .insert_header((PAYMENT_SIGNATURE_HEADER, signature_for(PAYER)))
            .to_http_request();
        assert_eq!(extract_payer_from_header(&req).as_deref(), Some(PAYER));
    }

    #[test]
    fn test_extract_payer_rejects_garbage() {
        let req = TestRequest::default()
            .insert_header((PAYMENT_SIGNATURE_HEADER, "%%% not base64"))
            .to_http_request();
        assert!(extract_payer_from_header(&req).is_none());

        let req = TestRequest::default()
            .insert_header((PAYMENT_SIGNATURE_HEADER, signature_for("0xabc")))
            .to_http_request();
        assert!(extract_payer_from_header(&req).is_none());
    }

    #[actix_rt::test]
    async fn test_header_verifier_requires_header() {
        let req = TestRequest::default().to_http_request();
        let res = PayerHeaderVerifier.verify(&req).await.unwrap_err();
        assert_eq!(res.status(), 402);
    }

    #[actix_rt::test]
    async fn test_header_verifier_attributes_payer() {
        let req = TestRequest::default()
            .insert_header((PAYMENT_SIGNATURE_HEADER, signature_for(PAYER)))
            .to_http_request();
        let identity = PaymentGate::new(PayerHeaderVerifier)
            .verify(&req)
            .await
            .unwrap();
        assert_eq!(identity.wallet_address, PAYER);
    }
}
