//! Stage ordering for gated routes.
//!
//! 1. [`verify_payment`] attaches the caller identity or short-circuits.
//! 2. [`enforce_allowlist`] rejects callers that are not on the allowlist.
//! 3. The route handler runs.
//! 4. [`augment_response`](crate::feedback::augment_response) shapes every response,
//!    including the ones stages 1 and 2 produced.
//!
//! Stages 1 and 2 are applied to a scope with [`gated`]; stage 4 wraps the whole
//! `App` so it also covers routing misses.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, Error, HttpMessage, Scope};
use std::str::FromStr;

use crate::allowlist::AllowlistChecker;
use crate::caller::require_caller;
use crate::error::ApiError;
use crate::metrics::{ALLOWLIST_DECISIONS, PAYMENT_REJECTIONS};
use crate::payment::PaymentGate;

pub const NOT_ALLOWLISTED_MESSAGE: &str = "Wallet is not on the allowlist";

/// Status used when a verified caller is not allowlisted. Chosen per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowlistDenial {
    #[default]
    Forbidden,
    Unauthorized,
}

impl AllowlistDenial {
    pub fn error(self) -> ApiError {
        match self {
            AllowlistDenial::Forbidden => ApiError::forbidden(NOT_ALLOWLISTED_MESSAGE),
            AllowlistDenial::Unauthorized => ApiError::unauthorized(NOT_ALLOWLISTED_MESSAGE),
        }
    }
}

impl FromStr for AllowlistDenial {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forbidden" | "403" => Ok(AllowlistDenial::Forbidden),
            "unauthorized" | "401" => Ok(AllowlistDenial::Unauthorized),
            other => Err(format!("unknown allowlist denial '{}'", other)),
        }
    }
}

/// App data for stage 2.
#[derive(Debug, Clone)]
pub struct AllowlistGate {
    /// `None` disables the check for this service.
    checker: Option<AllowlistChecker>,
    denial: AllowlistDenial,
}

impl AllowlistGate {
    pub fn new(checker: AllowlistChecker, denial: AllowlistDenial) -> Self {
        Self {
            checker: Some(checker),
            denial,
        }
    }

    pub fn disabled() -> Self {
        Self {
            checker: None,
            denial: AllowlistDenial::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.checker.is_some()
    }

    /// Decide for an already-verified caller.
    pub async fn authorize(&self, address: &str) -> Result<(), ApiError> {
        let Some(ref checker) = self.checker else {
            return Ok(());
        };
        match checker.check(address).await {
            Ok(true) => {
                ALLOWLIST_DECISIONS.with_label_values(&["allowed"]).inc();
                Ok(())
            }
            Ok(false) => {
                ALLOWLIST_DECISIONS.with_label_values(&["denied"]).inc();
                tracing::info!(address = %address, "Wallet not on allowlist");
                Err(self.denial.error())
            }
            Err(e) => {
                ALLOWLIST_DECISIONS.with_label_values(&["error"]).inc();
                Err(e.into())
            }
        }
    }
}

/// Stage 1: run the configured [`PaymentVerifier`](crate::payment::PaymentVerifier).
pub async fn verify_payment(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(gate) = req.app_data::<web::Data<PaymentGate>>().cloned() else {
        tracing::error!(path = %req.path(), "No payment verifier registered for gated route");
        let err = ApiError::not_configured("Payment verification is not configured");
        return Ok(req.error_response(err).map_into_right_body());
    };

    let verdict = gate.verify(req.request()).await;
    match verdict {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(rejection) => {
            PAYMENT_REJECTIONS.inc();
            Ok(req.into_response(rejection).map_into_right_body())
        }
    }
}

/// Stage 2: reject verified callers that are not allowlisted.
pub async fn enforce_allowlist(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(gate) = req.app_data::<web::Data<AllowlistGate>>().cloned() else {
        tracing::error!(path = %req.path(), "No allowlist gate registered for gated route");
        let err = ApiError::not_configured("Allowlist is not configured");
        return Ok(req.error_response(err).map_into_right_body());
    };

    let caller = match require_caller(req.request()) {
        Ok(caller) => caller,
        Err(err) => return Ok(req.error_response(err).map_into_right_body()),
    };

    match gate.authorize(&caller).await {
        Ok(()) => next.call(req).await.map(ServiceResponse::map_into_left_body),
        Err(err) => Ok(req.error_response(err).map_into_right_body()),
    }
}

/// Put stages 1 and 2 in front of every route in `scope`.
pub fn gated(
    scope: Scope,
) -> Scope<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    // Last wrap runs first.
    scope
        .wrap(from_fn(enforce_allowlist))
        .wrap(from_fn(verify_payment))
}
