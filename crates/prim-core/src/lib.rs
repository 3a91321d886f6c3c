//! Access control and response shaping shared by payment-gated prim services.
//!
//! A service composes, outermost first: [`feedback::augment_response`] on the whole
//! app, then [`pipeline::gated`] scopes that run the payment verifier and the
//! allowlist check ahead of business handlers. See [`pipeline`] for the ordering.

pub mod allowlist;
pub mod caller;
pub mod config;
pub mod cors;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod payment;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use allowlist::{
    AllowlistChecker, AllowlistEntry, AllowlistRegistry, AllowlistStore, StoreError,
};
pub use caller::{parse_json_body, require_caller, Caller, CallerIdentity};
pub use config::PrimConfig;
pub use error::{ApiError, ApiResult, ErrorCode, ErrorEnvelope};
pub use feedback::FeedbackChannel;
pub use payment::{PayerHeaderVerifier, PaymentGate, PaymentVerifier};
pub use pipeline::{gated, AllowlistDenial, AllowlistGate};
pub use state::AppState;
