use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Allowlist decisions: outcome is "allowed", "denied" or "error"
pub static ALLOWLIST_DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "prim_allowlist_decisions_total",
            "Allowlist checks by outcome",
        ),
        &["outcome"],
    )
    .unwrap()
});

pub static ENVELOPES_RENDERED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "prim_error_envelopes_total",
            "Error envelopes rendered by code",
        ),
        &["code"],
    )
    .unwrap()
});

pub static ERROR_BODIES_AUGMENTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "prim_error_bodies_augmented_total",
        "Error responses that had feedback_url merged into the body",
    )
    .unwrap()
});

pub static PAYMENT_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "prim_payment_rejections_total",
        "Requests short-circuited by the payment verifier",
    )
    .unwrap()
});

/// Register all metrics with the registry. Call once at startup.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(ALLOWLIST_DECISIONS.clone()))?;
    REGISTRY.register(Box::new(ENVELOPES_RENDERED.clone()))?;
    REGISTRY.register(Box::new(ERROR_BODIES_AUGMENTED.clone()))?;
    REGISTRY.register(Box::new(PAYMENT_REJECTIONS.clone()))?;
    Ok(())
}
