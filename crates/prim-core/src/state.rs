use std::sync::Arc;

use crate::allowlist::{AllowlistRegistry, AllowlistStore, StoreError};
use crate::config::PrimConfig;
use crate::pipeline::AllowlistGate;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PrimConfig>,
    pub registry: AllowlistRegistry,
    /// Store at `config.allowlist_db_path`, shared with the allowlist gate
    pub allowlist: AllowlistStore,
}

impl AppState {
    pub fn new(config: PrimConfig, registry: AllowlistRegistry) -> Result<Self, StoreError> {
        let allowlist = registry.open(&config.allowlist_db_path)?;
        Ok(Self {
            config: Arc::new(config),
            registry,
            allowlist,
        })
    }

    /// Stage-2 gate for this service's gated routes.
    pub fn allowlist_gate(&self) -> Result<AllowlistGate, StoreError> {
        if !self.config.allowlist_enabled {
            return Ok(AllowlistGate::disabled());
        }
        let checker = self.registry.checker(&self.config.allowlist_db_path)?;
        Ok(AllowlistGate::new(checker, self.config.allowlist_denial))
    }
}
