use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use veto_core::{PolicyDefaults, PolicySettings, PolicySettingsUpdate, PrincipalId, SettingsStore, VetoError};

/// Lifecycle of per-principal policy settings: lazy creation from
/// configured defaults, validated partial updates.
#[derive(Clone)]
pub struct SettingsManager {
    store: Arc<dyn SettingsStore>,
    defaults: PolicyDefaults,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: PolicyDefaults) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &PolicyDefaults {
        &self.defaults
    }

    pub fn get(&self, principal: PrincipalId) -> veto_core::Result<Option<PolicySettings>> {
        self.store.get_settings(principal)
    }

    /// Existing settings, or freshly stored defaults. Safe to race: the
    /// store keeps whichever row landed first and every caller gets it.
    pub fn get_or_create(&self, principal: PrincipalId) -> veto_core::Result<PolicySettings> {
        if let Some(existing) = self.store.get_settings(principal)? {
            return Ok(existing);
        }
        let fresh = PolicySettings::new(principal, &self.defaults, Utc::now());
        let stored = self.store.insert_settings_if_absent(&fresh)?;
        debug!(%principal, created = stored.id == fresh.id, "resolved policy settings");
        Ok(stored)
    }

    /// Merge `update` into existing settings. `None` if the principal has none.
    pub fn update(
        &self,
        principal: PrincipalId,
        update: PolicySettingsUpdate,
    ) -> veto_core::Result<Option<PolicySettings>> {
        self.update_at(principal, update, Utc::now())
    }

    pub fn update_at(
        &self,
        principal: PrincipalId,
        mut update: PolicySettingsUpdate,
        now: DateTime<Utc>,
    ) -> veto_core::Result<Option<PolicySettings>> {
        update.validate()?;
        let updated = self.store.update_settings(principal, &update, now)?;
        if updated.is_some() {
            info!(%principal, empty = update.is_empty(), "policy settings updated");
        }
        Ok(updated)
    }

    /// Create-or-update: apply `update` on top of existing settings, or on
    /// top of the defaults when the principal has none yet.
    pub fn configure(
        &self,
        principal: PrincipalId,
        mut update: PolicySettingsUpdate,
    ) -> veto_core::Result<PolicySettings> {
        update.validate()?;
        self.get_or_create(principal)?;
        self.store
            .update_settings(principal, &update, Utc::now())?
            .ok_or_else(|| VetoError::NotFound(format!("policy settings for {principal}")))
    }
}
