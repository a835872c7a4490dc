use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::VetoError;
use crate::types::{PrincipalId, SettingsId, SpendWindow, validate_amount};

/// Limits applied to a principal's settings when they are first created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefaults {
    /// Largest single action that passes without a caution.
    pub single_transaction_limit: f64,
    /// Ceiling over the trailing 24 hours.
    pub daily_limit: f64,
    /// Ceiling over the trailing 7 days.
    pub weekly_limit: f64,
    /// Ceiling over the trailing 30 days.
    pub monthly_limit: f64,
    /// Actions at or above this amount need human approval.
    pub require_approval_above: f64,
    /// Categories blocked for every new principal.
    pub blocked_categories: Vec<String>,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            single_transaction_limit: 50.0,
            daily_limit: 100.0,
            weekly_limit: 500.0,
            monthly_limit: 2000.0,
            require_approval_above: 100.0,
            blocked_categories: vec![],
        }
    }
}

/// Owner-configured spending policy. Exactly one row exists per principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    pub id: SettingsId,
    pub principal_id: PrincipalId,
    pub single_transaction_limit: f64,
    pub daily_limit: f64,
    pub weekly_limit: f64,
    pub monthly_limit: f64,
    pub require_approval_above: f64,
    /// When present and non-empty, only these categories may be spent on.
    pub allowed_categories: Option<BTreeSet<String>>,
    pub blocked_categories: Option<BTreeSet<String>>,
    /// Stored for the owner's dashboard; not consulted by the checks.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicySettings {
    /// Fresh settings for a principal, seeded from `defaults`.
    pub fn new(principal_id: PrincipalId, defaults: &PolicyDefaults, now: DateTime<Utc>) -> Self {
        let blocked: BTreeSet<String> = defaults
            .blocked_categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            id: Uuid::new_v4(),
            principal_id,
            single_transaction_limit: defaults.single_transaction_limit,
            daily_limit: defaults.daily_limit,
            weekly_limit: defaults.weekly_limit,
            monthly_limit: defaults.monthly_limit,
            require_approval_above: defaults.require_approval_above,
            allowed_categories: None,
            blocked_categories: Some(blocked),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The configured ceiling for a window.
    pub fn limit_for(&self, window: SpendWindow) -> f64 {
        match window {
            SpendWindow::Daily => self.daily_limit,
            SpendWindow::Weekly => self.weekly_limit,
            SpendWindow::Monthly => self.monthly_limit,
        }
    }

    pub fn is_blocked(&self, category: &str) -> bool {
        self.blocked_categories
            .as_ref()
            .is_some_and(|set| set.contains(category))
    }

    /// An empty or missing allow-list permits every category.
    pub fn is_allowed(&self, category: &str) -> bool {
        match &self.allowed_categories {
            Some(set) if !set.is_empty() => set.contains(category),
            _ => true,
        }
    }

    /// Merge the supplied fields of `update` and bump `updated_at`.
    pub fn apply(&mut self, update: &PolicySettingsUpdate, now: DateTime<Utc>) {
        if let Some(v) = update.single_transaction_limit {
            self.single_transaction_limit = v;
        }
        if let Some(v) = update.daily_limit {
            self.daily_limit = v;
        }
        if let Some(v) = update.weekly_limit {
            self.weekly_limit = v;
        }
        if let Some(v) = update.monthly_limit {
            self.monthly_limit = v;
        }
        if let Some(v) = update.require_approval_above {
            self.require_approval_above = v;
        }
        if let Some(ref v) = update.allowed_categories {
            self.allowed_categories = Some(v.clone());
        }
        if let Some(ref v) = update.blocked_categories {
            self.blocked_categories = Some(v.clone());
        }
        if let Some(v) = update.is_active {
            self.is_active = v;
        }
        self.updated_at = now;
    }
}

/// A partial settings change. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettingsUpdate {
    pub single_transaction_limit: Option<f64>,
    pub daily_limit: Option<f64>,
    pub weekly_limit: Option<f64>,
    pub monthly_limit: Option<f64>,
    pub require_approval_above: Option<f64>,
    pub allowed_categories: Option<BTreeSet<String>>,
    pub blocked_categories: Option<BTreeSet<String>>,
    pub is_active: Option<bool>,
}

impl PolicySettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check supplied limits and normalize category names in place.
    pub fn validate(&mut self) -> crate::Result<()> {
        let limits = [
            ("single_transaction_limit", self.single_transaction_limit),
            ("daily_limit", self.daily_limit),
            ("weekly_limit", self.weekly_limit),
            ("monthly_limit", self.monthly_limit),
            ("require_approval_above", self.require_approval_above),
        ];
        for (field, value) in limits {
            if let Some(v) = value {
                validate_amount(field, v)?;
            }
        }
        if let Some(set) = self.allowed_categories.take() {
            self.allowed_categories = Some(normalize_categories("allowed_categories", set)?);
        }
        if let Some(set) = self.blocked_categories.take() {
            self.blocked_categories = Some(normalize_categories("blocked_categories", set)?);
        }
        Ok(())
    }
}

fn normalize_categories(field: &str, set: BTreeSet<String>) -> crate::Result<BTreeSet<String>> {
    set.into_iter()
        .map(|c| {
            let trimmed = c.trim();
            if trimmed.is_empty() {
                Err(VetoError::validation(field, "category names must not be empty"))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}
