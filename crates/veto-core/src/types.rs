use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::VetoError;

/// Unique identifier for a principal (the account an agent spends for).
pub type PrincipalId = Uuid;

/// Unique identifier for a ledger record.
pub type RecordId = Uuid;

/// Unique identifier for a policy settings row.
pub type SettingsId = Uuid;

/// An account on whose behalf an agent acts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The kinds of financial action an agent may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Purchase,
    Transfer,
    Subscription,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Transfer => "transfer",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = VetoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "transfer" => Ok(Self::Transfer),
            "subscription" => Ok(Self::Subscription),
            other => Err(VetoError::validation(
                "action_type",
                format!("unknown action type '{other}' (expected purchase, transfer or subscription)"),
            )),
        }
    }
}

/// A trailing aggregation window, measured back from "now".
///
/// Windows are fixed durations, not calendar periods: `Daily` is the last
/// 24 hours, `Weekly` the last 7 days, `Monthly` the last 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendWindow {
    Daily,
    Weekly,
    Monthly,
}

impl SpendWindow {
    pub const ALL: [SpendWindow; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    pub fn duration(&self) -> Duration {
        match self {
            Self::Daily => Duration::hours(24),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }

    /// Start of the window ending at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for SpendWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpendWindow {
    type Err = VetoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(VetoError::validation(
                "period",
                format!("unknown period '{other}' (expected daily, weekly or monthly)"),
            )),
        }
    }
}

/// Reject amounts that cannot be compared against limits.
pub fn validate_amount(field: &str, amount: f64) -> crate::Result<()> {
    if !amount.is_finite() {
        return Err(VetoError::validation(field, format!("{amount} is not a finite number")));
    }
    if amount < 0.0 {
        return Err(VetoError::validation(field, format!("{amount} is negative")));
    }
    Ok(())
}
