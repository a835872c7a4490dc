use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VetoError;

/// Outcome of an authorization, ordered by severity:
///
/// - **Approved**: the action may proceed.
/// - **Caution**: the action may proceed but exceeded a soft limit.
/// - **RequiresHumanApproval**: the owner must confirm before the action runs.
/// - **Denied**: the action must not run.
/// - **Error**: the pipeline failed; never produced by a policy check.
///
/// When several checks fire, the final status is the maximum under this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum AuthorizationStatus {
    Approved = 0,
    Caution = 1,
    RequiresHumanApproval = 2,
    Denied = 3,
    Error = 4,
}

impl AuthorizationStatus {
    pub const ALL: [AuthorizationStatus; 5] = [
        Self::Approved,
        Self::Caution,
        Self::RequiresHumanApproval,
        Self::Denied,
        Self::Error,
    ];

    /// Wire value, exact and case-sensitive.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Caution => "CAUTION",
            Self::RequiresHumanApproval => "REQUIRES_HUMAN_APPROVAL",
            Self::Denied => "DENIED",
            Self::Error => "ERROR",
        }
    }

    /// Escalate to `other` if it is more severe.
    pub fn escalate(self, other: Self) -> Self {
        self.max(other)
    }

    /// Whether an action with this status may be carried out without further input.
    pub fn permits_execution(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorizationStatus {
    type Err = VetoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| VetoError::validation("status", format!("unknown status '{s}'")))
    }
}

/// Advisory risk bucket produced by the risk assessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s > 70 => Self::Critical,
            s if s > 50 => Self::High,
            s if s > 20 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
