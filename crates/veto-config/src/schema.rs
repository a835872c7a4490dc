use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use veto_core::PolicyDefaults;

/// Root configuration, read from `veto.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoConfig {
    /// Limits given to a principal the first time its settings are read.
    pub policy: PolicyDefaults,
    pub guard: GuardConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

// ── Guard ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Amounts above `single_transaction_limit * caution_multiplier` are
    /// denied; amounts between the limit and that ceiling get a caution.
    pub caution_multiplier: f64,
    /// Let the weekly and monthly ceilings deny actions, not just the daily one.
    pub enforce_extended_windows: bool,
    /// Count approved-but-not-yet-executed actions against the ceilings.
    pub reserve_pending_approvals: bool,
    /// History entries returned when the caller gives no limit.
    pub default_history_limit: usize,
    /// Upper bound on any history request.
    pub max_history_limit: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            caution_multiplier: 1.5,
            enforce_extended_windows: false,
            reserve_pending_approvals: false,
            default_history_limit: 50,
            max_history_limit: 500,
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path. `:memory:` keeps everything in process.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".veto")
                .join("veto.db"),
        }
    }
}

impl StorageConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl VetoConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Policy limits ───
        let limits = [
            ("policy.single_transaction_limit", self.policy.single_transaction_limit),
            ("policy.daily_limit", self.policy.daily_limit),
            ("policy.weekly_limit", self.policy.weekly_limit),
            ("policy.monthly_limit", self.policy.monthly_limit),
            ("policy.require_approval_above", self.policy.require_approval_above),
        ];
        for (field, value) in limits {
            if !value.is_finite() || value < 0.0 {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("{} is not a valid limit", value),
                    severity: WarningSeverity::Error,
                    hint: Some("Limits must be finite and >= 0".into()),
                });
            }
        }

        if self.policy.daily_limit > self.policy.weekly_limit
            || self.policy.weekly_limit > self.policy.monthly_limit
        {
            warnings.push(ConfigWarning {
                field: "policy".into(),
                message: "daily/weekly/monthly limits are not increasing".into(),
                severity: WarningSeverity::Warning,
                hint: Some("A longer window usually allows at least as much as a shorter one".into()),
            });
        }

        if self.policy.require_approval_above > self.policy.daily_limit {
            warnings.push(ConfigWarning {
                field: "policy.require_approval_above".into(),
                message: "approval threshold is above the daily limit, so it can never trigger before a denial".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Guard ───
        if !self.guard.caution_multiplier.is_finite() || self.guard.caution_multiplier < 1.0 {
            warnings.push(ConfigWarning {
                field: "guard.caution_multiplier".into(),
                message: format!("caution multiplier {} is out of range", self.guard.caution_multiplier),
                severity: WarningSeverity::Error,
                hint: Some("Must be >= 1.0; 1.0 disables the caution band".into()),
            });
        }

        if self.guard.max_history_limit == 0 {
            warnings.push(ConfigWarning {
                field: "guard.max_history_limit".into(),
                message: "max_history_limit is 0, history will always be empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 500".into()),
            });
        } else if self.guard.default_history_limit > self.guard.max_history_limit {
            warnings.push(ConfigWarning {
                field: "guard.default_history_limit".into(),
                message: format!(
                    "default_history_limit {} exceeds max_history_limit {}",
                    self.guard.default_history_limit, self.guard.max_history_limit
                ),
                severity: WarningSeverity::Warning,
                hint: Some("The default will be clamped to the maximum".into()),
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| w.to_string())
            .collect();
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors.join("\n"))
        }
    }
}
