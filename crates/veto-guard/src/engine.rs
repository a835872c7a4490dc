use chrono::{DateTime, Utc};
use tracing::info;
use veto_config::GuardConfig;
use veto_core::{
    AuthorizationStatus, Decision, PolicySettings, PrincipalId, ProposedAction, SpendWindow,
};

use crate::aggregator::{SpendAggregator, SpendSnapshot};
use crate::settings::SettingsManager;

/// What a single policy check concluded about an action.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckVerdict {
    /// Nothing to report.
    Pass,
    /// Allowed, but over a soft limit.
    Caution(String),
    /// Needs the owner's confirmation.
    RequireApproval(String),
    /// Must not proceed.
    Deny(String),
}

impl CheckVerdict {
    pub fn status(&self) -> AuthorizationStatus {
        match self {
            Self::Pass => AuthorizationStatus::Approved,
            Self::Caution(_) => AuthorizationStatus::Caution,
            Self::RequireApproval(_) => AuthorizationStatus::RequiresHumanApproval,
            Self::Deny(_) => AuthorizationStatus::Denied,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Caution(r) | Self::RequireApproval(r) | Self::Deny(r) => Some(r.as_str()),
        }
    }
}

/// Everything a check may look at.
pub struct CheckContext<'a> {
    pub action: &'a ProposedAction,
    pub settings: &'a PolicySettings,
    pub spend: &'a SpendSnapshot,
    pub caution_multiplier: f64,
    /// Count approved-but-unexecuted spend against ceilings.
    pub reserve_pending: bool,
}

impl CheckContext<'_> {
    pub fn counted_spend(&self, window: SpendWindow) -> f64 {
        self.spend.counted(window, self.reserve_pending)
    }
}

/// A single policy rule.
pub trait PolicyCheck: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict;
}

/// Runs every registered check against an action and settles on the most
/// severe verdict. Checks never short-circuit each other.
pub struct AuthorizationEngine {
    settings: SettingsManager,
    aggregator: SpendAggregator,
    checks: Vec<Box<dyn PolicyCheck>>,
    caution_multiplier: f64,
    reserve_pending: bool,
}

impl AuthorizationEngine {
    pub fn new(settings: SettingsManager, aggregator: SpendAggregator, config: &GuardConfig) -> Self {
        let mut engine = Self {
            settings,
            aggregator,
            checks: Vec::new(),
            caution_multiplier: config.caution_multiplier,
            reserve_pending: config.reserve_pending_approvals,
        };
        // Register built-in checks
        engine.add_check(Box::new(BlockedCategoryCheck));
        engine.add_check(Box::new(AllowedCategoryCheck));
        engine.add_check(Box::new(SingleTransactionCheck));
        engine.add_check(Box::new(WindowCeilingCheck {
            window: SpendWindow::Daily,
        }));
        if config.enforce_extended_windows {
            engine.add_check(Box::new(WindowCeilingCheck {
                window: SpendWindow::Weekly,
            }));
            engine.add_check(Box::new(WindowCeilingCheck {
                window: SpendWindow::Monthly,
            }));
        }
        engine.add_check(Box::new(HumanApprovalCheck));
        engine
    }

    pub fn add_check(&mut self, check: Box<dyn PolicyCheck>) {
        self.checks.push(check);
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Load settings and spend for `principal` and decide on `action`.
    /// Storage failures propagate; nothing is persisted except lazily
    /// created default settings.
    pub fn authorize(&self, principal: PrincipalId, action: &ProposedAction) -> veto_core::Result<Decision> {
        self.authorize_at(principal, action, Utc::now())
    }

    pub fn authorize_at(
        &self,
        principal: PrincipalId,
        action: &ProposedAction,
        now: DateTime<Utc>,
    ) -> veto_core::Result<Decision> {
        action.validate()?;
        let settings = self.settings.get_or_create(principal)?;
        let spend = self.aggregator.snapshot_at(principal, now, self.reserve_pending)?;
        Ok(self.evaluate(action, &settings, &spend))
    }

    /// Decide on `action` given already-loaded settings and spend.
    pub fn evaluate(&self, action: &ProposedAction, settings: &PolicySettings, spend: &SpendSnapshot) -> Decision {
        let ctx = CheckContext {
            action,
            settings,
            spend,
            caution_multiplier: self.caution_multiplier,
            reserve_pending: self.reserve_pending,
        };

        let mut status = AuthorizationStatus::Approved;
        let mut reasons = Vec::new();
        for check in &self.checks {
            let verdict = check.evaluate(&ctx);
            if let Some(reason) = verdict.reason() {
                info!(
                    check = check.name(),
                    status = %verdict.status(),
                    amount = action.amount,
                    category = %action.category,
                    "policy check triggered"
                );
                reasons.push(reason.to_string());
            }
            status = status.escalate(verdict.status());
        }

        // Headroom once this action goes through; a denied action consumes none.
        let consumed = if status == AuthorizationStatus::Denied {
            0.0
        } else {
            action.amount
        };
        let remaining = |window: SpendWindow| {
            (settings.limit_for(window) - ctx.counted_spend(window) - consumed).max(0.0)
        };

        Decision {
            status,
            reasons,
            remaining_daily: Some(remaining(SpendWindow::Daily)),
            remaining_weekly: Some(remaining(SpendWindow::Weekly)),
            record_id: None,
            authorization_token: None,
        }
    }
}

// ── Built-in checks ────────────────────────────────────────────

/// Denies categories on the block list.
struct BlockedCategoryCheck;

impl PolicyCheck for BlockedCategoryCheck {
    fn name(&self) -> &str {
        "blocked_category"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        if ctx.settings.is_blocked(&ctx.action.category) {
            CheckVerdict::Deny(format!("Category '{}' is blocked.", ctx.action.category))
        } else {
            CheckVerdict::Pass
        }
    }
}

/// Denies categories missing from a non-empty allow list.
struct AllowedCategoryCheck;

impl PolicyCheck for AllowedCategoryCheck {
    fn name(&self) -> &str {
        "allowed_category"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        if ctx.settings.is_allowed(&ctx.action.category) {
            CheckVerdict::Pass
        } else {
            CheckVerdict::Deny(format!(
                "Category '{}' is not in allowed list.",
                ctx.action.category
            ))
        }
    }
}

/// Cautions above the single-transaction limit, denies above the caution band.
struct SingleTransactionCheck;

impl PolicyCheck for SingleTransactionCheck {
    fn name(&self) -> &str {
        "single_transaction"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        let amount = ctx.action.amount;
        let limit = ctx.settings.single_transaction_limit;
        if amount > limit * ctx.caution_multiplier {
            CheckVerdict::Deny(format!(
                "Amount ${amount:.2} exceeds single transaction limit ${limit:.2}."
            ))
        } else if amount > limit {
            CheckVerdict::Caution(format!(
                "Amount ${amount:.2} exceeds single transaction limit ${limit:.2}."
            ))
        } else {
            CheckVerdict::Pass
        }
    }
}

/// Denies when the action would push a rolling window over its ceiling.
struct WindowCeilingCheck {
    window: SpendWindow,
}

impl PolicyCheck for WindowCeilingCheck {
    fn name(&self) -> &str {
        match self.window {
            SpendWindow::Daily => "daily_limit",
            SpendWindow::Weekly => "weekly_limit",
            SpendWindow::Monthly => "monthly_limit",
        }
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        let projected = ctx.counted_spend(self.window) + ctx.action.amount;
        let limit = ctx.settings.limit_for(self.window);
        if projected > limit {
            let label = match self.window {
                SpendWindow::Daily => "Daily",
                SpendWindow::Weekly => "Weekly",
                SpendWindow::Monthly => "Monthly",
            };
            CheckVerdict::Deny(format!(
                "{label} limit exceeded (${projected:.2} > ${limit:.2})."
            ))
        } else {
            CheckVerdict::Pass
        }
    }
}

/// Escalates amounts at or above the owner's approval threshold.
struct HumanApprovalCheck;

impl PolicyCheck for HumanApprovalCheck {
    fn name(&self) -> &str {
        "human_approval"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckVerdict {
        let amount = ctx.action.amount;
        let threshold = ctx.settings.require_approval_above;
        if amount >= threshold {
            CheckVerdict::RequireApproval(format!(
                "Amount ${amount:.2} requires human approval (threshold: ${threshold:.2})."
            ))
        } else {
            CheckVerdict::Pass
        }
    }
}
