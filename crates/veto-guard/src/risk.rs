//! Advisory purchase risk scoring. Independent of the authorization
//! checks; callers use it for display only.

use serde::{Deserialize, Serialize};
use veto_core::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInput {
    pub amount: f64,
    pub category: String,
    pub monthly_income: f64,
    /// Carried for display; does not affect the score.
    pub monthly_expenses: f64,
    /// Carried for display; does not affect the score.
    pub is_recurring: bool,
    pub is_essential: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0-100.
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

/// Score a prospective purchase against the buyer's income.
pub fn assess(input: &RiskInput) -> RiskAssessment {
    let mut score: u8 = 0;
    let mut factors = Vec::new();

    if input.monthly_income > 0.0 {
        let ratio = input.amount / input.monthly_income;
        if ratio > 0.5 {
            score += 50;
            factors.push("Cost > 50% of monthly income".to_string());
        } else if ratio > 0.1 {
            score += 20;
            factors.push("Significant cost relative to income".to_string());
        }
    }

    if !input.is_essential {
        score += 10;
        factors.push("Non-essential purchase".to_string());
    }

    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}
