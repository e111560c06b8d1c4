use serde::{Deserialize, Serialize};

use crate::catalog::{is_special_code, Discount};
use crate::geo::{is_eligible, restriction_reason, rules, suggestion, GeoCategory};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    SpecialTrack,
    CategoryRule,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityCheck {
    pub code: String,
    pub name: Option<String>,
    pub eligible: bool,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
    pub category: Option<GeoCategory>,
    pub rule_applied: RuleSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityStats {
    pub total: usize,
    pub eligible: usize,
    pub ineligible: usize,
    pub eligibility_rate: f64,
}

/// Evaluates one code. On the special track the special codes bypass
/// geographic gating entirely.
pub fn evaluate_code(
    code: &str,
    category: Option<GeoCategory>,
    special_track: bool,
) -> EligibilityCheck {
    let normalized = code.trim().to_ascii_uppercase();
    if special_track && is_special_code(&normalized) {
        return EligibilityCheck {
            code: normalized,
            name: None,
            eligible: true,
            reason: None,
            suggestion: None,
            category,
            rule_applied: RuleSource::SpecialTrack,
        };
    }

    let rule_applied = match (category, rules::find_rule(&normalized)) {
        (Some(_), Some(_)) => RuleSource::CategoryRule,
        _ => RuleSource::Default,
    };
    let eligible = is_eligible(category, &normalized);
    EligibilityCheck {
        reason: restriction_reason(category, &normalized).map(str::to_string),
        suggestion: if eligible {
            None
        } else {
            suggestion(category, &normalized).map(str::to_string)
        },
        code: normalized,
        name: None,
        eligible,
        category,
        rule_applied,
    }
}

pub fn analyze_eligibility(
    discounts: &[Discount],
    category: Option<GeoCategory>,
    special_track: bool,
) -> Vec<EligibilityCheck> {
    discounts
        .iter()
        .map(|discount| {
            let mut check = evaluate_code(&discount.code, category, special_track);
            check.name = Some(discount.name.clone());
            check
        })
        .collect()
}

pub fn eligibility_stats(checks: &[EligibilityCheck]) -> EligibilityStats {
    let total = checks.len();
    let eligible = checks.iter().filter(|c| c.eligible).count();
    let eligibility_rate = if total == 0 {
        100.0
    } else {
        eligible as f64 / total as f64 * 100.0
    };
    EligibilityStats {
        total,
        eligible,
        ineligible: total - eligible,
        eligibility_rate,
    }
}
