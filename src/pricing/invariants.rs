use thiserror::Error;

use crate::pricing::{CalculatedTotals, CriticalEdgeCase, EdgeCaseKind, PricingRules};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("calculation invariant violated ({count} case(s)): {summary}")]
pub struct InvariantViolation {
    pub count: usize,
    pub summary: String,
    pub cases: Vec<CriticalEdgeCase>,
}

/// Post-computation checks. A non-empty result means the arithmetic produced
/// something that must never reach a student.
pub fn detect_edge_cases(rules: &PricingRules, totals: &CalculatedTotals) -> Vec<CriticalEdgeCase> {
    let mut cases = Vec::new();

    if totals.final_value < -rules.currency_tolerance {
        cases.push(CriticalEdgeCase {
            kind: EdgeCaseKind::NegativeFinalValue,
            detail: format!("final value {:.2} is negative", totals.final_value),
        });
    }

    if !(0.0..=100.0).contains(&totals.applied_percentage) {
        cases.push(CriticalEdgeCase {
            kind: EdgeCaseKind::PercentageOutOfRange,
            detail: format!(
                "applied percentage {:.4} outside [0, 100]",
                totals.applied_percentage
            ),
        });
    }

    let expected_value = totals.base_value * totals.applied_percentage / 100.0;
    if (totals.discount_value - expected_value).abs() > rules.currency_tolerance {
        cases.push(CriticalEdgeCase {
            kind: EdgeCaseKind::DiscountValueMismatch,
            detail: format!(
                "discount value {:.2} differs from expected {:.2}",
                totals.discount_value, expected_value
            ),
        });
    }

    if !totals.full_scholarship_applied {
        let redistributed: f64 = totals
            .counted_discounts()
            .map(|line| line.applied_percentage)
            .sum();
        if (redistributed - totals.applied_percentage).abs() > rules.percentage_tolerance {
            cases.push(CriticalEdgeCase {
                kind: EdgeCaseKind::RedistributionMismatch,
                detail: format!(
                    "per-discount percentages sum to {:.4}, applied is {:.4}",
                    redistributed, totals.applied_percentage
                ),
            });
        }
    }

    cases
}

pub fn check_invariants(rules: &PricingRules, totals: &CalculatedTotals) -> Result<(), InvariantViolation> {
    let cases = detect_edge_cases(rules, totals);
    if cases.is_empty() {
        return Ok(());
    }
    let summary = cases
        .iter()
        .map(|case| case.detail.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(InvariantViolation {
        count: cases.len(),
        summary,
        cases,
    })
}

#[cfg(test)]
mod tests {
    use super::check_invariants;
    use crate::catalog::fallback::static_discounts;
    use crate::catalog::DiscountLookup;
    use crate::pricing::{calculate, CalculationOptions, EdgeCaseKind, PricingRules};

    fn sample() -> crate::pricing::CalculatedTotals {
        let lookups: Vec<DiscountLookup> = static_discounts()
            .into_iter()
            .filter(|d| ["IIR", "PBS", "COL"].contains(&d.code.as_str()))
            .map(DiscountLookup::Found)
            .collect();
        calculate(None, &lookups, 1000.0, &CalculationOptions::default())
    }

    #[test]
    fn well_formed_totals_pass() {
        let totals = sample();
        assert!(totals.cap_applied);
        check_invariants(&PricingRules::default(), &totals).expect("invariants hold");
    }

    #[test]
    fn tampered_totals_are_reported() {
        let mut totals = sample();
        totals.final_value = -5.0;
        totals.discounts[0].applied_percentage += 3.0;
        let violation = check_invariants(&PricingRules::default(), &totals)
            .expect_err("tampered totals should fail");
        let kinds: Vec<EdgeCaseKind> = violation.cases.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&EdgeCaseKind::NegativeFinalValue));
        assert!(kinds.contains(&EdgeCaseKind::RedistributionMismatch));
        assert_eq!(violation.count, 2);
    }

    #[test]
    fn override_skips_redistribution_sum() {
        let lookups: Vec<DiscountLookup> = static_discounts()
            .into_iter()
            .filter(|d| ["ABI", "IIR"].contains(&d.code.as_str()))
            .map(DiscountLookup::Found)
            .collect();
        let totals = calculate(None, &lookups, 1000.0, &CalculationOptions::default());
        assert!(totals.full_scholarship_applied);
        check_invariants(&PricingRules::default(), &totals).expect("override is exempt");
    }
}
