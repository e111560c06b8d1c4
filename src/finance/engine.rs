use tracing::debug;

use crate::finance::installments::build_plan;
use crate::finance::{
    ChangeStatus, FinanceError, FinanceRules, FinancialCalculation, FinancialRequest,
    PaymentScenario, ViabilityReport, YearComparison,
};
use crate::pricing::CalculatedTotals;

const INCOME_COMMITMENT_LIMIT: f64 = 30.0;
const YEARLY_INCREASE_LIMIT: f64 = 20.0;

/// Layers payment terms over computed totals. The payment-method discount is
/// taken from the capped value and never counts toward the cap.
pub fn calculate_financials(
    totals: &CalculatedTotals,
    request: &FinancialRequest,
    rules: &FinanceRules,
) -> Result<FinancialCalculation, FinanceError> {
    let due_day = request
        .due_day
        .unwrap_or_else(|| rules.due_days.first().copied().unwrap_or(5));
    if !rules.due_days.contains(&due_day) {
        return Err(FinanceError::InvalidDueDay(due_day));
    }
    let installments = request.installments.unwrap_or(rules.default_installments);
    if installments == 0 {
        return Err(FinanceError::NoInstallments);
    }

    let mut warnings = Vec::new();
    if totals.cap_applied {
        warnings.push(format!(
            "discount total of {:.2}% exceeds the {:.2}% cap; the cap was applied",
            totals.subtotal_percentage, totals.cap_percentage
        ));
    }

    let mut value_after_discounts = totals.final_value;
    let floor_applied =
        !totals.full_scholarship_applied && value_after_discounts < rules.minimum_monthly_value;
    if floor_applied {
        value_after_discounts = rules.minimum_monthly_value;
        warnings.push(format!(
            "monthly value raised to the minimum of {:.2}",
            rules.minimum_monthly_value
        ));
    }

    let payment_method_percentage = rules.rate_for(request.payment_method);
    let payment_method_discount = value_after_discounts * payment_method_percentage / 100.0;
    let final_monthly_value = value_after_discounts - payment_method_discount;

    let with_documents = totals
        .counted_discounts()
        .filter(|line| line.requires_documents)
        .count();
    if with_documents > 0 {
        warnings.push(format!("{with_documents} discount(s) require supporting documents"));
    }

    let material_cost = request.material_cost.max(0.0);
    let plan = build_plan(
        final_monthly_value,
        material_cost,
        installments,
        due_day,
        request.reference_date,
    )?;
    let comparison = request
        .previous_monthly_value
        .map(|previous| compare_with_previous(final_monthly_value, previous));

    debug!(
        final_monthly_value,
        method = request.payment_method.as_slug(),
        installments,
        "financials calculated"
    );

    Ok(FinancialCalculation {
        base_value: totals.base_value,
        material_cost,
        discount_percentage: totals.applied_percentage,
        discount_value: totals.discount_value,
        value_after_discounts,
        floor_applied,
        payment_method: request.payment_method,
        payment_method_percentage,
        payment_method_discount,
        final_monthly_value,
        total_annual_value: plan.total_value,
        plan,
        comparison,
        approval_level: totals.approval_level,
        warnings,
    })
}

fn compare_with_previous(current: f64, previous: f64) -> YearComparison {
    let difference = current - previous;
    let percentage_change = if previous > 0.0 {
        difference / previous * 100.0
    } else {
        0.0
    };
    let status = if difference > 0.0 {
        ChangeStatus::Increase
    } else if difference < 0.0 {
        ChangeStatus::Decrease
    } else {
        ChangeStatus::Stable
    };
    YearComparison {
        previous_value: previous,
        current_value: current,
        difference,
        percentage_change,
        status,
    }
}

/// One calculation per configured payment method.
pub fn simulate_payment_scenarios(
    totals: &CalculatedTotals,
    request: &FinancialRequest,
    rules: &FinanceRules,
) -> Result<Vec<PaymentScenario>, FinanceError> {
    rules
        .payment_methods
        .iter()
        .map(|rate| {
            let request = FinancialRequest {
                payment_method: rate.method,
                ..request.clone()
            };
            calculate_financials(totals, &request, rules).map(|calculation| PaymentScenario {
                method: rate.clone(),
                calculation,
            })
        })
        .collect()
}

pub fn assess_viability(
    calculation: &FinancialCalculation,
    family_income: Option<f64>,
    rules: &FinanceRules,
) -> ViabilityReport {
    let mut reasons = Vec::new();
    let mut recommendations = Vec::new();

    if calculation.final_monthly_value < rules.minimum_monthly_value
        && calculation.discount_percentage < 100.0
    {
        reasons.push("monthly value is below the allowed minimum".to_string());
        recommendations.push("review the applied discounts".to_string());
    }

    if let Some(income) = family_income.filter(|income| *income > 0.0) {
        let share = calculation.final_monthly_value / income * 100.0;
        if share > INCOME_COMMITMENT_LIMIT {
            reasons.push(format!("tuition takes {share:.1}% of the family income"));
            recommendations.push(
                "consider a social scholarship or a special installment plan".to_string(),
            );
        }
    }

    if let Some(comparison) = &calculation.comparison {
        if comparison.percentage_change > YEARLY_INCREASE_LIMIT {
            reasons.push(format!(
                "{:.1}% increase over last year",
                comparison.percentage_change
            ));
            recommendations
                .push("negotiate additional discounts or review the chosen track".to_string());
        }
    }

    ViabilityReport {
        is_viable: reasons.is_empty(),
        reasons,
        recommendations,
    }
}

/// Plain-text digest for operators.
pub fn executive_summary(calculation: &FinancialCalculation) -> String {
    let mut lines = vec![
        format!("Base value: {:.2}", calculation.base_value),
        format!(
            "Discounts: {:.1}% ({:.2})",
            calculation.discount_percentage, calculation.discount_value
        ),
        format!(
            "Payment method: {} (-{:.2})",
            calculation.payment_method, calculation.payment_method_discount
        ),
        format!("Final value: {:.2}/month", calculation.final_monthly_value),
        format!("Annual total: {:.2}", calculation.total_annual_value),
    ];

    if let Some(comparison) = &calculation.comparison {
        let label = match comparison.status {
            ChangeStatus::Increase => "Increase",
            ChangeStatus::Decrease => "Decrease",
            ChangeStatus::Stable => "Stable",
        };
        lines.push(format!(
            "{label}: {:.1}% vs last year",
            comparison.percentage_change.abs()
        ));
    }

    lines.push(format!("Approval: {}", calculation.approval_level));

    if !calculation.warnings.is_empty() {
        lines.push("Warnings:".to_string());
        lines.extend(calculation.warnings.iter().map(|w| format!("  - {w}")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{assess_viability, calculate_financials, executive_summary, simulate_payment_scenarios};
    use crate::catalog::fallback::{static_discounts, static_tracks};
    use crate::catalog::DiscountLookup;
    use crate::finance::{ChangeStatus, FinanceError, FinanceRules, FinancialRequest, PaymentMethod};
    use crate::pricing::{calculate, CalculatedTotals, CalculationOptions};

    fn totals(codes: &[&str], base: f64) -> CalculatedTotals {
        let lookups: Vec<DiscountLookup> = codes
            .iter()
            .filter_map(|code| static_discounts().into_iter().find(|d| d.code == *code))
            .map(DiscountLookup::Found)
            .collect();
        let track = static_tracks().remove(2);
        calculate(Some(&track), &lookups, base, &CalculationOptions::default())
    }

    fn request(method: PaymentMethod) -> FinancialRequest {
        FinancialRequest {
            material_cost: 300.0,
            installments: None,
            payment_method: method,
            due_day: Some(10),
            reference_date: NaiveDate::from_ymd_opt(2026, 12, 1).expect("date"),
            previous_monthly_value: Some(800.0),
            family_income: None,
        }
    }

    #[test]
    fn payment_discount_after_cap() {
        let capped = totals(&["PBS", "COL"], 1000.0);
        assert_eq!(capped.applied_percentage, 60.0);
        let calc = calculate_financials(&capped, &request(PaymentMethod::Pix), &FinanceRules::default())
            .expect("financials");

        assert!((calc.value_after_discounts - 400.0).abs() < 1e-9);
        assert!((calc.final_monthly_value - 392.0).abs() < 1e-9);
        assert!((calc.total_annual_value - (392.0 * 12.0 + 300.0)).abs() < 1e-9);
        assert_eq!(calc.comparison.as_ref().map(|c| c.status), Some(ChangeStatus::Decrease));
        assert!(calc.warnings.iter().any(|w| w.contains("cap")));
        assert!(calc.warnings.iter().any(|w| w.contains("documents")));
    }

    #[test]
    fn floor_clamps_small_values() {
        let small = totals(&["IIR", "PBS"], 150.0);
        let calc = calculate_financials(&small, &request(PaymentMethod::Boleto), &FinanceRules::default())
            .expect("financials");
        assert!(calc.floor_applied);
        assert_eq!(calc.final_monthly_value, 100.0);
        assert!(calc.warnings.iter().any(|w| w.contains("minimum")));
    }

    #[test]
    fn full_scholarship_is_exempt_from_floor() {
        let full = totals(&["ABI"], 1000.0);
        let calc = calculate_financials(&full, &request(PaymentMethod::Boleto), &FinanceRules::default())
            .expect("financials");
        assert!(!calc.floor_applied);
        assert_eq!(calc.final_monthly_value, 0.0);
        let report = assess_viability(&calc, None, &FinanceRules::default());
        assert!(report.is_viable);
    }

    #[test]
    fn full_scholarship_over_cap_still_warns() {
        let full = totals(&["PASS", "IIR"], 1000.0);
        assert!(full.cap_applied);
        let calc = calculate_financials(&full, &request(PaymentMethod::Boleto), &FinanceRules::default())
            .expect("financials");
        assert!(calc.warnings.iter().any(|w| w.contains("cap was applied")));
        assert_eq!(calc.final_monthly_value, 0.0);
    }

    #[test]
    fn rejects_unknown_due_day() {
        let mut bad = request(PaymentMethod::Boleto);
        bad.due_day = Some(12);
        let result = calculate_financials(&totals(&[], 900.0), &bad, &FinanceRules::default());
        assert_eq!(result, Err(FinanceError::InvalidDueDay(12)));
    }

    #[test]
    fn scenarios_cover_every_method() {
        let base = totals(&["IIR"], 1000.0);
        let scenarios = simulate_payment_scenarios(&base, &request(PaymentMethod::Boleto), &FinanceRules::default())
            .expect("scenarios");
        assert_eq!(scenarios.len(), 5);
        let cash = scenarios
            .iter()
            .find(|s| s.method.method == PaymentMethod::Cash)
            .expect("cash scenario");
        assert!((cash.calculation.final_monthly_value - 873.0).abs() < 1e-9);
    }

    #[test]
    fn viability_flags_income_and_increase() {
        let base = totals(&[], 1000.0);
        let calc = calculate_financials(&base, &request(PaymentMethod::Boleto), &FinanceRules::default())
            .expect("financials");
        let report = assess_viability(&calc, Some(2500.0), &FinanceRules::default());
        assert!(!report.is_viable);
        assert_eq!(report.reasons.len(), 2);
        assert_eq!(report.recommendations.len(), 2);

        let summary = executive_summary(&calc);
        assert!(summary.contains("Final value: 1000.00/month"));
        assert!(summary.contains("Increase: 25.0% vs last year"));
    }
}
