use tracing::debug;

use crate::catalog::{Discount, DiscountSelection};
use crate::geo::{self, GeoCategory};
use crate::migration::rules::carry_over;
use crate::migration::{
    DiscountAnalysisResult, DocumentStatus, EligibilityContext, FinancialImpact,
    MigrationAnalysisComplete, MigrationRules, MigrationStatus, MigrationStrategy,
    MigrationSummary, RequiredDocument,
};

/// Code granted to students with no outstanding debts.
pub const PUNCTUALITY_CODE: &str = "ADIM2";

pub fn analyze(previous: &[DiscountSelection], context: &EligibilityContext) -> MigrationAnalysisComplete {
    analyze_with(&MigrationRules::default(), previous, context)
}

/// Classifies every prior discount against the current context. Pure and
/// deterministic for a given input pair.
pub fn analyze_with(
    rules: &MigrationRules,
    previous: &[DiscountSelection],
    context: &EligibilityContext,
) -> MigrationAnalysisComplete {
    let category = current_category(context);
    let discount_analysis: Vec<DiscountAnalysisResult> = previous
        .iter()
        .map(|selection| analyze_discount(selection, category))
        .collect();

    let mut warnings: Vec<String> = discount_analysis
        .iter()
        .filter(|result| !result.can_keep)
        .filter_map(|result| {
            result
                .reason
                .as_ref()
                .map(|reason| format!("{}: {reason}", result.name))
        })
        .collect();
    if context.has_outstanding_debt {
        warnings.push(
            "student has outstanding debts; settle them before confirming discounts".to_string(),
        );
    }

    let summary = summarize(&discount_analysis);
    let recommended_strategy = recommend_strategy(rules, &summary);
    let financial_impact = financial_impact(rules, previous, &discount_analysis, context);
    debug!(
        student_id = %context.student_id,
        strategy = recommended_strategy.as_slug(),
        eligible = summary.eligible,
        ineligible = summary.ineligible,
        "migration analyzed"
    );

    MigrationAnalysisComplete {
        discount_analysis,
        summary,
        recommended_strategy,
        financial_impact,
        warnings,
    }
}

fn current_category(context: &EligibilityContext) -> Option<GeoCategory> {
    context.postal_code.as_deref().and_then(geo::classify)
}

fn analyze_discount(selection: &DiscountSelection, category: Option<GeoCategory>) -> DiscountAnalysisResult {
    let code = selection.discount_code.trim().to_ascii_uppercase();
    let verdict = carry_over(&code, category);
    let required_documents = verdict
        .documents
        .iter()
        .enumerate()
        .map(|(index, name)| RequiredDocument {
            id: format!("doc_{code}_{index}"),
            name: name.clone(),
            status: DocumentStatus::Pending,
        })
        .collect();

    DiscountAnalysisResult {
        discount_id: selection.discount_id.clone(),
        name: selection.display_name(),
        code,
        previous_percentage: selection.percentage,
        status: verdict.status,
        can_keep: verdict.status == MigrationStatus::Eligible,
        requires_new_documents: verdict.status == MigrationStatus::NeedsValidation,
        reason: verdict.reason,
        validation_steps: verdict.validation_steps,
        required_documents,
    }
}

fn summarize(results: &[DiscountAnalysisResult]) -> MigrationSummary {
    let count = |status: MigrationStatus| results.iter().filter(|r| r.status == status).count();
    MigrationSummary {
        total_previous_discounts: results.len(),
        eligible: count(MigrationStatus::Eligible),
        needs_validation: count(MigrationStatus::NeedsValidation),
        ineligible: count(MigrationStatus::Ineligible),
        new_discounts_available: 0,
    }
}

fn recommend_strategy(rules: &MigrationRules, summary: &MigrationSummary) -> MigrationStrategy {
    if summary.total_previous_discounts == 0 {
        return MigrationStrategy::Manual;
    }
    let keep_ratio = summary.eligible as f64 / summary.total_previous_discounts as f64;
    if keep_ratio >= rules.inherit_all_ratio {
        MigrationStrategy::InheritAll
    } else if keep_ratio >= rules.inherit_selected_ratio {
        MigrationStrategy::InheritSelected
    } else if summary.needs_validation > summary.eligible {
        MigrationStrategy::Hybrid
    } else {
        MigrationStrategy::Manual
    }
}

fn financial_impact(
    rules: &MigrationRules,
    previous: &[DiscountSelection],
    results: &[DiscountAnalysisResult],
    context: &EligibilityContext,
) -> FinancialImpact {
    let base_value = context
        .base_value
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(rules.reference_base_value);
    let ceiling = rules.max_cumulative_percentage;

    let previous_percentage = previous
        .iter()
        .map(|selection| selection.percentage.max(0.0))
        .sum::<f64>()
        .min(ceiling);
    let projected_percentage = results
        .iter()
        .filter(|result| result.can_keep)
        .map(|result| result.previous_percentage.max(0.0))
        .sum::<f64>()
        .min(ceiling);

    let previous_monthly_value = base_value * (1.0 - previous_percentage / 100.0);
    let projected_monthly_value = base_value * (1.0 - projected_percentage / 100.0);
    let difference = projected_monthly_value - previous_monthly_value;
    let percentage_change = if previous_monthly_value == 0.0 {
        0.0
    } else {
        difference / previous_monthly_value * 100.0
    };

    FinancialImpact {
        base_value,
        previous_percentage,
        projected_percentage,
        previous_monthly_value,
        projected_monthly_value,
        difference,
        percentage_change,
    }
}

/// Codes the student qualifies for now but does not hold yet, priced from
/// the given catalog.
pub fn newly_available_discounts(
    context: &EligibilityContext,
    current_codes: &[String],
    catalog: &[Discount],
) -> Vec<DiscountSelection> {
    let mut candidates: Vec<&str> = geo::automatic_discounts(current_category(context)).to_vec();
    if !context.has_outstanding_debt {
        candidates.push(PUNCTUALITY_CODE);
    }

    candidates
        .into_iter()
        .filter(|code| !current_codes.iter().any(|held| held.eq_ignore_ascii_case(code)))
        .filter_map(|code| {
            catalog
                .iter()
                .find(|discount| discount.active && discount.code.eq_ignore_ascii_case(code))
        })
        .map(DiscountSelection::from_discount)
        .collect()
}

/// Selection an operator gets when explicitly applying `strategy`.
pub fn selection_for_strategy(
    analysis: &MigrationAnalysisComplete,
    strategy: MigrationStrategy,
) -> Vec<DiscountSelection> {
    let keep = |result: &&DiscountAnalysisResult| match strategy {
        MigrationStrategy::InheritAll => result.can_keep,
        MigrationStrategy::InheritSelected => result.can_keep && !result.requires_new_documents,
        MigrationStrategy::Hybrid => result.status != MigrationStatus::Ineligible,
        MigrationStrategy::Manual => false,
    };

    analysis
        .discount_analysis
        .iter()
        .filter(keep)
        .map(|result| DiscountSelection {
            discount_id: result.discount_id.clone(),
            discount_code: result.code.clone(),
            percentage: result.previous_percentage,
            requires_documents: result.requires_new_documents,
            discount_name: Some(result.name.clone()),
            category: None,
        })
        .collect()
}
