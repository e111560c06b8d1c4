use anyhow::Result;

use crate::catalog::Discount;
use crate::finance::FinancialCalculation;
use crate::migration::MigrationAnalysisComplete;
use crate::pricing::scenarios::ScenarioComparison;
use crate::pricing::CalculatedTotals;

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn totals_to_csv(totals: &CalculatedTotals) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "discount_id",
        "code",
        "original_percentage",
        "applied_percentage",
        "discount_value",
        "status",
        "status_reason",
    ])?;
    for line in &totals.discounts {
        writer.write_record([
            line.discount_id.clone(),
            line.code.clone(),
            format!("{:.4}", line.original_percentage),
            format!("{:.4}", line.applied_percentage),
            format!("{:.2}", line.discount_value),
            format!("{:?}", line.status).to_lowercase(),
            line.status_reason
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
        ])?;
    }
    finish(writer)
}

pub fn migration_to_csv(analysis: &MigrationAnalysisComplete) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "code",
        "previous_percentage",
        "status",
        "can_keep",
        "requires_new_documents",
        "reason",
    ])?;
    for result in &analysis.discount_analysis {
        writer.write_record([
            result.code.clone(),
            format!("{:.2}", result.previous_percentage),
            result.status.as_slug().to_string(),
            result.can_keep.to_string(),
            result.requires_new_documents.to_string(),
            result.reason.clone().unwrap_or_default(),
        ])?;
    }
    finish(writer)
}

pub fn installments_to_csv(calculation: &FinancialCalculation) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["number", "due_date", "base_value", "additional_charges", "total_value"])?;
    for installment in &calculation.plan.installments {
        writer.write_record([
            installment.number.to_string(),
            installment.due_date.to_string(),
            format!("{:.2}", installment.base_value),
            format!("{:.2}", installment.additional_charges),
            format!("{:.2}", installment.total_value),
        ])?;
    }
    finish(writer)
}

pub fn scenarios_to_csv(comparison: &ScenarioComparison) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["scenario", "track", "applied_percentage", "final_value", "delta", "valid"])?;
    for outcome in &comparison.outcomes {
        writer.write_record([
            outcome.name.clone(),
            outcome.totals.metadata.track_used.clone(),
            format!("{:.2}", outcome.totals.applied_percentage),
            format!("{:.2}", outcome.totals.final_value),
            format!("{:.2}", outcome.delta_from_first),
            outcome.totals.is_valid().to_string(),
        ])?;
    }
    finish(writer)
}

pub fn discounts_to_csv(discounts: &[Discount]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["id", "code", "name", "category", "percentage", "approval_level", "active"])?;
    for discount in discounts {
        writer.write_record([
            discount.id.clone(),
            discount.code.clone(),
            discount.name.clone(),
            discount.category.clone(),
            format!("{:.2}", discount.effective_percentage),
            discount.approval_level.as_slug().to_string(),
            discount.active.to_string(),
        ])?;
    }
    finish(writer)
}
