use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::catalog::{Discount, Track};
use crate::finance::{FinancialCalculation, LateFees, PaymentScenario};
use crate::geo::EligibilityCheck;
use crate::migration::{MigrationAnalysisComplete, MigrationStatus};
use crate::output::{money, percent};
use crate::pricing::scenarios::ScenarioComparison;
use crate::pricing::{CalculatedTotals, DiscountStatus};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(status: DiscountStatus) -> Cell {
    match status {
        DiscountStatus::Eligible => Cell::new("eligible").fg(Color::Green),
        DiscountStatus::Conditional => Cell::new("conditional").fg(Color::Yellow),
        DiscountStatus::Blocked => Cell::new("blocked").fg(Color::Red),
    }
}

pub fn render_totals_table(totals: &CalculatedTotals) -> String {
    let mut lines = new_table();
    lines.set_header(vec![
        "Code", "Name", "Original", "Applied", "Value", "Status", "Reason", "Approval",
    ]);
    for line in &totals.discounts {
        lines.add_row(Row::from(vec![
            Cell::new(&line.code),
            Cell::new(&line.name),
            Cell::new(percent(line.original_percentage)),
            Cell::new(percent(line.applied_percentage)),
            Cell::new(money(line.discount_value)),
            status_cell(line.status),
            Cell::new(line.status_reason.map(|r| r.as_str()).unwrap_or("-")),
            Cell::new(line.approval_level.to_string()),
        ]));
    }

    let mut summary = new_table();
    summary.set_header(vec!["Field", "Value"]);
    let cap = if totals.cap_applied {
        Cell::new(format!("{} (applied)", percent(totals.cap_percentage))).fg(Color::Yellow)
    } else {
        Cell::new(percent(totals.cap_percentage))
    };
    summary.add_row(vec![Cell::new("Track"), Cell::new(&totals.track.name)]);
    summary.add_row(vec![Cell::new("Base value"), Cell::new(money(totals.base_value))]);
    summary.add_row(vec![Cell::new("Subtotal"), Cell::new(percent(totals.subtotal_percentage))]);
    summary.add_row(vec![Cell::new("Cap"), cap]);
    summary.add_row(vec![Cell::new("Applied"), Cell::new(percent(totals.applied_percentage))]);
    summary.add_row(vec![Cell::new("Discount value"), Cell::new(money(totals.discount_value))]);
    summary.add_row(vec![Cell::new("Final value"), Cell::new(money(totals.final_value))]);
    summary.add_row(vec![Cell::new("Annual savings"), Cell::new(money(totals.annual_savings))]);
    summary.add_row(vec![Cell::new("Approval"), Cell::new(totals.approval_level.to_string())]);
    let valid = if totals.is_valid() {
        Cell::new("YES").fg(Color::Green)
    } else {
        Cell::new("NO").fg(Color::Red)
    };
    summary.add_row(vec![Cell::new("Valid"), valid]);
    for error in &totals.validation.errors {
        summary.add_row(vec![Cell::new("Error").fg(Color::Red), Cell::new(error)]);
    }
    for warning in &totals.validation.warnings {
        summary.add_row(vec![Cell::new("Warning").fg(Color::Yellow), Cell::new(warning)]);
    }
    for case in &totals.critical_edge_cases {
        summary.add_row(vec![Cell::new("Critical").fg(Color::Red), Cell::new(&case.detail)]);
    }

    format!("{lines}\n{summary}")
}

pub fn render_eligibility_table(checks: &[EligibilityCheck]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Code", "Eligible", "Rule", "Reason", "Suggestion"]);
    for check in checks {
        let eligible = if check.eligible {
            Cell::new("YES").fg(Color::Green)
        } else {
            Cell::new("NO").fg(Color::Red)
        };
        table.add_row(Row::from(vec![
            Cell::new(&check.code),
            eligible,
            Cell::new(format!("{:?}", check.rule_applied)),
            Cell::new(check.reason.as_deref().unwrap_or("-")),
            Cell::new(check.suggestion.as_deref().unwrap_or("-")),
        ]));
    }
    table.to_string()
}

pub fn render_migration_table(analysis: &MigrationAnalysisComplete) -> String {
    let mut table = new_table();
    table.set_header(vec!["Code", "Name", "Previous", "Status", "Reason", "Documents"]);
    for result in &analysis.discount_analysis {
        let status = match result.status {
            MigrationStatus::Eligible => Cell::new(result.status.to_string()).fg(Color::Green),
            MigrationStatus::NeedsValidation => {
                Cell::new(result.status.to_string()).fg(Color::Yellow)
            }
            MigrationStatus::Ineligible => Cell::new(result.status.to_string()).fg(Color::Red),
        };
        let documents = result
            .required_documents
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(Row::from(vec![
            Cell::new(&result.code),
            Cell::new(&result.name),
            Cell::new(percent(result.previous_percentage)),
            status,
            Cell::new(result.reason.as_deref().unwrap_or("-")),
            Cell::new(if documents.is_empty() { "-".to_string() } else { documents }),
        ]));
    }

    let impact = &analysis.financial_impact;
    let mut footer = format!(
        "Strategy: {}\nPrevious monthly: {}  Projected: {}  Change: {:+.2} ({:+.1}%)",
        analysis.recommended_strategy,
        money(impact.previous_monthly_value),
        money(impact.projected_monthly_value),
        impact.difference,
        impact.percentage_change
    );
    for warning in &analysis.warnings {
        footer.push_str(&format!("\n! {warning}"));
    }
    format!("{table}\n{footer}")
}

pub fn render_financial_table(calculation: &FinancialCalculation) -> String {
    let mut table = new_table();
    table.set_header(vec!["#", "Due date", "Base", "Charges", "Total"]);
    for installment in &calculation.plan.installments {
        table.add_row(Row::from(vec![
            Cell::new(installment.number),
            Cell::new(installment.due_date.format("%Y-%m-%d").to_string()),
            Cell::new(money(installment.base_value)),
            Cell::new(money(installment.additional_charges)),
            Cell::new(money(installment.total_value)),
        ]));
    }
    format!("{table}\n{}", crate::finance::executive_summary(calculation))
}

pub fn render_payment_scenarios_table(scenarios: &[PaymentScenario]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Method", "Method discount", "Monthly", "Annual"]);
    for scenario in scenarios {
        table.add_row(Row::from(vec![
            Cell::new(&scenario.method.name),
            Cell::new(percent(scenario.method.percentage)),
            Cell::new(money(scenario.calculation.final_monthly_value)),
            Cell::new(money(scenario.calculation.total_annual_value)),
        ]));
    }
    table.to_string()
}

pub fn render_late_fees_table(fees: &LateFees) -> String {
    let mut table = new_table();
    table.set_header(vec!["Days late", "Fine", "Interest", "Penalty", "Total"]);
    table.add_row(Row::from(vec![
        Cell::new(fees.days_late),
        Cell::new(money(fees.fine_amount)),
        Cell::new(money(fees.interest_amount)),
        Cell::new(money(fees.total_penalty)),
        Cell::new(money(fees.total_with_penalty)),
    ]));
    table.to_string()
}

pub fn render_scenarios_table(comparison: &ScenarioComparison) -> String {
    let mut table = new_table();
    table.set_header(vec!["Scenario", "Track", "Applied", "Final", "Delta", "Valid"]);
    for outcome in &comparison.outcomes {
        let name = if comparison.lowest_final_value.as_deref() == Some(outcome.name.as_str()) {
            Cell::new(format!("{} *", outcome.name)).fg(Color::Green)
        } else {
            Cell::new(&outcome.name)
        };
        table.add_row(Row::from(vec![
            name,
            Cell::new(&outcome.totals.metadata.track_used),
            Cell::new(percent(outcome.totals.applied_percentage)),
            Cell::new(money(outcome.totals.final_value)),
            Cell::new(format!("{:+.2}", outcome.delta_from_first)),
            Cell::new(if outcome.totals.is_valid() { "YES" } else { "NO" }),
        ]));
    }
    table.to_string()
}

pub fn render_tracks_table(tracks: &[Track]) -> String {
    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Cap", "Full scholarship", "Combination", "Excluded"]);
    for track in tracks {
        table.add_row(Row::from(vec![
            Cell::new(&track.id),
            Cell::new(&track.name),
            Cell::new(
                track
                    .cap_percentage
                    .map(percent)
                    .unwrap_or_else(|| "unlimited".to_string()),
            ),
            Cell::new(if track.config.allows_full_scholarship { "yes" } else { "no" }),
            Cell::new(if track.config.allows_discount_combination { "yes" } else { "no" }),
            Cell::new(track.restrictions.excluded_discount_codes.join(", ")),
        ]));
    }
    table.to_string()
}

pub fn render_discounts_table(discounts: &[Discount]) -> String {
    let mut table = new_table();
    table.set_header(vec!["ID", "Code", "Name", "Category", "Percentage", "Approval", "Active"]);
    for discount in discounts {
        let percentage = match discount.max_percentage {
            Some(max) => format!("up to {}", percent(max)),
            None => percent(discount.effective_percentage),
        };
        let active = if discount.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Red)
        };
        table.add_row(Row::from(vec![
            Cell::new(&discount.id),
            Cell::new(&discount.code),
            Cell::new(&discount.name),
            Cell::new(&discount.category),
            Cell::new(percentage),
            Cell::new(discount.approval_level.to_string()),
            active,
        ]));
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::{render_discounts_table, render_totals_table, render_tracks_table};
    use crate::catalog::fallback::{static_discounts, static_tracks};
    use crate::catalog::DiscountLookup;
    use crate::pricing::{calculate, CalculationOptions};

    #[test]
    fn totals_table_lists_lines_and_summary() {
        let lookups: Vec<DiscountLookup> = static_discounts()
            .into_iter()
            .take(2)
            .map(DiscountLookup::Found)
            .collect();
        let totals = calculate(None, &lookups, 1000.0, &CalculationOptions::default());
        let rendered = render_totals_table(&totals);
        assert!(rendered.contains("IIR"));
        assert!(rendered.contains("Final value"));
        assert!(rendered.contains("700.00"));
    }

    #[test]
    fn catalog_tables_render() {
        let tracks = render_tracks_table(&static_tracks());
        assert!(tracks.contains("unlimited"));
        let discounts = render_discounts_table(&static_discounts());
        assert!(discounts.contains("COM_EXTRA"));
        assert!(discounts.contains("up to 20.00%"));
    }
}
