use chrono::{Datelike, Months, NaiveDate};

use crate::finance::{FinanceError, Installment, InstallmentPlan, InstallmentStatus};

/// Equal monthly installments; the material cost rides on the first one.
/// Installment `i` (1-based) falls `i` months after the reference date.
pub fn build_plan(
    monthly_value: f64,
    material_cost: f64,
    count: u32,
    due_day: u32,
    reference_date: NaiveDate,
) -> Result<InstallmentPlan, FinanceError> {
    if count == 0 {
        return Err(FinanceError::NoInstallments);
    }

    let mut installments = Vec::with_capacity(count as usize);
    for number in 1..=count {
        let due_date = reference_date
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(number)))
            .and_then(|month| month.with_day(due_day))
            .ok_or(FinanceError::DateOutOfRange(number))?;
        let additional_charges = if number == 1 { material_cost } else { 0.0 };
        installments.push(Installment {
            number,
            due_date,
            base_value: monthly_value,
            additional_charges,
            total_value: monthly_value + additional_charges,
            status: InstallmentStatus::Pending,
        });
    }

    let total_value = monthly_value * count as f64 + material_cost;
    Ok(InstallmentPlan {
        count,
        installments,
        total_value,
        average_installment_value: total_value / count as f64,
        first_installment_value: monthly_value + material_cost,
        regular_installment_value: monthly_value,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::build_plan;
    use crate::finance::FinanceError;

    #[test]
    fn material_only_in_first_installment() {
        let reference = NaiveDate::from_ymd_opt(2026, 11, 30).expect("date");
        let plan = build_plan(500.0, 240.0, 12, 10, reference).expect("plan");

        assert_eq!(plan.installments.len(), 12);
        assert_eq!(plan.first_installment_value, 740.0);
        assert_eq!(plan.installments[1].total_value, 500.0);
        assert_eq!(plan.total_value, 6240.0);
        assert_eq!(
            plan.installments[0].due_date,
            NaiveDate::from_ymd_opt(2026, 12, 10).expect("date")
        );
        assert_eq!(
            plan.installments[2].due_date,
            NaiveDate::from_ymd_opt(2027, 2, 10).expect("date")
        );
    }

    #[test]
    fn zero_installments_rejected() {
        let reference = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
        assert_eq!(
            build_plan(500.0, 0.0, 0, 5, reference),
            Err(FinanceError::NoInstallments)
        );
    }
}
