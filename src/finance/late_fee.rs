use chrono::NaiveDate;

use crate::finance::{FinanceRules, LateFees};

/// Interest stops compounding after ten years of arrears.
pub const MAX_INTEREST_DAYS: i64 = 3650;

/// Flat fine plus daily compound interest. Nothing is owed when paid on or
/// before the due date.
pub fn late_fees(value: f64, due_date: NaiveDate, paid_on: NaiveDate, rules: &FinanceRules) -> LateFees {
    let days_late = (paid_on - due_date).num_days();
    if days_late <= 0 {
        return LateFees {
            days_late: 0,
            fine_amount: 0.0,
            interest_amount: 0.0,
            total_penalty: 0.0,
            total_with_penalty: value,
        };
    }

    let fine_amount = value * rules.late_fine_percentage / 100.0;
    let daily_rate = rules.daily_interest_percentage / 100.0;
    let exponent = i32::try_from(days_late.min(MAX_INTEREST_DAYS)).unwrap_or(0);
    let interest_amount = value * ((1.0 + daily_rate).powi(exponent) - 1.0);
    let total_penalty = fine_amount + interest_amount;

    LateFees {
        days_late,
        fine_amount,
        interest_amount,
        total_penalty,
        total_with_penalty: value + total_penalty,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{late_fees, MAX_INTEREST_DAYS};
    use crate::finance::FinanceRules;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn on_time_payment_owes_nothing() {
        let fees = late_fees(800.0, date(2026, 3, 10), date(2026, 3, 10), &FinanceRules::default());
        assert_eq!(fees.total_penalty, 0.0);
        assert_eq!(fees.total_with_penalty, 800.0);
        let early = late_fees(800.0, date(2026, 3, 10), date(2026, 3, 2), &FinanceRules::default());
        assert_eq!(early.days_late, 0);
    }

    #[test]
    fn thirty_days_late() {
        let fees = late_fees(1000.0, date(2026, 3, 10), date(2026, 4, 9), &FinanceRules::default());
        assert_eq!(fees.days_late, 30);
        assert!((fees.fine_amount - 20.0).abs() < 1e-9);
        let expected_interest = 1000.0 * (1.00033_f64.powi(30) - 1.0);
        assert!((fees.interest_amount - expected_interest).abs() < 1e-9);
        assert!(fees.interest_amount > 9.9 && fees.interest_amount < 10.0);
    }

    #[test]
    fn interest_stops_compounding_at_the_limit() {
        let rules = FinanceRules::default();
        let extreme = late_fees(1000.0, date(1900, 1, 1), date(2200, 1, 1), &rules);
        assert!(extreme.days_late > MAX_INTEREST_DAYS);
        assert!(extreme.total_penalty.is_finite());

        let capped_interest = 1000.0 * (1.00033_f64.powi(MAX_INTEREST_DAYS as i32) - 1.0);
        assert!((extreme.interest_amount - capped_interest).abs() < 1e-6);
    }
}
