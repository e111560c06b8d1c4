pub mod engine;
pub mod installments;
pub mod late_fee;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ApprovalLevel;

pub use engine::{assess_viability, calculate_financials, executive_summary, simulate_payment_scenarios};
pub use installments::build_plan;
pub use late_fee::late_fees;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Boleto,
    Pix,
    CreditCard,
    DebitCard,
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Boleto,
        PaymentMethod::Pix,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::Cash,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Boleto => "boleto",
            Self::Pix => "pix",
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Cash => "cash",
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Boleto => "Bank slip",
            Self::Pix => "PIX",
            Self::CreditCard => "Credit card",
            Self::DebitCard => "Debit card",
            Self::Cash => "Cash",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown payment method: {0}")]
pub struct PaymentMethodParseError(pub String);

impl FromStr for PaymentMethod {
    type Err = PaymentMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "boleto" => Ok(Self::Boleto),
            "pix" => Ok(Self::Pix),
            "credit_card" | "credit" | "cartao_credito" => Ok(Self::CreditCard),
            "debit_card" | "debit" | "cartao_debito" => Ok(Self::DebitCard),
            "cash" | "dinheiro" => Ok(Self::Cash),
            _ => Err(PaymentMethodParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentMethodRate {
    pub method: PaymentMethod,
    pub name: String,
    /// Discount granted for paying this way, applied after the cap.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinanceRules {
    pub minimum_monthly_value: f64,
    pub late_fine_percentage: f64,
    pub daily_interest_percentage: f64,
    pub due_days: Vec<u32>,
    pub default_installments: u32,
    pub payment_methods: Vec<PaymentMethodRate>,
}

impl FinanceRules {
    pub fn rate_for(&self, method: PaymentMethod) -> f64 {
        self.payment_methods
            .iter()
            .find(|rate| rate.method == method)
            .map(|rate| rate.percentage)
            .unwrap_or(0.0)
    }
}

impl Default for FinanceRules {
    fn default() -> Self {
        let rate = |method: PaymentMethod, percentage: f64| PaymentMethodRate {
            method,
            name: method.to_string(),
            percentage,
        };
        Self {
            minimum_monthly_value: 100.0,
            late_fine_percentage: 2.0,
            daily_interest_percentage: 0.033,
            due_days: vec![5, 10, 15, 20, 25],
            default_installments: 12,
            payment_methods: vec![
                rate(PaymentMethod::Boleto, 0.0),
                rate(PaymentMethod::Pix, 2.0),
                rate(PaymentMethod::CreditCard, 0.0),
                rate(PaymentMethod::DebitCard, 1.0),
                rate(PaymentMethod::Cash, 3.0),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FinanceError {
    #[error("due day {0} is not one of the offered due days")]
    InvalidDueDay(u32),
    #[error("installment count must be at least one")]
    NoInstallments,
    #[error("due date out of range for installment {0}")]
    DateOutOfRange(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialRequest {
    #[serde(default)]
    pub material_cost: f64,
    #[serde(default)]
    pub installments: Option<u32>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub due_day: Option<u32>,
    pub reference_date: NaiveDate,
    #[serde(default)]
    pub previous_monthly_value: Option<f64>,
    #[serde(default)]
    pub family_income: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Installment {
    pub number: u32,
    pub due_date: NaiveDate,
    pub base_value: f64,
    pub additional_charges: f64,
    pub total_value: f64,
    pub status: InstallmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallmentPlan {
    pub count: u32,
    pub installments: Vec<Installment>,
    pub total_value: f64,
    pub average_installment_value: f64,
    pub first_installment_value: f64,
    pub regular_installment_value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Increase,
    Decrease,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearComparison {
    pub previous_value: f64,
    pub current_value: f64,
    pub difference: f64,
    pub percentage_change: f64,
    pub status: ChangeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialCalculation {
    pub base_value: f64,
    pub material_cost: f64,
    pub discount_percentage: f64,
    pub discount_value: f64,
    pub value_after_discounts: f64,
    pub floor_applied: bool,
    pub payment_method: PaymentMethod,
    pub payment_method_percentage: f64,
    pub payment_method_discount: f64,
    pub final_monthly_value: f64,
    pub total_annual_value: f64,
    pub plan: InstallmentPlan,
    pub comparison: Option<YearComparison>,
    pub approval_level: ApprovalLevel,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LateFees {
    pub days_late: i64,
    pub fine_amount: f64,
    pub interest_amount: f64,
    pub total_penalty: f64,
    pub total_with_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViabilityReport {
    pub is_viable: bool,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentScenario {
    pub method: PaymentMethodRate,
    pub calculation: FinancialCalculation,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Boleto
}

#[cfg(test)]
mod tests {
    use super::{FinanceRules, PaymentMethod};

    #[test]
    fn payment_method_aliases() {
        let parsed: PaymentMethod = "cartao_debito".parse().expect("alias parses");
        assert_eq!(parsed, PaymentMethod::DebitCard);
        let parsed: PaymentMethod = "Credit-Card".parse().expect("hyphen parses");
        assert_eq!(parsed, PaymentMethod::CreditCard);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn default_rates() {
        let rules = FinanceRules::default();
        assert_eq!(rules.rate_for(PaymentMethod::Pix), 2.0);
        assert_eq!(rules.rate_for(PaymentMethod::Cash), 3.0);
        assert_eq!(rules.rate_for(PaymentMethod::Boleto), 0.0);
        assert_eq!(rules.payment_methods.len(), PaymentMethod::ALL.len());
    }
}
