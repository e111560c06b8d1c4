pub mod analyzer;
pub mod rules;
pub mod validation;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use analyzer::{analyze, analyze_with, newly_available_discounts, selection_for_strategy};
pub use validation::{validate_discount_set, DiscountSetValidation};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Eligible,
    NeedsValidation,
    Ineligible,
}

impl MigrationStatus {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::NeedsValidation => "needs_validation",
            Self::Ineligible => "ineligible",
        }
    }
}

impl Display for MigrationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Eligible => "Eligible",
            Self::NeedsValidation => "Needs validation",
            Self::Ineligible => "Ineligible",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    InheritAll,
    InheritSelected,
    Hybrid,
    Manual,
}

impl MigrationStrategy {
    pub const ALL: [MigrationStrategy; 4] = [
        MigrationStrategy::InheritAll,
        MigrationStrategy::InheritSelected,
        MigrationStrategy::Hybrid,
        MigrationStrategy::Manual,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::InheritAll => "inherit_all",
            Self::InheritSelected => "inherit_selected",
            Self::Hybrid => "hybrid",
            Self::Manual => "manual",
        }
    }
}

impl Display for MigrationStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::InheritAll => "Inherit all",
            Self::InheritSelected => "Inherit selected",
            Self::Hybrid => "Hybrid",
            Self::Manual => "Manual",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown migration strategy: {0}")]
pub struct StrategyParseError(pub String);

impl FromStr for MigrationStrategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_slug() == normalized)
            .ok_or_else(|| StrategyParseError(s.to_string()))
    }
}

/// Student situation for the upcoming period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EligibilityContext {
    pub student_id: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub series_id: String,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub has_outstanding_debt: bool,
    /// Monthly value used for the impact projection.
    #[serde(default)]
    pub base_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequiredDocument {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountAnalysisResult {
    pub discount_id: String,
    pub code: String,
    pub name: String,
    pub previous_percentage: f64,
    pub status: MigrationStatus,
    pub can_keep: bool,
    pub requires_new_documents: bool,
    pub reason: Option<String>,
    pub validation_steps: Vec<String>,
    pub required_documents: Vec<RequiredDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MigrationSummary {
    pub total_previous_discounts: usize,
    pub eligible: usize,
    pub needs_validation: usize,
    pub ineligible: usize,
    pub new_discounts_available: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialImpact {
    pub base_value: f64,
    pub previous_percentage: f64,
    pub projected_percentage: f64,
    pub previous_monthly_value: f64,
    pub projected_monthly_value: f64,
    pub difference: f64,
    pub percentage_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationAnalysisComplete {
    pub discount_analysis: Vec<DiscountAnalysisResult>,
    pub summary: MigrationSummary,
    pub recommended_strategy: MigrationStrategy,
    pub financial_impact: FinancialImpact,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationRules {
    pub max_cumulative_percentage: f64,
    pub reference_base_value: f64,
    pub inherit_all_ratio: f64,
    pub inherit_selected_ratio: f64,
}

impl Default for MigrationRules {
    fn default() -> Self {
        Self {
            max_cumulative_percentage: 60.0,
            reference_base_value: 1000.0,
            inherit_all_ratio: 0.8,
            inherit_selected_ratio: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MigrationStrategy;

    #[test]
    fn strategy_parses_slugs() {
        for strategy in MigrationStrategy::ALL {
            let parsed: MigrationStrategy = strategy.as_slug().parse().expect("slug parses");
            assert_eq!(parsed, strategy);
        }
        let hyphenated: MigrationStrategy = "inherit-all".parse().expect("hyphen form");
        assert_eq!(hyphenated, MigrationStrategy::InheritAll);
        assert!("everything".parse::<MigrationStrategy>().is_err());
    }
}
