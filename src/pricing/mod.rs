pub mod calculator;
pub mod invariants;
pub mod scenarios;
pub mod session;
pub mod validation;

use serde::{Deserialize, Serialize};

use crate::catalog::ApprovalLevel;

pub use calculator::{calculate, calculate_with};
pub use invariants::{check_invariants, detect_edge_cases, InvariantViolation};
pub use session::{calculate_by_ids, CalculationInput, PricingSession};

pub const CALCULATION_VERSION: &str = "2.0.0";
pub const BASE_VALUE_ERROR: &str = "base value must be greater than zero";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CalculationOptions {
    #[serde(default)]
    pub include_inactive_discounts: bool,
    #[serde(default = "default_true")]
    pub validate_documentation: bool,
    #[serde(default = "default_true")]
    pub apply_cap_automatically: bool,
    #[serde(default = "default_true")]
    pub consider_special_rules: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            include_inactive_discounts: false,
            validate_documentation: true,
            apply_cap_automatically: true,
            consider_special_rules: true,
        }
    }
}

/// Engine-wide constants. Tolerances are in percentage points and currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingRules {
    pub default_cap_percentage: f64,
    pub default_automatic_threshold: f64,
    pub coordination_ceiling: f64,
    pub percentage_tolerance: f64,
    pub currency_tolerance: f64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            default_cap_percentage: 60.0,
            default_automatic_threshold: 20.0,
            coordination_ceiling: 50.0,
            percentage_tolerance: 0.01,
            currency_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountStatus {
    Eligible,
    Blocked,
    Conditional,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    Inactive,
    ExcludedByTrack,
    DiscountNotFound,
    RequiresApproval,
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::ExcludedByTrack => "excluded_by_track",
            Self::DiscountNotFound => "discount_not_found",
            Self::RequiresApproval => "requires_approval",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountBreakdown {
    pub discount_id: String,
    pub code: String,
    pub name: String,
    pub original_percentage: f64,
    pub applied_percentage: f64,
    pub discount_value: f64,
    pub status: DiscountStatus,
    pub status_reason: Option<StatusReason>,
    pub requires_documents: bool,
    pub pending_documents: Vec<String>,
    pub approval_level: ApprovalLevel,
}

impl DiscountBreakdown {
    pub fn counts(&self) -> bool {
        self.status != DiscountStatus::Blocked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackSummary {
    pub id: String,
    pub name: String,
    pub cap_percentage: f64,
    pub allows_full_scholarship: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CalculationStatistics {
    pub discount_count: usize,
    pub max_individual_percentage: f64,
    pub min_individual_percentage: f64,
    pub savings_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationMetadata {
    pub version: String,
    pub track_used: String,
    pub discount_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCaseKind {
    NegativeFinalValue,
    PercentageOutOfRange,
    DiscountValueMismatch,
    RedistributionMismatch,
}

impl EdgeCaseKind {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::NegativeFinalValue => "negative_final_value",
            Self::PercentageOutOfRange => "percentage_out_of_range",
            Self::DiscountValueMismatch => "discount_value_mismatch",
            Self::RedistributionMismatch => "redistribution_mismatch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticalEdgeCase {
    pub kind: EdgeCaseKind,
    pub detail: String,
}

/// Output of one totals computation. Always recomputed from scratch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculatedTotals {
    pub base_value: f64,
    pub subtotal_percentage: f64,
    pub applied_percentage: f64,
    pub cap_percentage: f64,
    pub cap_applied: bool,
    pub full_scholarship_applied: bool,
    pub discount_value: f64,
    pub final_value: f64,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub discounts: Vec<DiscountBreakdown>,
    pub track: TrackSummary,
    pub validation: ValidationReport,
    pub approval_level: ApprovalLevel,
    pub statistics: CalculationStatistics,
    pub critical_edge_cases: Vec<CriticalEdgeCase>,
    pub metadata: CalculationMetadata,
}

impl CalculatedTotals {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }

    pub fn counted_discounts(&self) -> impl Iterator<Item = &DiscountBreakdown> {
        self.discounts.iter().filter(|d| d.counts())
    }

    pub fn blocked_discounts(&self) -> impl Iterator<Item = &DiscountBreakdown> {
        self.discounts.iter().filter(|d| !d.counts())
    }
}

fn default_true() -> bool {
    true
}
