pub mod analysis;
pub mod rules;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::normalize::{digits_only, normalize_code};

pub use analysis::{analyze_eligibility, eligibility_stats, evaluate_code, EligibilityCheck, EligibilityStats, RuleSource};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GeoCategory {
    HighIncome,
    LowIncome,
    OutsideServiceArea,
}

impl GeoCategory {
    pub const ALL: [GeoCategory; 3] = [
        GeoCategory::HighIncome,
        GeoCategory::LowIncome,
        GeoCategory::OutsideServiceArea,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::HighIncome => "high_income",
            Self::LowIncome => "low_income",
            Self::OutsideServiceArea => "outside_service_area",
        }
    }
}

impl Display for GeoCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::HighIncome => "High income",
            Self::LowIncome => "Low income",
            Self::OutsideServiceArea => "Outside service area",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown geographic category: {0}")]
pub struct CategoryParseError(pub String);

impl FromStr for GeoCategory {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "high_income" | "high" | "alta" => Ok(Self::HighIncome),
            "low_income" | "low" | "baixa" => Ok(Self::LowIncome),
            "outside_service_area" | "outside" | "fora" => Ok(Self::OutsideServiceArea),
            _ => Err(CategoryParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PostalRange {
    start: u32,
    end: u32,
    area: &'static str,
}

const HIGH_INCOME_RANGES: [PostalRange; 5] = [
    PostalRange { start: 37_701_000, end: 37_701_999, area: "Centro" },
    PostalRange { start: 37_702_000, end: 37_702_499, area: "Jardim dos Estados" },
    PostalRange { start: 37_702_500, end: 37_702_999, area: "Country Club" },
    PostalRange { start: 37_703_000, end: 37_703_499, area: "Vila Cruz" },
    PostalRange { start: 37_709_000, end: 37_719_999, area: "Other central neighborhoods" },
];

const LOW_INCOME_RANGES: [PostalRange; 5] = [
    PostalRange { start: 37_704_000, end: 37_704_999, area: "Regiao Sul" },
    PostalRange { start: 37_705_000, end: 37_705_999, area: "Sao Jose" },
    PostalRange { start: 37_706_000, end: 37_706_999, area: "Vila Nova" },
    PostalRange { start: 37_707_000, end: 37_707_999, area: "Kennedy" },
    PostalRange { start: 37_708_000, end: 37_708_999, area: "Zona Leste" },
];

/// Detailed classification of a postal code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub postal_code: String,
    pub category: GeoCategory,
    pub area: String,
    pub automatic_discounts: Vec<String>,
}

/// Maps an 8-digit postal code to its category. Anything else is unclassifiable.
pub fn classify(postal_code: &str) -> Option<GeoCategory> {
    classify_detailed(postal_code).map(|c| c.category)
}

pub fn classify_detailed(postal_code: &str) -> Option<Classification> {
    let digits = digits_only(postal_code);
    if digits.len() != 8 {
        return None;
    }
    let numeric = digits.parse::<u32>().ok()?;

    let (category, area) = if let Some(range) = find_range(&HIGH_INCOME_RANGES, numeric) {
        (GeoCategory::HighIncome, range.area)
    } else if let Some(range) = find_range(&LOW_INCOME_RANGES, numeric) {
        (GeoCategory::LowIncome, range.area)
    } else {
        (GeoCategory::OutsideServiceArea, "Outside the city")
    };

    Some(Classification {
        postal_code: digits,
        category,
        area: area.to_string(),
        automatic_discounts: automatic_discounts(Some(category))
            .iter()
            .map(|c| c.to_string())
            .collect(),
    })
}

/// Permissive when no category is known.
pub fn is_eligible(category: Option<GeoCategory>, code: &str) -> bool {
    let Some(category) = category else {
        return true;
    };
    rules::find_rule(&normalize_code(code))
        .map(|rule| rule.verdict(category).eligible)
        .unwrap_or(true)
}

pub fn restriction_reason(category: Option<GeoCategory>, code: &str) -> Option<&'static str> {
    let category = category?;
    let verdict = rules::find_rule(&normalize_code(code))?.verdict(category);
    if verdict.eligible {
        None
    } else {
        verdict.reason
    }
}

pub fn suggestion(category: Option<GeoCategory>, code: &str) -> Option<&'static str> {
    let category = category?;
    rules::find_rule(&normalize_code(code))?
        .verdict(category)
        .suggestion
}

pub fn automatic_discounts(category: Option<GeoCategory>) -> &'static [&'static str] {
    match category {
        Some(GeoCategory::LowIncome) => &["CEP5"],
        Some(GeoCategory::OutsideServiceArea) => &["RES", "CEP10"],
        Some(GeoCategory::HighIncome) | None => &[],
    }
}

/// Codes this category blocks.
pub fn blocked_discounts(category: GeoCategory) -> Vec<&'static str> {
    rules::CATEGORY_RULES
        .iter()
        .filter(|rule| !rule.verdict(category).eligible)
        .map(|rule| rule.code)
        .collect()
}

fn find_range(ranges: &[PostalRange], value: u32) -> Option<&PostalRange> {
    ranges
        .iter()
        .find(|range| value >= range.start && value <= range.end)
}

#[cfg(test)]
mod tests {
    use super::{
        automatic_discounts, blocked_discounts, classify, classify_detailed, is_eligible,
        restriction_reason, GeoCategory,
    };

    #[test]
    fn classifies_by_numeric_range() {
        assert_eq!(classify("37701-500"), Some(GeoCategory::HighIncome));
        assert_eq!(classify("37715000"), Some(GeoCategory::HighIncome));
        assert_eq!(classify("37706123"), Some(GeoCategory::LowIncome));
        assert_eq!(classify("01310-100"), Some(GeoCategory::OutsideServiceArea));
        assert_eq!(classify("37703500"), Some(GeoCategory::OutsideServiceArea));
    }

    #[test]
    fn rejects_non_eight_digit_input() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("3770412"), None);
        assert_eq!(classify("377041200"), None);
        assert_eq!(classify("abc"), None);
    }

    #[test]
    fn missing_category_is_permissive() {
        for code in ["RES", "CEP", "CEP5", "CEP10", "IIR"] {
            assert!(is_eligible(None, code));
            assert!(restriction_reason(None, code).is_none());
        }
    }

    #[test]
    fn residence_discount_only_outside() {
        assert!(is_eligible(Some(GeoCategory::OutsideServiceArea), "RES"));
        assert!(!is_eligible(Some(GeoCategory::HighIncome), "res"));
        assert!(!is_eligible(Some(GeoCategory::LowIncome), "RES"));
        let reason = restriction_reason(Some(GeoCategory::LowIncome), "RES").expect("reason");
        assert!(reason.contains("residents"));
    }

    #[test]
    fn low_income_partition() {
        let category = Some(GeoCategory::LowIncome);
        assert!(is_eligible(category, "CEP"));
        assert!(is_eligible(category, "CEP5"));
        assert!(!is_eligible(category, "CEP10"));
        assert_eq!(automatic_discounts(category), &["CEP5"]);
        let blocked = blocked_discounts(GeoCategory::LowIncome);
        assert!(blocked.contains(&"RES"));
        assert!(blocked.contains(&"CEP10"));
    }

    #[test]
    fn detailed_classification_lists_automatic_codes() {
        let detail = classify_detailed("13000-000").expect("classifiable");
        assert_eq!(detail.category, GeoCategory::OutsideServiceArea);
        assert_eq!(detail.automatic_discounts, vec!["RES", "CEP10"]);
        assert!(automatic_discounts(Some(GeoCategory::HighIncome)).is_empty());
    }

    #[test]
    fn unknown_codes_default_to_eligible() {
        assert!(is_eligible(Some(GeoCategory::HighIncome), "IIR"));
        assert!(restriction_reason(Some(GeoCategory::HighIncome), "IIR").is_none());
    }
}
