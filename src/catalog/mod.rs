pub mod fallback;
pub mod normalize;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codes whose 100% variant is a categorical full scholarship.
pub const FULL_SCHOLARSHIP_CODES: [&str; 2] = ["ABI", "PASS"];

/// Codes that are always available on the special track.
pub const SPECIAL_DISCOUNT_CODES: [&str; 6] = ["ABI", "ABP", "PASS", "PBS", "COL", "SAE"];

pub const SPECIAL_TRACK_ID: &str = "A";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Automatic,
    Coordination,
    Direction,
}

impl ApprovalLevel {
    pub const ALL: [ApprovalLevel; 3] = [
        ApprovalLevel::Automatic,
        ApprovalLevel::Coordination,
        ApprovalLevel::Direction,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Coordination => "coordination",
            Self::Direction => "direction",
        }
    }

    /// Tiered sign-off for an aggregate percentage.
    pub fn for_percentage(percentage: f64, automatic_threshold: f64, coordination_ceiling: f64) -> Self {
        if percentage <= automatic_threshold {
            Self::Automatic
        } else if percentage <= coordination_ceiling {
            Self::Coordination
        } else {
            Self::Direction
        }
    }
}

impl Display for ApprovalLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Automatic => "Automatic",
            Self::Coordination => "Coordination",
            Self::Direction => "Direction",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown approval level: {0}")]
pub struct ApprovalLevelParseError(pub String);

impl FromStr for ApprovalLevel {
    type Err = ApprovalLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "automatic" | "automatica" | "auto" => Ok(Self::Automatic),
            "coordination" | "coordenacao" => Ok(Self::Coordination),
            "direction" | "direcao" => Ok(Self::Direction),
            _ => Err(ApprovalLevelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackConfig {
    pub allows_full_scholarship: bool,
    pub allows_discount_combination: bool,
    pub automatic_approval_threshold: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            allows_full_scholarship: true,
            allows_discount_combination: true,
            automatic_approval_threshold: normalize::DEFAULT_AUTOMATIC_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrackRestrictions {
    #[serde(default)]
    pub excluded_discount_codes: Vec<String>,
    #[serde(default)]
    pub required_discount_codes: Vec<String>,
    #[serde(default)]
    pub minimum_base_value: Option<f64>,
}

/// A pricing tier. `cap_percentage = None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub cap_percentage: Option<f64>,
    pub conditions: Vec<String>,
    pub priority: u32,
    pub config: TrackConfig,
    pub restrictions: TrackRestrictions,
    pub active: bool,
}

impl Track {
    pub fn effective_cap(&self) -> f64 {
        self.cap_percentage.unwrap_or(100.0)
    }

    pub fn excludes(&self, code: &str) -> bool {
        self.restrictions
            .excluded_discount_codes
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(code))
    }

    pub fn is_special(&self) -> bool {
        self.id.eq_ignore_ascii_case(SPECIAL_TRACK_ID)
    }

    /// Identifier match used by every lookup source: id, code or upper-cased name.
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.id.eq_ignore_ascii_case(key)
            || self.code.eq_ignore_ascii_case(key)
            || self.name.to_uppercase() == key.to_uppercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Discount {
    pub id: String,
    pub code: String,
    pub name: String,
    pub category: String,
    pub base_percentage: f64,
    pub effective_percentage: f64,
    /// Upper bound for discounts whose percentage is chosen per student.
    #[serde(default)]
    pub max_percentage: Option<f64>,
    pub required_documents: Vec<String>,
    pub requires_approval: bool,
    pub approval_level: ApprovalLevel,
    pub active: bool,
}

impl Discount {
    pub fn is_full_scholarship(&self) -> bool {
        is_full_scholarship_code(&self.code) && self.effective_percentage >= 100.0
    }

    pub fn is_variable(&self) -> bool {
        self.max_percentage.is_some()
    }

    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.id.eq_ignore_ascii_case(key) || self.code.eq_ignore_ascii_case(key)
    }

    /// Applies a student's chosen percentage to a variable discount.
    /// Fixed discounts keep their catalog percentage.
    pub fn with_selection(&self, selection: &DiscountSelection) -> Discount {
        self.with_chosen_percentage(selection.percentage)
    }

    pub fn with_chosen_percentage(&self, percentage: f64) -> Discount {
        let mut discount = self.clone();
        if let Some(max) = self.max_percentage {
            discount.effective_percentage = normalize::clamp_percentage(percentage).min(max);
        }
        discount
    }
}

/// A student's chosen discount for one enrollment period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountSelection {
    pub discount_id: String,
    pub discount_code: String,
    pub percentage: f64,
    #[serde(default)]
    pub requires_documents: bool,
    #[serde(default)]
    pub discount_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl DiscountSelection {
    pub fn from_discount(discount: &Discount) -> Self {
        Self {
            discount_id: discount.id.clone(),
            discount_code: discount.code.clone(),
            percentage: discount.effective_percentage,
            requires_documents: !discount.required_documents.is_empty(),
            discount_name: Some(discount.name.clone()),
            category: Some(discount.category.clone()),
        }
    }

    pub fn display_name(&self) -> String {
        self.discount_name
            .clone()
            .unwrap_or_else(|| display_name(&self.discount_code).to_string())
    }
}

/// Outcome of resolving one discount identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscountLookup {
    Found(Discount),
    NotFound { id: String },
}

impl DiscountLookup {
    pub fn found(&self) -> Option<&Discount> {
        match self {
            Self::Found(discount) => Some(discount),
            Self::NotFound { .. } => None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Found(discount) => &discount.id,
            Self::NotFound { id } => id,
        }
    }
}

pub fn is_full_scholarship_code(code: &str) -> bool {
    FULL_SCHOLARSHIP_CODES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(code))
}

pub fn is_special_code(code: &str) -> bool {
    SPECIAL_DISCOUNT_CODES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(code))
}

/// Friendly label for a discount code, used when a selection carries no name.
pub fn display_name(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "IIR" => "Sibling discount",
        "RES" => "Out-of-town residence",
        "PAV" => "Upfront payment",
        "PASS" => "Staff child scholarship",
        "PBS" => "Teachers' union partner",
        "COL" => "Employee discount",
        "SAE" => "Water utility agreement",
        "ABI" => "Full philanthropic scholarship",
        "ABP" => "Partial philanthropic scholarship",
        "CEP" => "Postal area discount",
        "CEP5" => "Low-income area discount",
        "CEP10" => "Out-of-town area discount",
        "ADI" | "ADIM2" => "Punctual payment",
        "COM_EXTRA" => "Commercial negotiation",
        _ => "Other discount",
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalLevel, DiscountSelection};
    use crate::catalog::fallback::{static_discounts, static_tracks};

    #[test]
    fn approval_level_tiers() {
        assert_eq!(ApprovalLevel::for_percentage(20.0, 20.0, 50.0), ApprovalLevel::Automatic);
        assert_eq!(ApprovalLevel::for_percentage(20.5, 20.0, 50.0), ApprovalLevel::Coordination);
        assert_eq!(ApprovalLevel::for_percentage(50.0, 20.0, 50.0), ApprovalLevel::Coordination);
        assert_eq!(ApprovalLevel::for_percentage(51.0, 20.0, 50.0), ApprovalLevel::Direction);
        let parsed: ApprovalLevel = "coordenacao".parse().expect("alias should parse");
        assert_eq!(parsed, ApprovalLevel::Coordination);
    }

    #[test]
    fn track_matches_id_code_and_name() {
        let tracks = static_tracks();
        let combined = tracks.iter().find(|t| t.id == "B").expect("track B");
        assert!(combined.matches("b"));
        assert!(combined.matches("COMBINADO"));
        assert!(!combined.matches("C"));
        assert!(combined.excludes("abi"));
    }

    #[test]
    fn variable_discount_takes_selected_percentage_within_bound() {
        let discounts = static_discounts();
        let commercial = discounts
            .iter()
            .find(|d| d.code == "COM_EXTRA")
            .expect("commercial discount");
        let mut selection = DiscountSelection::from_discount(commercial);
        selection.percentage = 35.0;
        let applied = commercial.with_selection(&selection);
        assert_eq!(applied.effective_percentage, 20.0);

        let sibling = discounts.iter().find(|d| d.code == "IIR").expect("sibling");
        let applied = sibling.with_selection(&selection);
        assert_eq!(applied.effective_percentage, 10.0);
    }
}
