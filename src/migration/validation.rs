use serde::{Deserialize, Serialize};

use crate::catalog::DiscountSelection;
use crate::migration::rules::code_family;
use crate::migration::MigrationRules;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountSetValidation {
    pub is_valid: bool,
    /// Sum of the selection, capped at the cumulative ceiling.
    pub total_percentage: f64,
    pub errors: Vec<String>,
}

/// Checks a carried-over selection before it is confirmed.
pub fn validate_discount_set(rules: &MigrationRules, selections: &[DiscountSelection]) -> DiscountSetValidation {
    let mut errors = Vec::new();
    let total: f64 = selections.iter().map(|s| s.percentage).sum();
    let ceiling = rules.max_cumulative_percentage;

    if total > ceiling {
        errors.push(format!(
            "discount total ({total}%) exceeds the {ceiling}% limit"
        ));
    }

    let has = |code: &str| {
        selections
            .iter()
            .any(|s| code_family(&s.discount_code.to_ascii_uppercase()) == code)
    };
    if has("CEP") && has("RES") {
        errors.push("CEP and RES discounts cannot be combined".to_string());
    }
    if has("ABI") && selections.len() > 1 {
        errors.push("a full scholarship cannot be combined with other discounts".to_string());
    }

    DiscountSetValidation {
        is_valid: errors.is_empty(),
        total_percentage: total.min(ceiling),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::validate_discount_set;
    use crate::catalog::DiscountSelection;
    use crate::migration::MigrationRules;

    fn pick(code: &str, percentage: f64) -> DiscountSelection {
        DiscountSelection {
            discount_id: code.to_lowercase(),
            discount_code: code.to_string(),
            percentage,
            requires_documents: false,
            discount_name: None,
            category: None,
        }
    }

    #[test]
    fn accepts_modest_selection() {
        let result = validate_discount_set(&MigrationRules::default(), &[pick("IIR", 10.0), pick("PAV", 15.0)]);
        assert!(result.is_valid);
        assert_eq!(result.total_percentage, 25.0);
    }

    #[test]
    fn reports_every_conflict() {
        let result = validate_discount_set(
            &MigrationRules::default(),
            &[pick("ABI", 100.0), pick("cep", 10.0), pick("RES", 20.0)],
        );
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.total_percentage, 60.0);
    }
}
