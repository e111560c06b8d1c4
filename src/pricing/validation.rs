use crate::catalog::{is_full_scholarship_code, Track};
use crate::pricing::{DiscountBreakdown, PricingRules, StatusReason, ValidationReport};

/// Aggregate percentages the report is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Percentages {
    pub subtotal: f64,
    pub applied: f64,
    pub cap: f64,
    pub full_scholarship: bool,
}

pub fn validate(
    rules: &PricingRules,
    track: Option<&Track>,
    lines: &[DiscountBreakdown],
    base_value: f64,
    percentages: &Percentages,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let missing: Vec<&str> = lines
        .iter()
        .filter(|line| line.status_reason == Some(StatusReason::DiscountNotFound))
        .map(|line| line.discount_id.as_str())
        .collect();
    if !missing.is_empty() {
        warnings.push(format!("discounts not found: {}", missing.join(", ")));
    }

    let Some(track) = track else {
        warnings.push("no track selected; default rules applied".to_string());
        return ValidationReport::from_parts(errors, warnings);
    };

    if !percentages.full_scholarship
        && percentages.applied > percentages.cap + rules.percentage_tolerance
    {
        errors.push(format!(
            "discount total {:.2}% exceeds the {:.2}% cap of track {}",
            percentages.subtotal, percentages.cap, track.name
        ));
    }

    let excluded: Vec<&str> = lines
        .iter()
        .filter(|line| line.status_reason == Some(StatusReason::ExcludedByTrack))
        .map(|line| line.code.as_str())
        .collect();
    if !excluded.is_empty() {
        errors.push(format!(
            "discounts not allowed in track {}: {}",
            track.name,
            excluded.join(", ")
        ));
    }

    let counted: Vec<&DiscountBreakdown> = lines.iter().filter(|line| line.counts()).collect();

    if !track.config.allows_full_scholarship
        && counted
            .iter()
            .any(|line| is_full_scholarship_code(&line.code) && line.original_percentage >= 100.0)
    {
        errors.push(format!(
            "track {} does not accept full scholarships",
            track.name
        ));
    }

    if !track.config.allows_discount_combination && counted.len() > 1 {
        errors.push(format!(
            "track {} does not allow combining discounts ({} selected)",
            track.name,
            counted.len()
        ));
    }

    let missing_required: Vec<&str> = track
        .restrictions
        .required_discount_codes
        .iter()
        .filter(|required| !counted.iter().any(|line| line.code.eq_ignore_ascii_case(required)))
        .map(String::as_str)
        .collect();
    if !missing_required.is_empty() {
        warnings.push(format!(
            "track {} expects discounts: {}",
            track.name,
            missing_required.join(", ")
        ));
    }

    if let Some(minimum) = track.restrictions.minimum_base_value {
        if base_value < minimum {
            warnings.push(format!(
                "base value {base_value:.2} is below the {minimum:.2} minimum of track {}",
                track.name
            ));
        }
    }

    ValidationReport::from_parts(errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::{validate, Percentages};
    use crate::catalog::fallback::static_tracks;
    use crate::catalog::ApprovalLevel;
    use crate::pricing::{DiscountBreakdown, DiscountStatus, PricingRules};

    fn line(code: &str, status: DiscountStatus) -> DiscountBreakdown {
        DiscountBreakdown {
            discount_id: code.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            original_percentage: 10.0,
            applied_percentage: 10.0,
            discount_value: 0.0,
            status,
            status_reason: None,
            requires_documents: false,
            pending_documents: Vec::new(),
            approval_level: ApprovalLevel::Automatic,
        }
    }

    fn within_cap() -> Percentages {
        Percentages {
            subtotal: 20.0,
            applied: 20.0,
            cap: 60.0,
            full_scholarship: false,
        }
    }

    #[test]
    fn combination_forbidden_is_error() {
        let mut track = static_tracks().remove(2);
        track.config.allows_discount_combination = false;
        let lines = vec![
            line("IIR", DiscountStatus::Eligible),
            line("PAV", DiscountStatus::Conditional),
        ];
        let report = validate(&PricingRules::default(), Some(&track), &lines, 1000.0, &within_cap());
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("combining"));
    }

    #[test]
    fn track_restrictions_produce_warnings() {
        let mut track = static_tracks().remove(2);
        track.restrictions.required_discount_codes = vec!["RES".to_string()];
        track.restrictions.minimum_base_value = Some(1500.0);
        let lines = vec![line("IIR", DiscountStatus::Eligible)];
        let report = validate(&PricingRules::default(), Some(&track), &lines, 1000.0, &within_cap());
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn full_scholarship_in_disallowing_track() {
        let track = static_tracks().remove(1);
        let mut pass = line("PASS", DiscountStatus::Conditional);
        pass.original_percentage = 100.0;
        let lines = vec![pass];
        let percentages = Percentages {
            subtotal: 100.0,
            applied: 100.0,
            cap: 25.0,
            full_scholarship: true,
        };
        let report = validate(&PricingRules::default(), Some(&track), &lines, 1000.0, &percentages);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("full scholarships"));
    }

    #[test]
    fn tolerance_absorbs_rounding() {
        let track = static_tracks().remove(2);
        let percentages = Percentages {
            subtotal: 60.005,
            applied: 60.005,
            cap: 60.0,
            full_scholarship: false,
        };
        let lines = vec![line("IIR", DiscountStatus::Eligible)];
        let report = validate(&PricingRules::default(), Some(&track), &lines, 1000.0, &percentages);
        assert!(report.is_valid);
    }

    #[test]
    fn partial_pass_is_not_a_full_scholarship() {
        let track = static_tracks().remove(1);
        let mut pass = line("PASS", DiscountStatus::Conditional);
        pass.original_percentage = 50.0;
        let percentages = Percentages {
            subtotal: 50.0,
            applied: 25.0,
            cap: 25.0,
            full_scholarship: false,
        };
        let report = validate(&PricingRules::default(), Some(&track), &[pass], 1000.0, &percentages);
        assert!(report.errors.iter().all(|e| !e.contains("full scholarships")));
        assert!(report.is_valid);
    }
}
