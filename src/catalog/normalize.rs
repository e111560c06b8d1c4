use crate::catalog::ApprovalLevel;

pub const DEFAULT_AUTOMATIC_THRESHOLD: f64 = 20.0;
pub const DEFAULT_COORDINATION_CEILING: f64 = 50.0;

pub fn clamp_percentage(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Sign-off level implied by a single discount's percentage.
pub fn approval_level_for(percentage: f64) -> ApprovalLevel {
    ApprovalLevel::for_percentage(
        percentage,
        DEFAULT_AUTOMATIC_THRESHOLD,
        DEFAULT_COORDINATION_CEILING,
    )
}

/// Level for a store row: an explicit value wins, otherwise approval-gated rows
/// are tiered by percentage and the rest are automatic.
pub fn resolve_approval_level(
    explicit: Option<ApprovalLevel>,
    requires_approval: bool,
    percentage: f64,
) -> ApprovalLevel {
    match explicit {
        Some(level) => level,
        None if requires_approval => approval_level_for(percentage),
        None => ApprovalLevel::Automatic,
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Keeps only the digits of a postal code.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::{clamp_percentage, digits_only, resolve_approval_level};
    use crate::catalog::ApprovalLevel;

    #[test]
    fn clamps_out_of_range_percentages() {
        assert_eq!(clamp_percentage(-5.0), 0.0);
        assert_eq!(clamp_percentage(140.0), 100.0);
        assert_eq!(clamp_percentage(f64::NAN), 0.0);
        assert_eq!(clamp_percentage(37.5), 37.5);
    }

    #[test]
    fn approval_level_prefers_explicit_value() {
        assert_eq!(
            resolve_approval_level(Some(ApprovalLevel::Direction), false, 5.0),
            ApprovalLevel::Direction
        );
        assert_eq!(resolve_approval_level(None, true, 40.0), ApprovalLevel::Coordination);
        assert_eq!(resolve_approval_level(None, false, 90.0), ApprovalLevel::Automatic);
    }

    #[test]
    fn strips_postal_code_punctuation() {
        assert_eq!(digits_only("37704-120"), "37704120");
    }
}
