use tracing::{debug, error};

use crate::catalog::{is_full_scholarship_code, ApprovalLevel, DiscountLookup, Track};
use crate::pricing::invariants::detect_edge_cases;
use crate::pricing::validation::{validate, Percentages};
use crate::pricing::{
    CalculatedTotals, CalculationMetadata, CalculationOptions, CalculationStatistics,
    DiscountBreakdown, DiscountStatus, PricingRules, StatusReason, TrackSummary, ValidationReport,
    BASE_VALUE_ERROR, CALCULATION_VERSION,
};

const MONTHS_PER_YEAR: f64 = 12.0;

pub fn calculate(
    track: Option<&Track>,
    discounts: &[DiscountLookup],
    base_value: f64,
    options: &CalculationOptions,
) -> CalculatedTotals {
    calculate_with(&PricingRules::default(), track, discounts, base_value, options)
}

/// Computes totals for one selection. Never fails: bad input lands in the
/// validation report and reference problems become blocked lines.
pub fn calculate_with(
    rules: &PricingRules,
    track: Option<&Track>,
    discounts: &[DiscountLookup],
    base_value: f64,
    options: &CalculationOptions,
) -> CalculatedTotals {
    if !base_value.is_finite() || base_value <= 0.0 {
        debug!(base_value, "rejecting non-positive base value");
        return invalid_base(rules, track, discounts, base_value);
    }

    let cap = track
        .map(Track::effective_cap)
        .unwrap_or(rules.default_cap_percentage)
        .clamp(0.0, 100.0);
    let limit = if options.apply_cap_automatically { cap } else { 100.0 };
    let threshold = track
        .map(|t| t.config.automatic_approval_threshold)
        .unwrap_or(rules.default_automatic_threshold);

    let mut lines: Vec<DiscountBreakdown> = discounts
        .iter()
        .map(|lookup| classify_line(lookup, track, options, rules, threshold))
        .collect();

    let subtotal: f64 = lines
        .iter()
        .filter(|line| line.counts())
        .map(|line| line.original_percentage)
        .sum();

    let full_scholarship = options.consider_special_rules
        && lines.iter().any(|line| {
            line.counts()
                && is_full_scholarship_code(&line.code)
                && line.original_percentage >= 100.0
        });

    let cap_applied = subtotal > limit;
    let applied = if full_scholarship {
        100.0
    } else if cap_applied {
        limit
    } else {
        subtotal.min(100.0)
    };

    for line in lines.iter_mut().filter(|line| line.counts()) {
        line.applied_percentage = if cap_applied && !full_scholarship && subtotal > 0.0 {
            line.original_percentage / subtotal * applied
        } else {
            line.original_percentage
        };
        line.discount_value = base_value * line.applied_percentage / 100.0;
    }

    let discount_value = base_value * applied / 100.0;
    let final_value = base_value - discount_value;
    let validation = validate(
        rules,
        track,
        &lines,
        base_value,
        &Percentages {
            subtotal,
            applied,
            cap,
            full_scholarship,
        },
    );

    let mut totals = CalculatedTotals {
        base_value,
        subtotal_percentage: subtotal,
        applied_percentage: applied,
        cap_percentage: cap,
        cap_applied,
        full_scholarship_applied: full_scholarship,
        discount_value,
        final_value,
        monthly_savings: discount_value,
        annual_savings: discount_value * MONTHS_PER_YEAR,
        statistics: statistics(&lines, discount_value, base_value),
        discounts: lines,
        track: track_summary(track, rules),
        validation,
        approval_level: ApprovalLevel::for_percentage(applied, threshold, rules.coordination_ceiling),
        critical_edge_cases: Vec::new(),
        metadata: metadata(track, discounts),
    };

    totals.critical_edge_cases = detect_edge_cases(rules, &totals);
    for case in &totals.critical_edge_cases {
        error!(kind = ?case.kind, detail = %case.detail, "calculation invariant violated");
    }
    debug!(
        subtotal = totals.subtotal_percentage,
        applied = totals.applied_percentage,
        final_value = totals.final_value,
        "calculated totals"
    );
    totals
}

fn classify_line(
    lookup: &DiscountLookup,
    track: Option<&Track>,
    options: &CalculationOptions,
    rules: &PricingRules,
    threshold: f64,
) -> DiscountBreakdown {
    let discount = match lookup {
        DiscountLookup::Found(discount) => discount,
        DiscountLookup::NotFound { id } => {
            return DiscountBreakdown {
                discount_id: id.clone(),
                code: id.trim().to_ascii_uppercase(),
                name: "Unknown discount".to_string(),
                original_percentage: 0.0,
                applied_percentage: 0.0,
                discount_value: 0.0,
                status: DiscountStatus::Blocked,
                status_reason: Some(StatusReason::DiscountNotFound),
                requires_documents: false,
                pending_documents: Vec::new(),
                approval_level: ApprovalLevel::Automatic,
            }
        }
    };

    let (status, status_reason) = if !discount.active && !options.include_inactive_discounts {
        (DiscountStatus::Blocked, Some(StatusReason::Inactive))
    } else if track.is_some_and(|t| t.excludes(&discount.code)) {
        (DiscountStatus::Blocked, Some(StatusReason::ExcludedByTrack))
    } else if discount.requires_approval {
        (DiscountStatus::Conditional, Some(StatusReason::RequiresApproval))
    } else {
        (DiscountStatus::Eligible, None)
    };

    let pending_documents = if options.validate_documentation && status != DiscountStatus::Blocked {
        discount.required_documents.clone()
    } else {
        Vec::new()
    };

    DiscountBreakdown {
        discount_id: discount.id.clone(),
        code: discount.code.clone(),
        name: discount.name.clone(),
        original_percentage: discount.effective_percentage,
        applied_percentage: 0.0,
        discount_value: 0.0,
        status,
        status_reason,
        requires_documents: !discount.required_documents.is_empty(),
        pending_documents,
        approval_level: if discount.requires_approval {
            discount.approval_level
        } else {
            ApprovalLevel::for_percentage(
                discount.effective_percentage,
                threshold,
                rules.coordination_ceiling,
            )
        },
    }
}

fn statistics(lines: &[DiscountBreakdown], discount_value: f64, base_value: f64) -> CalculationStatistics {
    let applied: Vec<f64> = lines
        .iter()
        .filter(|line| line.counts())
        .map(|line| line.applied_percentage)
        .collect();
    CalculationStatistics {
        discount_count: applied.len(),
        max_individual_percentage: applied.iter().copied().fold(0.0, f64::max),
        min_individual_percentage: if applied.is_empty() {
            0.0
        } else {
            applied.iter().copied().fold(f64::INFINITY, f64::min)
        },
        savings_ratio: if base_value > 0.0 {
            discount_value / base_value
        } else {
            0.0
        },
    }
}

fn track_summary(track: Option<&Track>, rules: &PricingRules) -> TrackSummary {
    match track {
        Some(track) => TrackSummary {
            id: track.id.clone(),
            name: track.name.clone(),
            cap_percentage: track.effective_cap(),
            allows_full_scholarship: track.config.allows_full_scholarship,
        },
        None => TrackSummary {
            id: "default".to_string(),
            name: "Default rules".to_string(),
            cap_percentage: rules.default_cap_percentage,
            allows_full_scholarship: true,
        },
    }
}

fn metadata(track: Option<&Track>, discounts: &[DiscountLookup]) -> CalculationMetadata {
    CalculationMetadata {
        version: CALCULATION_VERSION.to_string(),
        track_used: track
            .map(|t| t.id.clone())
            .unwrap_or_else(|| "default".to_string()),
        discount_ids: discounts.iter().map(|d| d.id().to_string()).collect(),
    }
}

fn invalid_base(
    rules: &PricingRules,
    track: Option<&Track>,
    discounts: &[DiscountLookup],
    base_value: f64,
) -> CalculatedTotals {
    CalculatedTotals {
        base_value: if base_value.is_finite() { base_value } else { 0.0 },
        subtotal_percentage: 0.0,
        applied_percentage: 0.0,
        cap_percentage: track
            .map(Track::effective_cap)
            .unwrap_or(rules.default_cap_percentage),
        cap_applied: false,
        full_scholarship_applied: false,
        discount_value: 0.0,
        final_value: 0.0,
        monthly_savings: 0.0,
        annual_savings: 0.0,
        discounts: Vec::new(),
        track: track_summary(track, rules),
        validation: ValidationReport::from_parts(vec![BASE_VALUE_ERROR.to_string()], Vec::new()),
        approval_level: ApprovalLevel::Automatic,
        statistics: CalculationStatistics::default(),
        critical_edge_cases: Vec::new(),
        metadata: metadata(track, discounts),
    }
}

#[cfg(test)]
mod tests {
    use super::{calculate, calculate_with};
    use crate::catalog::fallback::{static_discounts, static_tracks};
    use crate::catalog::{ApprovalLevel, Discount, DiscountLookup, Track};
    use crate::pricing::{
        CalculationOptions, DiscountStatus, PricingRules, StatusReason, BASE_VALUE_ERROR,
    };

    fn track(id: &str) -> Track {
        static_tracks()
            .into_iter()
            .find(|t| t.id == id)
            .expect("static track")
    }

    fn discount(code: &str) -> Discount {
        static_discounts()
            .into_iter()
            .find(|d| d.code == code)
            .expect("static discount")
    }

    fn flat(id: &str, percentage: f64) -> DiscountLookup {
        let mut discount = discount("IIR");
        discount.id = id.to_string();
        discount.code = id.to_string();
        discount.effective_percentage = percentage;
        discount.base_percentage = percentage;
        discount.requires_approval = false;
        DiscountLookup::Found(discount)
    }

    fn found(code: &str) -> DiscountLookup {
        DiscountLookup::Found(discount(code))
    }

    #[test]
    fn capped_track_redistributes_proportionally() {
        let combined = track("B");
        let selection = vec![flat("X1", 20.0), flat("X2", 20.0), flat("X3", 20.0)];
        let totals = calculate(Some(&combined), &selection, 1000.0, &CalculationOptions::default());

        assert_eq!(totals.subtotal_percentage, 60.0);
        assert_eq!(totals.applied_percentage, 25.0);
        assert!(totals.cap_applied);
        assert!((totals.final_value - 750.0).abs() < 1e-9);
        let redistributed: f64 = totals.discounts.iter().map(|d| d.applied_percentage).sum();
        assert!((redistributed - 25.0).abs() < 0.01);
        assert!(totals.critical_edge_cases.is_empty());
    }

    #[test]
    fn unlimited_track_reaches_full_discount() {
        let special = track("A");
        let selection = vec![flat("X1", 50.0), flat("X2", 50.0)];
        let totals = calculate(Some(&special), &selection, 1200.0, &CalculationOptions::default());

        assert_eq!(totals.applied_percentage, 100.0);
        assert_eq!(totals.final_value, 0.0);
        assert!(!totals.cap_applied);
    }

    #[test]
    fn missing_track_uses_default_cap() {
        let selection = vec![flat("X1", 40.0), flat("X2", 40.0)];
        let totals = calculate(None, &selection, 900.0, &CalculationOptions::default());

        assert_eq!(totals.subtotal_percentage, 80.0);
        assert_eq!(totals.applied_percentage, 60.0);
        assert!(totals.cap_applied);
        assert_eq!(totals.metadata.track_used, "default");
        assert!(totals
            .validation
            .warnings
            .iter()
            .any(|w| w.contains("no track")));
    }

    #[test]
    fn zero_base_value_is_invalid() {
        let totals = calculate(None, &[flat("X1", 10.0)], 0.0, &CalculationOptions::default());
        assert!(!totals.is_valid());
        assert_eq!(totals.final_value, 0.0);
        assert_eq!(totals.validation.errors, vec![BASE_VALUE_ERROR.to_string()]);

        let nan = calculate(None, &[], f64::NAN, &CalculationOptions::default());
        assert!(!nan.is_valid());
        assert_eq!(nan.base_value, 0.0);
    }

    #[test]
    fn empty_selection_keeps_base_value() {
        for base in [1.0, 350.5, 2200.0] {
            let totals = calculate(Some(&track("C")), &[], base, &CalculationOptions::default());
            assert_eq!(totals.final_value, base);
            assert_eq!(totals.applied_percentage, 0.0);
            assert_eq!(totals.statistics.min_individual_percentage, 0.0);
        }
    }

    #[test]
    fn full_scholarship_overrides_cap() {
        let normal = track("C");
        let selection = vec![found("PASS"), found("IIR")];
        let totals = calculate(Some(&normal), &selection, 1500.0, &CalculationOptions::default());

        assert!(totals.full_scholarship_applied);
        assert_eq!(totals.subtotal_percentage, 110.0);
        assert!(totals.cap_applied);
        assert_eq!(totals.applied_percentage, 100.0);
        assert_eq!(totals.final_value, 0.0);
        let iir = totals
            .discounts
            .iter()
            .find(|d| d.code == "IIR")
            .expect("iir line");
        assert_eq!(iir.applied_percentage, 10.0);
        let pass = totals
            .discounts
            .iter()
            .find(|d| d.code == "PASS")
            .expect("pass line");
        assert_eq!(pass.applied_percentage, 100.0);
        assert_eq!(totals.approval_level, ApprovalLevel::Direction);
    }

    #[test]
    fn override_disabled_without_special_rules() {
        let options = CalculationOptions {
            consider_special_rules: false,
            ..CalculationOptions::default()
        };
        let totals = calculate(Some(&track("C")), &[found("ABI")], 1000.0, &options);
        assert!(!totals.full_scholarship_applied);
        assert_eq!(totals.applied_percentage, 60.0);
        assert!(totals.cap_applied);
    }

    #[test]
    fn excluded_and_unknown_discounts_are_blocked() {
        let combined = track("B");
        let selection = vec![
            found("ABI"),
            found("IIR"),
            DiscountLookup::NotFound {
                id: "ghost".to_string(),
            },
        ];
        let totals = calculate(Some(&combined), &selection, 1000.0, &CalculationOptions::default());

        let abi = &totals.discounts[0];
        assert_eq!(abi.status, DiscountStatus::Blocked);
        assert_eq!(abi.status_reason, Some(StatusReason::ExcludedByTrack));
        let ghost = &totals.discounts[2];
        assert_eq!(ghost.status_reason, Some(StatusReason::DiscountNotFound));
        assert_eq!(totals.subtotal_percentage, 10.0);
        assert!(!totals.full_scholarship_applied);
        assert!(!totals.is_valid());
    }

    #[test]
    fn inactive_discounts_follow_option() {
        let mut inactive = discount("PAV");
        inactive.active = false;
        let selection = vec![DiscountLookup::Found(inactive)];

        let totals = calculate(None, &selection, 1000.0, &CalculationOptions::default());
        assert_eq!(totals.discounts[0].status_reason, Some(StatusReason::Inactive));
        assert_eq!(totals.applied_percentage, 0.0);

        let options = CalculationOptions {
            include_inactive_discounts: true,
            ..CalculationOptions::default()
        };
        let totals = calculate(None, &selection, 1000.0, &options);
        assert_eq!(totals.applied_percentage, 15.0);
    }

    #[test]
    fn uncapped_computation_reports_cap_error() {
        let options = CalculationOptions {
            apply_cap_automatically: false,
            ..CalculationOptions::default()
        };
        let selection = vec![flat("X1", 40.0), flat("X2", 40.0)];
        let totals = calculate(Some(&track("C")), &selection, 1000.0, &options);
        assert_eq!(totals.applied_percentage, 80.0);
        assert!(!totals.cap_applied);
        assert!(totals.validation.errors.iter().any(|e| e.contains("cap")));
    }

    #[test]
    fn documentation_listing_follows_option() {
        let selection = vec![found("IIR")];
        let totals = calculate(None, &selection, 1000.0, &CalculationOptions::default());
        assert_eq!(totals.discounts[0].pending_documents.len(), 2);

        let options = CalculationOptions {
            validate_documentation: false,
            ..CalculationOptions::default()
        };
        let totals = calculate(None, &selection, 1000.0, &options);
        assert!(totals.discounts[0].pending_documents.is_empty());
        assert!(totals.discounts[0].requires_documents);
    }

    #[test]
    fn approval_level_uses_track_threshold() {
        let rules = PricingRules::default();
        let mut normal = track("C");
        normal.config.automatic_approval_threshold = 5.0;
        let totals = calculate_with(&rules, Some(&normal), &[flat("X1", 10.0)], 800.0, &CalculationOptions::default());
        assert_eq!(totals.approval_level, ApprovalLevel::Coordination);
        assert!((totals.annual_savings - 960.0).abs() < 1e-9);
    }

    #[test]
    fn identical_inputs_are_bit_identical() {
        let selection = vec![found("IIR"), found("PAV"), found("PBS")];
        let first = calculate(Some(&track("C")), &selection, 1234.56, &CalculationOptions::default());
        let second = calculate(Some(&track("C")), &selection, 1234.56, &CalculationOptions::default());
        assert_eq!(first, second);
        let first_json = serde_json::to_string(&first).expect("serialize");
        let second_json = serde_json::to_string(&second).expect("serialize");
        assert_eq!(first_json, second_json);
    }
}
