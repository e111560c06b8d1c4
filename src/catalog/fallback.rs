use crate::catalog::normalize::{approval_level_for, clamp_percentage};
use crate::catalog::{ApprovalLevel, Discount, Track, TrackConfig, TrackRestrictions};

/// Built-in tracks served when the reference store is unavailable.
pub fn static_tracks() -> Vec<Track> {
    vec![
        Track {
            id: "A".to_string(),
            code: "especial".to_string(),
            name: "Especial".to_string(),
            description: "Special track with no discount cap".to_string(),
            cap_percentage: None,
            conditions: strings(&[
                "Unlimited discounts",
                "Full scholarships accepted",
                "Automatic approval up to 20%",
                "Coordination approval up to 50%",
                "Direction approval above 50%",
            ]),
            priority: 1,
            config: TrackConfig::default(),
            restrictions: TrackRestrictions::default(),
            active: true,
        },
        Track {
            id: "B".to_string(),
            code: "combinado".to_string(),
            name: "Combinado".to_string(),
            description: "Combined track capped at 25%".to_string(),
            cap_percentage: Some(25.0),
            conditions: strings(&[
                "Maximum discount of 25%",
                "Full scholarships not accepted",
                "Automatic approval up to 20%",
                "Coordination approval from 21% to 25%",
            ]),
            priority: 2,
            config: TrackConfig {
                allows_full_scholarship: false,
                ..TrackConfig::default()
            },
            restrictions: TrackRestrictions {
                excluded_discount_codes: strings(&["ABI"]),
                ..TrackRestrictions::default()
            },
            active: true,
        },
        Track {
            id: "C".to_string(),
            code: "normal".to_string(),
            name: "Normal".to_string(),
            description: "Regular track capped at 60%".to_string(),
            cap_percentage: Some(60.0),
            conditions: strings(&[
                "Maximum discount of 60%",
                "Full scholarships accepted",
                "Automatic approval up to 20%",
                "Coordination approval from 21% to 50%",
                "Direction approval from 51% to 60%",
            ]),
            priority: 3,
            config: TrackConfig::default(),
            restrictions: TrackRestrictions::default(),
            active: true,
        },
    ]
}

/// Built-in discount catalog.
pub fn static_discounts() -> Vec<Discount> {
    vec![
        fixed("1", "IIR", "Siblings enrolled - 10%", 10.0, &[
            "Siblings' birth certificates",
            "Proof of sibling enrollment",
        ]),
        fixed("2", "RES", "Students from other cities - 20%", 20.0, &[
            "Proof of residence in another city",
        ]),
        fixed("9", "PAV", "Upfront payment - 15%", 15.0, &["Proof of full payment"]),
        directed("3", "PASS", "Children of unionized staff teachers - 100%", 100.0, &[
            "Employment record",
            "Union membership statement",
        ]),
        fixed("4", "PBS", "Children of unionized teachers elsewhere - 40%", 40.0, &[
            "Proof of teaching employment",
            "Proof of union membership",
        ]),
        fixed("5", "COL", "Children of unionized staff employees - 50%", 50.0, &[
            "Employment record with the institution",
            "Proof of union membership",
        ]),
        fixed("6", "SAE", "Children of unionized employees elsewhere - 40%", 40.0, &[
            "Proof of employment",
            "Union membership statement",
        ]),
        directed("7", "ABI", "Full philanthropic scholarship - 100%", 100.0, &[
            "Complete philanthropy process",
        ]),
        fixed("8", "ABP", "Partial philanthropic scholarship - 50%", 50.0, &[
            "Complete philanthropy process",
        ]),
        fixed("C1", "CEP10", "Commercial - postal code outside the city - 10%", 10.0, &[]),
        fixed("C2", "CEP5", "Commercial - low-income neighborhood - 5%", 5.0, &[]),
        Discount {
            approval_level: ApprovalLevel::Automatic,
            requires_approval: false,
            ..fixed("C3", "ADIM2", "Commercial - punctual payer - 2%", 2.0, &[])
        },
        Discount {
            max_percentage: Some(20.0),
            ..directed("C4", "COM_EXTRA", "Commercial - negotiated extra up to 20%", 0.0, &[])
        },
    ]
}

/// Category bucket for a discount code.
pub fn category_for(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "IIR" | "RES" | "PAV" => "regular",
        "PASS" | "PBS" | "COL" | "SAE" | "ABI" | "ABP" => "special",
        _ => "negotiation",
    }
}

fn fixed(id: &str, code: &str, name: &str, percentage: f64, documents: &[&str]) -> Discount {
    let percentage = clamp_percentage(percentage);
    let level = approval_level_for(percentage);
    Discount {
        id: id.to_string(),
        code: code.to_string(),
        name: name.to_string(),
        category: category_for(code).to_string(),
        base_percentage: percentage,
        effective_percentage: percentage,
        max_percentage: None,
        required_documents: strings(documents),
        requires_approval: level != ApprovalLevel::Automatic,
        approval_level: level,
        active: true,
    }
}

fn directed(id: &str, code: &str, name: &str, percentage: f64, documents: &[&str]) -> Discount {
    Discount {
        requires_approval: true,
        approval_level: ApprovalLevel::Direction,
        ..fixed(id, code, name, percentage, documents)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
