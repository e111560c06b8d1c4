use crate::geo::{self, GeoCategory};
use crate::migration::MigrationStatus;

/// Codes re-proven every period regardless of anything else.
pub const ANNUAL_REVALIDATION_CODES: [&str; 3] = ["PAV", "CEP", "ADI"];
pub const POSTAL_DEPENDENT_CODES: [&str; 2] = ["CEP", "RES"];
pub const EMPLOYMENT_CODES: [&str; 4] = ["PASS", "PBS", "COL", "SAE"];
pub const SOCIAL_CODES: [&str; 2] = ["ABI", "ABP"];

pub const LEFT_COVERAGE_REASON: &str = "postal code no longer in coverage area";

#[derive(Debug, Clone, PartialEq)]
pub struct CarryOverVerdict {
    pub status: MigrationStatus,
    pub reason: Option<String>,
    pub validation_steps: Vec<String>,
    pub documents: Vec<String>,
}

impl CarryOverVerdict {
    fn eligible(documents: &[&str]) -> Self {
        Self {
            status: MigrationStatus::Eligible,
            reason: None,
            validation_steps: Vec::new(),
            documents: strings(documents),
        }
    }

    fn needs_validation(step: &str, documents: &[&str]) -> Self {
        Self {
            status: MigrationStatus::NeedsValidation,
            reason: None,
            validation_steps: vec![step.to_string()],
            documents: strings(documents),
        }
    }
}

/// Decides whether a prior discount carries into the new period. Rules are
/// tried in priority order and the first match wins.
pub fn carry_over(code: &str, category: Option<GeoCategory>) -> CarryOverVerdict {
    let code = code.trim().to_ascii_uppercase();
    let code = code.as_str();
    let family = code_family(code);

    if code == "IIR" {
        return CarryOverVerdict::eligible(&["Proof of sibling enrollment"]);
    }
    if ANNUAL_REVALIDATION_CODES.contains(&family) {
        return CarryOverVerdict::needs_validation(
            "Submit updated documentation",
            annual_documents(family),
        );
    }
    if POSTAL_DEPENDENT_CODES.contains(&family) && !geo::is_eligible(category, code) {
        return CarryOverVerdict {
            status: MigrationStatus::Ineligible,
            reason: Some(LEFT_COVERAGE_REASON.to_string()),
            validation_steps: Vec::new(),
            documents: Vec::new(),
        };
    }
    if EMPLOYMENT_CODES.contains(&code) {
        return CarryOverVerdict::needs_validation(
            "Submit updated proof of employment",
            employment_documents(code),
        );
    }
    if SOCIAL_CODES.contains(&code) {
        return CarryOverVerdict::needs_validation(
            "Renew the socioeconomic assessment",
            &SOCIAL_DOCUMENTS,
        );
    }
    CarryOverVerdict::eligible(&[])
}

const SOCIAL_DOCUMENTS: [&str; 5] = [
    "Proof of family income",
    "Proof of residence",
    "Income tax return",
    "Receipts for basic expenses",
    "Socioeconomic questionnaire",
];

/// Catalog variants such as `CEP10` or `ADIM2` belong to their base code.
pub fn code_family(code: &str) -> &str {
    ["CEP", "ADI"]
        .into_iter()
        .find(|family| code.starts_with(family))
        .unwrap_or(code)
}

fn annual_documents(code: &str) -> &'static [&'static str] {
    match code {
        "PAV" => &["Proof of upfront payment"],
        "CEP" => &["Updated proof of address"],
        "ADI" => &["Statement of good payment standing"],
        _ => &["Standard documentation"],
    }
}

fn employment_documents(code: &str) -> &'static [&'static str] {
    match code {
        "PASS" => &["Current payslip", "Employment record", "School statement"],
        "PBS" => &["Current payslip", "Union statement", "Employment record"],
        "COL" => &["Current payslip", "Staff ID card", "HR statement"],
        "SAE" => &["Current payslip", "Utility workers' union statement", "Employment record"],
        _ => &["Proof of employment"],
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
