use crate::geo::GeoCategory;

#[derive(Debug, Clone, Copy)]
pub struct Verdict {
    pub eligible: bool,
    pub reason: Option<&'static str>,
    pub suggestion: Option<&'static str>,
}

const ALLOWED: Verdict = Verdict {
    eligible: true,
    reason: None,
    suggestion: None,
};

const fn blocked(reason: &'static str, suggestion: &'static str) -> Verdict {
    Verdict {
        eligible: false,
        reason: Some(reason),
        suggestion: Some(suggestion),
    }
}

/// Per-category verdicts for one geographically gated code.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub code: &'static str,
    pub high_income: Verdict,
    pub low_income: Verdict,
    pub outside: Verdict,
}

impl CategoryRule {
    pub fn verdict(&self, category: GeoCategory) -> Verdict {
        match category {
            GeoCategory::HighIncome => self.high_income,
            GeoCategory::LowIncome => self.low_income,
            GeoCategory::OutsideServiceArea => self.outside,
        }
    }
}

pub const CATEGORY_RULES: [CategoryRule; 4] = [
    CategoryRule {
        code: "RES",
        high_income: blocked(
            "Out-of-town discount does not apply to residents of the city",
            "Explore other discount types available for your situation",
        ),
        low_income: blocked(
            "Out-of-town discount does not apply to residents of the city",
            "Consider the automatic postal discount available for your area",
        ),
        outside: ALLOWED,
    },
    CategoryRule {
        code: "CEP",
        high_income: blocked(
            "Automatic postal discount is not available in higher-income neighborhoods",
            "Other discount types may be available for your situation",
        ),
        low_income: ALLOWED,
        outside: blocked(
            "Postal discount does not apply outside the city (use the RES discount)",
            "The out-of-town discount (RES) is available to you",
        ),
    },
    CategoryRule {
        code: "CEP5",
        high_income: blocked(
            "CEP5 discount is only available in lower-income neighborhoods",
            "Explore other discount types available",
        ),
        low_income: ALLOWED,
        outside: blocked(
            "CEP5 discount does not apply outside the city",
            "Consider the out-of-town discount (RES)",
        ),
    },
    CategoryRule {
        code: "CEP10",
        high_income: blocked(
            "CEP10 discount does not apply to residents of the city",
            "Explore other discount types available",
        ),
        low_income: blocked(
            "CEP10 discount does not apply to residents of the city",
            "The CEP5 discount may be available for your area",
        ),
        outside: ALLOWED,
    },
];

pub fn find_rule(code: &str) -> Option<&'static CategoryRule> {
    CATEGORY_RULES.iter().find(|rule| rule.code == code)
}
