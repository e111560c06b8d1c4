use serde::{Deserialize, Serialize};

use crate::pricing::session::{calculate_by_ids, CalculationInput};
use crate::pricing::{CalculatedTotals, PricingRules};
use crate::resolver::Resolver;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedScenario {
    pub name: String,
    #[serde(flatten)]
    pub input: CalculationInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub totals: CalculatedTotals,
    /// Difference in final value against the first scenario.
    pub delta_from_first: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioComparison {
    pub outcomes: Vec<ScenarioOutcome>,
    pub lowest_final_value: Option<String>,
}

/// Runs each scenario independently and lines them up against the first.
pub async fn compare_scenarios(
    resolver: &Resolver,
    rules: &PricingRules,
    scenarios: &[NamedScenario],
) -> ScenarioComparison {
    let mut outcomes = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let totals = calculate_by_ids(resolver, rules, &scenario.input).await;
        outcomes.push(ScenarioOutcome {
            name: scenario.name.clone(),
            totals,
            delta_from_first: 0.0,
        });
    }

    if let Some(reference) = outcomes.first().map(|o| o.totals.final_value) {
        for outcome in &mut outcomes {
            outcome.delta_from_first = outcome.totals.final_value - reference;
        }
    }

    let lowest_final_value = outcomes
        .iter()
        .filter(|o| o.totals.is_valid())
        .min_by(|a, b| a.totals.final_value.total_cmp(&b.totals.final_value))
        .map(|o| o.name.clone());

    ScenarioComparison {
        outcomes,
        lowest_final_value,
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_scenarios, NamedScenario};
    use crate::pricing::{CalculationInput, PricingRules};
    use crate::resolver::Resolver;

    fn scenario(name: &str, track: &str, ids: &[&str]) -> NamedScenario {
        NamedScenario {
            name: name.to_string(),
            input: CalculationInput {
                track_id: Some(track.to_string()),
                discount_ids: ids.iter().map(|id| id.to_string()).collect(),
                base_value: 1000.0,
                ..CalculationInput::default()
            },
        }
    }

    #[tokio::test]
    async fn picks_cheapest_valid_scenario() {
        let resolver = Resolver::static_only();
        let comparison = compare_scenarios(
            &resolver,
            &PricingRules::default(),
            &[
                scenario("sibling only", "C", &["1"]),
                scenario("sibling and upfront", "C", &["1", "9"]),
                scenario("combined track", "B", &["1", "9"]),
            ],
        )
        .await;

        assert_eq!(comparison.outcomes.len(), 3);
        assert_eq!(comparison.outcomes[1].delta_from_first, -150.0);
        assert_eq!(comparison.lowest_final_value.as_deref(), Some("sibling and upfront"));
    }

    #[tokio::test]
    async fn empty_comparison() {
        let comparison =
            compare_scenarios(&Resolver::static_only(), &PricingRules::default(), &[]).await;
        assert!(comparison.outcomes.is_empty());
        assert!(comparison.lowest_final_value.is_none());
    }
}
