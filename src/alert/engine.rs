use serde::{Deserialize, Serialize};

use crate::alert::rules::AlertEventKind;
use crate::pricing::CalculatedTotals;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub title: String,
    pub body: String,
}

/// Operator-facing events for one calculation plus the resolver's running
/// count of store calls that fell back to the built-in tables.
pub fn evaluate_alerts(totals: Option<&CalculatedTotals>, store_failures: u64) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    if let Some(totals) = totals {
        for case in &totals.critical_edge_cases {
            events.push(AlertEvent {
                kind: AlertEventKind::InvariantViolation,
                title: format!("Calculation invariant violated ({})", case.kind.as_slug()),
                body: format!(
                    "{}; track {}, base value {:.2}",
                    case.detail, totals.metadata.track_used, totals.base_value
                ),
            });
        }
    }

    if store_failures > 0 {
        events.push(AlertEvent {
            kind: AlertEventKind::StoreFallback,
            title: "Reference store unavailable".to_string(),
            body: format!("{store_failures} lookup(s) served from the built-in tables after retries"),
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::evaluate_alerts;
    use crate::alert::rules::{apply_alert_rules, AlertEventKind};
    use crate::config::AlertRulesConfig;
    use crate::pricing::{calculate, CalculationOptions, CriticalEdgeCase, EdgeCaseKind};

    #[test]
    fn clean_calculation_raises_nothing() {
        let totals = calculate(None, &[], 500.0, &CalculationOptions::default());
        assert!(evaluate_alerts(Some(&totals), 0).is_empty());
    }

    #[test]
    fn edge_cases_and_fallbacks_become_events() {
        let mut totals = calculate(None, &[], 500.0, &CalculationOptions::default());
        totals.critical_edge_cases.push(CriticalEdgeCase {
            kind: EdgeCaseKind::NegativeFinalValue,
            detail: "final value -1.00 is negative".to_string(),
        });
        let events = evaluate_alerts(Some(&totals), 3);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AlertEventKind::InvariantViolation);
        assert!(events[0].title.contains("negative_final_value"));
        assert!(events[1].body.starts_with("3 lookup(s)"));

        let rules = AlertRulesConfig {
            invariant_violation: true,
            store_fallback: false,
        };
        let kept = apply_alert_rules(events, &rules);
        assert_eq!(kept.len(), 1);
    }
}
