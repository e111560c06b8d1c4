use serde::{Deserialize, Serialize};

use crate::alert::engine::AlertEvent;
use crate::config::AlertRulesConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    InvariantViolation,
    StoreFallback,
}

pub fn apply_alert_rules(alerts: Vec<AlertEvent>, rules: &AlertRulesConfig) -> Vec<AlertEvent> {
    alerts
        .into_iter()
        .filter(|event| match event.kind {
            AlertEventKind::InvariantViolation => rules.invariant_violation,
            AlertEventKind::StoreFallback => rules.store_fallback,
        })
        .collect()
}
