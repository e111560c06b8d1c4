pub mod engine;
pub mod rules;
pub mod sink;

pub use engine::{evaluate_alerts, AlertEvent};
pub use rules::{apply_alert_rules, AlertEventKind};
pub use sink::{build_sinks, dispatch, AlertSink, StdoutSink, WebhookSink};
