use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::catalog::DiscountLookup;
use crate::pricing::{calculate_with, CalculatedTotals, CalculationOptions, PricingRules};
use crate::resolver::sequencer::RequestSequencer;
use crate::resolver::Resolver;

const MEMO_LIMIT: usize = 256;

/// Everything a totals computation depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CalculationInput {
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub discount_ids: Vec<String>,
    pub base_value: f64,
    #[serde(default)]
    pub options: CalculationOptions,
    /// Chosen percentage for variable discounts, keyed by discount id or code.
    #[serde(default)]
    pub variable_percentages: BTreeMap<String, f64>,
}

/// Resolves ids through the resolver, then computes. An unknown track falls
/// back to the default rules.
pub async fn calculate_by_ids(
    resolver: &Resolver,
    rules: &PricingRules,
    input: &CalculationInput,
) -> CalculatedTotals {
    let track = match input.track_id.as_deref().filter(|id| !id.trim().is_empty()) {
        Some(id) => match resolver.resolve_track(id).await {
            Ok(track) => Some(track),
            Err(err) => {
                warn!(track_id = id, error = %err, "track unresolved, using default rules");
                None
            }
        },
        None => None,
    };

    let lookups: Vec<DiscountLookup> = resolver
        .resolve_discounts(&input.discount_ids)
        .await
        .into_iter()
        .map(|lookup| match lookup {
            DiscountLookup::Found(discount) if discount.is_variable() => {
                let chosen = input
                    .variable_percentages
                    .iter()
                    .find(|(key, _)| discount.matches(key))
                    .map(|(_, percentage)| *percentage);
                match chosen {
                    Some(percentage) => {
                        DiscountLookup::Found(discount.with_chosen_percentage(percentage))
                    }
                    None => DiscountLookup::Found(discount),
                }
            }
            other => other,
        })
        .collect();

    calculate_with(rules, track.as_ref(), &lookups, input.base_value, &input.options)
}

/// Memoized totals, tagged with the reference data they were built from.
struct MemoEntry {
    generation: u64,
    stored_at: Instant,
    totals: CalculatedTotals,
}

/// Explicit recomputation wrapper for interactive callers: memoizes by exact
/// input and drops results superseded by a newer `update`. Memo entries die
/// with the reference data generation they were computed against, or after
/// the resolver's shortest cache TTL.
pub struct PricingSession {
    resolver: Arc<Resolver>,
    rules: PricingRules,
    sequencer: RequestSequencer,
    memo: Mutex<HashMap<String, MemoEntry>>,
    latest: Mutex<Option<CalculatedTotals>>,
}

impl PricingSession {
    pub fn new(resolver: Arc<Resolver>, rules: PricingRules) -> Self {
        Self {
            resolver,
            rules,
            sequencer: RequestSequencer::new(),
            memo: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
        }
    }

    /// Returns `None` when a newer input arrived while this one was resolving.
    pub async fn update(&self, input: CalculationInput) -> Option<CalculatedTotals> {
        let ticket = self.sequencer.begin();
        let key = serde_json::to_string(&input).ok();

        let generation = self.resolver.generation();
        let ttl = self.resolver.shortest_ttl();

        let cached = match &key {
            Some(key) => self
                .memo
                .lock()
                .await
                .get(key)
                .filter(|entry| entry.generation == generation && entry.stored_at.elapsed() < ttl)
                .map(|entry| entry.totals.clone()),
            None => None,
        };
        let totals = match cached {
            Some(totals) => {
                debug!("pricing memo hit");
                totals
            }
            None => {
                let totals = calculate_by_ids(&self.resolver, &self.rules, &input).await;
                if let Some(key) = key {
                    let mut memo = self.memo.lock().await;
                    memo.retain(|_, entry| entry.generation == generation);
                    if memo.len() >= MEMO_LIMIT {
                        memo.clear();
                    }
                    memo.insert(
                        key,
                        MemoEntry {
                            generation,
                            stored_at: Instant::now(),
                            totals: totals.clone(),
                        },
                    );
                }
                totals
            }
        };

        let mut latest = self.latest.lock().await;
        if !self.sequencer.is_current(ticket) {
            debug!("discarding superseded pricing result");
            return None;
        }
        *latest = Some(totals.clone());
        Some(totals)
    }

    pub async fn latest(&self) -> Option<CalculatedTotals> {
        self.latest.lock().await.clone()
    }

    pub async fn memo_len(&self) -> usize {
        self.memo.lock().await.len()
    }

    pub async fn clear(&self) {
        self.memo.lock().await.clear();
        *self.latest.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::{calculate_by_ids, CalculationInput, PricingSession};
    use crate::pricing::{DiscountStatus, PricingRules, StatusReason};
    use crate::resolver::Resolver;

    fn input(track: Option<&str>, ids: &[&str], base: f64) -> CalculationInput {
        CalculationInput {
            track_id: track.map(str::to_string),
            discount_ids: ids.iter().map(|id| id.to_string()).collect(),
            base_value: base,
            ..CalculationInput::default()
        }
    }

    #[tokio::test]
    async fn resolves_ids_and_reports_missing() {
        let resolver = Resolver::static_only();
        let totals = calculate_by_ids(
            &resolver,
            &PricingRules::default(),
            &input(Some("C"), &["1", "9", "missing"], 1000.0),
        )
        .await;
        assert_eq!(totals.subtotal_percentage, 25.0);
        assert_eq!(totals.final_value, 750.0);
        let missing = &totals.discounts[2];
        assert_eq!(missing.status, DiscountStatus::Blocked);
        assert_eq!(missing.status_reason, Some(StatusReason::DiscountNotFound));
    }

    #[tokio::test]
    async fn unknown_track_uses_default_rules() {
        let resolver = Resolver::static_only();
        let totals = calculate_by_ids(
            &resolver,
            &PricingRules::default(),
            &input(Some("Z"), &["4", "5"], 1000.0),
        )
        .await;
        assert_eq!(totals.metadata.track_used, "default");
        assert_eq!(totals.applied_percentage, 60.0);
    }

    #[tokio::test]
    async fn variable_discount_takes_chosen_percentage() {
        let resolver = Resolver::static_only();
        let mut request = input(Some("A"), &["C4"], 1000.0);
        request.variable_percentages = BTreeMap::from([("COM_EXTRA".to_string(), 12.5)]);
        let totals = calculate_by_ids(&resolver, &PricingRules::default(), &request).await;
        assert_eq!(totals.applied_percentage, 12.5);
    }

    #[tokio::test]
    async fn session_memoizes_identical_inputs() {
        let session = PricingSession::new(Arc::new(Resolver::static_only()), PricingRules::default());
        let first = session
            .update(input(Some("B"), &["1", "2"], 800.0))
            .await
            .expect("current result");
        let second = session
            .update(input(Some("B"), &["1", "2"], 800.0))
            .await
            .expect("current result");
        assert_eq!(first, second);
        assert_eq!(session.memo_len().await, 1);
        assert_eq!(session.latest().await, Some(second));

        session.clear().await;
        assert!(session.latest().await.is_none());
    }

    #[tokio::test]
    async fn invalidation_drops_memoized_totals() {
        let resolver = Arc::new(Resolver::static_only());
        let session = PricingSession::new(Arc::clone(&resolver), PricingRules::default());
        session
            .update(input(Some("C"), &["1"], 500.0))
            .await
            .expect("current result");
        assert_eq!(session.memo_len().await, 1);

        resolver.invalidate().await;
        session
            .update(input(Some("C"), &["2"], 500.0))
            .await
            .expect("current result");
        assert_eq!(session.memo_len().await, 1, "entries from the old generation are pruned");
    }
}
