pub mod cache;
pub mod http;
pub mod sequencer;
pub mod sqlite;
pub mod strategy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::normalize::{clamp_percentage, resolve_approval_level, DEFAULT_AUTOMATIC_THRESHOLD};
use crate::catalog::{
    ApprovalLevel, Discount, DiscountLookup, Track, TrackConfig, TrackRestrictions,
};
use crate::config::{Config, StoreBackend};
use crate::resolver::cache::TtlCache;
use crate::resolver::http::{sha256_json, HttpReferenceStore};
use crate::resolver::sqlite::SqliteReferenceStore;
use crate::resolver::strategy::{ResolverStrategy, RetryPolicy, StaticStrategy, StoreStrategy};

pub const TRACK_TTL: Duration = Duration::from_secs(600);
pub const DISCOUNT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("track not found: {0}")]
    TrackNotFound(String),
    #[error("discount not found: {0}")]
    DiscountNotFound(String),
    #[error("no resolver strategy produced reference tables")]
    RefreshFailed,
}

/// Track row as served by a reference store. Missing columns fall back to
/// documented defaults in [`TrackRow::into_track`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "codigo")]
    pub code: Option<String>,
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default, alias = "descricao")]
    pub description: Option<String>,
    #[serde(default, alias = "cap_maximo")]
    pub cap_percentage: Option<f64>,
    #[serde(default, alias = "condicoes")]
    pub conditions: Option<Vec<String>>,
    #[serde(default, alias = "prioridade")]
    pub priority: Option<u32>,
    #[serde(default, alias = "permite_bolsa_integral")]
    pub allows_full_scholarship: Option<bool>,
    #[serde(default, alias = "permite_combinacao_descontos")]
    pub allows_discount_combination: Option<bool>,
    #[serde(default, alias = "nivel_aprovacao_automatica")]
    pub automatic_approval_threshold: Option<f64>,
    #[serde(default, alias = "tipos_desconto_excluidos")]
    pub excluded_discount_codes: Option<Vec<String>>,
    #[serde(default, alias = "tipos_desconto_obrigatorios")]
    pub required_discount_codes: Option<Vec<String>>,
    #[serde(default, alias = "valor_minimo_base")]
    pub minimum_base_value: Option<f64>,
    #[serde(default, alias = "ativo")]
    pub active: Option<bool>,
}

impl TrackRow {
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.id.eq_ignore_ascii_case(key)
            || self
                .code
                .as_deref()
                .map(|code| code.eq_ignore_ascii_case(key))
                .unwrap_or(false)
            || self
                .name
                .as_deref()
                .map(|name| name.to_uppercase() == key.to_uppercase())
                .unwrap_or(false)
    }

    pub fn into_track(self) -> Track {
        let defaults = TrackConfig::default();
        Track {
            code: self.code.unwrap_or_else(|| self.id.clone()),
            name: self.name.unwrap_or_else(|| self.id.clone()),
            description: self.description.unwrap_or_default(),
            cap_percentage: self.cap_percentage.map(clamp_percentage),
            conditions: self.conditions.unwrap_or_default(),
            priority: self.priority.unwrap_or(0),
            config: TrackConfig {
                allows_full_scholarship: self
                    .allows_full_scholarship
                    .unwrap_or(defaults.allows_full_scholarship),
                allows_discount_combination: self
                    .allows_discount_combination
                    .unwrap_or(defaults.allows_discount_combination),
                automatic_approval_threshold: self
                    .automatic_approval_threshold
                    .map(clamp_percentage)
                    .unwrap_or(DEFAULT_AUTOMATIC_THRESHOLD),
            },
            restrictions: TrackRestrictions {
                excluded_discount_codes: self.excluded_discount_codes.unwrap_or_default(),
                required_discount_codes: self.required_discount_codes.unwrap_or_default(),
                minimum_base_value: self.minimum_base_value,
            },
            active: self.active.unwrap_or(true),
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscountRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "codigo")]
    pub code: String,
    #[serde(default, alias = "descricao")]
    pub name: Option<String>,
    #[serde(default, alias = "categoria")]
    pub category: Option<String>,
    #[serde(default, alias = "percentual_fixo")]
    pub percentage: Option<f64>,
    #[serde(default, alias = "percentual_efetivo")]
    pub effective_percentage: Option<f64>,
    #[serde(default, alias = "percentual_maximo")]
    pub max_percentage: Option<f64>,
    #[serde(default, alias = "eh_variavel")]
    pub variable: Option<bool>,
    #[serde(default, alias = "documentos_necessarios")]
    pub required_documents: Option<Vec<String>>,
    #[serde(default, alias = "requer_aprovacao")]
    pub requires_approval: Option<bool>,
    #[serde(default, alias = "nivel_aprovacao_requerido")]
    pub approval_level: Option<String>,
    #[serde(default, alias = "ativo")]
    pub active: Option<bool>,
}

impl DiscountRow {
    pub fn into_discount(self) -> Discount {
        let base = clamp_percentage(self.percentage.unwrap_or(0.0));
        let effective = self.effective_percentage.map(clamp_percentage).unwrap_or(base);
        let max_percentage = match (self.variable, self.max_percentage) {
            (_, Some(max)) => Some(clamp_percentage(max)),
            (Some(true), None) => Some(100.0),
            _ => None,
        };
        let explicit_level = self.approval_level.as_deref().and_then(|raw| {
            raw.parse::<ApprovalLevel>()
                .map_err(|error| debug!("ignoring approval level on discount {}: {error}", self.id))
                .ok()
        });
        let requires_approval = self.requires_approval.unwrap_or(false);
        let approval_level = resolve_approval_level(explicit_level, requires_approval, effective);
        Discount {
            name: self.name.unwrap_or_else(|| self.code.clone()),
            category: self.category.unwrap_or_else(|| "general".to_string()),
            base_percentage: base,
            effective_percentage: effective,
            max_percentage,
            required_documents: self.required_documents.unwrap_or_default(),
            requires_approval: requires_approval || approval_level != ApprovalLevel::Automatic,
            approval_level,
            active: self.active.unwrap_or(true),
            id: self.id,
            code: self.code.trim().to_ascii_uppercase(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A live backing store for reference data.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    fn name(&self) -> &str;
    async fn get_track(&self, id: &str) -> Result<Option<TrackRow>>;
    async fn get_tracks(&self) -> Result<Vec<TrackRow>>;
    async fn get_discount_types(&self) -> Result<Vec<DiscountRow>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackLookup {
    Found(Track),
    NotFound { id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub source: String,
    pub fallback: bool,
    pub tracks: usize,
    pub discounts: usize,
    pub revision: String,
}

/// Track and discount lookup through an ordered list of strategies, with a
/// TTL cache in front.
pub struct Resolver {
    strategies: Vec<Arc<dyn ResolverStrategy>>,
    tracks: TtlCache<Track>,
    discounts: TtlCache<Discount>,
    generation: AtomicU64,
}

impl Resolver {
    pub fn new(
        strategies: Vec<Arc<dyn ResolverStrategy>>,
        track_ttl: Duration,
        discount_ttl: Duration,
    ) -> Self {
        Self {
            strategies,
            tracks: TtlCache::new(track_ttl),
            discounts: TtlCache::new(discount_ttl),
            generation: AtomicU64::new(0),
        }
    }

    pub fn static_only() -> Self {
        Self::new(vec![Arc::new(StaticStrategy)], TRACK_TTL, DISCOUNT_TTL)
    }

    /// Store first, built-in tables second.
    pub fn with_store(
        store: Arc<dyn ReferenceStore>,
        retry: RetryPolicy,
        track_ttl: Duration,
        discount_ttl: Duration,
    ) -> Self {
        Self::new(
            vec![
                Arc::new(StoreStrategy::new(store, retry)),
                Arc::new(StaticStrategy),
            ],
            track_ttl,
            discount_ttl,
        )
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy {
            max_retries: config.store.max_retries,
            track_backoff: Duration::from_millis(config.store.track_retry_backoff_ms),
            discount_backoff: Duration::from_millis(config.store.discount_retry_backoff_ms),
        };
        let store: Arc<dyn ReferenceStore> = match config.store.backend {
            StoreBackend::Static => {
                return Ok(Self::new(
                    vec![Arc::new(StaticStrategy)],
                    config.track_ttl(),
                    config.discount_ttl(),
                ))
            }
            StoreBackend::Http => {
                let api_key = Some(config.store.api_key.clone()).filter(|k| !k.trim().is_empty());
                Arc::new(HttpReferenceStore::new(config.store.url.clone(), api_key))
            }
            StoreBackend::Sqlite => Arc::new(SqliteReferenceStore::open(&config.resolved_db_path())?),
        };
        Ok(Self::with_store(
            store,
            retry,
            config.track_ttl(),
            config.discount_ttl(),
        ))
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Bumped on every successful refresh and on invalidation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Longest time a value derived from cached reference data stays current.
    pub fn shortest_ttl(&self) -> Duration {
        self.tracks.ttl().min(self.discounts.ttl())
    }

    /// Number of store calls that exhausted their retries.
    pub fn store_failures(&self) -> u64 {
        self.strategies.iter().map(|s| s.failure_count()).sum()
    }

    pub async fn resolve_track(&self, id: &str) -> std::result::Result<Track, ResolveError> {
        let key = id.trim();
        if let Some(track) = self.tracks.get(key).await {
            return Ok(track);
        }
        for strategy in &self.strategies {
            if let Some(track) = strategy.track(key).await {
                debug!("track {key} resolved by {}", strategy.name());
                self.tracks.insert(key, track.clone()).await;
                return Ok(track);
            }
        }
        Err(ResolveError::TrackNotFound(key.to_string()))
    }

    pub async fn resolve_tracks(&self, ids: &[String]) -> Vec<TrackLookup> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolve_track(id).await {
                Ok(track) => out.push(TrackLookup::Found(track)),
                Err(_) => out.push(TrackLookup::NotFound { id: id.clone() }),
            }
        }
        out
    }

    pub async fn resolve_discount(&self, id: &str) -> std::result::Result<Discount, ResolveError> {
        let lookups = self.resolve_discounts(&[id.to_string()]).await;
        match lookups.into_iter().next() {
            Some(DiscountLookup::Found(discount)) => Ok(discount),
            _ => Err(ResolveError::DiscountNotFound(id.trim().to_string())),
        }
    }

    /// Resolves every id; unknown ids come back as `NotFound` without failing
    /// the batch. Each strategy's table is fetched at most once per call.
    pub async fn resolve_discounts(&self, ids: &[String]) -> Vec<DiscountLookup> {
        let mut resolved: HashMap<String, Discount> = HashMap::new();
        let mut missing = Vec::new();
        for id in ids {
            let key = id.trim().to_string();
            if resolved.contains_key(&key) || missing.contains(&key) {
                continue;
            }
            match self.discounts.get(&key).await {
                Some(discount) => {
                    resolved.insert(key, discount);
                }
                None => missing.push(key),
            }
        }

        for strategy in &self.strategies {
            if missing.is_empty() {
                break;
            }
            let Some(table) = strategy.discounts().await else {
                continue;
            };
            let mut found = Vec::new();
            missing.retain(|key| match table.iter().find(|d| d.matches(key)) {
                Some(discount) => {
                    found.push((key.clone(), discount.clone()));
                    false
                }
                None => true,
            });
            debug!(
                "{} discounts resolved by {}",
                found.len(),
                strategy.name()
            );
            self.discounts.insert_many(found.clone()).await;
            resolved.extend(found);
        }

        ids.iter()
            .map(|id| {
                let key = id.trim();
                match resolved.get(key) {
                    Some(discount) => DiscountLookup::Found(discount.clone()),
                    None => DiscountLookup::NotFound { id: key.to_string() },
                }
            })
            .collect()
    }

    /// Full track table from the first strategy that answers.
    pub async fn list_tracks(&self) -> Vec<Track> {
        for strategy in &self.strategies {
            if let Some(mut tracks) = strategy.tracks().await {
                tracks.sort_by_key(|t| t.priority);
                return tracks;
            }
        }
        Vec::new()
    }

    pub async fn list_discounts(&self) -> Vec<Discount> {
        for strategy in &self.strategies {
            if let Some(discounts) = strategy.discounts().await {
                return discounts;
            }
        }
        Vec::new()
    }

    /// Reloads both tables from the first strategy that yields them and swaps
    /// the caches wholesale. On failure the previous cache stays untouched.
    pub async fn refresh(&self) -> std::result::Result<RefreshSummary, ResolveError> {
        for strategy in &self.strategies {
            let Some(tracks) = strategy.tracks().await else {
                continue;
            };
            let Some(discounts) = strategy.discounts().await else {
                continue;
            };
            let revision = sha256_json(&serde_json::json!({
                "tracks": tracks,
                "discounts": discounts,
            }));
            let summary = RefreshSummary {
                source: strategy.name().to_string(),
                fallback: strategy.is_fallback(),
                tracks: tracks.len(),
                discounts: discounts.len(),
                revision: revision.clone(),
            };
            self.tracks
                .replace_all(
                    tracks.into_iter().map(|t| (t.id.clone(), t)).collect(),
                    revision.clone(),
                )
                .await;
            self.discounts
                .replace_all(
                    discounts.into_iter().map(|d| (d.id.clone(), d)).collect(),
                    revision,
                )
                .await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            info!(
                "reference cache refreshed from {} ({} tracks, {} discounts)",
                summary.source, summary.tracks, summary.discounts
            );
            return Ok(summary);
        }
        Err(ResolveError::RefreshFailed)
    }

    pub async fn invalidate(&self) {
        self.tracks.invalidate().await;
        self.discounts.invalidate().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("reference cache invalidated");
    }

    pub async fn revision(&self) -> Option<String> {
        self.tracks.revision().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DiscountRow, ResolveError, Resolver, TrackRow};
    use crate::catalog::{ApprovalLevel, DiscountLookup};

    #[test]
    fn track_row_substitutes_documented_defaults() {
        let row: TrackRow = serde_json::from_value(json!({ "id": 7, "nome": "Bolsa" }))
            .expect("row should parse");
        assert!(row.matches("bolsa"));
        let track = row.into_track();
        assert_eq!(track.id, "7");
        assert_eq!(track.cap_percentage, None);
        assert!(track.config.allows_full_scholarship);
        assert!(track.config.allows_discount_combination);
        assert_eq!(track.config.automatic_approval_threshold, 20.0);
        assert!(track.active);
    }

    #[test]
    fn discount_row_defaults_and_normalizes() {
        let row: DiscountRow = serde_json::from_value(json!({
            "id": "x1",
            "codigo": "pbs",
            "percentual_fixo": 140,
            "requer_aprovacao": true
        }))
        .expect("row should parse");
        let discount = row.into_discount();
        assert_eq!(discount.code, "PBS");
        assert_eq!(discount.effective_percentage, 100.0);
        assert_eq!(discount.category, "general");
        assert_eq!(discount.approval_level, ApprovalLevel::Direction);
        assert!(discount.active);

        let plain: DiscountRow = serde_json::from_value(json!({
            "id": "x2",
            "codigo": "IIR",
            "percentual_fixo": 10
        }))
        .expect("row should parse");
        let plain = plain.into_discount();
        assert_eq!(plain.approval_level, ApprovalLevel::Automatic);
        assert!(!plain.requires_approval);
    }

    #[tokio::test]
    async fn static_resolver_falls_through_to_not_found() {
        let resolver = Resolver::static_only();
        let track = resolver.resolve_track("C").await.expect("track C");
        assert_eq!(track.cap_percentage, Some(60.0));
        let by_name = resolver.resolve_track("especial").await.expect("by name");
        assert_eq!(by_name.id, "A");
        assert_eq!(
            resolver.resolve_track("Z").await,
            Err(ResolveError::TrackNotFound("Z".to_string()))
        );

        let lookups = resolver
            .resolve_discounts(&["IIR".to_string(), "missing".to_string(), "7".to_string()])
            .await;
        assert!(matches!(&lookups[0], DiscountLookup::Found(d) if d.code == "IIR"));
        assert!(matches!(&lookups[1], DiscountLookup::NotFound { id } if id == "missing"));
        assert!(matches!(&lookups[2], DiscountLookup::Found(d) if d.code == "ABI"));
    }

    #[tokio::test]
    async fn refresh_reports_static_source() {
        let resolver = Resolver::static_only();
        let summary = resolver.refresh().await.expect("refresh");
        assert!(summary.fallback);
        assert_eq!(summary.tracks, 3);
        assert_eq!(resolver.revision().await, Some(summary.revision.clone()));
        resolver.invalidate().await;
        assert!(resolver.revision().await.is_none());
    }
}
