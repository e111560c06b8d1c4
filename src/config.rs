use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::finance::{FinanceRules, PaymentMethodRate};
use crate::migration::MigrationRules;
use crate::pricing::PricingRules;

pub const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub finance: FinanceConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Static,
    Http,
    Sqlite,
}

#[derive(Debug, Error)]
#[error("unknown store backend: {0}")]
pub struct StoreBackendParseError(pub String);

impl FromStr for StoreBackend {
    type Err = StoreBackendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "none" => Ok(Self::Static),
            "http" | "rest" => Ok(Self::Http),
            "sqlite" | "db" => Ok(Self::Sqlite),
            _ => Err(StoreBackendParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_track_backoff_ms")]
    pub track_retry_backoff_ms: u64,
    #[serde(default = "default_discount_backoff_ms")]
    pub discount_retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_track_ttl_secs")]
    pub track_ttl_secs: u64,
    #[serde(default = "default_discount_ttl_secs")]
    pub discount_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_cap")]
    pub default_cap_percentage: f64,
    #[serde(default = "default_automatic_threshold")]
    pub default_automatic_threshold: f64,
    #[serde(default = "default_coordination_ceiling")]
    pub coordination_ceiling: f64,
    #[serde(default = "default_tolerance")]
    pub percentage_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub currency_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceConfig {
    #[serde(default = "default_minimum_monthly_value")]
    pub minimum_monthly_value: f64,
    #[serde(default = "default_late_fine_percentage")]
    pub late_fine_percentage: f64,
    #[serde(default = "default_daily_interest_percentage")]
    pub daily_interest_percentage: f64,
    #[serde(default = "default_due_days")]
    pub due_days: Vec<u32>,
    #[serde(default = "default_installments")]
    pub default_installments: u32,
    #[serde(default = "default_payment_methods")]
    pub payment_methods: Vec<PaymentMethodRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_max_cumulative")]
    pub max_cumulative_percentage: f64,
    #[serde(default = "default_reference_base_value")]
    pub reference_base_value: f64,
    #[serde(default = "default_inherit_all_ratio")]
    pub inherit_all_ratio: f64,
    #[serde(default = "default_inherit_selected_ratio")]
    pub inherit_selected_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub rules: AlertRulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRulesConfig {
    #[serde(default = "default_true")]
    pub invariant_violation: bool,
    #[serde(default = "default_true")]
    pub store_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<StoreBackend>,
    pub store_url: Option<String>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/tuition-engine/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.backend {
            self.store.backend = backend;
        }
        if let Some(url) = overrides.store_url {
            self.store.url = url;
        }
        if let Some(db_path) = overrides.db_path {
            self.store.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    /// Copy safe to hand out over the API: credentials are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.store.api_key = mask(&copy.store.api_key);
        copy.alerts.webhook_url = mask(&copy.alerts.webhook_url);
        copy
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.store.db_path)
    }

    pub fn pricing_rules(&self) -> PricingRules {
        PricingRules {
            default_cap_percentage: self.pricing.default_cap_percentage,
            default_automatic_threshold: self.pricing.default_automatic_threshold,
            coordination_ceiling: self.pricing.coordination_ceiling,
            percentage_tolerance: self.pricing.percentage_tolerance,
            currency_tolerance: self.pricing.currency_tolerance,
        }
    }

    pub fn finance_rules(&self) -> FinanceRules {
        FinanceRules {
            minimum_monthly_value: self.finance.minimum_monthly_value,
            late_fine_percentage: self.finance.late_fine_percentage,
            daily_interest_percentage: self.finance.daily_interest_percentage,
            due_days: self.finance.due_days.clone(),
            default_installments: self.finance.default_installments,
            payment_methods: self.finance.payment_methods.clone(),
        }
    }

    pub fn migration_rules(&self) -> MigrationRules {
        MigrationRules {
            max_cumulative_percentage: self.migration.max_cumulative_percentage,
            reference_base_value: self.migration.reference_base_value,
            inherit_all_ratio: self.migration.inherit_all_ratio,
            inherit_selected_ratio: self.migration.inherit_selected_ratio,
        }
    }

    pub fn track_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.track_ttl_secs)
    }

    pub fn discount_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.discount_ttl_secs)
    }

    pub fn default_template() -> String {
        let template = r#"[store]
# static | http | sqlite
backend = "static"
url = ""
api_key = ""
db_path = "~/.local/share/tuition-engine/catalog.db"
max_retries = 2
track_retry_backoff_ms = 1500
discount_retry_backoff_ms = 1000

[cache]
track_ttl_secs = 600
discount_ttl_secs = 300

[pricing]
default_cap_percentage = 60.0
default_automatic_threshold = 20.0
coordination_ceiling = 50.0
percentage_tolerance = 0.01
currency_tolerance = 0.01

[finance]
minimum_monthly_value = 100.0
late_fine_percentage = 2.0
daily_interest_percentage = 0.033
due_days = [5, 10, 15, 20, 25]
default_installments = 12

[migration]
max_cumulative_percentage = 60.0
reference_base_value = 1000.0
inherit_all_ratio = 0.8
inherit_selected_ratio = 0.5

[alerts]
webhook_url = ""
enable_stdout = true

[alerts.rules]
invariant_violation = true
store_fallback = true

[server]
host = "127.0.0.1"
port = 3001
"#;
        template.to_string()
    }
}

fn mask(secret: &str) -> String {
    if secret.trim().is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            pricing: PricingConfig::default(),
            finance: FinanceConfig::default(),
            migration: MigrationConfig::default(),
            alerts: AlertsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            api_key: String::new(),
            db_path: default_db_path(),
            max_retries: default_max_retries(),
            track_retry_backoff_ms: default_track_backoff_ms(),
            discount_retry_backoff_ms: default_discount_backoff_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            track_ttl_secs: default_track_ttl_secs(),
            discount_ttl_secs: default_discount_ttl_secs(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_cap_percentage: default_cap(),
            default_automatic_threshold: default_automatic_threshold(),
            coordination_ceiling: default_coordination_ceiling(),
            percentage_tolerance: default_tolerance(),
            currency_tolerance: default_tolerance(),
        }
    }
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            minimum_monthly_value: default_minimum_monthly_value(),
            late_fine_percentage: default_late_fine_percentage(),
            daily_interest_percentage: default_daily_interest_percentage(),
            due_days: default_due_days(),
            default_installments: default_installments(),
            payment_methods: default_payment_methods(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_cumulative_percentage: default_max_cumulative(),
            reference_base_value: default_reference_base_value(),
            inherit_all_ratio: default_inherit_all_ratio(),
            inherit_selected_ratio: default_inherit_selected_ratio(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            enable_stdout: default_enable_stdout(),
            rules: AlertRulesConfig::default(),
        }
    }
}

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            invariant_violation: true,
            store_fallback: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Static
}

fn default_db_path() -> String {
    "~/.local/share/tuition-engine/catalog.db".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_track_backoff_ms() -> u64 {
    1500
}

fn default_discount_backoff_ms() -> u64 {
    1000
}

fn default_track_ttl_secs() -> u64 {
    600
}

fn default_discount_ttl_secs() -> u64 {
    300
}

fn default_cap() -> f64 {
    60.0
}

fn default_automatic_threshold() -> f64 {
    20.0
}

fn default_coordination_ceiling() -> f64 {
    50.0
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_minimum_monthly_value() -> f64 {
    100.0
}

fn default_late_fine_percentage() -> f64 {
    2.0
}

fn default_daily_interest_percentage() -> f64 {
    0.033
}

fn default_due_days() -> Vec<u32> {
    vec![5, 10, 15, 20, 25]
}

fn default_installments() -> u32 {
    12
}

fn default_payment_methods() -> Vec<PaymentMethodRate> {
    FinanceRules::default().payment_methods
}

fn default_max_cumulative() -> f64 {
    60.0
}

fn default_reference_base_value() -> f64 {
    1000.0
}

fn default_inherit_all_ratio() -> f64 {
    0.8
}

fn default_inherit_selected_ratio() -> f64 {
    0.5
}

fn default_enable_stdout() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigOverrides, StoreBackend, REDACTED};

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config =
            toml::from_str(&Config::default_template()).expect("template should parse");
        assert_eq!(parsed.store.backend, StoreBackend::Static);
        assert_eq!(parsed.store.max_retries, 2);
        assert_eq!(parsed.cache.track_ttl_secs, 600);
        assert_eq!(parsed.finance.due_days, vec![5, 10, 15, 20, 25]);
        assert_eq!(parsed.finance.payment_methods.len(), 5);
        assert_eq!(parsed.pricing_rules().default_cap_percentage, 60.0);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[store]
backend = "http"
url = "https://catalog.example.org/rest/v1"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.store.backend, StoreBackend::Http);
        assert_eq!(parsed.store.discount_retry_backoff_ms, 1000);
        assert_eq!(parsed.migration_rules().reference_base_value, 1000.0);
    }

    #[test]
    fn overrides_replace_store_settings() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            backend: Some(StoreBackend::Sqlite),
            store_url: None,
            db_path: Some("/tmp/catalog.db".to_string()),
        });
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.resolved_db_path().to_string_lossy(), "/tmp/catalog.db");
        assert!("rest".parse::<StoreBackend>().is_ok());
    }

    #[test]
    fn redacted_copy_masks_credentials() {
        let mut config = Config::default();
        config.store.api_key = "service-role-key".to_string();
        config.alerts.webhook_url = "https://hooks.example.org/T000/secret".to_string();

        let shown = config.redacted();
        assert_eq!(shown.store.api_key, REDACTED);
        assert_eq!(shown.alerts.webhook_url, REDACTED);
        assert_eq!(shown.store.url, config.store.url);
        let json = serde_json::to_string(&shown).expect("serializable");
        assert!(!json.contains("service-role-key"));
        assert!(!json.contains("secret"));

        assert_eq!(Config::default().redacted().store.api_key, "");
    }
}
