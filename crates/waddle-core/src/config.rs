use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (`waddle.toml` + `WADDLE_*` env overrides), per the
/// environment-driven configuration contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaddleConfig {
    #[serde(default)]
    pub module: ModuleConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Default for WaddleConfig {
    fn default() -> Self {
        Self {
            module: ModuleConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            stream: StreamConfig::default(),
            router: RouterConfig::default(),
            auth: AuthConfig::default(),
            translation: TranslationConfig::default(),
            workflow: WorkflowConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default = "default_module_name")]
    pub name: String,
    #[serde(default = "default_module_version")]
    pub version: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: default_module_name(),
            version: default_module_version(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_url")]
    pub url: String,
    #[serde(default = "default_l1_ttl_secs")]
    pub l1_ttl_secs: u64,
    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: u64,
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            l1_ttl_secs: default_l1_ttl_secs(),
            l2_ttl_secs: default_l2_ttl_secs(),
            l1_max_entries: default_l1_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stream_prefix")]
    pub prefix: String,
    #[serde(default = "default_dlq_prefix")]
    pub dlq_prefix: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_stream_prefix(),
            dlq_prefix: default_dlq_prefix(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            max_len: default_max_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_url")]
    pub url: String,
    #[serde(default = "default_module_timeout_ms")]
    pub module_timeout_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// Statically-known triggers to register at startup. Interaction
    /// modules live out of process, so this is the bootstrap mechanism in
    /// place of a runtime module-registration endpoint.
    #[serde(default)]
    pub triggers: Vec<TriggerBootstrap>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            url: default_router_url(),
            module_timeout_ms: default_module_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            triggers: Vec::new(),
        }
    }
}

/// One `[[router.triggers]]` entry: a config-level mirror of
/// `waddle-router`'s `Trigger` row, kept string-typed here so `waddle-core`
/// does not need to depend on `waddle-router` to describe it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerBootstrap {
    pub pattern: String,
    /// One of `command_prefix | greeting | farewell | wildcard | event_type`.
    pub kind: String,
    pub module_name: String,
    #[serde(default)]
    pub priority: i32,
    /// One of `visitor | member | moderator | admin | owner`; defaults to
    /// `member`.
    #[serde(default = "default_required_role")]
    pub required_role: String,
}

fn default_required_role() -> String {
    "member".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_algorithm: default_jwt_algorithm(),
            jwt_expiration_seconds: default_jwt_expiration_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_ai_decision_mode")]
    pub ai_decision_mode: String,
    /// Base URL of the commercial provider; the provider is left out of the
    /// fallback chain entirely when unset, since an unconfigured commercial
    /// endpoint always fails its own health check regardless and omitting
    /// it avoids a pointless network round trip every call.
    #[serde(default)]
    pub commercial_base_url: Option<String>,
    #[serde(default)]
    pub commercial_api_key: Option<String>,
    #[serde(default = "default_lightweight_base_url")]
    pub lightweight_base_url: String,
    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            confidence_threshold: default_confidence_threshold(),
            ai_decision_mode: default_ai_decision_mode(),
            commercial_base_url: None,
            commercial_api_key: None,
            lightweight_base_url: default_lightweight_base_url(),
            ai_base_url: default_ai_base_url(),
            ai_model: default_ai_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_connections: default_max_connections(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_hmac_algorithm")]
    pub hmac_default_algorithm: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_webhook_timeout_ms(),
            hmac_default_algorithm: default_hmac_algorithm(),
        }
    }
}

fn default_module_name() -> String {
    "waddle-router".to_string()
}
fn default_module_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_database_url() -> String {
    "waddle.db".to_string()
}
fn default_cache_url() -> String {
    "waddle-cache.db".to_string()
}
fn default_l1_ttl_secs() -> u64 {
    3600
}
fn default_l2_ttl_secs() -> u64 {
    86_400
}
fn default_l1_max_entries() -> usize {
    10_000
}
fn default_stream_prefix() -> String {
    "waddlebot:stream".to_string()
}
fn default_dlq_prefix() -> String {
    "waddlebot:dlq".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    10
}
fn default_block_ms() -> u64 {
    5000
}
fn default_max_len() -> usize {
    10_000
}
fn default_router_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_module_timeout_ms() -> u64 {
    30_000
}
fn default_session_timeout_ms() -> u64 {
    60_000
}
fn default_jwt_secret() -> String {
    "change-me".to_string()
}
fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}
fn default_jwt_expiration_secs() -> u64 {
    3600
}
fn default_min_words() -> usize {
    5
}
fn default_confidence_threshold() -> f64 {
    0.70
}
fn default_ai_decision_mode() -> String {
    "uncertain".to_string()
}
fn default_lightweight_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_ai_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ai_model() -> String {
    "llama3".to_string()
}
fn default_max_nodes() -> usize {
    100
}
fn default_max_connections() -> usize {
    200
}
fn default_max_depth() -> usize {
    20
}
fn default_webhook_timeout_ms() -> u64 {
    10_000
}
fn default_hmac_algorithm() -> String {
    "sha256".to_string()
}

impl WaddleConfig {
    /// Load config from a TOML file with `WADDLE_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `./waddle.toml`.
    /// Every field has a built-in default, so a missing file is not an error.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(|| "waddle.toml".to_string());

        let config: WaddleConfig = Figment::from(figment::providers::Serialized::defaults(
            WaddleConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("WADDLE_").split("_"))
        .extract()
        .map_err(|e| crate::error::WaddleError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let cfg = WaddleConfig::default();
        assert_eq!(cfg.stream.max_retries, 3);
        assert_eq!(cfg.stream.batch_size, 10);
        assert_eq!(cfg.stream.block_ms, 5000);
        assert!(!cfg.stream.enabled);
        assert_eq!(cfg.translation.min_words, 5);
        assert_eq!(cfg.translation.confidence_threshold, 0.70);
        assert_eq!(cfg.workflow.max_nodes, 100);
        assert_eq!(cfg.workflow.max_connections, 200);
        assert_eq!(cfg.workflow.max_depth, 20);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = WaddleConfig::load(Some("/nonexistent/path/waddle.toml")).unwrap();
        assert_eq!(cfg.module.port, 8000);
    }
}
