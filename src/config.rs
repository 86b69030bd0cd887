//! Configuration types and builders for aspire-duck-sync.

use crate::error::{Error, ErrorContext, Result};
use crate::registry::Entity;
use crate::watermark::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

/// Main configuration for the sync client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncConfig {
    /// Aspire API configuration
    #[validate(nested)]
    pub aspire: AspireConfig,

    /// MotherDuck connection configuration
    #[validate(nested)]
    pub motherduck: MotherDuckConfig,

    /// Sync behavior configuration
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncBehaviorConfig,

    /// Entities to sync, in order
    #[serde(default)]
    #[validate(nested)]
    pub entities: Vec<EntityMapping>,

    /// Retry configuration
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("ASPIRE_CLIENT_ID")
            .map_err(|_| Error::config("ASPIRE_CLIENT_ID not set"))?;
        let client_secret = std::env::var("ASPIRE_CLIENT_SECRET")
            .map_err(|_| Error::config("ASPIRE_CLIENT_SECRET not set"))?;

        let mut builder = Self::builder()
            .client_id(client_id)
            .client_secret(client_secret);

        if let Ok(base_url) = std::env::var("ASPIRE_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        match std::env::var("DUCKDB_PATH") {
            Ok(path) => builder = builder.local_path(path),
            Err(_) => {
                let token = std::env::var("MOTHERDUCK_TOKEN")
                    .map_err(|_| Error::config("MOTHERDUCK_TOKEN or DUCKDB_PATH not set"))?;
                builder = builder.motherduck_token(token);
            }
        }

        let database =
            std::env::var("MOTHERDUCK_DATABASE").unwrap_or_else(|_| default_database());

        builder.motherduck_database(database).build()
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;

        Self::from_toml(&content).map_err(|e| match e {
            Error::Config { message, source } => Error::Config {
                message: format!("{}: {}", path, message),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Config validation failed: {}", e)))
    }

    /// Enabled entity mappings, optionally restricted to the given names.
    pub fn selected_entities<'a>(&'a self, only: &'a [String]) -> impl Iterator<Item = &'a EntityMapping> + 'a {
        self.entities.iter().filter(move |m| {
            m.enabled && (only.is_empty() || only.iter().any(|n| n == m.entity.name()))
        })
    }
}

/// Aspire API configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AspireConfig {
    /// API base URL
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token exchange URL (defaults to `{base_url}/Authorization`)
    #[validate(url)]
    #[serde(default)]
    pub auth_url: Option<String>,

    /// API client identifier
    #[validate(length(min = 1))]
    pub client_id: String,

    /// API client secret
    #[validate(length(min = 1))]
    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Records per page
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request timeout, e.g. `"30s"` or `"2m"`
    #[validate(custom(function = "validate_duration"))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

impl Default for AspireConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl AspireConfig {
    /// Token exchange endpoint.
    pub fn auth_endpoint(&self) -> String {
        self.auth_url
            .clone()
            .unwrap_or_else(|| format!("{}/Authorization", self.base_url.trim_end_matches('/')))
    }

    /// Endpoint of one data feed.
    pub fn feed_endpoint(&self, entity: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), entity)
    }

    /// Parsed request timeout.
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout).map_err(|e| {
            Error::config(format!(
                "Invalid request_timeout '{}': {}",
                self.request_timeout, e
            ))
        })
    }
}

/// MotherDuck connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_motherduck"))]
pub struct MotherDuckConfig {
    /// Access token
    #[serde(default, skip_serializing)]
    pub token: String,

    /// Database name
    #[validate(length(min = 1, max = 128))]
    #[serde(default = "default_database")]
    pub database: String,

    /// Schema name
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Create database if not exists
    #[serde(default = "default_true")]
    pub create_database: bool,

    /// Local DuckDB file (or `:memory:`) used instead of MotherDuck
    #[serde(default)]
    pub local_path: Option<String>,
}

impl Default for MotherDuckConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            database: default_database(),
            schema: default_schema(),
            create_database: true,
            local_path: None,
        }
    }
}

impl MotherDuckConfig {
    /// Configuration for an in-memory DuckDB database.
    pub fn in_memory() -> Self {
        Self {
            local_path: Some(":memory:".into()),
            ..Default::default()
        }
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncBehaviorConfig {
    /// Start date for full refreshes and for entities with no stored data
    #[validate(custom(function = "validate_date"))]
    #[serde(default = "default_start_date")]
    pub default_start_date: String,

    /// Prefix of warehouse table names
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Rows per INSERT statement
    #[validate(range(min = 1, max = 100000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fetch and transform but do not write
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SyncBehaviorConfig {
    fn default() -> Self {
        Self {
            default_start_date: default_start_date(),
            table_prefix: default_table_prefix(),
            batch_size: default_batch_size(),
            dry_run: false,
        }
    }
}

impl SyncBehaviorConfig {
    /// Warehouse table name of an entity.
    pub fn table_name(&self, entity: &str) -> String {
        format!("{}{}", self.table_prefix, entity)
    }
}

/// Extra equality filter appended to the date filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFilter {
    /// Column name
    pub key: String,
    /// Literal value, inserted as-is
    pub value: String,
}

/// One entity to sync.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EntityMapping {
    /// Aspire data feed
    pub entity: Entity,

    /// Warehouse table (defaults to prefix + entity name)
    #[validate(length(min = 1, max = 128))]
    #[serde(default)]
    pub target_table: Option<String>,

    /// Date column used as the watermark; `None` makes the entity a snapshot
    #[serde(default)]
    pub date_column: Option<String>,

    /// Identifier column used for the parent upsert
    #[validate(length(min = 1, max = 128))]
    pub id_column: String,

    /// Ignore stored data and reload everything
    #[serde(default)]
    pub full_refresh: bool,

    /// Start date of a full refresh (defaults to the sync default)
    #[validate(custom(function = "validate_date"))]
    #[serde(default)]
    pub refresh_date: Option<String>,

    /// Optional extra equality filter
    #[serde(default)]
    pub id_filter: Option<IdFilter>,

    /// Enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EntityMapping {
    /// Create a builder.
    pub fn builder() -> EntityMappingBuilder {
        EntityMappingBuilder::default()
    }

    /// Warehouse table of this entity.
    pub fn table_name(&self, sync: &SyncBehaviorConfig) -> String {
        self.target_table
            .clone()
            .unwrap_or_else(|| sync.table_name(self.entity.name()))
    }
}

/// Builder for EntityMapping.
#[derive(Debug)]
pub struct EntityMappingBuilder {
    entity: Option<Entity>,
    target_table: Option<String>,
    date_column: Option<String>,
    id_column: Option<String>,
    full_refresh: bool,
    refresh_date: Option<String>,
    id_filter: Option<IdFilter>,
    enabled: bool,
}

impl Default for EntityMappingBuilder {
    fn default() -> Self {
        Self {
            entity: None,
            target_table: None,
            date_column: None,
            id_column: None,
            full_refresh: false,
            refresh_date: None,
            id_filter: None,
            enabled: true,
        }
    }
}

impl EntityMappingBuilder {
    /// Set the data feed.
    pub fn entity(mut self, entity: impl Into<Entity>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the data feed by name.
    pub fn entity_name(mut self, name: &str) -> Self {
        self.entity = Some(Entity::parse(name));
        self
    }

    /// Set the warehouse table name.
    pub fn target_table(mut self, name: impl Into<String>) -> Self {
        self.target_table = Some(name.into());
        self
    }

    /// Set the watermark date column.
    pub fn date_column(mut self, col: impl Into<String>) -> Self {
        self.date_column = Some(col.into());
        self
    }

    /// Set the identifier column.
    pub fn id_column(mut self, col: impl Into<String>) -> Self {
        self.id_column = Some(col.into());
        self
    }

    /// Set the full refresh flag.
    pub fn full_refresh(mut self, full: bool) -> Self {
        self.full_refresh = full;
        self
    }

    /// Set the full refresh start date.
    pub fn refresh_date(mut self, date: impl Into<String>) -> Self {
        self.refresh_date = Some(date.into());
        self
    }

    /// Add an equality filter.
    pub fn id_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.id_filter = Some(IdFilter {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Set enabled flag.
    pub fn enabled(mut self, e: bool) -> Self {
        self.enabled = e;
        self
    }

    /// Build the EntityMapping.
    pub fn build(self) -> Result<EntityMapping> {
        let entity = self
            .entity
            .ok_or_else(|| Error::config("entity required"))?;
        let id_column = self
            .id_column
            .or_else(|| entity.config().map(|c| c.id_column.to_string()))
            .ok_or_else(|| Error::config(format!("id_column required for {}", entity)))?;

        Ok(EntityMapping {
            entity,
            target_table: self.target_table,
            date_column: self.date_column,
            id_column,
            full_refresh: self.full_refresh,
            refresh_date: self.refresh_date,
            id_filter: self.id_filter,
            enabled: self.enabled,
        })
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetryConfig {
    /// Max retry attempts
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Max backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Add jitter
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Get initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get max backoff duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// No retries; used by tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            ..Default::default()
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            timestamps: true,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Builder for SyncConfig.
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    base_url: Option<String>,
    auth_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    page_size: Option<usize>,
    motherduck_token: Option<String>,
    motherduck_database: Option<String>,
    motherduck_schema: Option<String>,
    local_path: Option<String>,
    default_start_date: Option<String>,
    table_prefix: Option<String>,
    batch_size: Option<usize>,
    max_retries: Option<u32>,
    entities: Vec<EntityMapping>,
    log_level: Option<String>,
}

impl SyncConfigBuilder {
    /// Set the Aspire API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the token exchange URL.
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// Set the API client identifier.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the API client secret.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set records per page.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set MotherDuck access token.
    pub fn motherduck_token(mut self, token: impl Into<String>) -> Self {
        self.motherduck_token = Some(token.into());
        self
    }

    /// Set MotherDuck database name.
    pub fn motherduck_database(mut self, db: impl Into<String>) -> Self {
        self.motherduck_database = Some(db.into());
        self
    }

    /// Set MotherDuck schema name.
    pub fn motherduck_schema(mut self, schema: impl Into<String>) -> Self {
        self.motherduck_schema = Some(schema.into());
        self
    }

    /// Use a local DuckDB file instead of MotherDuck.
    pub fn local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Set the default start date.
    pub fn default_start_date(mut self, date: impl Into<String>) -> Self {
        self.default_start_date = Some(date.into());
        self
    }

    /// Set the table name prefix.
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    /// Set batch size for inserts.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set max retry attempts.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Add an entity mapping.
    pub fn entity(mut self, mapping: EntityMapping) -> Self {
        self.entities.push(mapping);
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build the SyncConfig.
    pub fn build(self) -> Result<SyncConfig> {
        let client_id = self
            .client_id
            .ok_or_else(|| Error::config("client_id required"))?;
        let client_secret = self
            .client_secret
            .ok_or_else(|| Error::config("client_secret required"))?;

        let base_url = self.base_url.unwrap_or_else(default_base_url);
        Url::parse(&base_url).map_err(|e| Error::config(format!("Invalid base URL: {}", e)))?;

        if self.motherduck_token.is_none() && self.local_path.is_none() {
            return Err(Error::config("motherduck_token or local_path required"));
        }

        let config = SyncConfig {
            aspire: AspireConfig {
                base_url,
                auth_url: self.auth_url,
                client_id,
                client_secret,
                page_size: self.page_size.unwrap_or_else(default_page_size),
                ..Default::default()
            },
            motherduck: MotherDuckConfig {
                token: self.motherduck_token.unwrap_or_default(),
                database: self.motherduck_database.unwrap_or_else(default_database),
                schema: self.motherduck_schema.unwrap_or_else(default_schema),
                local_path: self.local_path,
                ..Default::default()
            },
            sync: SyncBehaviorConfig {
                default_start_date: self.default_start_date.unwrap_or_else(default_start_date),
                table_prefix: self.table_prefix.unwrap_or_else(default_table_prefix),
                batch_size: self.batch_size.unwrap_or_else(default_batch_size),
                ..Default::default()
            },
            entities: if self.entities.is_empty() {
                default_entities()?
            } else {
                self.entities
            },
            retry: RetryConfig {
                max_retries: self.max_retries.unwrap_or_else(default_max_retries),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: self.log_level.unwrap_or_else(default_log_level),
                ..Default::default()
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn validate_date(value: &str) -> std::result::Result<(), ValidationError> {
    if parse_timestamp(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_date"))
    }
}

fn validate_duration(value: &str) -> std::result::Result<(), ValidationError> {
    humantime::parse_duration(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_duration"))
}

fn validate_motherduck(config: &MotherDuckConfig) -> std::result::Result<(), ValidationError> {
    if config.local_path.is_none() && config.token.is_empty() {
        return Err(ValidationError::new("token_or_local_path_required"));
    }
    Ok(())
}

// Defaults
fn default_base_url() -> String {
    "https://cloud-api.youraspire.com".into()
}
fn default_page_size() -> usize {
    1000
}
fn default_request_timeout() -> String {
    "60s".into()
}
fn default_database() -> String {
    "aspire".into()
}
fn default_schema() -> String {
    "main".into()
}
fn default_start_date() -> String {
    "2015-01-01".into()
}
fn default_table_prefix() -> String {
    "aspire_".into()
}
fn default_batch_size() -> usize {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

/// Compact entity config for JSON parsing from environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Data feed name
    pub entity: String,
    /// Watermark date column
    #[serde(default)]
    pub date: Option<String>,
    /// Identifier column
    pub id: String,
    /// Full refresh flag
    #[serde(default)]
    pub full_refresh: bool,
    /// Target table
    #[serde(default)]
    pub target: Option<String>,
    /// Enabled (default true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl From<EntityEntry> for EntityMapping {
    fn from(entry: EntityEntry) -> Self {
        EntityMapping {
            entity: Entity::parse(&entry.entity),
            target_table: entry.target,
            date_column: entry.date,
            id_column: entry.id,
            full_refresh: entry.full_refresh,
            refresh_date: None,
            id_filter: None,
            enabled: entry.enabled,
        }
    }
}

/// Wrapper struct for object format: `{"entities": [...]}`
#[derive(Debug, Deserialize)]
struct EntitiesWrapper {
    entities: Vec<EntityEntry>,
}

/// Parse entity mappings from JSON text, either `[{...}]` or
/// `{"entities": [{...}]}`.
pub fn parse_entities_json(json: &str) -> Result<Vec<EntityMapping>> {
    match serde_json::from_str::<Vec<EntityEntry>>(json) {
        Ok(entries) => {
            tracing::debug!("Parsed as array format: {} entities", entries.len());
            return Ok(entries.into_iter().map(EntityMapping::from).collect());
        }
        Err(e) => {
            tracing::debug!("Array format parse failed: {}", e);
        }
    }

    match serde_json::from_str::<EntitiesWrapper>(json) {
        Ok(wrapper) => {
            tracing::debug!("Parsed as object format: {} entities", wrapper.entities.len());
            return Ok(wrapper.entities.into_iter().map(EntityMapping::from).collect());
        }
        Err(e) => {
            tracing::debug!("Object format parse failed: {}", e);
        }
    }

    Err(Error::config(
        "Failed to parse entity config JSON: expected array [...] or object {\"entities\": [...]}",
    ))
}

/// Decode a base64-encoded entity config.
pub fn decode_entities_base64(encoded: &str) -> Result<Vec<EntityMapping>> {
    use base64::{Engine, engine::general_purpose::STANDARD};

    let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
        Error::config(format!("Failed to decode ASPIRE_ENTITIES_CONFIG base64: {}", e))
    })?;
    let json = String::from_utf8(decoded).map_err(|e| {
        Error::config(format!("ASPIRE_ENTITIES_CONFIG is not valid UTF-8: {}", e))
    })?;
    parse_entities_json(&json)
}

/// Load entity mappings from ASPIRE_ENTITIES_CONFIG (base64 JSON) or
/// ASPIRE_ENTITIES_JSON (plain JSON). Empty if neither is set.
pub fn entities_from_env() -> Result<Vec<EntityMapping>> {
    entities_from_vars(
        std::env::var("ASPIRE_ENTITIES_CONFIG").ok(),
        std::env::var("ASPIRE_ENTITIES_JSON").ok(),
    )
}

/// Resolve entity mappings from the values of the two entity variables.
/// The base64 form wins when both are present.
pub fn entities_from_vars(
    encoded: Option<String>,
    json: Option<String>,
) -> Result<Vec<EntityMapping>> {
    match (encoded, json) {
        (Some(encoded), _) => decode_entities_base64(&encoded),
        (None, Some(json)) => {
            tracing::debug!("Using ASPIRE_ENTITIES_JSON: {} bytes", json.len());
            parse_entities_json(&json)
        }
        (None, None) => {
            tracing::debug!("No ASPIRE_ENTITIES_CONFIG or ASPIRE_ENTITIES_JSON found");
            Ok(vec![])
        }
    }
}

fn default_entities() -> Result<Vec<EntityMapping>> {
    let entities = entities_from_env()?;
    if entities.is_empty() {
        tracing::warn!("No entities configured");
    } else {
        tracing::info!("Loaded {} entities from environment", entities.len());
    }
    Ok(entities)
}
