//! Core sync logic for aspire-duck-sync.

use crate::aspire::{AspireClient, FetchRequest, RecordSource};
use crate::config::{EntityMapping, RetryConfig, SyncBehaviorConfig, SyncConfig};
use crate::error::Result;
use crate::extract::extract_children;
use crate::merge::upsert;
use crate::metrics::{Metrics, MetricsSnapshot, Timer};
use crate::motherduck::MotherDuckClient;
use crate::record::RecordTable;
use crate::store::TableStore;
use crate::watermark::watermark;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Run-level sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Honour each entity's own full refresh flag
    #[default]
    Incremental,
    /// Treat every entity as a full refresh
    Full,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Incremental => write!(f, "incremental"),
            SyncMode::Full => write!(f, "full"),
        }
    }
}

/// How one entity is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Fetch everything and replace every table
    Full,
    /// Read the stored table only
    Snapshot,
    /// Fetch from the watermark and merge
    Incremental,
}

impl LoadMode {
    /// Pick the load mode of `mapping`.
    pub fn select(mapping: &EntityMapping, run: SyncMode) -> Self {
        if mapping.full_refresh || run == SyncMode::Full {
            LoadMode::Full
        } else if mapping.date_column.is_none() {
            LoadMode::Snapshot
        } else {
            LoadMode::Incremental
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Full => write!(f, "full"),
            LoadMode::Snapshot => write!(f, "snapshot"),
            LoadMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Tables produced by syncing one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityLoad {
    /// Load mode used
    pub mode: LoadMode,
    /// Parent table after the load
    pub parent: RecordTable,
    /// Child tables after the load, keyed by warehouse table name
    pub children: BTreeMap<String, RecordTable>,
    /// Lower bound of the fetch, if dated
    pub watermark: Option<String>,
    /// Records received from the source
    pub records_fetched: usize,
    /// Rows written, keyed by warehouse table name
    pub tables_written: BTreeMap<String, usize>,
}

impl EntityLoad {
    fn unchanged(mode: LoadMode, parent: RecordTable, watermark: Option<String>) -> Self {
        Self {
            mode,
            parent,
            children: BTreeMap::new(),
            watermark,
            records_fetched: 0,
            tables_written: BTreeMap::new(),
        }
    }
}

/// Sync result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Run identifier
    pub run_id: Uuid,
    /// Whether every entity synced
    pub success: bool,
    /// Sync mode used
    pub mode: SyncMode,
    /// Per-entity results, in sync order
    pub entities: Vec<EntitySyncResult>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when sync completed
    pub completed_at: String,
    /// Error message if failed
    pub error: Option<String>,
}

impl SyncResult {
    /// Get total records fetched.
    pub fn total_fetched(&self) -> usize {
        self.entities.iter().map(|e| e.records_fetched).sum()
    }

    /// Get total rows written across all tables.
    pub fn total_written(&self) -> usize {
        self.entities
            .iter()
            .flat_map(|e| e.tables_written.values())
            .sum()
    }

    /// Entities that failed.
    pub fn failed(&self) -> impl Iterator<Item = &EntitySyncResult> {
        self.entities.iter().filter(|e| !e.success)
    }
}

/// Per-entity sync result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySyncResult {
    /// Entity name
    pub entity: String,
    /// Target table name
    pub target_table: String,
    /// Load mode used
    pub mode: LoadMode,
    /// Whether sync was successful
    pub success: bool,
    /// Fetch lower bound, if dated
    pub watermark: Option<String>,
    /// Records fetched
    pub records_fetched: usize,
    /// Rows in the parent table after the load
    pub parent_rows: usize,
    /// Rows written per table
    pub tables_written: BTreeMap<String, usize>,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Error message if failed
    pub error: Option<String>,
}

/// Stored state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Entity name
    pub entity: String,
    /// Target table name
    pub target_table: String,
    /// Load mode an incremental run would use
    pub mode: LoadMode,
    /// Stored row count, `None` if the table does not exist
    pub rows: Option<usize>,
    /// Current watermark
    pub watermark: Option<String>,
}

/// Sync progress callback.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Sync progress update.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current entity being synced
    pub entity: String,
    /// Current phase
    pub phase: SyncPhase,
    /// Records processed so far
    pub records_processed: usize,
    /// Total records to process (if known)
    pub total_records: Option<usize>,
    /// Percentage complete (0-100)
    pub percent: u8,
}

/// Sync phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Reading stored tables
    Reading,
    /// Fetching records from the API
    Fetching,
    /// Extracting and merging tables
    Transforming,
    /// Writing tables
    Writing,
    /// Completed
    Completed,
    /// Failed
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Reading => write!(f, "reading"),
            SyncPhase::Fetching => write!(f, "fetching"),
            SyncPhase::Transforming => write!(f, "transforming"),
            SyncPhase::Writing => write!(f, "writing"),
            SyncPhase::Completed => write!(f, "completed"),
            SyncPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Drives extraction, formatting and merging for a record source and a
/// table store.
pub struct Synchronizer<S, W> {
    source: S,
    store: W,
    settings: SyncBehaviorConfig,
    metrics: Arc<Metrics>,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl<S: RecordSource, W: TableStore> Synchronizer<S, W> {
    /// Create a synchronizer.
    pub fn new(source: S, store: W, settings: SyncBehaviorConfig) -> Self {
        Self {
            source,
            store,
            settings,
            metrics: Arc::new(Metrics::new()),
            progress_callback: None,
        }
    }

    /// Share a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Record source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Table store.
    pub fn store(&self) -> &W {
        &self.store
    }

    /// Metrics collector.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Sync every mapping in order. A fatal error aborts the run; any other
    /// error fails only its entity.
    #[instrument(skip(self, mappings), fields(mode = %mode))]
    pub async fn run<'a>(
        &self,
        mappings: impl IntoIterator<Item = &'a EntityMapping>,
        mode: SyncMode,
    ) -> Result<SyncResult> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        info!("Starting {} sync (run {})", mode, run_id);

        let mut entities = Vec::new();
        for mapping in mappings {
            let load_mode = LoadMode::select(mapping, mode);
            let target_table = mapping.table_name(&self.settings);
            let timer = Timer::start(format!("sync {}", mapping.entity));

            let outcome = self.sync_entity(mapping, load_mode).await;
            let duration_ms = timer.stop();

            let result = match outcome {
                Ok(load) => {
                    self.metrics
                        .record_entity(true, load.records_fetched as u64, duration_ms);
                    EntitySyncResult {
                        entity: mapping.entity.to_string(),
                        target_table,
                        mode: load.mode,
                        success: true,
                        watermark: load.watermark,
                        records_fetched: load.records_fetched,
                        parent_rows: load.parent.len(),
                        tables_written: load.tables_written,
                        duration_ms,
                        error: None,
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Aborting sync at {}: {}", mapping.entity, e);
                    self.metrics.record_entity(false, 0, duration_ms);
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to sync {}: {}", mapping.entity, e);
                    self.metrics.record_entity(false, 0, duration_ms);
                    self.report_progress(mapping.entity.name(), SyncPhase::Failed, 0, None, 100);
                    EntitySyncResult {
                        entity: mapping.entity.to_string(),
                        target_table,
                        mode: load_mode,
                        success: false,
                        watermark: None,
                        records_fetched: 0,
                        parent_rows: 0,
                        tables_written: BTreeMap::new(),
                        duration_ms,
                        error: Some(format!("[{}] {}", e.code(), e)),
                    }
                }
            };
            entities.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let failed = entities.iter().filter(|e| !e.success).count();
        let result = SyncResult {
            run_id,
            success: failed == 0,
            mode,
            entities,
            duration_ms,
            completed_at: chrono::Utc::now().to_rfc3339(),
            error: (failed > 0).then(|| format!("{} entities failed to sync", failed)),
        };

        if result.success {
            info!(
                "Sync completed successfully in {}ms. Fetched: {}, Written: {}, Entities: {}",
                duration_ms,
                result.total_fetched(),
                result.total_written(),
                result.entities.len()
            );
        } else {
            warn!(
                "Sync completed with errors in {}ms. Fetched: {}, Failed entities: {}",
                duration_ms,
                result.total_fetched(),
                failed
            );
        }

        Ok(result)
    }

    /// Sync one entity in the given mode.
    #[instrument(skip(self, mapping), fields(entity = %mapping.entity, mode = %mode))]
    pub async fn sync_entity(&self, mapping: &EntityMapping, mode: LoadMode) -> Result<EntityLoad> {
        let load = match mode {
            LoadMode::Full => self.full_load(mapping).await?,
            LoadMode::Snapshot => self.snapshot_load(mapping)?,
            LoadMode::Incremental => self.incremental_load(mapping).await?,
        };

        self.report_progress(
            mapping.entity.name(),
            SyncPhase::Completed,
            load.records_fetched,
            Some(load.records_fetched),
            100,
        );
        Ok(load)
    }

    async fn full_load(&self, mapping: &EntityMapping) -> Result<EntityLoad> {
        let start_date = self.refresh_date(mapping);
        let request = self.request(mapping, mapping.date_column.as_ref().map(|_| start_date.clone()));
        let target = mapping.table_name(&self.settings);

        let fetched = self.fetch(mapping, &request).await?;
        if fetched.is_empty() {
            warn!("Full refresh of {} returned no records; clearing its tables", mapping.entity);
        }

        let records_fetched = fetched.len();
        self.report_progress(mapping.entity.name(), SyncPhase::Transforming, 0, Some(records_fetched), 40);
        let extraction = extract_children(fetched, mapping.entity.config())?;

        let mut tables_written = BTreeMap::new();
        tables_written.insert(target.clone(), self.write(&target, &extraction.parent)?);

        let mut children = BTreeMap::new();
        for (name, child) in extraction.children {
            let table = self.settings.table_name(&name);
            tables_written.insert(table.clone(), self.write(&table, &child.table)?);
            children.insert(table, child.table);
        }

        Ok(EntityLoad {
            mode: LoadMode::Full,
            parent: extraction.parent,
            children,
            watermark: mapping.date_column.as_ref().map(|_| start_date),
            records_fetched,
            tables_written,
        })
    }

    fn snapshot_load(&self, mapping: &EntityMapping) -> Result<EntityLoad> {
        let target = mapping.table_name(&self.settings);
        self.report_progress(mapping.entity.name(), SyncPhase::Reading, 0, None, 10);

        let parent = self.store.read_table(&target)?.unwrap_or_else(|| {
            debug!("No stored snapshot for {}", target);
            RecordTable::new()
        });
        info!("Loaded snapshot of {}: {} rows", target, parent.len());
        Ok(EntityLoad::unchanged(LoadMode::Snapshot, parent, None))
    }

    async fn incremental_load(&self, mapping: &EntityMapping) -> Result<EntityLoad> {
        let target = mapping.table_name(&self.settings);
        self.report_progress(mapping.entity.name(), SyncPhase::Reading, 0, None, 10);

        let existing = self.store.read_table(&target)?.unwrap_or_default();
        let since = mapping
            .date_column
            .as_deref()
            .and_then(|col| watermark(&existing, col))
            .unwrap_or_else(|| {
                let fallback = self.refresh_date(mapping);
                debug!("No watermark in {}; starting from {}", target, fallback);
                fallback
            });
        info!("Watermark for {}: {} ({} stored rows)", mapping.entity, since, existing.len());

        let request = self.request(mapping, Some(since.clone()));
        let fetched = self.fetch(mapping, &request).await?;
        if fetched.is_empty() {
            info!("No new records for {}", mapping.entity);
            return Ok(EntityLoad::unchanged(LoadMode::Incremental, existing, Some(since)));
        }

        let records_fetched = fetched.len();
        self.report_progress(mapping.entity.name(), SyncPhase::Transforming, 0, Some(records_fetched), 40);
        let extraction = extract_children(fetched, mapping.entity.config())?;

        let mut tables_written = BTreeMap::new();
        let mut children = BTreeMap::new();
        for (name, child) in extraction.children {
            let table = self.settings.table_name(&name);
            let stored = self.store.read_table(&table)?.unwrap_or_default();
            let merged = upsert(stored, Some(child.table), &child.link_column);
            tables_written.insert(table.clone(), self.write(&table, &merged)?);
            children.insert(table, merged);
        }

        let parent = upsert(existing, Some(extraction.parent), &mapping.id_column);
        tables_written.insert(target.clone(), self.write(&target, &parent)?);

        Ok(EntityLoad {
            mode: LoadMode::Incremental,
            parent,
            children,
            watermark: Some(since),
            records_fetched,
            tables_written,
        })
    }

    /// Stored row count and watermark of `mapping`.
    pub fn status(&self, mapping: &EntityMapping) -> Result<EntityStatus> {
        let target = mapping.table_name(&self.settings);
        let stored = self.store.read_table(&target)?;
        let watermark = match (&stored, mapping.date_column.as_deref()) {
            (Some(table), Some(col)) => watermark(table, col),
            _ => None,
        };

        Ok(EntityStatus {
            entity: mapping.entity.to_string(),
            target_table: target,
            mode: LoadMode::select(mapping, SyncMode::Incremental),
            rows: stored.map(|t| t.len()),
            watermark,
        })
    }

    fn refresh_date(&self, mapping: &EntityMapping) -> String {
        mapping
            .refresh_date
            .clone()
            .unwrap_or_else(|| self.settings.default_start_date.clone())
    }

    fn request(&self, mapping: &EntityMapping, since: Option<String>) -> FetchRequest {
        let request = FetchRequest::new(mapping.entity.name());
        let request = match (&mapping.date_column, since) {
            (Some(col), Some(since)) => request.since(col, since),
            _ => request,
        };
        request.with_id_filter(mapping.id_filter.clone())
    }

    async fn fetch(&self, mapping: &EntityMapping, request: &FetchRequest) -> Result<RecordTable> {
        self.report_progress(mapping.entity.name(), SyncPhase::Fetching, 0, None, 20);
        let records = self.source.fetch_records(request).await?;
        info!("Fetched {} records for {}", records.len(), mapping.entity);
        Ok(RecordTable::from_json_records(records))
    }

    fn write(&self, table: &str, rows: &RecordTable) -> Result<usize> {
        if self.settings.dry_run {
            info!("Dry run: would write {} rows to {}", rows.len(), table);
            return Ok(0);
        }
        self.report_progress(table, SyncPhase::Writing, 0, Some(rows.len()), 75);
        let written = self.store.write_table(table, rows)?;
        self.metrics.record_table_write(written as u64);
        Ok(written)
    }

    fn report_progress(
        &self,
        entity: &str,
        phase: SyncPhase,
        records_processed: usize,
        total_records: Option<usize>,
        percent: u8,
    ) {
        if let Some(ref callback) = self.progress_callback {
            callback(SyncProgress {
                entity: entity.to_string(),
                phase,
                records_processed,
                total_records,
                percent,
            });
        }
    }
}

/// Main sync client: Aspire API to MotherDuck.
pub struct SyncClient {
    config: SyncConfig,
    syncer: Synchronizer<AspireClient, MotherDuckClient>,
}

impl SyncClient {
    /// Authenticate with the API and connect to the warehouse. Fails if the
    /// token exchange fails.
    #[instrument(skip(config))]
    pub async fn new(config: SyncConfig) -> Result<Self> {
        info!("Initializing sync client...");
        let metrics = Arc::new(Metrics::new());

        let aspire = AspireClient::new(config.aspire.clone(), config.retry.clone())?
            .with_metrics(metrics.clone());
        aspire.authenticate().await?;

        let md_client = MotherDuckClient::connect(config.motherduck.clone())?
            .with_batch_size(config.sync.batch_size);

        let syncer =
            Synchronizer::new(aspire, md_client, config.sync.clone()).with_metrics(metrics);

        Ok(Self { config, syncer })
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        self.syncer = self.syncer.with_progress(callback);
        self
    }

    /// Test the token exchange and warehouse connectivity.
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity...");

        self.syncer.source().authenticate().await?;
        info!("Aspire API: OK");

        self.syncer.store().ping()?;
        info!("MotherDuck: OK");

        Ok(())
    }

    /// Sync enabled entities, optionally restricted to `only`.
    pub async fn sync(&self, mode: SyncMode, only: &[String]) -> Result<SyncResult> {
        info!("Config has {} entities", self.config.entities.len());
        self.syncer
            .run(self.config.selected_entities(only), mode)
            .await
    }

    /// Stored state of enabled entities.
    pub fn status(&self, only: &[String]) -> Result<Vec<EntityStatus>> {
        self.config
            .selected_entities(only)
            .map(|m| self.syncer.status(m))
            .collect()
    }

    /// Metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.syncer.metrics().snapshot()
    }
}

/// Create exponential backoff from config.
pub fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_backoff())
        .with_max_interval(config.max_backoff())
        .with_multiplier(config.multiplier)
        .with_randomization_factor(if config.jitter { 0.5 } else { 0.0 })
        .with_max_elapsed_time(Some(Duration::from_secs(300)))
        .build()
}
