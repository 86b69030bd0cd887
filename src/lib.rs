//! # Aspire Duck Sync
//!
//! Incremental sync of Aspire REST API data feeds into MotherDuck.
//!
//! ## Features
//!
//! - **Incremental sync**: Fetch only records modified since the stored watermark
//! - **Full refresh**: Reload an entity from a start date and replace its tables
//! - **Child tables**: Nested record arrays are split into their own tables,
//!   linked by the parent's identifier
//! - **Upsert**: Changed rows replace their stored versions by identifier
//! - **Retry logic**: Automatic retries with exponential backoff
//! - **Progress tracking**: Real-time progress updates via callbacks
//! - **Metrics**: Built-in metrics for observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aspire_duck_sync::{EntityMapping, KnownEntity, SyncClient, SyncConfig, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder()
//!         .client_id("client-id")
//!         .client_secret("secret")
//!         .motherduck_token("your_token")
//!         .motherduck_database("aspire")
//!         .entity(
//!             EntityMapping::builder()
//!                 .entity(KnownEntity::Properties)
//!                 .date_column("ModifiedDate")
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     let client = SyncClient::new(config).await?;
//!     let result = client.sync(SyncMode::Incremental, &[]).await?;
//!
//!     println!("Fetched {} records", result.total_fetched());
//!     Ok(())
//! }
//! ```
//!
//! ## Custom sources and stores
//!
//! The orchestrator is generic over [`RecordSource`] and [`TableStore`]:
//!
//! ```rust,no_run
//! use aspire_duck_sync::{
//!     AspireClient, LoadMode, MemoryStore, SyncConfig, Synchronizer,
//! };
//!
//! # async fn run(config: SyncConfig) -> aspire_duck_sync::Result<()> {
//! let source = AspireClient::new(config.aspire.clone(), config.retry.clone())?;
//! let syncer = Synchronizer::new(source, MemoryStore::new(), config.sync.clone());
//! let load = syncer.sync_entity(&config.entities[0], LoadMode::Incremental).await?;
//! println!("{} parent rows", load.parent.len());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod aspire;
pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod merge;
pub mod metrics;
pub mod motherduck;
pub mod record;
pub mod registry;
pub mod schema;
pub mod store;
pub mod sync;
pub mod watermark;

// Re-exports for convenience
pub use aspire::{AspireClient, BearerToken, FetchRequest, RecordSource};
pub use config::{EntityMapping, EntityMappingBuilder, SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result};
pub use extract::{Extraction, extract_children};
pub use format::format_columns;
pub use merge::upsert;
pub use motherduck::MotherDuckClient;
pub use record::{ColumnValue, RecordTable, Row};
pub use registry::{Entity, EntityConfig, KnownEntity};
pub use store::{MemoryStore, TableStore};
pub use sync::{
    EntityLoad, EntityStatus, LoadMode, SyncClient, SyncMode, SyncProgress, SyncResult,
    Synchronizer,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
