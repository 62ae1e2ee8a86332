//! # porter
//!
//! Streaming forum migration engine.
//!
//! A run extracts a source forum's data with platform-specific SQL,
//! normalizes it into a canonical intermediate model, and loads it into a
//! database or a flat export file. A target platform can then import the
//! intermediate tables into its own schema, followed by an optional
//! finalization step.
//!
//! - **Capability negotiation** suppresses features neither side supports
//! - **Column mapping** renames, filters and coerces every row by a declared structure
//! - **Batched writes** with bounded memory and synthesized destination tables
//!
//! ## Example
//!
//! ```rust,no_run
//! use porter::{Config, Orchestrator, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), porter::PorterError> {
//!     let config = Config::load("porter.yaml")?;
//!     let request = RunRequest::new("codo", "local", "codoforum").with_target_platform("flarum");
//!     let report = Orchestrator::new(config).run(&request).await?;
//!     for comment in &report.comments {
//!         println!("{}", comment);
//!     }
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod config;
pub mod connection;
pub mod core;
pub mod drivers;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod platform;
pub mod storage;

// Re-exports for convenient access
pub use capability::{negotiate, CapabilityFlags, Feature, FeatureSupport, Flag, Modes, Support};
pub use config::{Config, ConnectionConfig, ConnectionKind, PorterOptions};
pub use connection::{ConnectionDescriptor, Database};
pub use crate::core::{Row, SqlValue, TableStructure, TypeDescriptor};
pub use error::{PorterError, Result};
pub use mapping::{export_table, ColumnMap, ColumnSpec, ExportOperation, ExportStats, Filter, Gate};
pub use orchestrator::{EntityReport, Orchestrator, OutputMode, RunPhase, RunReport, RunRequest};
pub use platform::{Platform, PlatformRegistry, Postscript, RequiredTable, Side};
pub use storage::{DatabaseStorage, FileStorage, Storage, StoreStats};
