//! Run orchestrator: negotiation, verification, export, import and
//! finalization, one entity at a time.

mod request;

pub use request::{EntityReport, OutputMode, RunPhase, RunReport, RunRequest};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::capability::{negotiate, tied_flag, Modes};
use crate::config::{Config, ConnectionKind};
use crate::connection::{ConnectionDescriptor, Database};
use crate::core::SourceReader;
use crate::drivers::substitute_prefix;
use crate::error::{PorterError, Result};
use crate::mapping::{export_table, verify_source, ExportOperation, ExportStats};
use crate::platform::{Platform, PlatformRegistry};
use crate::storage::{DatabaseStorage, FileStorage, Storage};

/// Coordinates one run over a configuration and a platform catalog.
pub struct Orchestrator {
    config: Config,
    registry: PlatformRegistry,
}

/// Explicit per-run state. Owns the single storage instance of the run,
/// and with it the set of tables already reset.
pub struct RunState {
    pub phase: RunPhase,
    pub source: Arc<dyn Platform>,
    pub target: Option<Arc<dyn Platform>>,
    pub source_connection: ConnectionDescriptor,
    pub target_connection: ConnectionDescriptor,
    pub modes: Modes,
    storage: Box<dyn Storage>,
    comments: Vec<String>,
    entities: Vec<EntityReport>,
    /// Entity and operation in progress, named in the failure comment.
    current: Option<(String, &'static str)>,
}

impl RunState {
    /// Diagnostic comments so far.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    fn comment(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("Comment: {}", text);
        self.comments.push(text);
    }

    fn mark(&mut self, entity: impl Into<String>, operation: &'static str) {
        self.current = Some((entity.into(), operation));
    }

    /// Operations admitted by the negotiated modes.
    fn admitted(&self, ops: Vec<ExportOperation>) -> Vec<ExportOperation> {
        for op in ops.iter().filter(|op| !op.gate.admits(&self.modes)) {
            if let Some(flag) = tied_flag(op) {
                debug!("Skipping {} operation tied to {}", op.entity, flag);
            }
        }
        self.modes.select(ops)
    }

    fn record(&mut self, stats: ExportStats, capture_query: bool) {
        self.comment(format!(
            "{}: {} rows in {:.2}s, peak {:.1} MB",
            stats.entity,
            stats.rows,
            stats.elapsed.as_secs_f64(),
            stats.peak_memory() as f64 / (1024.0 * 1024.0)
        ));
        if capture_query {
            self.comment(format!("{} query: {}", stats.entity, stats.query));
        }
        let peak_memory = stats.peak_memory();
        self.entities.push(EntityReport {
            phase: self.phase,
            entity: stats.entity,
            rows: stats.rows,
            flushes: stats.flushes,
            peak_memory,
        });
    }
}

impl Orchestrator {
    /// Create an orchestrator over the built-in platform catalog.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: PlatformRegistry::builtin(),
        }
    }

    /// Replace the platform catalog.
    pub fn with_registry(mut self, registry: PlatformRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a migration.
    ///
    /// Problems resolving platforms, aliases or connections are returned as
    /// errors. Once verification starts, a failure ends the run in
    /// [`RunPhase::Failed`] and is carried in the report.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let start = Instant::now();
        let started_at = Local::now();
        info!(
            "Starting {} run: {} ({}) -> {} ({})",
            request.output_mode,
            request.source_platform,
            request.source_alias,
            request.target_platform.as_deref().unwrap_or("intermediate"),
            request.target_alias
        );

        let (mut state, source_db, target_db) = self.init(request).await?;

        let failure = match self.run_phases(&mut state, &source_db, target_db.as_ref()).await {
            Ok(()) => None,
            Err(err) => {
                let (entity, operation) = state
                    .current
                    .clone()
                    .unwrap_or_else(|| ("run".to_string(), "setup"));
                error!("{} failed at {} ({}): {}", state.phase, entity, operation, err);
                state.comment(format!(
                    "Failed while {} {} ({}): {}",
                    state.phase, entity, operation, err
                ));
                state.phase = RunPhase::Failed;
                Some(err)
            }
        };
        if failure.is_none() {
            state.phase = RunPhase::Done;
        }

        let elapsed = start.elapsed();
        state.comment(format!(
            "ELAPSED — {} ({} - {})",
            format_elapsed(elapsed),
            started_at.format("%H:%M:%S"),
            Local::now().format("%H:%M:%S")
        ));
        info!("Run finished in {:.1}s: {}", elapsed.as_secs_f64(), state.phase);

        Ok(RunReport {
            phase: state.phase,
            comments: state.comments,
            entities: state.entities,
            failure,
            elapsed,
        })
    }

    async fn init(&self, request: &RunRequest) -> Result<(RunState, Database, Option<Database>)> {
        let source = self.registry.source(&request.source_platform)?;
        let target = request
            .target_platform
            .as_deref()
            .map(|name| self.registry.target(name))
            .transpose()?;

        let source_connection = self.config.connection(&request.source_alias)?;
        let target_connection = self.config.connection(&request.target_alias)?;
        let options = &self.config.options;

        let source_db = source_connection.open().await?;
        let (storage, target_db): (Box<dyn Storage>, Option<Database>) = match request.output_mode
        {
            OutputMode::File => {
                if target_connection.kind() != ConnectionKind::File {
                    return Err(PorterError::Config(format!(
                        "file output needs a file connection, '{}' is a {} connection",
                        target_connection.alias(),
                        target_connection.kind()
                    )));
                }
                let path = target_connection.parameters().path.clone().ok_or_else(|| {
                    PorterError::Config(format!(
                        "file connection '{}' has no path",
                        target_connection.alias()
                    ))
                })?;
                let storage = FileStorage::new(path).with_batch_size(options.batch_size);
                (Box::new(storage), None)
            }
            OutputMode::Database => {
                let database = target_connection.open().await?;
                let mut storage =
                    DatabaseStorage::new(database.writer()).with_batch_size(options.batch_size);
                storage.set_prefix(&options.intermediate_prefix);
                (Box::new(storage), Some(database))
            }
        };

        let modes = match &target {
            Some(target) => negotiate(source.as_ref(), target.as_ref())?,
            None => Modes::default(),
        };

        let mut state = RunState {
            phase: RunPhase::Init,
            source,
            target,
            source_connection,
            target_connection,
            modes,
            storage,
            comments: Vec::new(),
            entities: Vec::new(),
            current: None,
        };

        let suppressed: Vec<_> = state.modes.suppressed().collect();
        for flag in suppressed {
            state.comment(format!("Suppressed {} on both source and target", flag));
        }
        if request.output_mode == OutputMode::File {
            if let Some(target) = &state.target {
                let note = format!("File output: import into {} skipped", target.name());
                warn!("{}", note);
                state.comment(note);
            }
        }

        Ok((state, source_db, target_db))
    }

    async fn run_phases(
        &self,
        state: &mut RunState,
        source_db: &Database,
        target_db: Option<&Database>,
    ) -> Result<()> {
        let reader = source_reader(state, source_db);

        state.phase = RunPhase::Verifying;
        state.mark(state.source.id(), "verify");
        info!("Verifying {} source structure", state.source.name());
        verify_source(reader.as_ref(), &state.source.required_structure()).await?;

        let phase_start = Instant::now();
        self.export(state, source_db, reader.as_ref()).await?;
        state.comment(format!(
            "Export phase: {}",
            format_elapsed(phase_start.elapsed())
        ));

        if let (Some(target), Some(target_db)) = (state.target.clone(), target_db) {
            let phase_start = Instant::now();
            let prefix = self.import(state, target.as_ref(), target_db).await?;
            state.comment(format!(
                "Import phase: {}",
                format_elapsed(phase_start.elapsed())
            ));
            state.mark("storage", "end");
            state.storage.end().await?;

            self.finalize(state, target.as_ref(), target_db, &prefix).await;
        } else {
            state.mark("storage", "end");
            state.storage.end().await?;
        }

        Ok(())
    }

    async fn export(
        &self,
        state: &mut RunState,
        source_db: &Database,
        reader: &dyn SourceReader,
    ) -> Result<()> {
        state.phase = RunPhase::Exporting;
        info!("Exporting {} into the intermediate model", state.source.name());

        if let Some(table) = state.source.charset_table() {
            state.mark(table, "character set");
            if let Some(charset) = reader.character_set(table).await? {
                state.storage.set_character_set(&charset).await?;
                state.comment(format!("Character set: {}", charset));
            }
        }

        state.mark("storage", "begin");
        state.storage.begin().await?;

        let writer = source_db.writer();
        for statement in state.source.setup_statements() {
            state.mark(state.source.id(), "setup statement");
            writer
                .execute(&substitute_prefix(&statement, reader.prefix()))
                .await?;
        }

        let ops = state.admitted(state.source.operations()?);
        for op in ops {
            state.mark(op.entity.clone(), "export");
            let stats = export_table(reader, state.storage.as_mut(), &op).await?;
            state.record(stats, self.config.options.capture_queries);
        }
        Ok(())
    }

    /// Returns the destination prefix the target tables were written under.
    async fn import(
        &self,
        state: &mut RunState,
        target: &dyn Platform,
        target_db: &Database,
    ) -> Result<String> {
        state.phase = RunPhase::Importing;
        info!("Importing the intermediate model into {}", target.name());

        let intermediate = target_db.reader_with_prefix(&self.config.options.intermediate_prefix);

        let mut runnable = Vec::new();
        for op in state.admitted(target.operations()?) {
            state.mark(op.entity.clone(), "check intermediate tables");
            let mut missing = None;
            for entity in &op.reads {
                if !state.storage.exists(entity, &[]).await? {
                    missing = Some(entity.clone());
                    break;
                }
            }
            match missing {
                Some(entity) => state.comment(format!(
                    "Skipped {} import: intermediate {} was not exported",
                    op.entity, entity
                )),
                None => runnable.push(op),
            }
        }

        let prefix = match state.target_connection.prefix() {
            "" => target.prefix().to_string(),
            configured => configured.to_string(),
        };
        state.storage.set_prefix(&prefix);

        for op in runnable {
            state.mark(op.entity.clone(), "import");
            let stats = export_table(intermediate.as_ref(), state.storage.as_mut(), &op).await?;
            state.record(stats, self.config.options.capture_queries);
        }
        Ok(prefix)
    }

    /// Failures are reported, never rolled back.
    async fn finalize(
        &self,
        state: &mut RunState,
        target: &dyn Platform,
        target_db: &Database,
        prefix: &str,
    ) {
        state.phase = RunPhase::Finalizing;
        let Some(postscript) = self.registry.postscript(target.id()) else {
            return;
        };

        info!("Finalizing {}", target.name());
        match postscript.run(target_db, prefix).await {
            Ok(notes) => {
                for note in notes {
                    state.comment(note);
                }
            }
            Err(err) => {
                error!("{}", err);
                state.comment(err.to_string());
            }
        }
    }
}

/// Source reader using the connection's prefix, or the platform's default.
fn source_reader(state: &RunState, source_db: &Database) -> Arc<dyn SourceReader> {
    match state.source_connection.prefix() {
        "" => source_db.reader_with_prefix(state.source.prefix()),
        _ => source_db.reader(),
    }
}

/// Format a duration as `[Hh ]Mm Ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[tokio::test]
    async fn test_unknown_platform_fails_before_connecting() {
        let config = Config::from_yaml(
            "connections:\n  - alias: a\n    adapter: sqlite\n    name: /nonexistent/dir/a.db\n",
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config);
        let err = orchestrator
            .run(&RunRequest::new("a", "a", "phpbb"))
            .await
            .unwrap_err();
        assert!(matches!(err, PorterError::UnknownPlatform { .. }));
    }

    #[tokio::test]
    async fn test_file_output_needs_file_connection() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "connections:\n  - alias: a\n    adapter: sqlite\n    name: {}\n",
            dir.path().join("a.db").display()
        );
        let orchestrator = Orchestrator::new(Config::from_yaml(&yaml).unwrap());
        let request = RunRequest::new("a", "a", "codoforum").with_output_mode(OutputMode::File);
        let err = orchestrator.run(&request).await.unwrap_err();
        assert!(err.to_string().contains("file output needs a file connection"));
    }
}
