//! Run requests and run reports.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PorterError;

/// Where the intermediate model ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Flat export file; no import or finalization.
    File,
    /// Intermediate tables in the target database, then an optional import.
    #[default]
    Database,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputMode::File => "file",
            OutputMode::Database => "database",
        })
    }
}

impl FromStr for OutputMode {
    type Err = PorterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(OutputMode::File),
            "database" | "db" => Ok(OutputMode::Database),
            other => Err(PorterError::Config(format!(
                "invalid output mode '{}': expected file or database",
                other
            ))),
        }
    }
}

/// One migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub source_alias: String,
    pub target_alias: String,
    pub source_platform: String,
    /// Platform to import into. Without one the run stops after export.
    #[serde(default)]
    pub target_platform: Option<String>,
    #[serde(default)]
    pub output_mode: OutputMode,
}

impl RunRequest {
    pub fn new(
        source_alias: impl Into<String>,
        target_alias: impl Into<String>,
        source_platform: impl Into<String>,
    ) -> Self {
        Self {
            source_alias: source_alias.into(),
            target_alias: target_alias.into(),
            source_platform: source_platform.into(),
            target_platform: None,
            output_mode: OutputMode::Database,
        }
    }

    pub fn with_target_platform(mut self, platform: impl Into<String>) -> Self {
        self.target_platform = Some(platform.into());
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }
}

/// Orchestration state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Init,
    Verifying,
    Exporting,
    Importing,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::Verifying => "verifying",
            RunPhase::Exporting => "exporting",
            RunPhase::Importing => "importing",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Row count of one entity in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub phase: RunPhase,
    pub entity: String,
    pub rows: u64,
    pub flushes: usize,
    /// Peak sampled process memory in bytes.
    pub peak_memory: u64,
}

/// Outcome of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Final phase: `Done` or `Failed`.
    pub phase: RunPhase,
    /// Human-readable diagnostic comments, in emission order.
    pub comments: Vec<String>,
    pub entities: Vec<EntityReport>,
    /// The error that moved the run to `Failed`.
    #[serde(skip)]
    pub failure: Option<PorterError>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.phase == RunPhase::Done
    }

    /// Total rows written for an entity in a phase, summed across operations.
    pub fn rows(&self, phase: RunPhase, entity: &str) -> u64 {
        self.entities
            .iter()
            .filter(|e| e.phase == phase && e.entity == entity)
            .map(|e| e.rows)
            .sum()
    }

    /// Turn a failed report into its error.
    pub fn into_result(self) -> Result<Self, PorterError> {
        match self.failure {
            Some(err) if self.phase == RunPhase::Failed => Err(err),
            Some(_) | None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("file".parse::<OutputMode>().unwrap(), OutputMode::File);
        assert_eq!("Database".parse::<OutputMode>().unwrap(), OutputMode::Database);
        assert!("api".parse::<OutputMode>().is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: RunRequest = serde_json::from_str(
            r#"{"source_alias": "codo", "target_alias": "local", "source_platform": "codoforum"}"#,
        )
        .unwrap();
        assert_eq!(request.output_mode, OutputMode::Database);
        assert_eq!(request.target_platform, None);
    }

    #[test]
    fn test_report_sums_rows_per_phase() {
        let entity = |phase, name: &str, rows| EntityReport {
            phase,
            entity: name.to_string(),
            rows,
            flushes: 1,
            peak_memory: 0,
        };
        let report = RunReport {
            phase: RunPhase::Done,
            comments: Vec::new(),
            entities: vec![
                entity(RunPhase::Exporting, "Comment", 3),
                entity(RunPhase::Exporting, "Comment", 2),
                entity(RunPhase::Importing, "posts", 5),
            ],
            failure: None,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(report.rows(RunPhase::Exporting, "Comment"), 5);
        assert_eq!(report.rows(RunPhase::Importing, "Comment"), 0);
        assert!(report.is_success());
    }
}
