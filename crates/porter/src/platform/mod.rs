//! Platform catalog: sources that export into the intermediate model and
//! targets that import from it.
//!
//! A platform is a static declaration: table prefix, capability flags,
//! feature support, required source structure, and an ordered list of
//! [`ExportOperation`]s. The engine never special-cases a platform.

mod codoforum;
mod flarum;
pub mod model;
mod webwiz;

pub use codoforum::CodoForum;
pub use flarum::{Flarum, FlarumPostscript};
pub use webwiz::WebWiz;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{CapabilityFlags, FeatureSupport};
use crate::connection::Database;
use crate::error::{PorterError, Result};
use crate::mapping::ExportOperation;

/// A source table and the columns an export depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredTable {
    /// Unprefixed table name.
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl RequiredTable {
    pub const fn new(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self { table, columns }
    }
}

/// A forum platform declaration.
pub trait Platform: Send + Sync {
    /// Registry key, lowercase.
    fn id(&self) -> &'static str;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Default table prefix of the platform's own tables.
    fn prefix(&self) -> &'static str;

    /// Table whose character set governs the export, if any.
    fn charset_table(&self) -> Option<&'static str> {
        None
    }

    fn flags(&self) -> CapabilityFlags;

    fn features(&self) -> FeatureSupport;

    /// Tables and columns verified before any data moves.
    fn required_structure(&self) -> Vec<RequiredTable> {
        Vec::new()
    }

    /// Statements run on the source before the export operations, such as
    /// scratch tables the extraction queries join against.
    fn setup_statements(&self) -> Vec<String> {
        Vec::new()
    }

    /// Every operation, in run order. Gates are applied by the caller.
    fn operations(&self) -> Result<Vec<ExportOperation>>;
}

/// Destination-side finalization after a target import.
#[async_trait]
pub trait Postscript: Send + Sync {
    /// Repair the imported data. Returns human-readable notes.
    async fn run(&self, database: &Database, prefix: &str) -> Result<Vec<String>>;
}

/// Which side of a run a platform is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

/// Named platforms available to a run.
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    sources: BTreeMap<String, Arc<dyn Platform>>,
    targets: BTreeMap<String, Arc<dyn Platform>>,
    postscripts: BTreeMap<String, Arc<dyn Postscript>>,
}

impl PlatformRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_source(Arc::new(CodoForum));
        registry.register_source(Arc::new(WebWiz));
        registry.register_target(Arc::new(Flarum));
        registry.register_postscript(Flarum.id(), Arc::new(FlarumPostscript));
        registry
    }

    pub fn register_source(&mut self, platform: Arc<dyn Platform>) {
        self.sources.insert(platform.id().to_ascii_lowercase(), platform);
    }

    pub fn register_target(&mut self, platform: Arc<dyn Platform>) {
        self.targets.insert(platform.id().to_ascii_lowercase(), platform);
    }

    pub fn register_postscript(&mut self, target: &str, postscript: Arc<dyn Postscript>) {
        self.postscripts.insert(target.to_ascii_lowercase(), postscript);
    }

    pub fn get(&self, side: Side, name: &str) -> Result<Arc<dyn Platform>> {
        let map = match side {
            Side::Source => &self.sources,
            Side::Target => &self.targets,
        };
        map.get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| PorterError::UnknownPlatform {
                kind: side.as_str(),
                name: name.to_string(),
            })
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn Platform>> {
        self.get(Side::Source, name)
    }

    pub fn target(&self, name: &str) -> Result<Arc<dyn Platform>> {
        self.get(Side::Target, name)
    }

    /// Finalization step registered for a target, if any.
    pub fn postscript(&self, target: &str) -> Option<Arc<dyn Postscript>> {
        self.postscripts.get(&target.to_ascii_lowercase()).cloned()
    }

    /// Registered platforms of one side, sorted by id.
    pub fn list(&self, side: Side) -> Vec<Arc<dyn Platform>> {
        let map = match side {
            Side::Source => &self.sources,
            Side::Target => &self.targets,
        };
        map.values().cloned().collect()
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("postscripts", &self.postscripts.keys().collect::<Vec<_>>())
            .finish()
    }
}
