//! Shared fixtures for integration tests: SQLite databases in a temp dir.

#![allow(dead_code)]

use porter::drivers::sqlite;
use porter::Config;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// A source forum database, a destination database and an export file path,
/// all inside one temp dir.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    /// Aliases: `forum` (source, with `source_prefix`), `local` (destination),
    /// `export` (file).
    pub fn new(source_prefix: &str) -> Self {
        Self::with_options(source_prefix, "")
    }

    pub fn with_options(source_prefix: &str, options: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
connections:
  - alias: forum
    adapter: sqlite
    name: {source}
    prefix: "{prefix}"
  - alias: local
    adapter: sqlite
    name: {target}
  - alias: export
    type: file
    path: {export}
{options}
"#,
            source = dir.path().join("forum.db").display(),
            target = dir.path().join("local.db").display(),
            export = dir.path().join("export.txt").display(),
            prefix = source_prefix,
            options = options,
        );
        let config = Config::from_yaml(&yaml).unwrap();
        Self { dir, config }
    }

    pub fn export_path(&self) -> std::path::PathBuf {
        self.dir.path().join("export.txt")
    }

    /// Open a pool on a configured database alias.
    pub async fn pool(&self, alias: &str) -> SqlitePool {
        let conn = self
            .config
            .connections
            .iter()
            .find(|c| c.alias == alias)
            .unwrap();
        sqlite::connect(conn).await.unwrap()
    }

    /// Run statements on an alias, then close the pool.
    pub async fn seed(&self, alias: &str, statements: &[&str]) {
        let pool = self.pool(alias).await;
        for sql in statements {
            sqlx::query(sql).execute(&pool).await.unwrap();
        }
        pool.close().await;
    }
}

/// Table names in a database, sorted.
pub async fn tables(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await
        .unwrap()
}
