//! Configuration validation.

use std::collections::HashSet;

use super::{ConnectionKind, Config};
use crate::error::{PorterError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let mut aliases = HashSet::new();

    for conn in &config.connections {
        if conn.alias.trim().is_empty() {
            return Err(PorterError::Config("connection alias is required".into()));
        }
        if !aliases.insert(conn.alias.as_str()) {
            return Err(PorterError::Config(format!(
                "duplicate connection alias '{}'",
                conn.alias
            )));
        }

        match conn.kind {
            ConnectionKind::Database => {
                if conn.adapter.is_none() {
                    return Err(PorterError::Config(format!(
                        "connections.{}.adapter is required for database connections",
                        conn.alias
                    )));
                }
                if conn.name.is_empty() {
                    return Err(PorterError::Config(format!(
                        "connections.{}.name is required",
                        conn.alias
                    )));
                }
                if conn.max_connections < 2 {
                    return Err(PorterError::Config(format!(
                        "connections.{}.max_connections must be at least 2",
                        conn.alias
                    )));
                }
            }
            ConnectionKind::File => {
                if conn.path.is_none() {
                    return Err(PorterError::Config(format!(
                        "connections.{}.path is required for file connections",
                        conn.alias
                    )));
                }
            }
            ConnectionKind::Api => {}
        }
    }

    if config.options.batch_size == 0 {
        return Err(PorterError::Config(
            "options.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_config() {
        let c = config(
            r#"
connections:
  - alias: forum
    adapter: mysql
    name: forum
  - alias: out
    type: file
    path: /tmp/out.txt
"#,
        );
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn test_duplicate_alias() {
        let c = config(
            r#"
connections:
  - alias: forum
    adapter: mysql
    name: a
  - alias: forum
    adapter: sqlite
    name: b.db
"#,
        );
        let err = validate(&c).unwrap_err();
        assert!(err.to_string().contains("duplicate connection alias 'forum'"));
    }

    #[test]
    fn test_database_requires_adapter() {
        let c = config(
            r#"
connections:
  - alias: forum
    name: forum
"#,
        );
        assert!(validate(&c).is_err());
    }

    #[test]
    fn test_file_requires_path() {
        let c = config(
            r#"
connections:
  - alias: out
    type: file
"#,
        );
        assert!(validate(&c).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let c = config(
            r#"
connections: []
options:
  batch_size: 0
"#,
        );
        assert!(validate(&c).is_err());
    }
}
