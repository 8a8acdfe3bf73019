//! Versioned schema migrations.
//!
//! The schema lives in `migrations/NNN_name.sql` files; applied versions are
//! recorded in `schema_migrations`, so a binary can run migrations on every
//! start and only pay for what is new. Each file is applied inside its own
//! transaction: a failing migration leaves the store at the last good
//! version.

use crate::error::{PraxisError, Result};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;

/// One pending migration, parsed from its filename.
#[derive(Debug)]
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of every migration already recorded, oldest first.
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

fn parse_version(filename: &str) -> Result<u32> {
    filename
        .split('_')
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            PraxisError::Config(format!(
                "Migration filename must start with a numeric version: {}",
                filename
            ))
        })
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();
    for entry in fs::read_dir(migrations_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PraxisError::Config("Invalid migration filename".to_string()))?;

        migrations.push(Migration {
            version: parse_version(filename)?,
            name: filename.trim_end_matches(".sql").to_string(),
            sql: fs::read_to_string(&path)?,
        });
    }
    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Apply every migration not yet recorded, in version order.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration {}", migration.name);
        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            PraxisError::Config(format!("Migration {} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_applied_migrations_are_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        ensure_migrations_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![1, "001_entities"],
        )
        .unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec!["001_entities".to_string()]);
    }

    #[test]
    fn test_load_migrations_sorted_by_version() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();

        // Written out of order on purpose
        fs::write(
            migrations_dir.join("002_edges.sql"),
            "CREATE TABLE edges (id INTEGER);",
        )
        .unwrap();
        fs::write(
            migrations_dir.join("001_nodes.sql"),
            "CREATE TABLE nodes (id INTEGER);",
        )
        .unwrap();
        fs::write(migrations_dir.join("README.md"), "not a migration").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].name, "001_nodes");
        assert_eq!(migrations[1].name, "002_edges");
    }

    #[test]
    fn test_bad_version_prefix_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("first.sql"), "SELECT 1;").unwrap();

        let err = load_migrations(&migrations_dir).unwrap_err();
        assert!(matches!(err, PraxisError::Config(_)));
    }

    #[test]
    fn test_migrations_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        run_migrations(&mut conn, &migrations_dir).unwrap();
        // Second run applies nothing and must not fail
        run_migrations(&mut conn, &migrations_dir).unwrap();
    }

    #[test]
    fn test_schema_tables_and_indexes() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        run_migrations(&mut conn, &migrations_dir).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"relationships".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(indexes.contains(&"idx_entities_kind".to_string()));
        assert!(indexes.contains(&"idx_relationships_from".to_string()));
        assert!(indexes.contains(&"idx_relationships_to".to_string()));
        assert!(indexes.contains(&"idx_relationships_rel_type".to_string()));
        assert!(
            indexes.contains(&"idx_entities_kind_embedded".to_string()),
            "Partial index for similarity scans should exist"
        );
    }
}
