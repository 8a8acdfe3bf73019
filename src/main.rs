use praxis::db::{migrate, Db};
use praxis::Config;
use std::path::Path;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    // Parse command-line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "audit" => {
            run_audit().await?;
        }
        "verify" | _ => {
            // Default: verify database schema
            run_schema_verification().await?;
        }
    }

    Ok(())
}

/// Open the configured database with migrations applied.
async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;
    Ok(db)
}

/// Run the integrity audit and print every finding.
async fn run_audit() -> Result<()> {
    let config = Config::load()?;
    let db = open_db(&config).await?;

    let findings = praxis::integrity::audit(&db).await?;
    if findings.is_empty() {
        log::info!("Audit clean: no findings");
    } else {
        log::warn!("Audit produced {} finding(s)", findings.len());
        for finding in &findings {
            println!("{}", finding);
        }
    }

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting Praxis v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());

    let db = open_db(&config).await?;
    log::info!("Database initialized successfully");

    verify_database_schema(&db).await?;

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    use praxis::error::PraxisError;

    db.with_connection(|conn| {
        // Check tables
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = vec!["entities", "relationships", "schema_migrations"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if !tables.iter().any(|t| t == table) {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            } else {
                log::debug!("✓ Table exists: {}", table);
            }
        }

        if !all_tables_exist {
            return Err(PraxisError::Config("Not all required tables exist".to_string()));
        }

        // Check migrations
        let applied = migrate::get_applied_migrations(conn)?;
        if applied.len() < 3 {
            return Err(PraxisError::Config(format!("Expected at least 3 migrations, found {}", applied.len())));
        }
        log::debug!("✓ {} migrations applied", applied.len());

        // Check traversal and lookup indexes
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_indexes = vec![
            "idx_entities_kind",
            "idx_relationships_from",
            "idx_relationships_to",
            "idx_relationships_rel_type",
        ];

        for index_name in &expected_indexes {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("✓ Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {} (migration 003 may not be applied)", index_name);
            }
        }

        // Check pragmas
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(PraxisError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(PraxisError::Config("Foreign keys not enabled".to_string()));
        }
        log::debug!("✓ Foreign keys enabled");

        // Integrity check
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(PraxisError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
