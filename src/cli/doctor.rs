//! CLI `doctor` command: run database diagnostics and print a health report.

use anirec::config::AppConfig;
use anirec::db;
use anyhow::{Context, Result};

/// Run database diagnostics and print a health report.
pub fn doctor(config: &AppConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `anirec ingest --end <page>` or `anirec serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path, config.embedding.dimensions)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;
    let configured = format!("{}/{}", config.embedding.provider, config.embedding.model);

    println!("anirec Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        v{}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    println!(
        "  Stored:          {}",
        report.embedding_model.as_deref().unwrap_or("(not set)")
    );
    println!("  Configured:      {configured}");
    println!("  Index width:     {}", report.vector_dimensions);
    if report.vector_dimensions != config.embedding.dimensions {
        println!(
            "  WARNING: configured dimensions ({}) differ from the index; new vectors will not be indexed.",
            config.embedding.dimensions
        );
    }
    if let Some(ref stored) = report.embedding_model {
        if stored != &configured {
            println!("  WARNING: model mismatch! Stored vectors are not comparable with new queries.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Anime:           {}", report.anime_count);
    println!("  With embedding:  {}", report.embedded_count);
    println!("  Indexed:         {}", report.indexed_count);
    println!("  Ingest runs:     {}", report.ingest_run_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or delete the database and re-ingest the catalog.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
