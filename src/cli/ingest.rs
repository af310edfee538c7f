//! CLI `ingest` / `ingest-page` commands.

use anirec::config::AppConfig;
use anirec::ingest::IngestReport;
use anyhow::Result;

use crate::server::setup_shared_state;

/// Concurrent range ingest: one bulk write for everything that succeeded.
pub async fn ingest_range(config: AppConfig, start: u32, end: u32, per_page: u32) -> Result<()> {
    let state = setup_shared_state(config)?;
    let pb = super::spinner(format!("Ingesting pages {start}..={end} ({per_page} per page)"));
    let result = state.ingestor.ingest_range(start, end, per_page).await;
    pb.finish_and_clear();
    print_report(&result?);
    Ok(())
}

/// Single-page ingest with sequential embedding.
pub async fn ingest_page(config: AppConfig, page: u32, per_page: u32) -> Result<()> {
    let state = setup_shared_state(config)?;
    let pb = super::spinner(format!("Ingesting page {page} ({per_page} per page)"));
    let result = state.ingestor.ingest_page(page, per_page).await;
    pb.finish_and_clear();
    print_report(&result?);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("Ingest run {}", report.run_id);
    println!(
        "  Pages:           {}..={} ({} per page)",
        report.start_page, report.end_page, report.per_page
    );
    println!("  Pages fetched:   {}/{}", report.pages - report.failed_pages, report.pages);
    println!("  Items fetched:   {}", report.fetched);
    println!("  Failed items:    {}", report.failed_items);
    println!("  Inserted:        {}", report.inserted);
    if report.inserted == 0 {
        println!("  Nothing was written.");
    }
}
