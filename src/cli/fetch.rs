use anirec::catalog::anilist::AniListClient;
use anirec::catalog::CatalogFetcher;
use anirec::config::AppConfig;
use anyhow::Result;

/// Fetch one catalog page and print its titles. Touches no database.
pub async fn fetch(config: &AppConfig, page: u32, per_page: u32) -> Result<()> {
    let client = AniListClient::new(&config.catalog)?;
    let pb = super::spinner(format!("Fetching page {page}"));
    let result = client.fetch(page, per_page).await;
    pb.finish_and_clear();
    let records = result?;

    if records.is_empty() {
        println!("Page {page} is empty.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{:>8}  {:>3}  {}",
            record.id, record.average_score, record.title.romaji
        );
    }
    Ok(())
}
