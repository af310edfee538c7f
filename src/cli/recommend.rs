use anirec::config::AppConfig;
use anyhow::Result;

use crate::server::setup_shared_state;

/// Rank stored anime against a free-text query and print the top results.
pub async fn recommend(
    config: AppConfig,
    query: &str,
    k: Option<usize>,
    indexed: bool,
) -> Result<()> {
    let state = setup_shared_state(config)?;
    let k = k.unwrap_or(state.config.retrieval.default_k);

    let pb = super::spinner("Embedding query");
    let results = if indexed {
        state.recommend_indexed(query, k).await
    } else {
        state.recommend(query, k).await
    };
    pb.finish_and_clear();
    let results = results?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Top {} match(es) for {:?}\n", results.len(), query);
    for (i, scored) in results.iter().enumerate() {
        let record = &scored.anime.record;
        println!(
            "  {}. {} [{}] (score: {:.4})",
            i + 1,
            record.title.romaji,
            record.id,
            scored.score,
        );
        if !record.title.english.is_empty() {
            println!("     {}", record.title.english);
        }
        if !record.genres.is_empty() {
            println!("     {}", record.genres.join(", "));
        }
        println!("     {}", super::preview(&record.description, 120));
        println!();
    }

    Ok(())
}
