//! Verifies that an `IndexEntry` round-trips correctly through the durable
//! turso-backed store, and that the redb read-cache fronting it serves the
//! same rows without hitting the durable store a second time.

use std::sync::Arc;

use anyhow::Result;
use epimatch_core::embeddings::provider::test_support::deterministic_embedding;
use epimatch_core::index::IndexStore;
use epimatch_core::types::{IndexEntry, SubtitleSourceFormat};
use epimatch_storage_redb::CachingIndexStore;
use epimatch_storage_turso::TursoStorage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("Verifying durable storage");
    println!("-------------------------");
    test_durable_only().await?;
    println!("durable storage: ok\n");

    println!("Verifying cache-fronted storage");
    println!("--------------------------------");
    test_cached_storage().await?;
    println!("cache-fronted storage: ok");

    Ok(())
}

fn fixture_entry() -> IndexEntry {
    let clean_text = "Demo Show season 1 episode 1 transcript body".to_string();
    IndexEntry {
        id: uuid::Uuid::new_v4(),
        series: "Demo Show".to_string(),
        season: 1,
        episode: 1,
        episode_name: Some("Pilot".to_string()),
        clean_text: clean_text.clone(),
        source_format: SubtitleSourceFormat::Text,
        ctph_hash: epimatch_core::hash::CtphFingerprint::compute(&clean_text).to_string(),
        embedding: Some(deterministic_embedding(&clean_text)),
    }
}

async fn test_durable_only() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("verify.db");
    let storage = TursoStorage::connect(&format!("file:{}", db_path.display()), "").await?;

    let entry = fixture_entry();
    storage.insert(entry.clone()).await?;
    let fetched = storage.get(entry.id).await?.expect("entry must round-trip");
    assert_eq!(fetched.series, entry.series);
    assert_eq!(fetched.embedding.as_ref().map(|e| e.as_slice().len()), Some(384));

    let count = storage.count().await?;
    println!("  inserted 1 row, store reports count = {count}");
    Ok(())
}

async fn test_cached_storage() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("verify.db");
    let storage = Arc::new(TursoStorage::connect(&format!("file:{}", db_path.display()), "").await?);

    let entry = fixture_entry();
    storage.insert(entry.clone()).await?;

    let cache_path = temp_dir.path().join("verify.redb");
    let cached = CachingIndexStore::open(&cache_path, Arc::clone(&storage))?;

    let first = cached.get(entry.id).await?.expect("entry must be visible through the cache");
    let second = cached.get(entry.id).await?.expect("second lookup should hit the cache");
    assert_eq!(first.id, second.id);
    println!("  cache-fronted lookup succeeded for {}", entry.id);
    Ok(())
}
