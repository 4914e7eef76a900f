//! Integration tests against a real Postgres instance. Set DATABASE_TEST_URL
//! or these are skipped.

use chrono::Utc;
use sentryfeed_common::{DiscriminatorLists, Source};
use sentryfeed_store::{ArticleWrite, Store};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_store() -> Option<Store> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = Store::from_pool(pool);
    store.migrate().await.ok()?;
    Some(store)
}

fn sample_source(identifier: &str) -> Source {
    Source {
        identifier: identifier.to_string(),
        name: identifier.to_string(),
        url: format!("https://{identifier}.example.com"),
        ..Source::default()
    }
}

fn sample_article(source_id: Uuid, content_hash: &str) -> ArticleWrite {
    ArticleWrite {
        id: Uuid::new_v4(),
        source_id,
        canonical_url: format!("https://example.com/{content_hash}"),
        original_url: format!("https://example.com/{content_hash}"),
        title: "A sample threat report".to_string(),
        content: "rundll32 was observed launching a suspicious child process".to_string(),
        raw_html: None,
        published_at: Some(Utc::now()),
        author: Some("analyst".to_string()),
        tags: vec!["malware".to_string()],
        language: Some("en".to_string()),
        content_hash: content_hash.to_string(),
        simhash: 0xdead_beef_cafe_f00d,
        quality_score: 0.75,
        threat_hunting_score: 42,
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn upsert_source_round_trips_through_get_source() {
    let Some(store) = test_store().await else { return };
    let source = sample_source("unit-test-upsert-source");

    let is_new = store.upsert_source(&source).await.unwrap();
    assert!(is_new);

    let fetched = store.get_source(source.id).await.unwrap().expect("source must exist");
    assert_eq!(fetched.identifier, source.identifier);
    assert_eq!(fetched.url, source.url);

    let is_new_again = store.upsert_source(&source).await.unwrap();
    assert!(!is_new_again, "re-upserting the same identifier must not report a new row");
}

#[tokio::test]
async fn try_claim_is_exclusive_until_released() {
    let Some(store) = test_store().await else { return };
    let source = sample_source("unit-test-lease");
    store.upsert_source(&source).await.unwrap();

    let first = store.try_claim(source.id, "worker-a").await.unwrap();
    assert!(first, "first claim must succeed");

    let second = store.try_claim(source.id, "worker-b").await.unwrap();
    assert!(!second, "a second holder must not acquire an active lease");

    store.release(source.id).await.unwrap();

    let third = store.try_claim(source.id, "worker-b").await.unwrap();
    assert!(third, "claim must succeed again once released");
}

#[tokio::test]
async fn persist_article_is_found_by_exact_content_hash() {
    let Some(store) = test_store().await else { return };
    let source = sample_source("unit-test-persist");
    store.upsert_source(&source).await.unwrap();

    let content_hash = format!("hash-{}", Uuid::new_v4());
    let article = sample_article(source.id, &content_hash);
    let bands = sentryfeed_clean_bands(article.simhash);

    store.persist_article(&article, bands).await.unwrap();

    let found = store.find_by_content_hash(&content_hash).await.unwrap();
    assert_eq!(found, Some(article.id));

    let missing = store.find_by_content_hash("does-not-exist").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn persist_article_rejects_duplicate_content_hash_as_storage_conflict() {
    let Some(store) = test_store().await else { return };
    let source = sample_source("unit-test-conflict");
    store.upsert_source(&source).await.unwrap();

    let content_hash = format!("hash-{}", Uuid::new_v4());
    let first = sample_article(source.id, &content_hash);
    let bands = sentryfeed_clean_bands(first.simhash);
    store.persist_article(&first, bands).await.unwrap();

    let mut second = sample_article(source.id, &content_hash);
    second.id = Uuid::new_v4();
    let result = store.persist_article(&second, bands).await;

    match result {
        Err(sentryfeed_common::SentryFeedError::StorageConflict(hash)) => {
            assert_eq!(hash, content_hash);
        }
        other => panic!("expected StorageConflict, got {other:?}"),
    }
}

#[tokio::test]
async fn discriminator_lists_round_trip_through_save_and_load() {
    let Some(store) = test_store().await else { return };
    let lists = DiscriminatorLists {
        perfect: vec!["cobalt strike".to_string()],
        lolbas: vec!["rundll32".to_string(), "certutil".to_string()],
        good: vec!["lateral movement".to_string()],
    };

    store.save_discriminators(&lists).await.unwrap();
    let loaded = store.load_discriminators().await.unwrap();

    assert_eq!(loaded.perfect, lists.perfect);
    assert_eq!(loaded.lolbas, lists.lolbas);
    assert_eq!(loaded.good, lists.good);
}

/// Inline band split so this test file doesn't need a `sentryfeed-clean`
/// dev-dependency for one helper call.
fn sentryfeed_clean_bands(hash: u64) -> [u16; 4] {
    [
        (hash & 0xFFFF) as u16,
        ((hash >> 16) & 0xFFFF) as u16,
        ((hash >> 32) & 0xFFFF) as u16,
        ((hash >> 48) & 0xFFFF) as u16,
    ]
}
