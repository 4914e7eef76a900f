//! Processor pipeline (§4.G): validate, hash, dedup, score, persist, and
//! conditionally enqueue a workflow trigger.

use async_trait::async_trait;
use sentryfeed_clean::{bands, content_hash, hamming_distance, simhash, validate};
use sentryfeed_common::{
    ArticleCandidate, DiscriminatorLists, DuplicateKindOwned, ProcessOutcome, SentryFeedError,
    Source,
};
use sentryfeed_fetch::ArticleSink;
use sentryfeed_store::{ArticleWrite, Store};
use tracing::info;
use uuid::Uuid;

use crate::quality::{self, QualityInput};
use crate::threat_hunting;

/// Near-duplicate threshold (§4.G step 4): 64-bit Hamming distance `<= 3`.
const NEAR_DUP_HAMMING_THRESHOLD: u32 = 3;

/// Default auto-trigger threshold for the workflow outbox (§4.G side effects,
/// §6 configuration).
pub const DEFAULT_AUTO_TRIGGER_THRESHOLD: u32 = 80;

/// §7 `storage_conflict`: retry a persist this many times before folding the
/// write into an exact-duplicate outcome.
const STORAGE_CONFLICT_RETRIES: u32 = 3;

pub struct Processor {
    store: Store,
    discriminators: DiscriminatorLists,
    auto_trigger_threshold: u32,
}

impl Processor {
    pub fn new(store: Store, discriminators: DiscriminatorLists, auto_trigger_threshold: u32) -> Self {
        Self {
            store,
            discriminators,
            auto_trigger_threshold,
        }
    }

    pub async fn process(
        &self,
        source: &Source,
        candidate: ArticleCandidate,
    ) -> sentryfeed_common::Result<ProcessOutcome> {
        let canonical_url = sentryfeed_common::url_norm::normalize(&candidate.original_url)
            .map_err(|e| SentryFeedError::ExtractionFailed(format!("bad url: {e}")))?;

        let issues = validate(&candidate.title, &candidate.content, &candidate.original_url, &source.scope);
        if !issues.is_empty() {
            return Ok(ProcessOutcome::Rejected(format!("validation: {}", issues.join("; "))));
        }

        let hash = content_hash(&candidate.title, &candidate.content);
        let fingerprint = simhash(&candidate.content);
        let band_keys = bands(fingerprint);

        if let Some(existing) = self
            .store
            .find_by_content_hash(&hash)
            .await
            .map_err(anyhow::Error::from)?
        {
            self.store
                .track_url_alias(source.id, &canonical_url, existing)
                .await
                .map_err(anyhow::Error::from)?;
            return Ok(ProcessOutcome::Duplicate {
                kind: DuplicateKindOwned::Exact,
                canonical_id: existing,
            });
        }

        let near_dup_candidates = self
            .store
            .near_dup_candidates(band_keys)
            .await
            .map_err(anyhow::Error::from)?;
        if let Some(nearest) = near_dup_candidates
            .iter()
            .filter(|c| hamming_distance(c.simhash, fingerprint) <= NEAR_DUP_HAMMING_THRESHOLD)
            .min_by_key(|c| c.discovered_at)
        {
            self.store
                .track_url_alias(source.id, &canonical_url, nearest.article_id)
                .await
                .map_err(anyhow::Error::from)?;
            return Ok(ProcessOutcome::Duplicate {
                kind: DuplicateKindOwned::Near,
                canonical_id: nearest.article_id,
            });
        }

        let quality = quality::score(&QualityInput {
            title: &candidate.title,
            content: &candidate.content,
            published_at: candidate.published_at,
        });
        if quality::should_reject(quality, source.weight) {
            return Ok(ProcessOutcome::Rejected(format!("quality score {quality:.2} below threshold")));
        }

        let threat = threat_hunting::score(&candidate.content, &self.discriminators);

        let article_id = Uuid::new_v4();
        let mut metadata = serde_json::Map::new();
        metadata.insert("threat_hunting".to_string(), serde_json::to_value(&threat).map_err(anyhow::Error::from)?);

        let write = ArticleWrite {
            id: article_id,
            source_id: source.id,
            canonical_url,
            original_url: candidate.original_url,
            title: candidate.title,
            content: candidate.content,
            raw_html: candidate.raw_html,
            published_at: candidate.published_at,
            author: candidate.author,
            tags: candidate.tags,
            language: candidate.language,
            content_hash: hash,
            simhash: fingerprint,
            quality_score: quality,
            threat_hunting_score: threat.score,
            metadata: serde_json::Value::Object(metadata),
        };

        if let Some(outcome) = self.persist_with_conflict_retry(&write, band_keys, &hash).await? {
            return Ok(outcome);
        }

        if threat.score >= self.auto_trigger_threshold {
            self.store
                .enqueue_workflow_trigger(article_id, "threat_hunting_threshold", threat.score)
                .await
                .map_err(anyhow::Error::from)?;
            info!(article_id = %article_id, score = threat.score, "workflow trigger enqueued");
        }

        Ok(ProcessOutcome::Stored(article_id))
    }

    /// Retries a unique-constraint conflict (two workers racing the same
    /// content past the pre-check dedup lookups) up to
    /// `STORAGE_CONFLICT_RETRIES` times, then folds it into a
    /// `Duplicate(Exact)` outcome pointing at whichever article won the
    /// race (§7 `storage_conflict`).
    async fn persist_with_conflict_retry(
        &self,
        write: &ArticleWrite,
        band_keys: [u16; 4],
        content_hash: &str,
    ) -> sentryfeed_common::Result<Option<ProcessOutcome>> {
        for attempt in 0..=STORAGE_CONFLICT_RETRIES {
            match self.store.persist_article(write, band_keys).await {
                Ok(()) => return Ok(None),
                Err(SentryFeedError::StorageConflict(_)) if attempt < STORAGE_CONFLICT_RETRIES => {
                    continue;
                }
                Err(SentryFeedError::StorageConflict(hash)) => {
                    let canonical_id = self
                        .store
                        .find_by_content_hash(&hash)
                        .await
                        .map_err(anyhow::Error::from)?
                        .ok_or_else(|| SentryFeedError::StorageConflict(hash.clone()))?;
                    self.store
                        .track_url_alias(write.source_id, &write.canonical_url, canonical_id)
                        .await
                        .map_err(anyhow::Error::from)?;
                    return Ok(Some(ProcessOutcome::Duplicate {
                        kind: DuplicateKindOwned::Exact,
                        canonical_id,
                    }));
                }
                Err(e) => return Err(e),
            }
        }
        // unreachable: the loop above always returns on its last iteration
        Err(SentryFeedError::StorageConflict(content_hash.to_string()))
    }
}

/// Adapts `Processor` to the `Fetcher`'s `ArticleSink` trait. The source is
/// threaded through a thread-local-free closure instead, since `ArticleSink`
/// only carries the candidate — callers construct one `SourceBoundSink` per
/// `check_source` call.
pub struct SourceBoundSink<'a> {
    processor: &'a Processor,
    source: &'a Source,
}

impl<'a> SourceBoundSink<'a> {
    pub fn new(processor: &'a Processor, source: &'a Source) -> Self {
        Self { processor, source }
    }
}

#[async_trait]
impl<'a> ArticleSink for SourceBoundSink<'a> {
    async fn process(&self, candidate: ArticleCandidate) -> sentryfeed_common::Result<ProcessOutcome> {
        self.processor.process(self.source, candidate).await
    }
}
