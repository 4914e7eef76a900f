//! Postgres persistence for sources, articles, and scheduling state (§3, §6).
//!
//! A thin `PgPool` wrapper: `FromRow` read models paired with plain-field
//! write paths, and warn-and-continue handling for writes that shouldn't
//! abort a scrape in progress.

use chrono::{DateTime, Duration, Utc};
use sentryfeed_common::{
    Article, DiscoveryHints, ExtractHints, Health, HttpOverrides, Scope, SentryFeedError, Source,
    SourceCheck, SourceState, Tier, UrlTracking,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

/// Candidate handed to `Store::persist_article`, already scored and hashed
/// by `sentryfeed-process`.
#[derive(Debug, Clone)]
pub struct ArticleWrite {
    pub id: Uuid,
    pub source_id: Uuid,
    pub canonical_url: String,
    pub original_url: String,
    pub title: String,
    pub content: String,
    pub raw_html: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub content_hash: String,
    pub simhash: u64,
    pub quality_score: f64,
    pub threat_hunting_score: u32,
    pub metadata: serde_json::Value,
}

/// A stored article's simhash, for near-duplicate comparison in the caller.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SimhashCandidate {
    pub article_id: Uuid,
    #[sqlx(try_from = "i64")]
    pub simhash: u64,
    pub discovered_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    identifier: String,
    name: String,
    url: String,
    rss_url: Option<String>,
    tier: i16,
    active: bool,
    weight: f64,
    check_frequency_seconds: i64,
    rate_limit_per_minute: i32,
    user_agent_override: Option<String>,
    scope_allow: serde_json::Value,
    scope_deny: serde_json::Value,
    scope_post_url_regex: Option<String>,
    extract_hints: serde_json::Value,
    discovery_hints: serde_json::Value,
    categories: serde_json::Value,
    http_overrides: serde_json::Value,
}

impl SourceRow {
    fn into_source(self) -> anyhow::Result<Source> {
        Ok(Source {
            id: self.id,
            identifier: self.identifier,
            name: self.name,
            url: self.url,
            rss_url: self.rss_url,
            tier: match self.tier {
                1 => Tier::Rss,
                2 => Tier::Modern,
                _ => Tier::Legacy,
            },
            active: self.active,
            weight: self.weight,
            check_frequency_seconds: self.check_frequency_seconds,
            rate_limit_per_minute: self.rate_limit_per_minute as u32,
            user_agent_override: self.user_agent_override,
            scope: Scope {
                allow: serde_json::from_value(self.scope_allow)?,
                deny: serde_json::from_value(self.scope_deny)?,
                post_url_regex: self.scope_post_url_regex,
            },
            extract_hints: serde_json::from_value::<ExtractHints>(self.extract_hints)?,
            discovery_hints: serde_json::from_value::<DiscoveryHints>(self.discovery_hints)?,
            categories: serde_json::from_value(self.categories)?,
            http_overrides: serde_json::from_value::<HttpOverrides>(self.http_overrides)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SourceStateRow {
    source_id: Uuid,
    last_checked_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_etag: Option<String>,
    last_modified: Option<String>,
    consecutive_failures: i32,
    health: String,
    next_run_at: Option<DateTime<Utc>>,
}

impl SourceStateRow {
    fn into_state(self) -> SourceState {
        SourceState {
            source_id: self.source_id,
            last_checked_at: self.last_checked_at,
            last_success_at: self.last_success_at,
            last_etag: self.last_etag,
            last_modified: self.last_modified,
            consecutive_failures: self.consecutive_failures as u32,
            health: match self.health.as_str() {
                "degraded" => Health::Degraded,
                "disabled_auto" => Health::DisabledAuto,
                _ => Health::Healthy,
            },
            next_run_at: self.next_run_at,
        }
    }
}

fn health_str(h: Health) -> &'static str {
    match h {
        Health::Healthy => "healthy",
        Health::Degraded => "degraded",
        Health::DisabledAuto => "disabled_auto",
    }
}

impl Store {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert or update a source from the catalog, creating its `SourceState`
    /// row if absent. Returns whether the source was newly created.
    pub async fn upsert_source(&self, source: &Source) -> anyhow::Result<bool> {
        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM sources WHERE identifier = $1")
                .bind(&source.identifier)
                .fetch_optional(&self.pool)
                .await?;

        let is_new = existing.is_none();
        let id = existing.unwrap_or(source.id);

        sqlx::query(
            r#"
            INSERT INTO sources (
                id, identifier, name, url, rss_url, tier, active, weight,
                check_frequency_seconds, rate_limit_per_minute, user_agent_override,
                scope_allow, scope_deny, scope_post_url_regex,
                extract_hints, discovery_hints, categories, http_overrides
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            ON CONFLICT (identifier) DO UPDATE SET
                name = EXCLUDED.name,
                url = EXCLUDED.url,
                rss_url = EXCLUDED.rss_url,
                tier = EXCLUDED.tier,
                active = EXCLUDED.active,
                weight = EXCLUDED.weight,
                check_frequency_seconds = EXCLUDED.check_frequency_seconds,
                rate_limit_per_minute = EXCLUDED.rate_limit_per_minute,
                user_agent_override = EXCLUDED.user_agent_override,
                scope_allow = EXCLUDED.scope_allow,
                scope_deny = EXCLUDED.scope_deny,
                scope_post_url_regex = EXCLUDED.scope_post_url_regex,
                extract_hints = EXCLUDED.extract_hints,
                discovery_hints = EXCLUDED.discovery_hints,
                categories = EXCLUDED.categories,
                http_overrides = EXCLUDED.http_overrides
            "#,
        )
        .bind(id)
        .bind(&source.identifier)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.rss_url)
        .bind(source.tier.as_i16())
        .bind(source.active)
        .bind(source.weight)
        .bind(source.check_frequency_seconds)
        .bind(source.rate_limit_per_minute as i32)
        .bind(&source.user_agent_override)
        .bind(serde_json::to_value(&source.scope.allow)?)
        .bind(serde_json::to_value(&source.scope.deny)?)
        .bind(&source.scope.post_url_regex)
        .bind(serde_json::to_value(&source.extract_hints)?)
        .bind(serde_json::to_value(&source.discovery_hints)?)
        .bind(serde_json::to_value(&source.categories)?)
        .bind(serde_json::to_value(&source.http_overrides)?)
        .execute(&self.pool)
        .await?;

        if is_new {
            sqlx::query(
                "INSERT INTO source_state (source_id, health, next_run_at) VALUES ($1, 'healthy', now()) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
        }

        Ok(is_new)
    }

    /// Deactivate sources present in storage but absent from `keep_identifiers`.
    /// This is `sync-sources`'s default path (§4.H): sources missing from the
    /// catalog are marked inactive rather than removed unless `--remove` is
    /// passed, in which case `delete_missing` runs instead.
    pub async fn deactivate_missing(&self, keep_identifiers: &[String]) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE sources SET active = false WHERE NOT (identifier = ANY($1)) AND active = true",
        )
        .bind(keep_identifiers)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Hard-delete sources absent from `keep_identifiers` (§4.H "unknown
    /// sources in DB are not auto-removed unless `--remove` is passed" —
    /// this is the `--remove` path; the default path is `deactivate_missing`).
    /// `source_state`/`source_leases` cascade via the FK; historical
    /// `source_checks`/`articles`/`url_tracking` rows reference the source
    /// too, so those are deleted first to satisfy the FK constraints.
    pub async fn delete_missing(&self, keep_identifiers: &[String]) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM sources WHERE NOT (identifier = ANY($1))",
        )
        .bind(keep_identifiers)
        .fetch_all(&self.pool)
        .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM url_tracking WHERE source_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM content_hashes WHERE article_id IN (SELECT id FROM articles WHERE source_id = ANY($1))",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
        for band_idx in 0..4 {
            let table = format!("simhash_band_{band_idx}");
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE article_id IN (SELECT id FROM articles WHERE source_id = ANY($1))"
            ))
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM articles WHERE source_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM source_checks WHERE source_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM sources WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn get_source(&self, id: Uuid) -> anyhow::Result<Option<Source>> {
        let row: Option<SourceRow> = sqlx::query_as("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SourceRow::into_source).transpose()
    }

    pub async fn get_source_state(&self, source_id: Uuid) -> anyhow::Result<SourceState> {
        let row: Option<SourceStateRow> =
            sqlx::query_as("SELECT * FROM source_state WHERE source_id = $1")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(SourceStateRow::into_state).unwrap_or_else(|| SourceState::new(source_id)))
    }

    /// §4.H: sources due for a check, ordered by health, then weight, then staleness.
    pub async fn due_sources(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Source>> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            r#"
            SELECT s.* FROM sources s
            JOIN source_state st ON st.source_id = s.id
            WHERE s.active = true AND (st.next_run_at IS NULL OR st.next_run_at <= $1)
            ORDER BY
                (st.health = 'healthy') DESC,
                s.weight DESC,
                st.next_run_at ASC NULLS FIRST
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SourceRow::into_source).collect()
    }

    /// Records a successful check: resets the failure streak, refreshes
    /// conditional-fetch headers, and schedules the next run.
    pub async fn record_check_success(
        &self,
        source_id: Uuid,
        etag: Option<&str>,
        last_modified: Option<&str>,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE source_state SET
                last_checked_at = now(),
                last_success_at = now(),
                last_etag = $2,
                last_modified = $3,
                consecutive_failures = 0,
                health = 'healthy',
                next_run_at = $4
            WHERE source_id = $1
            "#,
        )
        .bind(source_id)
        .bind(etag)
        .bind(last_modified)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a failed check: bumps the failure streak and recomputes health.
    pub async fn record_check_failure(
        &self,
        source_id: Uuid,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<Health> {
        let failures: i32 = sqlx::query_scalar(
            "UPDATE source_state SET last_checked_at = now(), consecutive_failures = consecutive_failures + 1, next_run_at = $2 WHERE source_id = $1 RETURNING consecutive_failures",
        )
        .bind(source_id)
        .bind(next_run_at)
        .fetch_one(&self.pool)
        .await?;

        let health = Health::from_failures(failures as u32);
        sqlx::query("UPDATE source_state SET health = $2 WHERE source_id = $1")
            .bind(source_id)
            .bind(health_str(health))
            .execute(&self.pool)
            .await?;
        Ok(health)
    }

    /// Attempts to acquire the per-source lease (§4.F mutual exclusion).
    /// Returns `false` if another holder has an unexpired lease.
    pub async fn try_claim(&self, source_id: Uuid, holder: &str) -> anyhow::Result<bool> {
        self.release_stuck(source_id, Duration::minutes(5)).await?;
        let result = sqlx::query(
            "INSERT INTO source_leases (source_id, holder, acquired_at) VALUES ($1, $2, now()) ON CONFLICT (source_id) DO NOTHING",
        )
        .bind(source_id)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release(&self, source_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM source_leases WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_stuck(&self, source_id: Uuid, max_age: Duration) -> anyhow::Result<()> {
        let cutoff = Utc::now() - max_age;
        sqlx::query("DELETE FROM source_leases WHERE source_id = $1 AND acquired_at < $2")
            .bind(source_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn start_check(&self, check: &SourceCheck) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO source_checks (id, source_id, started_at, articles_seen, articles_new) VALUES ($1,$2,$3,0,0)",
        )
        .bind(check.id)
        .bind(check.source_id)
        .bind(check.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_check(
        &self,
        check_id: Uuid,
        http_status: Option<u16>,
        bytes: Option<i64>,
        articles_seen: u32,
        articles_new: u32,
        error_kind: Option<&str>,
        error_detail: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE source_checks SET
                finished_at = now(),
                http_status = $2,
                bytes = $3,
                articles_seen = $4,
                articles_new = $5,
                error_kind = $6,
                error_detail = $7
            WHERE id = $1
            "#,
        )
        .bind(check_id)
        .bind(http_status.map(|s| s as i16))
        .bind(bytes)
        .bind(articles_seen as i32)
        .bind(articles_new as i32)
        .bind(error_kind)
        .bind(error_detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.G exact-dedup lookup by content hash.
    pub async fn find_by_content_hash(&self, content_hash: &str) -> anyhow::Result<Option<Uuid>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT article_id FROM content_hashes WHERE content_hash = $1")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    /// §4.G near-dup candidate lookup: any article sharing a simhash band.
    /// Hamming distance is computed by the caller (`sentryfeed-clean::hamming_distance`).
    pub async fn near_dup_candidates(
        &self,
        bands: [u16; 4],
    ) -> anyhow::Result<Vec<SimhashCandidate>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (band_idx, band_key) in bands.iter().enumerate() {
            let table = format!("simhash_band_{band_idx}");
            let rows: Vec<SimhashCandidate> = sqlx::query_as(&format!(
                "SELECT b.article_id, a.simhash, a.discovered_at FROM {table} b JOIN articles a ON a.id = b.article_id WHERE b.band_key = $1"
            ))
            .bind(*band_key as i32)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                if seen.insert(row.article_id) {
                    out.push(row);
                }
            }
        }
        Ok(out)
    }

    /// §5 transactional persist: article row, content-hash index, all four
    /// simhash band rows, and URL tracking commit together.
    /// §7 `storage_conflict`: a unique-constraint violation on `content_hash`
    /// (two workers racing the same article past the pre-check in
    /// `Processor::process`) surfaces as `SentryFeedError::StorageConflict`
    /// rather than a bare `anyhow::Error`, so the caller can retry or fold it
    /// into a duplicate outcome instead of failing the whole source check.
    pub async fn persist_article(
        &self,
        article: &ArticleWrite,
        bands: [u16; 4],
    ) -> Result<(), SentryFeedError> {
        let mut tx = self.pool.begin().await.map_err(|e| classify_db_error(e, &article.content_hash))?;

        let tags_json = serde_json::to_value(&article.tags)
            .map_err(|e| SentryFeedError::Fatal(format!("tags serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO articles (
                id, source_id, canonical_url, original_url, title, content, raw_html,
                published_at, author, tags, language, content_hash, simhash,
                quality_score, threat_hunting_score, metadata
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            "#,
        )
        .bind(article.id)
        .bind(article.source_id)
        .bind(&article.canonical_url)
        .bind(&article.original_url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.raw_html)
        .bind(article.published_at)
        .bind(&article.author)
        .bind(tags_json)
        .bind(&article.language)
        .bind(&article.content_hash)
        .bind(article.simhash as i64)
        .bind(article.quality_score)
        .bind(article.threat_hunting_score as i32)
        .bind(&article.metadata)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_db_error(e, &article.content_hash))?;

        sqlx::query("INSERT INTO content_hashes (content_hash, article_id) VALUES ($1, $2)")
            .bind(&article.content_hash)
            .bind(article.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_db_error(e, &article.content_hash))?;

        for (band_idx, band_key) in bands.iter().enumerate() {
            let table = format!("simhash_band_{band_idx}");
            sqlx::query(&format!(
                "INSERT INTO {table} (band_key, article_id) VALUES ($1, $2)"
            ))
            .bind(*band_key as i32)
            .bind(article.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_db_error(e, &article.content_hash))?;
        }

        sqlx::query(
            r#"
            INSERT INTO url_tracking (source_id, canonical_url, first_seen_at, last_seen_at, article_id)
            VALUES ($1, $2, now(), now(), $3)
            ON CONFLICT (source_id, canonical_url) DO UPDATE SET
                last_seen_at = now(),
                article_id = EXCLUDED.article_id
            "#,
        )
        .bind(article.source_id)
        .bind(&article.canonical_url)
        .bind(article.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_db_error(e, &article.content_hash))?;

        tx.commit()
            .await
            .map_err(|e| classify_db_error(e, &article.content_hash))?;
        Ok(())
    }

    /// §4.G step 4: alias `canonical_url` (scoped to `source_id`) to the
    /// article id a duplicate resolved to, so the same URL is recognized as
    /// already tracked on the next check instead of being re-discovered and
    /// re-scored every cycle.
    pub async fn track_url_alias(
        &self,
        source_id: Uuid,
        canonical_url: &str,
        article_id: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO url_tracking (source_id, canonical_url, first_seen_at, last_seen_at, article_id)
            VALUES ($1, $2, now(), now(), $3)
            ON CONFLICT (source_id, canonical_url) DO UPDATE SET
                last_seen_at = now(),
                article_id = EXCLUDED.article_id
            "#,
        )
        .bind(source_id)
        .bind(canonical_url)
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.F: skip re-fetch of URLs already tracked for this source.
    pub async fn lookup_url_tracking(
        &self,
        source_id: Uuid,
        canonical_url: &str,
    ) -> anyhow::Result<Option<UrlTracking>> {
        let row = sqlx::query_as::<_, UrlTrackingRow>(
            "SELECT * FROM url_tracking WHERE source_id = $1 AND canonical_url = $2",
        )
        .bind(source_id)
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UrlTracking {
            source_id: r.source_id,
            canonical_url: r.canonical_url,
            first_seen_at: r.first_seen_at,
            last_seen_at: r.last_seen_at,
            article_id: r.article_id,
        }))
    }

    pub async fn enqueue_workflow_trigger(
        &self,
        article_id: Uuid,
        reason: &str,
        score: u32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO workflow_triggers (id, article_id, reason, score, enqueued_at) VALUES ($1,$2,$3,$4, now())",
        )
        .bind(Uuid::new_v4())
        .bind(article_id)
        .bind(reason)
        .bind(score as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Maintenance: prune `SourceCheck` rows older than `older_than_days` (§9 supplemented task).
    pub async fn prune_source_checks(&self, older_than_days: i64) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days);
        let result = sqlx::query("DELETE FROM source_checks WHERE started_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Maintenance: drop duplicate `(band_key, article_id)` rows that can
    /// accumulate if a persist is retried (§9 supplemented task).
    pub async fn compact_simhash_buckets(&self) -> anyhow::Result<u64> {
        let mut total = 0u64;
        for band_idx in 0..4 {
            let table = format!("simhash_band_{band_idx}");
            let result = sqlx::query(&format!(
                r#"
                DELETE FROM {table} a USING {table} b
                WHERE a.ctid < b.ctid
                  AND a.band_key = b.band_key
                  AND a.article_id = b.article_id
                "#
            ))
            .execute(&self.pool)
            .await?;
            total += result.rows_affected();
        }
        Ok(total)
    }

    /// All sources, active or not, for `stats` aggregate listing.
    pub async fn all_sources(&self) -> anyhow::Result<Vec<Source>> {
        let rows: Vec<SourceRow> = sqlx::query_as("SELECT * FROM sources ORDER BY identifier")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SourceRow::into_source).collect()
    }

    /// Stored articles, optionally scoped to a source or a single article id
    /// (SPEC_FULL §0 supplemented `rescore` operation).
    pub async fn list_articles(&self, source_id: Option<Uuid>, article_id: Option<Uuid>) -> anyhow::Result<Vec<Article>> {
        let rows: Vec<ArticleRow> = match (source_id, article_id) {
            (_, Some(id)) => {
                sqlx::query_as("SELECT * FROM articles WHERE id = $1")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(sid), None) => {
                sqlx::query_as("SELECT * FROM articles WHERE source_id = $1 ORDER BY discovered_at DESC")
                    .bind(sid)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM articles ORDER BY discovered_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(ArticleRow::into_article).collect()
    }

    /// Overwrites a stored article's quality/threat-hunting scores after a
    /// rescore pass.
    pub async fn update_article_scores(
        &self,
        id: Uuid,
        quality_score: f64,
        threat_hunting_score: u32,
        metadata: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE articles SET quality_score = $2, threat_hunting_score = $3, metadata = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(quality_score)
        .bind(threat_hunting_score as i32)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Per-source counters backing `stats --source` (SPEC_FULL §0
    /// supplemented feature 1).
    pub async fn source_stats(&self, source_id: Uuid) -> anyhow::Result<Option<SourceStats>> {
        let Some(source) = self.get_source(source_id).await? else {
            return Ok(None);
        };
        let state = self.get_source_state(source_id).await?;

        let (article_count, avg_quality_score, avg_threat_hunting_score): (i64, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*), AVG(quality_score)::float8, AVG(threat_hunting_score)::float8 FROM articles WHERE source_id = $1",
            )
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;

        let last_check: Option<SourceCheckRow> = sqlx::query_as(
            "SELECT * FROM source_checks WHERE source_id = $1 ORDER BY started_at DESC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Some(SourceStats {
            source,
            state,
            article_count,
            avg_quality_score,
            avg_threat_hunting_score,
            last_check: last_check.map(SourceCheckRow::into_check),
        }))
    }

    /// Persists the catalog's discriminator keyword lists (§9 open question:
    /// these are operator configuration, not a hardcoded constant). Called
    /// by `init`/`sync-sources` after a successful catalog parse so a later,
    /// separate `collect` process can load the same lists back.
    pub async fn save_discriminators(&self, discriminators: &sentryfeed_common::DiscriminatorLists) -> anyhow::Result<()> {
        let value = serde_json::to_value(discriminators)?;
        sqlx::query(
            r#"
            INSERT INTO catalog_meta (id, discriminators, updated_at)
            VALUES (1, $1, now())
            ON CONFLICT (id) DO UPDATE SET discriminators = EXCLUDED.discriminators, updated_at = now()
            "#,
        )
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Loads the discriminator lists last saved by `save_discriminators`.
    /// Returns the default (empty) lists if the catalog has never been synced.
    pub async fn load_discriminators(&self) -> anyhow::Result<sentryfeed_common::DiscriminatorLists> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT discriminators FROM catalog_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((value,)) => Ok(serde_json::from_value(value)?),
            None => Ok(sentryfeed_common::DiscriminatorLists::default()),
        }
    }
}

/// Aggregate counters for a single source, built fresh for each `stats`
/// invocation rather than cached.
#[derive(Debug, Clone)]
pub struct SourceStats {
    pub source: Source,
    pub state: SourceState,
    pub article_count: i64,
    pub avg_quality_score: Option<f64>,
    pub avg_threat_hunting_score: Option<f64>,
    pub last_check: Option<SourceCheck>,
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    source_id: Uuid,
    canonical_url: String,
    original_url: String,
    title: String,
    content: String,
    raw_html: Option<String>,
    published_at: Option<DateTime<Utc>>,
    discovered_at: DateTime<Utc>,
    author: Option<String>,
    tags: serde_json::Value,
    language: Option<String>,
    content_hash: String,
    simhash: i64,
    quality_score: f64,
    threat_hunting_score: i32,
    metadata: serde_json::Value,
}

impl ArticleRow {
    fn into_article(self) -> anyhow::Result<Article> {
        Ok(Article {
            id: self.id,
            source_id: self.source_id,
            canonical_url: self.canonical_url,
            original_url: self.original_url,
            title: self.title,
            content: self.content,
            raw_html: self.raw_html,
            published_at: self.published_at,
            discovered_at: self.discovered_at,
            author: self.author,
            tags: serde_json::from_value(self.tags).unwrap_or_default(),
            language: self.language,
            content_hash: self.content_hash,
            simhash: self.simhash as u64,
            quality_score: self.quality_score,
            threat_hunting_score: self.threat_hunting_score as u32,
            metadata: serde_json::from_value(self.metadata).unwrap_or_default(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct SourceCheckRow {
    id: Uuid,
    source_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    http_status: Option<i16>,
    bytes: Option<i64>,
    articles_seen: i32,
    articles_new: i32,
    error_kind: Option<String>,
    error_detail: Option<String>,
}

impl SourceCheckRow {
    fn into_check(self) -> SourceCheck {
        SourceCheck {
            id: self.id,
            source_id: self.source_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            http_status: self.http_status.map(|s| s as u16),
            bytes: self.bytes,
            articles_seen: self.articles_seen as u32,
            articles_new: self.articles_new as u32,
            error_kind: self.error_kind,
            error_detail: self.error_detail,
        }
    }
}

/// Postgres unique-violation code (`23505`) becomes `StorageConflict`; every
/// other `sqlx::Error` is a fatal failure for this write.
fn classify_db_error(err: sqlx::Error, content_hash: &str) -> SentryFeedError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return SentryFeedError::StorageConflict(content_hash.to_string());
        }
    }
    SentryFeedError::Anyhow(anyhow::Error::from(err))
}

#[derive(sqlx::FromRow)]
struct UrlTrackingRow {
    source_id: Uuid,
    canonical_url: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    article_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_str_round_trips_through_from_failures() {
        assert_eq!(health_str(Health::from_failures(0)), "healthy");
        assert_eq!(health_str(Health::from_failures(5)), "degraded");
        assert_eq!(health_str(Health::from_failures(20)), "disabled_auto");
    }
}
