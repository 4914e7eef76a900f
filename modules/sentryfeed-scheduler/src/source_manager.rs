//! Source Manager (§4.H): loads, validates, and syncs the source catalog,
//! and exposes the scheduler's `due_sources` ordering.

use sentryfeed_common::catalog::{parse_catalog, CatalogError};
use sentryfeed_common::{DiscriminatorLists, Source};
use sentryfeed_store::Store;

pub struct SourceManager<'a> {
    store: &'a Store,
}

#[derive(Debug, Clone, Default)]
pub struct SyncDiff {
    pub added_or_updated: usize,
    pub deactivated: usize,
}

impl<'a> SourceManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Parses and validates `yaml`, then upserts every source. Sources
    /// present in storage but absent from the catalog are marked inactive
    /// by default; passing `remove` hard-deletes them instead (§4.H
    /// "unknown sources in DB are not auto-removed unless `--remove` is
    /// passed; sources absent from config but present in DB are marked
    /// inactive by default").
    pub async fn sync(
        &self,
        yaml: &str,
        remove: bool,
    ) -> anyhow::Result<(SyncDiff, DiscriminatorLists)> {
        let catalog = parse_catalog(yaml).map_err(CatalogErrorDisplay)?;

        let mut diff = SyncDiff::default();
        let mut identifiers = Vec::with_capacity(catalog.sources.len());
        for entry in &catalog.sources {
            let source: Source = entry.into();
            identifiers.push(entry.identifier.clone());
            self.store.upsert_source(&source).await?;
            diff.added_or_updated += 1;
        }

        if remove {
            diff.deactivated = self.store.delete_missing(&identifiers).await? as usize;
        } else {
            diff.deactivated = self.store.deactivate_missing(&identifiers).await? as usize;
        }

        // Persisted so a later, separate `collect`/`rescore` invocation
        // (which never sees the catalog file) can load the same
        // discriminator lists back (§9 open question).
        self.store.save_discriminators(&catalog.discriminators).await?;

        Ok((diff, catalog.discriminators))
    }

    pub async fn due_sources(&self, now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<Source>> {
        self.store.due_sources(now).await
    }

    /// Every source, active or not, for `stats` listing.
    pub async fn all_sources(&self) -> anyhow::Result<Vec<Source>> {
        self.store.all_sources().await
    }
}

struct CatalogErrorDisplay(CatalogError);

impl From<CatalogErrorDisplay> for anyhow::Error {
    fn from(e: CatalogErrorDisplay) -> Self {
        anyhow::anyhow!("catalog validation failed: {}", e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_diff_default_is_zero() {
        let diff = SyncDiff::default();
        assert_eq!(diff.added_or_updated, 0);
        assert_eq!(diff.deactivated, 0);
    }
}
