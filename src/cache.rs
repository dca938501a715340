//! Read-through enrichment cache.
//!
//! Two layers: a moka in-memory cache for the hot path and the durable
//! `enrichment_cache` table behind it. Entries are tenant-scoped and keyed by
//! a SHA-256 hash of the company domain (or email as a fallback), so two
//! tenants never see each other's enrichment data even for the same company.

use chrono::{Duration as ChronoDuration, Utc};
use moka::future::Cache as MokaCache;
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::db_storage::PipelineStore;
use crate::errors::PipelineError;
use crate::models::CachedEnrichment;

/// Durable cache TTL. The in-memory layer expires daily regardless.
pub const CACHE_TTL_DAYS: i64 = 90;

pub struct EnrichmentCache {
    memory: MokaCache<String, CachedEnrichment>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self {
            memory: MokaCache::builder()
                .time_to_live(Duration::from_secs(86400))
                .max_capacity(50_000)
                .build(),
        }
    }

    /// Tenant-scoped cache key hash.
    pub fn hash_key(tenant_id: Uuid, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("enrich:{}:{}", tenant_id, key.to_lowercase()));
        hex::encode(hasher.finalize())
    }

    pub async fn get(
        &self,
        store: &dyn PipelineStore,
        tenant_id: Uuid,
        key: &str,
    ) -> Result<Option<CachedEnrichment>, PipelineError> {
        let hash = Self::hash_key(tenant_id, key);

        if let Some(entry) = self.memory.get(&hash).await {
            if entry.expires_at > Utc::now() {
                tracing::debug!("Enrichment cache hit (memory) for {}", key);
                return Ok(Some(entry));
            }
            self.memory.invalidate(&hash).await;
        }

        if let Some(entry) = store.cache_get(tenant_id, &hash).await? {
            tracing::debug!("Enrichment cache hit (durable) for {}", key);
            self.memory.insert(hash, entry.clone()).await;
            return Ok(Some(entry));
        }

        Ok(None)
    }

    pub async fn put(
        &self,
        store: &dyn PipelineStore,
        tenant_id: Uuid,
        key: &str,
        enriched_data: serde_json::Value,
        providers_used: Vec<String>,
    ) -> Result<(), PipelineError> {
        let hash = Self::hash_key(tenant_id, key);
        let entry = CachedEnrichment {
            tenant_id,
            key_hash: hash.clone(),
            enriched_data,
            providers_used,
            expires_at: Utc::now() + ChronoDuration::days(CACHE_TTL_DAYS),
        };

        store.cache_put(&entry).await?;
        self.memory.insert(hash, entry).await;
        Ok(())
    }
}

impl Default for EnrichmentCache {
    fn default() -> Self {
        Self::new()
    }
}
