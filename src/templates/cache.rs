use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::{FsTemplateStore, Template, TemplateStore};
use crate::error::DocumentError;

/// Filesystem store with an in-memory copy of recently used templates.
///
/// Entries are keyed by id and modification time, so saving a new version of
/// a template makes the next load read it from disk.
#[derive(Clone)]
pub struct CachedTemplateStore {
    inner: FsTemplateStore,
    cache: Cache<(String, SystemTime), Template>,
}

impl CachedTemplateStore {
    pub fn new(inner: FsTemplateStore, capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(30 * 60))
            .max_capacity(capacity)
            .build();
        Self { inner, cache }
    }

    pub fn inner(&self) -> &FsTemplateStore {
        &self.inner
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl TemplateStore for CachedTemplateStore {
    async fn load(&self, template_id: &str) -> Result<Template, DocumentError> {
        let modified = self.inner.modified(template_id).await?;
        let key = (template_id.to_string(), modified);

        if let Some(template) = self.cache.get(&key).await {
            log::debug!("Template cache hit for {}", template_id);
            return Ok(template);
        }

        let template = self.inner.load(template_id).await?;
        self.cache.insert(key, template.clone()).await;
        Ok(template)
    }
}

/// Wrap a filesystem store in a cache unless `capacity` is zero.
pub fn cached_or_plain(inner: FsTemplateStore, capacity: u64) -> Arc<dyn TemplateStore> {
    if capacity == 0 {
        Arc::new(inner)
    } else {
        Arc::new(CachedTemplateStore::new(inner, capacity))
    }
}
