//! Template storage.
//!
//! Templates are read fresh for every document (or served as an immutable copy
//! from the cache) and never modified in place.

mod cache;

pub use cache::{cached_or_plain, CachedTemplateStore};

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::DocumentError;
use crate::format::Format;

/// A loaded template: id, container format and raw bytes.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub format: Format,
    pub bytes: Arc<Vec<u8>>,
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn load(&self, template_id: &str) -> Result<Template, DocumentError>;
}

/// Templates read from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an id to a path under the root, refusing anything that escapes it.
    pub fn resolve(&self, template_id: &str) -> Result<(PathBuf, Format), DocumentError> {
        let relative = Path::new(template_id);
        let escapes = template_id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(DocumentError::template_not_found(
                template_id,
                "template ids must be relative paths inside the template directory",
            ));
        }

        let format = Format::from_filename(template_id)
            .filter(Format::is_container)
            .ok_or_else(|| {
                DocumentError::malformed(format!(
                    "'{}' does not name an office container (.docx, .xlsx or .odg)",
                    template_id
                ))
            })?;
        Ok((self.root.join(relative), format))
    }

    pub(crate) async fn modified(&self, template_id: &str) -> Result<SystemTime, DocumentError> {
        let (path, _) = self.resolve(template_id)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| DocumentError::template_not_found(template_id, e))?;
        metadata
            .modified()
            .map_err(|e| DocumentError::template_not_found(template_id, e))
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, template_id: &str) -> Result<Template, DocumentError> {
        let (path, format) = self.resolve(template_id)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            log::warn!("Template {} unreadable at {}: {}", template_id, path.display(), e);
            DocumentError::template_not_found(template_id, e)
        })?;
        log::debug!("Loaded template {} ({} bytes)", template_id, bytes.len());
        Ok(Template {
            id: template_id.to_string(),
            format,
            bytes: Arc::new(bytes),
        })
    }
}
