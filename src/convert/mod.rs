//! Conversion pipeline.
//!
//! Wraps a slow external converter behind a fixed-size FIFO limiter. Every
//! call works inside its own temporary directory, which is removed however
//! the call ends: success, failure, timeout or cancellation.

mod gotenberg;
mod soffice;

pub use gotenberg::GotenbergBackend;
pub use soffice::SofficeBackend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DocumentError;
use crate::format::Format;

/// Pairs the pipeline will hand to a backend. Identity is handled without one.
pub const SUPPORTED_PAIRS: [(Format, Format); 3] = [
    (Format::WordProcessor, Format::Pdf),
    (Format::Spreadsheet, Format::Pdf),
    (Format::VectorGraphics, Format::Pdf),
];

/// How a backend call went wrong.
#[derive(Debug, Error)]
pub enum ConverterFailure {
    /// The converter could not be reached or started.
    #[error("{0}")]
    Unavailable(String),
    /// The converter ran and rejected or botched the input.
    #[error("{0}")]
    Failed(String),
}

impl From<ConverterFailure> for DocumentError {
    fn from(failure: ConverterFailure) -> Self {
        match failure {
            ConverterFailure::Unavailable(msg) => DocumentError::ConversionUnavailable(msg),
            ConverterFailure::Failed(msg) => DocumentError::ConversionFailed(msg),
        }
    }
}

/// One backend invocation. All paths live inside the call's temporary directory.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub from: Format,
    pub to: Format,
    /// Scratch space owned by this call (profiles, logs).
    pub work_dir: PathBuf,
    /// `<work_dir>/<id>.<from ext>`
    pub input: PathBuf,
    /// Directory the backend must write its result to.
    pub output_dir: PathBuf,
}

impl ConversionJob {
    fn new(id: Uuid, from: Format, to: Format, work_dir: &Path) -> Self {
        Self {
            id,
            from,
            to,
            work_dir: work_dir.to_path_buf(),
            input: work_dir.join(format!("{}.{}", id, from.extension())),
            output_dir: work_dir.join("out"),
        }
    }

    /// Where the pipeline reads the result: `<output_dir>/<id>.<to ext>`.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.id, self.to.extension()))
    }
}

/// An external converter.
#[async_trait]
pub trait ConverterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can produce `to` from `from`.
    fn supports(&self, _from: Format, _to: Format) -> bool {
        true
    }

    /// Convert `job.input` and leave the result at `job.output_path()`.
    async fn convert(&self, job: &ConversionJob) -> Result<(), ConverterFailure>;
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum simultaneous backend calls (L).
    pub concurrency: usize,
    pub run_timeout: Duration,
    /// How long a call may wait for a free slot; `None` waits indefinitely.
    pub queue_timeout: Option<Duration>,
    /// Parent of the per-call directories; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            run_timeout: Duration::from_secs(120),
            queue_timeout: None,
            temp_root: None,
        }
    }
}

/// Bounded, cancellable access to a converter backend.
pub struct ConversionPipeline {
    backend: Arc<dyn ConverterBackend>,
    limiter: Arc<Semaphore>,
    options: PipelineOptions,
    shutdown: CancellationToken,
}

impl ConversionPipeline {
    pub fn new(backend: Arc<dyn ConverterBackend>, options: PipelineOptions) -> Self {
        let slots = options.concurrency.max(1);
        log::info!(
            "Conversion pipeline ready: backend={}, slots={}, run timeout={:?}",
            backend.name(),
            slots,
            options.run_timeout
        );
        Self {
            backend,
            limiter: Arc::new(Semaphore::new(slots)),
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn supported_pairs(&self) -> Vec<(Format, Format)> {
        SUPPORTED_PAIRS
            .into_iter()
            .filter(|(from, to)| self.backend.supports(*from, *to))
            .collect()
    }

    pub fn is_supported(&self, from: Format, to: Format) -> bool {
        from == to || self.supported_pairs().contains(&(from, to))
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.options.concurrency.max(1) - self.limiter.available_permits()
    }

    pub async fn convert(&self, bytes: &[u8], from: Format, to: Format) -> Result<Vec<u8>, DocumentError> {
        self.convert_cancellable(bytes, from, to, &CancellationToken::new())
            .await
    }

    pub async fn convert_cancellable(
        &self,
        bytes: &[u8],
        from: Format,
        to: Format,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, DocumentError> {
        if from == to {
            log::debug!("Identity conversion {}, returning input", from);
            return Ok(bytes.to_vec());
        }
        if !self.is_supported(from, to) {
            return Err(DocumentError::UnsupportedFormatPair { from, to });
        }

        let id = Uuid::new_v4();
        log::debug!("Conversion {} queued: {} -> {}", id, from, to);

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Conversion {} cancelled while queued", id);
                return Err(DocumentError::Cancelled);
            }
            permit = self.acquire() => permit?,
        };

        let workspace = self.workspace()?;
        let job = ConversionJob::new(id, from, to, workspace.path());
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|e| temp_failure(id, "create output directory", e))?;
        tokio::fs::write(&job.input, bytes)
            .await
            .map_err(|e| temp_failure(id, "write input", e))?;

        log::info!("Conversion {} started on {}: {} -> {}", id, self.backend.name(), from, to);
        let run = tokio::time::timeout(self.options.run_timeout, self.backend.convert(&job));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Conversion {} cancelled in flight", id);
                return Err(DocumentError::Cancelled);
            }
            outcome = run => outcome,
        };

        match outcome {
            Err(_) => {
                log::warn!("Conversion {} timed out after {:?}", id, self.options.run_timeout);
                return Err(DocumentError::ConversionFailed(format!(
                    "converter did not finish within {} seconds",
                    self.options.run_timeout.as_secs()
                )));
            }
            Ok(Err(failure)) => {
                log::warn!("Conversion {} failed: {}", id, failure);
                return Err(failure.into());
            }
            Ok(Ok(())) => {}
        }

        let output = match tokio::fs::read(job.output_path()).await {
            Ok(output) if !output.is_empty() => output,
            Ok(_) => {
                return Err(DocumentError::ConversionFailed(
                    "converter produced an empty file".to_string(),
                ))
            }
            Err(e) => {
                return Err(DocumentError::ConversionFailed(format!(
                    "converter produced no output: {}",
                    e
                )))
            }
        };
        log::info!("Conversion {} finished ({} bytes)", id, output.len());
        Ok(output)
    }

    /// Run an explicit chain of single-hop conversions, e.g. `[odg, pdf]`.
    ///
    /// Every hop is checked before the first one runs.
    pub async fn convert_chain(&self, bytes: &[u8], chain: &[Format]) -> Result<Vec<u8>, DocumentError> {
        let Some(first) = chain.first() else {
            return Err(DocumentError::InvalidDomainData(
                "conversion chain is empty".to_string(),
            ));
        };
        if let Some(pair) = chain.windows(2).find(|hop| !self.is_supported(hop[0], hop[1])) {
            return Err(DocumentError::UnsupportedFormatPair {
                from: pair[0],
                to: pair[1],
            });
        }

        let mut current = bytes.to_vec();
        let mut format = *first;
        for &next in &chain[1..] {
            current = self.convert(&current, format, next).await?;
            format = next;
        }
        Ok(current)
    }

    /// Stop accepting work. Waiting calls fail with `ConversionUnavailable`.
    pub fn shutdown(&self) {
        log::info!("Conversion pipeline shutting down");
        self.shutdown.cancel();
        self.limiter.close();
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, DocumentError> {
        if self.shutdown.is_cancelled() {
            return Err(unavailable_shutdown());
        }
        let acquire = self.limiter.clone().acquire_owned();
        let permit = match self.options.queue_timeout {
            Some(limit) => tokio::time::timeout(limit, acquire).await.map_err(|_| {
                DocumentError::ConversionUnavailable(format!(
                    "no converter slot became free within {} seconds",
                    limit.as_secs()
                ))
            })?,
            None => acquire.await,
        };
        permit.map_err(|_| unavailable_shutdown())
    }

    fn workspace(&self) -> Result<tempfile::TempDir, DocumentError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pestdocs-");
        let created = match &self.options.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        created.map_err(|e| {
            log::error!("Cannot create conversion workspace: {}", e);
            DocumentError::ConversionUnavailable(format!(
                "temporary workspace unavailable: {}",
                e
            ))
        })
    }
}

fn unavailable_shutdown() -> DocumentError {
    DocumentError::ConversionUnavailable("conversion pipeline is shut down".to_string())
}

fn temp_failure(id: Uuid, step: &str, e: std::io::Error) -> DocumentError {
    log::error!("Conversion {}: cannot {}: {}", id, step, e);
    DocumentError::ConversionUnavailable(format!("cannot {}: {}", step, e))
}

/// Last few lines of converter output, for error messages.
pub(crate) fn excerpt(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    let joined = lines[start..].join(" | ");
    if joined.chars().count() > 400 {
        joined.chars().take(400).collect()
    } else {
        joined
    }
}
