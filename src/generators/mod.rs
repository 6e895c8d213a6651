//! Generators module - business logic for filling office templates.
//!
//! This module contains one request type per document:
//! - `CertificateRequest` - certificado de servicio (drawing)
//! - `OperationSheetRequest` - ficha de operación (word processor)
//! - `RodentRegisterRequest` - registro de roedores (spreadsheet)
//! - `ScheduleRequest` - programa de servicios (spreadsheet, one sheet per month)
//! - `ReportRequest` - informe técnico (word processor)
//!
//! `DocumentService` loads the template, fills it and converts the result.

pub mod certificate;
pub mod common;
pub mod operation_sheet;
pub mod report;
pub mod rodent_register;
pub mod schedule;
pub mod traits;
pub mod validation;

pub use certificate::CertificateRequest;
pub use operation_sheet::OperationSheetRequest;
pub use report::{ReportRequest, ReportSection};
pub use rodent_register::RodentRegisterRequest;
pub use schedule::ScheduleRequest;
pub use traits::{Generator, Placeholders, Validator};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::convert::ConversionPipeline;
use crate::engine::{fill_rows, PlaceholderMap, RowSpec, UnresolvedTokens};
use crate::error::DocumentError;
use crate::format::Format;
use crate::templates::{Template, TemplateStore};
use common::document_filename;
use validation::{validate_required, ValidationErrors};

/// Document kinds the service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Certificate,
    OperationSheet,
    RodentRegister,
    Schedule,
    NarrativeReport,
}

impl DocumentType {
    pub fn default_template(&self) -> &'static str {
        match self {
            Self::Certificate => "certificado.odg",
            Self::OperationSheet => "ficha_operacion.docx",
            Self::RodentRegister => "registro_roedores.xlsx",
            Self::Schedule => "programa_servicios.xlsx",
            Self::NarrativeReport => "informe_tecnico.docx",
        }
    }

    pub fn filename_prefix(&self) -> &'static str {
        match self {
            Self::Certificate => "certificado",
            Self::OperationSheet => "ficha-operacion",
            Self::RodentRegister => "registro-roedores",
            Self::Schedule => "programa-servicios",
            Self::NarrativeReport => "informe-tecnico",
        }
    }
}

/// Result of a successful document generation.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub format: Format,
}

/// Datos del cliente, comunes a todos los documentos.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cliente {
    pub nombre: String,
    /// RUT o documento tributario.
    pub documento: String,
    pub direccion: String,
    #[serde(default)]
    pub contacto: Option<String>,
}

impl Cliente {
    pub(crate) fn validate_into(&self, errors: &mut ValidationErrors) {
        validate_required(&self.nombre, "cliente.nombre", "Nombre del cliente", errors);
        validate_required(&self.direccion, "cliente.direccion", "Dirección", errors);
    }
}

impl Placeholders for Cliente {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("{cliente}", self.nombre.trim().to_string()),
            ("{documento}", self.documento.trim().to_string()),
            ("{direccion}", self.direccion.trim().to_string()),
            (
                "{contacto}",
                self.contacto.as_deref().unwrap_or_default().trim().to_string(),
            ),
        ]
    }
}

/// Where a repeatable row lives in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub table: usize,
    pub anchor_row: usize,
    pub minimum: usize,
}

impl TableLayout {
    pub fn spec(&self, tokens: &[&str], rows: Vec<PlaceholderMap>) -> Result<RowSpec, DocumentError> {
        Ok(RowSpec::new(self.table, self.anchor_row, tokens)?
            .with_rows(rows)
            .with_minimum(self.minimum))
    }
}

/// Fill the header and every row region in one pass under `policy`.
pub(crate) fn fill_with_rows(
    template: &Template,
    header: PlaceholderMap,
    specs: &[RowSpec],
    policy: UnresolvedTokens,
) -> Result<Vec<u8>, DocumentError> {
    fill_rows(&template.bytes, template.format, &header, specs, policy)
}

/// Facade over template storage, the fill engine and the converter.
#[derive(Clone)]
pub struct DocumentService {
    templates: Arc<dyn TemplateStore>,
    pipeline: Arc<ConversionPipeline>,
    policy: UnresolvedTokens,
    overrides: HashMap<DocumentType, String>,
}

impl DocumentService {
    pub fn new(templates: Arc<dyn TemplateStore>, pipeline: Arc<ConversionPipeline>) -> Self {
        Self {
            templates,
            pipeline,
            policy: UnresolvedTokens::default(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: UnresolvedTokens) -> Self {
        self.policy = policy;
        self
    }

    /// Use a different template id for one document type.
    pub fn with_template(mut self, kind: DocumentType, template_id: impl Into<String>) -> Self {
        self.overrides.insert(kind, template_id.into());
        self
    }

    pub fn template_id(&self, kind: DocumentType) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_template())
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    pub async fn certificate(
        &self,
        request: &CertificateRequest,
        target: Format,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generate(request, target, &CancellationToken::new()).await
    }

    pub async fn operation_sheet(
        &self,
        request: &OperationSheetRequest,
        target: Format,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generate(request, target, &CancellationToken::new()).await
    }

    pub async fn rodent_register(
        &self,
        request: &RodentRegisterRequest,
        target: Format,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generate(request, target, &CancellationToken::new()).await
    }

    pub async fn schedule(
        &self,
        request: &ScheduleRequest,
        target: Format,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generate(request, target, &CancellationToken::new()).await
    }

    pub async fn narrative_report(
        &self,
        request: &ReportRequest,
        target: Format,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generate(request, target, &CancellationToken::new()).await
    }

    /// Validate, load, fill and convert. The first failure stops the pipeline.
    pub async fn generate<R: Generator>(
        &self,
        request: &R,
        target: Format,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDocument, DocumentError> {
        let kind = R::TYPE;
        request.validate()?;

        let template = self.templates.load(self.template_id(kind)).await?;
        if !self.pipeline.is_supported(template.format, target) {
            return Err(DocumentError::UnsupportedFormatPair {
                from: template.format,
                to: target,
            });
        }

        let filled = request.fill(&template, self.policy)?;
        let bytes = self
            .pipeline
            .convert_cancellable(&filled, template.format, target, cancel)
            .await?;

        let parts = request.filename_parts();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let filename = document_filename(kind.filename_prefix(), &parts, target.extension());
        log::info!("Generated {} ({} bytes)", filename, bytes.len());

        Ok(GeneratedDocument {
            filename,
            bytes,
            mime_type: target.mime_type().to_string(),
            format: target,
        })
    }

    /// Convert arbitrary bytes through the shared pipeline.
    pub async fn convert(
        &self,
        bytes: &[u8],
        from: Format,
        to: Format,
    ) -> Result<Vec<u8>, DocumentError> {
        self.pipeline.convert(bytes, from, to).await
    }

    pub async fn convert_chain(&self, bytes: &[u8], chain: &[Format]) -> Result<Vec<u8>, DocumentError> {
        self.pipeline.convert_chain(bytes, chain).await
    }
}
