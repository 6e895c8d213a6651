//! Error taxonomy shared by every stage of document generation.

use thiserror::Error;

use crate::format::Format;

/// Errors that can occur while loading, filling or converting a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("template '{id}' not found: {reason}")]
    TemplateNotFound { id: String, reason: String },
    #[error("malformed template: {0}")]
    MalformedTemplate(String),
    #[error("conversion from {from} to {to} is not supported")]
    UnsupportedFormatPair { from: Format, to: Format },
    #[error("document converter unavailable: {0}")]
    ConversionUnavailable(String),
    #[error("document conversion failed: {0}")]
    ConversionFailed(String),
    #[error("invalid document data: {0}")]
    InvalidDomainData(String),
    #[error("document generation was cancelled")]
    Cancelled,
}

impl DocumentError {
    pub fn template_not_found(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::TemplateNotFound {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedTemplate(message.into())
    }

    /// Stable machine-readable code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateNotFound { .. } => "TemplateNotFound",
            Self::MalformedTemplate(_) => "MalformedTemplate",
            Self::UnsupportedFormatPair { .. } => "UnsupportedFormatPair",
            Self::ConversionUnavailable(_) => "ConversionUnavailable",
            Self::ConversionFailed(_) => "ConversionFailed",
            Self::InvalidDomainData(_) => "InvalidDomainData",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Message shown to office staff. Each kind reads differently so a missing
    /// template is never confused with a converter outage.
    pub fn user_message(&self) -> String {
        match self {
            Self::TemplateNotFound { id, .. } => format!(
                "No se encontró la plantilla '{}'. Verifique que el archivo exista en la carpeta de plantillas.",
                id
            ),
            Self::MalformedTemplate(detail) => format!(
                "La plantilla no tiene el formato esperado: {}. Revise el archivo de plantilla.",
                detail
            ),
            Self::UnsupportedFormatPair { from, to } => format!(
                "No es posible convertir documentos de {} a {}.",
                from.extension().to_uppercase(),
                to.extension().to_uppercase()
            ),
            Self::ConversionUnavailable(_) => {
                "El servicio de conversión de documentos no está disponible. Intente nuevamente en unos minutos."
                    .to_string()
            }
            Self::ConversionFailed(_) => {
                "El documento se generó pero no pudo convertirse al formato solicitado.".to_string()
            }
            Self::InvalidDomainData(detail) => format!("Datos inválidos: {}", detail),
            Self::Cancelled => "La generación del documento fue cancelada.".to_string(),
        }
    }
}

impl From<quick_xml::Error> for DocumentError {
    fn from(e: quick_xml::Error) -> Self {
        DocumentError::MalformedTemplate(e.to_string())
    }
}

impl From<zip::result::ZipError> for DocumentError {
    fn from(e: zip::result::ZipError) -> Self {
        DocumentError::MalformedTemplate(format!("unreadable container: {}", e))
    }
}
