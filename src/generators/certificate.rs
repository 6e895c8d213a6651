//! Generator for service certificates (certificado de servicio).
//!
//! A single-page drawing whose text fields are filled by substitution.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::common::{format_date, format_spanish_date};
use super::traits::{Generator, Placeholders, Validator};
use super::{Cliente, DocumentType};
use crate::engine::{substitute_with, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

/// Datos del certificado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificadoData {
    pub numero: String,
    /// Servicios realizados, p. ej. "Desratización".
    pub servicios: Vec<String>,
    pub fecha_servicio: NaiveDate,
    pub vigencia_hasta: NaiveDate,
    pub tecnico: String,
    #[serde(default)]
    pub productos: String,
    /// Fecha de emisión; hoy si no se indica.
    #[serde(default)]
    pub fecha_emision: Option<NaiveDate>,
}

/// Request para emitir un certificado de servicio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub cliente: Cliente,
    pub certificado: CertificadoData,
}

impl Validator for CertificateRequest {
    fn validate(&self) -> Result<(), DocumentError> {
        use super::validation::*;

        let mut errors = ValidationErrors::new();
        self.cliente.validate_into(&mut errors);

        let cert = &self.certificado;
        validate_required(&cert.numero, "certificado.numero", "Número de certificado", &mut errors);
        validate_required(&cert.tecnico, "certificado.tecnico", "Técnico responsable", &mut errors);
        validate_services(&cert.servicios, "certificado.servicios", &mut errors);
        validate_date_order(
            cert.fecha_servicio,
            cert.vigencia_hasta,
            "certificado.vigencia_hasta",
            ("Fecha de servicio", "Vigencia"),
            &mut errors,
        );

        errors.into_result()
    }
}

impl Placeholders for CertificateRequest {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let cert = &self.certificado;
        let issued = cert
            .fecha_emision
            .unwrap_or_else(|| Local::now().date_naive());

        let mut fields = self.cliente.fields();
        fields.extend([
            ("{numero}", cert.numero.trim().to_string()),
            ("{servicios}", cert.servicios.join(", ")),
            ("{fecha_servicio}", format_spanish_date(cert.fecha_servicio)),
            ("{vigencia}", format_date(cert.vigencia_hasta)),
            ("{tecnico}", cert.tecnico.trim().to_string()),
            ("{productos}", cert.productos.trim().to_string()),
            ("{fecha_emision}", format_spanish_date(issued)),
        ]);
        fields
    }
}

impl Generator for CertificateRequest {
    const TYPE: DocumentType = DocumentType::Certificate;

    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError> {
        substitute_with(&template.bytes, template.format, &self.placeholder_map()?, policy)
    }

    fn filename_parts(&self) -> Vec<String> {
        vec![self.certificado.numero.clone(), self.cliente.nombre.clone()]
    }
}
