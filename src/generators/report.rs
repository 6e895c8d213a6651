//! Generator for narrative technical reports (informe técnico).
//!
//! The body is a single-column table; each section becomes one or more rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::common::format_spanish_date;
use super::traits::{Generator, Placeholders, Validator};
use super::{fill_with_rows, Cliente, DocumentType, TableLayout};
use crate::engine::{PlaceholderMap, RowSpec, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

pub const SECTIONS_LAYOUT: TableLayout = TableLayout {
    table: 0,
    anchor_row: 0,
    minimum: 0,
};

pub const SECTION_TOKENS: [&str; 2] = ["{seccion_titulo}", "{seccion_texto}"];

/// Content of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum ReportSection {
    /// A heading with one paragraph of prose.
    TextBlock { title: String, body: String },
    /// A heading with a list of lines, one row each.
    TextArea { title: String, lines: Vec<String> },
}

impl ReportSection {
    pub fn title(&self) -> &str {
        match self {
            Self::TextBlock { title, .. } | Self::TextArea { title, .. } => title,
        }
    }

    /// `(title cell, text cell)` per rendered row. A text area shows its title
    /// on the first line only; an empty one still renders its title.
    pub fn rows(&self) -> Vec<(String, String)> {
        match self {
            Self::TextBlock { title, body } => vec![(title.clone(), body.clone())],
            Self::TextArea { title, lines } if lines.is_empty() => {
                vec![(title.clone(), String::new())]
            }
            Self::TextArea { title, lines } => lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let heading = if i == 0 { title.clone() } else { String::new() };
                    (heading, line.clone())
                })
                .collect(),
        }
    }
}

/// Datos generales del informe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformeData {
    pub numero: String,
    pub titulo: String,
    pub fecha: NaiveDate,
    pub autor: String,
}

/// Request para el informe técnico.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub cliente: Cliente,
    pub informe: InformeData,
    pub secciones: Vec<ReportSection>,
}

impl Validator for ReportRequest {
    fn validate(&self) -> Result<(), DocumentError> {
        use super::validation::*;

        let mut errors = ValidationErrors::new();
        self.cliente.validate_into(&mut errors);
        validate_required(&self.informe.numero, "informe.numero", "Número de informe", &mut errors);
        validate_required(&self.informe.titulo, "informe.titulo", "Título", &mut errors);
        validate_required(&self.informe.autor, "informe.autor", "Autor", &mut errors);
        validate_not_empty(&self.secciones, "secciones", "Sección", &mut errors);
        for (i, section) in self.secciones.iter().enumerate() {
            validate_required(
                section.title(),
                &format!("secciones[{}].title", i),
                "Título de sección",
                &mut errors,
            );
        }
        errors.into_result()
    }
}

impl Placeholders for ReportRequest {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.cliente.fields();
        fields.extend([
            ("{numero}", self.informe.numero.trim().to_string()),
            ("{titulo}", self.informe.titulo.trim().to_string()),
            ("{fecha}", format_spanish_date(self.informe.fecha)),
            ("{autor}", self.informe.autor.trim().to_string()),
        ]);
        fields
    }
}

impl ReportRequest {
    pub fn row_spec(&self) -> Result<RowSpec, DocumentError> {
        let rows = self
            .secciones
            .iter()
            .flat_map(ReportSection::rows)
            .map(|(title, text)| {
                PlaceholderMap::from_pairs([(SECTION_TOKENS[0], title), (SECTION_TOKENS[1], text)])
            })
            .collect::<Result<Vec<_>, _>>()?;
        SECTIONS_LAYOUT.spec(&SECTION_TOKENS, rows)
    }
}

impl Generator for ReportRequest {
    const TYPE: DocumentType = DocumentType::NarrativeReport;

    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError> {
        fill_with_rows(template, self.placeholder_map()?, &[self.row_spec()?], policy)
    }

    fn filename_parts(&self) -> Vec<String> {
        vec![self.informe.numero.clone(), self.cliente.nombre.clone()]
    }
}
