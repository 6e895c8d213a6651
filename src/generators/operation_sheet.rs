//! Generator for operation sheets (ficha de operación).
//!
//! Header fields by substitution, plus one table row per treated area. The
//! printed form always shows at least ten rows so technicians can add areas
//! by hand.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::common::format_date;
use super::traits::{Generator, Placeholders, Validator};
use super::{fill_with_rows, Cliente, DocumentType, TableLayout};
use crate::engine::{PlaceholderMap, RowSpec, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

/// Areas table: first table of the document, header in row 0.
pub const AREAS_LAYOUT: TableLayout = TableLayout {
    table: 0,
    anchor_row: 1,
    minimum: 10,
};

pub const AREA_TOKENS: [&str; 5] = ["{area}", "{plaga}", "{producto}", "{dosis}", "{metodo}"];

/// Datos de la visita.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitaData {
    pub numero: String,
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_termino: NaiveTime,
    pub tecnico: String,
    pub servicio: String,
    #[serde(default)]
    pub observaciones: String,
}

/// Área tratada durante la visita.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaTratada {
    pub area: String,
    #[serde(default)]
    pub plaga: String,
    #[serde(default)]
    pub producto: String,
    #[serde(default)]
    pub dosis: String,
    #[serde(default)]
    pub metodo: String,
}

impl Placeholders for AreaTratada {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("{area}", self.area.clone()),
            ("{plaga}", self.plaga.clone()),
            ("{producto}", self.producto.clone()),
            ("{dosis}", self.dosis.clone()),
            ("{metodo}", self.metodo.clone()),
        ]
    }
}

/// Request para la ficha de operación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSheetRequest {
    pub cliente: Cliente,
    pub visita: VisitaData,
    #[serde(default)]
    pub areas: Vec<AreaTratada>,
}

impl Validator for OperationSheetRequest {
    fn validate(&self) -> Result<(), DocumentError> {
        use super::validation::*;

        let mut errors = ValidationErrors::new();
        self.cliente.validate_into(&mut errors);
        validate_required(&self.visita.numero, "visita.numero", "Número de ficha", &mut errors);
        validate_required(&self.visita.tecnico, "visita.tecnico", "Técnico", &mut errors);
        validate_required(&self.visita.servicio, "visita.servicio", "Servicio", &mut errors);
        if self.visita.hora_termino < self.visita.hora_inicio {
            errors.add(ValidationError::new(
                "visita.hora_termino",
                "La hora de término no puede ser anterior a la hora de inicio",
            ));
        }
        for (i, area) in self.areas.iter().enumerate() {
            validate_required(&area.area, &format!("areas[{}].area", i), "Área", &mut errors);
        }
        errors.into_result()
    }
}

impl Placeholders for OperationSheetRequest {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let visita = &self.visita;
        let mut fields = self.cliente.fields();
        fields.extend([
            ("{numero}", visita.numero.trim().to_string()),
            ("{fecha}", format_date(visita.fecha)),
            ("{hora_inicio}", visita.hora_inicio.format("%H:%M").to_string()),
            ("{hora_termino}", visita.hora_termino.format("%H:%M").to_string()),
            ("{tecnico}", visita.tecnico.trim().to_string()),
            ("{servicio}", visita.servicio.trim().to_string()),
            ("{observaciones}", visita.observaciones.trim().to_string()),
        ]);
        fields
    }
}

impl OperationSheetRequest {
    pub fn row_spec(&self) -> Result<RowSpec, DocumentError> {
        let rows = self
            .areas
            .iter()
            .map(Placeholders::placeholder_map)
            .collect::<Result<Vec<PlaceholderMap>, _>>()?;
        AREAS_LAYOUT.spec(&AREA_TOKENS, rows)
    }
}

impl Generator for OperationSheetRequest {
    const TYPE: DocumentType = DocumentType::OperationSheet;

    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError> {
        fill_with_rows(template, self.placeholder_map()?, &[self.row_spec()?], policy)
    }

    fn filename_parts(&self) -> Vec<String> {
        vec![
            self.visita.numero.clone(),
            self.cliente.nombre.clone(),
            self.visita.fecha.format("%Y%m%d").to_string(),
        ]
    }
}
