//! Generator for service schedules (programa de servicios).
//!
//! Visits are spread over one worksheet per month by the schedule aggregator.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::traits::{Generator, Placeholders, Validator};
use super::{Cliente, DocumentType};
use crate::engine::{build_schedule_with, ScheduleEntry, ScheduleLayout, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

/// Visit rows start at spreadsheet row 5 of the first worksheet.
pub const SCHEDULE_LAYOUT: ScheduleLayout = ScheduleLayout {
    anchor_row: 4,
    minimum: 0,
};

/// Visita programada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitaProgramada {
    pub fecha_hora: NaiveDateTime,
    pub servicios: Vec<String>,
}

/// Request para el programa anual o mensual de servicios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub cliente: Cliente,
    /// Nombre del contrato o plan, p. ej. "Plan anual 2024".
    #[serde(default)]
    pub plan: String,
    pub visitas: Vec<VisitaProgramada>,
}

impl Validator for ScheduleRequest {
    fn validate(&self) -> Result<(), DocumentError> {
        use super::validation::*;

        let mut errors = ValidationErrors::new();
        self.cliente.validate_into(&mut errors);
        validate_not_empty(&self.visitas, "visitas", "Visita", &mut errors);
        for (i, visit) in self.visitas.iter().enumerate() {
            validate_services(&visit.servicios, &format!("visitas[{}].servicios", i), &mut errors);
        }
        errors.into_result()
    }
}

impl Placeholders for ScheduleRequest {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.cliente.fields();
        fields.push(("{plan}", self.plan.trim().to_string()));
        fields.push(("{total_visitas}", self.visitas.len().to_string()));
        fields
    }
}

impl ScheduleRequest {
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.visitas
            .iter()
            .map(|visit| ScheduleEntry::new(visit.fecha_hora, visit.servicios.iter().cloned()))
            .collect()
    }
}

impl Generator for ScheduleRequest {
    const TYPE: DocumentType = DocumentType::Schedule;

    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError> {
        let header = self.placeholder_map()?;
        build_schedule_with(
            &template.bytes,
            &SCHEDULE_LAYOUT,
            &header,
            &self.entries(),
            policy,
        )
    }

    fn filename_parts(&self) -> Vec<String> {
        let mut parts = vec![self.cliente.nombre.clone()];
        if let Some(first) = self.visitas.iter().map(|v| v.fecha_hora).min() {
            parts.push(first.format("%Y%m").to_string());
        }
        parts
    }
}
