//! Generator for rodent-monitoring registers (registro de roedores).
//!
//! One worksheet row per bait station, padded to twenty rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::common::format_date;
use super::traits::{Generator, Placeholders, Validator};
use super::{fill_with_rows, Cliente, DocumentType, TableLayout};
use crate::engine::{PlaceholderMap, RowSpec, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

/// Stations: first worksheet, spreadsheet row 7.
pub const STATIONS_LAYOUT: TableLayout = TableLayout {
    table: 0,
    anchor_row: 6,
    minimum: 20,
};

pub const STATION_TOKENS: [&str; 6] = [
    "{estacion}",
    "{ubicacion}",
    "{tipo_cebo}",
    "{consumo}",
    "{estado}",
    "{observacion}",
];

/// Bait consumption observed at a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consumo {
    #[default]
    SinConsumo,
    Parcial,
    Total,
}

impl Consumo {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SinConsumo => "Sin consumo",
            Self::Parcial => "Parcial",
            Self::Total => "Total",
        }
    }
}

/// Estación de cebo revisada.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Estacion {
    pub numero: String,
    #[serde(default)]
    pub ubicacion: String,
    #[serde(default)]
    pub tipo_cebo: String,
    #[serde(default)]
    pub consumo: Consumo,
    /// Estado físico de la estación ("Buena", "Dañada", ...).
    #[serde(default)]
    pub estado: String,
    #[serde(default)]
    pub observacion: String,
}

impl Placeholders for Estacion {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("{estacion}", self.numero.clone()),
            ("{ubicacion}", self.ubicacion.clone()),
            ("{tipo_cebo}", self.tipo_cebo.clone()),
            ("{consumo}", self.consumo.label().to_string()),
            ("{estado}", self.estado.clone()),
            ("{observacion}", self.observacion.clone()),
        ]
    }
}

/// Request para el registro de monitoreo de roedores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RodentRegisterRequest {
    pub cliente: Cliente,
    pub fecha: NaiveDate,
    pub tecnico: String,
    /// Periodo informado, p. ej. "Marzo 2024".
    #[serde(default)]
    pub periodo: String,
    #[serde(default)]
    pub estaciones: Vec<Estacion>,
}

impl Validator for RodentRegisterRequest {
    fn validate(&self) -> Result<(), DocumentError> {
        use super::validation::*;

        let mut errors = ValidationErrors::new();
        self.cliente.validate_into(&mut errors);
        validate_required(&self.tecnico, "tecnico", "Técnico", &mut errors);
        for (i, station) in self.estaciones.iter().enumerate() {
            validate_required(
                &station.numero,
                &format!("estaciones[{}].numero", i),
                "Número de estación",
                &mut errors,
            );
        }
        errors.into_result()
    }
}

impl Placeholders for RodentRegisterRequest {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let active = self
            .estaciones
            .iter()
            .filter(|s| s.consumo != Consumo::SinConsumo)
            .count();
        let mut fields = self.cliente.fields();
        fields.extend([
            ("{fecha}", format_date(self.fecha)),
            ("{tecnico}", self.tecnico.trim().to_string()),
            ("{periodo}", self.periodo.trim().to_string()),
            ("{total_estaciones}", self.estaciones.len().to_string()),
            ("{estaciones_con_consumo}", active.to_string()),
        ]);
        fields
    }
}

impl RodentRegisterRequest {
    pub fn row_spec(&self) -> Result<RowSpec, DocumentError> {
        let rows = self
            .estaciones
            .iter()
            .map(Placeholders::placeholder_map)
            .collect::<Result<Vec<PlaceholderMap>, _>>()?;
        STATIONS_LAYOUT.spec(&STATION_TOKENS, rows)
    }
}

impl Generator for RodentRegisterRequest {
    const TYPE: DocumentType = DocumentType::RodentRegister;

    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError> {
        fill_with_rows(template, self.placeholder_map()?, &[self.row_spec()?], policy)
    }

    fn filename_parts(&self) -> Vec<String> {
        vec![
            self.cliente.nombre.clone(),
            self.fecha.format("%Y%m%d").to_string(),
        ]
    }
}
