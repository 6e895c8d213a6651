//! Input validation for document requests.
//!
//! Checks only presence and shape of the fields a template needs. Every
//! problem is collected so office staff can fix a request in one pass.

use chrono::NaiveDate;
use std::fmt;

use crate::engine::service_code;
use crate::error::DocumentError;

/// Validation error with a user-facing message in Spanish.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    /// Suggestion for how to fix the error
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create error for empty required field
    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} no puede estar vacío", label)).with_suggestion(format!(
            "Ingrese un valor para {}",
            label.to_lowercase()
        ))
    }

    pub fn empty_list(field: &str, label: &str) -> Self {
        Self::new(field, format!("Debe indicar al menos un(a) {}", label.to_lowercase()))
    }

    pub fn unknown_service(field: &str, value: &str) -> Self {
        Self::new(field, format!("Servicio '{}' no reconocido", value)).with_suggestion(
            "Servicios válidos: Desinsectación, Desratización, Sanitización, Fumigación, \
             Control de termitas, Control de aves, Monitoreo, Limpieza de estanques",
        )
    }

    pub fn date_order(field: &str, earlier_label: &str, later_label: &str) -> Self {
        Self::new(
            field,
            format!("{} no puede ser anterior a {}", later_label, earlier_label.to_lowercase()),
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors with formatted output.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// One line per error, numbered.
    pub fn to_message(&self) -> String {
        let mut parts = vec![format!(
            "{} error(es) de validación",
            self.errors.len()
        )];
        for (i, error) in self.errors.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, error));
        }
        parts.join("\n")
    }

    /// Ok if no errors, otherwise `InvalidDomainData` carrying every message.
    pub fn into_result(self) -> Result<(), DocumentError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::InvalidDomainData(self.to_message()))
        }
    }
}

// ============================================================================
// Validation functions
// ============================================================================

/// Validate that a string is not empty after trimming
pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

pub fn validate_not_empty<T>(items: &[T], field: &str, label: &str, errors: &mut ValidationErrors) {
    if items.is_empty() {
        errors.add(ValidationError::empty_list(field, label));
    }
}

/// Every label must map to a service code.
pub fn validate_services(labels: &[String], field: &str, errors: &mut ValidationErrors) {
    if labels.is_empty() {
        errors.add(ValidationError::empty_list(field, "Servicio"));
        return;
    }
    for (i, label) in labels.iter().enumerate() {
        if service_code(label).is_err() {
            errors.add(ValidationError::unknown_service(
                &format!("{}[{}]", field, i),
                label,
            ));
        }
    }
}

pub fn validate_date_order(
    earlier: NaiveDate,
    later: NaiveDate,
    field: &str,
    labels: (&str, &str),
    errors: &mut ValidationErrors,
) {
    if later < earlier {
        errors.add(ValidationError::date_order(field, labels.0, labels.1));
    }
}
