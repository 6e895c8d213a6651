//! Traits for generator system standardization.

use super::DocumentType;
use crate::engine::{PlaceholderMap, UnresolvedTokens};
use crate::error::DocumentError;
use crate::templates::Template;

/// Trait for validating request objects.
pub trait Validator {
    /// Check presence and shape of every field the template needs.
    fn validate(&self) -> Result<(), DocumentError>;
}

/// A record whose fields map one to one onto template tokens.
pub trait Placeholders {
    /// `(token, value)` pairs, e.g. `("{cliente}", "ACME Ltda.")`.
    fn fields(&self) -> Vec<(&'static str, String)>;

    fn placeholder_map(&self) -> Result<PlaceholderMap, DocumentError> {
        PlaceholderMap::from_pairs(self.fields())
    }
}

/// A document request that knows how to fill its template.
pub trait Generator: Validator + Send + Sync {
    const TYPE: DocumentType;

    /// Fill the template. The result has the template's own format.
    fn fill(&self, template: &Template, policy: UnresolvedTokens) -> Result<Vec<u8>, DocumentError>;

    /// Key fields that make the output filename, most significant first.
    fn filename_parts(&self) -> Vec<String>;
}
