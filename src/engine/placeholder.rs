//! Tokens and the maps that bind them to replacement text.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use crate::error::DocumentError;

pub const OPEN: char = '{';
pub const CLOSE: char = '}';

/// A closed placeholder marker such as `{nombre}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    pub fn new(raw: &str) -> Result<Self, DocumentError> {
        if is_well_formed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(DocumentError::InvalidDomainData(format!(
                "'{}' is not a placeholder token (expected {{name}})",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name between the delimiters.
    pub fn name(&self) -> &str {
        &self.0[1..self.0.len() - 1]
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// `{` + one or more name characters + `}`.
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() > 2
        && raw.starts_with(OPEN)
        && raw.ends_with(CLOSE)
        && raw[1..raw.len() - 1].chars().all(is_name_char)
}

/// What to do with a well-formed token that the map does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedTokens {
    /// Leave the token in the output as literal text.
    #[default]
    Keep,
    /// Replace the token with nothing.
    Blank,
    /// Fail with `MalformedTemplate`.
    Reject,
}

impl UnresolvedTokens {
    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" => Some(Self::Keep),
            "blank" => Some(Self::Blank),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Token → literal replacement text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderMap {
    values: HashMap<Token, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(token, value)` pairs, rejecting malformed tokens.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, DocumentError>
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::new();
        for (token, value) in pairs {
            map.insert(Token::new(token.as_ref())?, value);
        }
        Ok(map)
    }

    /// Map every token to an empty string.
    pub fn blank<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Self {
        Self {
            values: tokens
                .into_iter()
                .map(|token| (token.clone(), String::new()))
                .collect(),
        }
    }

    pub fn insert(&mut self, token: Token, value: impl Into<String>) -> Option<String> {
        self.values.insert(token, value.into())
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.values.contains_key(token)
    }

    /// Add entries from `other` that this map does not define yet.
    pub fn extend_missing(&mut self, other: &PlaceholderMap) {
        for (token, value) in &other.values {
            self.values
                .entry(token.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A located token replacement inside a paragraph's concatenated text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub value: String,
}

/// Scan `text` for closed tokens and decide what each becomes.
pub(crate) fn plan_edits(
    text: &str,
    placeholders: &PlaceholderMap,
    policy: UnresolvedTokens,
) -> Result<Vec<Edit>, DocumentError> {
    let mut edits = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(OPEN) {
        let open = cursor + found;
        let after = open + OPEN.len_utf8();
        let Some(rel) = text[after..].find(&[OPEN, CLOSE][..]) else {
            break;
        };
        let close = after + rel;
        if text[close..].starts_with(OPEN) {
            // `{{name}`: restart from the inner brace
            cursor = close;
            continue;
        }

        let end = close + CLOSE.len_utf8();
        let candidate = &text[open..end];
        if let Some(value) = placeholders.get(candidate) {
            edits.push(Edit {
                start: open,
                end,
                value: value.to_string(),
            });
        } else if is_well_formed(candidate) {
            match policy {
                UnresolvedTokens::Keep => {}
                UnresolvedTokens::Blank => edits.push(Edit {
                    start: open,
                    end,
                    value: String::new(),
                }),
                UnresolvedTokens::Reject => {
                    return Err(DocumentError::malformed(format!(
                        "token {} has no value",
                        candidate
                    )))
                }
            }
        }
        cursor = end;
    }

    Ok(edits)
}
