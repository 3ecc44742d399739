//! Typed conversion of raw text for direct variable assignment

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::reserved::is_reserved;
use crate::engine::Value;
use crate::parser::is_keyword;

/// Target type of a direct assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindTag {
    Int,
    Float,
    Bool,
    Str,
}

impl KindTag {
    /// Unknown tags fall back to `str`
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "int" => KindTag::Int,
            "float" => KindTag::Float,
            "bool" => KindTag::Bool,
            _ => KindTag::Str,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KindTag::Int => "int",
            KindTag::Float => "float",
            KindTag::Bool => "bool",
            KindTag::Str => "str",
        }
    }

    /// Convert `raw` to a value of this kind
    pub fn coerce(&self, raw: &str) -> Result<Value, ConversionError> {
        let invalid = || ConversionError::InvalidLiteral {
            kind: *self,
            raw: raw.to_string(),
        };

        match self {
            KindTag::Int => raw.trim().parse::<i64>().map(Value::Int).map_err(|_| invalid()),
            KindTag::Float => raw.trim().parse::<f64>().map(Value::Float).map_err(|_| invalid()),
            KindTag::Bool => Ok(Value::Bool(matches!(
                raw.to_lowercase().as_str(),
                "1" | "true" | "yes"
            ))),
            KindTag::Str => Ok(Value::Str(raw.to_string())),
        }
    }
}

impl std::fmt::Display for KindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("invalid literal for {kind}: '{raw}'")]
    InvalidLiteral { kind: KindTag, raw: String },

    #[error("'{0}' is not a valid variable name")]
    InvalidName(String),

    #[error("'{0}' is a reserved name")]
    ReservedName(String),
}

/// Check that `name` can be bound directly by a client
pub fn validate_name(name: &str) -> Result<(), ConversionError> {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    let is_identifier = IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false);

    if !is_identifier || is_keyword(name) {
        return Err(ConversionError::InvalidName(name.to_string()));
    }
    if is_reserved(name) {
        return Err(ConversionError::ReservedName(name.to_string()));
    }
    Ok(())
}
