use crate::core::reading::format_timestamp;
use crate::core::time::parse_flexible;
use crate::error::DecodeError;
use serde_json::{Number, Value};

/// Cell spellings read as missing values
const NULL_TOKENS: [&str; 9] = ["", "NaN", "nan", "NA", "N/A", "null", "NULL", "None", "#N/A"];

/// Storage type requested for a column with `name:type`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    Str,
    Int,
    Float,
    Bool,
    Timestamp,
}

impl ColumnType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "str" => Some(ColumnType::Str),
            "int" => Some(ColumnType::Int),
            "float" => Some(ColumnType::Float),
            "bool" => Some(ColumnType::Bool),
            "timestamp" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Str => "str",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// Convert a raw cell; empty and null-like cells become `null`
    pub fn convert(&self, raw: &str, row: u64, column: &str) -> Result<Value, DecodeError> {
        if raw.is_empty() || (*self != ColumnType::Str && is_null_token(raw.trim())) {
            return Ok(Value::Null);
        }
        let invalid = || DecodeError::CellType {
            row,
            column: column.to_string(),
            value: raw.to_string(),
            ty: self.name(),
        };
        let trimmed = raw.trim();
        match self {
            ColumnType::Str => Ok(Value::String(raw.to_string())),
            ColumnType::Int => trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid()),
            ColumnType::Float => match trimmed.parse::<f64>() {
                Ok(float) => Ok(float_value(float, raw)),
                Err(_) => Err(invalid()),
            },
            ColumnType::Bool => parse_bool(trimmed).map(Value::Bool).ok_or_else(invalid),
            ColumnType::Timestamp => parse_flexible(trimmed)
                .map(|ts| Value::String(format_timestamp(&ts)))
                .ok_or_else(invalid),
        }
    }
}

/// One entry of an explicit column list; an empty name drops that file column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: Option<ColumnType>,
}

impl ColumnSpec {
    pub fn is_selected(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Parse `name[:type]` tokens
pub fn parse_column_specs(tokens: &[String]) -> Result<Vec<ColumnSpec>, DecodeError> {
    tokens
        .iter()
        .map(|token| {
            let parts: Vec<&str> = token.split(':').collect();
            match parts.as_slice() {
                [name] => Ok(ColumnSpec {
                    name: name.to_string(),
                    ty: None,
                }),
                [name, ty] if !name.is_empty() => {
                    let ty = ColumnType::from_token(ty).ok_or_else(|| {
                        DecodeError::UnknownColumnType {
                            name: name.to_string(),
                            ty: ty.to_string(),
                        }
                    })?;
                    Ok(ColumnSpec {
                        name: name.to_string(),
                        ty: Some(ty),
                    })
                }
                _ => Err(DecodeError::MalformedColumn {
                    token: token.clone(),
                }),
            }
        })
        .collect()
}

/// Best-effort typing for columns without an explicit type
pub fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if raw.is_empty() || (!trimmed.is_empty() && is_null_token(trimmed)) {
        return Value::Null;
    }
    // whitespace-only cells stay visible to the NaN check
    if trimmed.is_empty() {
        return Value::String(raw.to_string());
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return float_value(float, raw);
    }
    match trimmed {
        "True" | "true" | "TRUE" => Value::Bool(true),
        "False" | "false" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn is_null_token(value: &str) -> bool {
    NULL_TOKENS.contains(&value)
}

/// Infinities have no JSON number form and keep their spelling; NaN is missing
fn float_value(value: f64, raw: &str) -> Value {
    if value.is_nan() {
        return Value::Null;
    }
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}
