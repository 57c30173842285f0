//! Single-value validation against a declared [`FieldSpec`].
//!
//! Issues are data: a failed check yields a [`ValidationIssue`], never an
//! `Err`. Messages are Spanish because they are shown to document
//! reviewers; `code()` is the stable machine-readable key.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{FieldSpec, FieldType, Validator};

/// Date layouts tried when the field declares no `date_format`.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static regex")
});

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Required,
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    PatternMismatch { pattern: String },
    NotANumber,
    NotAnInteger,
    BelowMinimum { min: f64, value: f64 },
    AboveMaximum { max: f64, value: f64 },
    InvalidDate { format: Option<String> },
    InvalidEmail,
    InvalidBoolean,
    /// Arrays and objects where a scalar was expected.
    NotScalar { expected: FieldType },
}

impl ValidationIssue {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::TooShort { .. } => "min_length",
            Self::TooLong { .. } => "max_length",
            Self::PatternMismatch { .. } => "pattern",
            Self::NotANumber => "not_a_number",
            Self::NotAnInteger => "is_integer",
            Self::BelowMinimum { .. } => "min_value",
            Self::AboveMaximum { .. } => "max_value",
            Self::InvalidDate { .. } => "date",
            Self::InvalidEmail => "email",
            Self::InvalidBoolean => "boolean",
            Self::NotScalar { .. } => "not_scalar",
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "El campo es requerido"),
            Self::TooShort { min, actual } => {
                write!(f, "Longitud {actual} menor que el mínimo de {min} caracteres")
            }
            Self::TooLong { max, actual } => {
                write!(f, "Longitud {actual} mayor que el máximo de {max} caracteres")
            }
            Self::PatternMismatch { pattern } => {
                write!(f, "El valor no coincide con el patrón '{pattern}'")
            }
            Self::NotANumber => write!(f, "El valor no es numérico"),
            Self::NotAnInteger => write!(f, "El valor debe ser un número entero"),
            Self::BelowMinimum { min, value } => {
                write!(f, "El valor {value} es menor que el mínimo permitido ({min})")
            }
            Self::AboveMaximum { max, value } => {
                write!(f, "El valor {value} es mayor que el máximo permitido ({max})")
            }
            Self::InvalidDate { format: Some(fmt_str) } => {
                write!(f, "Fecha inválida para el formato '{fmt_str}'")
            }
            Self::InvalidDate { format: None } => write!(f, "Fecha inválida"),
            Self::InvalidEmail => write!(f, "Correo electrónico inválido"),
            Self::InvalidBoolean => write!(f, "Valor booleano inválido"),
            Self::NotScalar { expected } => {
                write!(f, "Se esperaba un valor simple de tipo {expected}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stateful wrapper
// ---------------------------------------------------------------------------

/// Keeps the messages of the most recent call. Not meant to be shared:
/// every call overwrites the previous errors.
#[derive(Debug, Default)]
pub struct FieldValidator {
    errors: Vec<String>,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_field(&mut self, value: Option<&Value>, spec: &FieldSpec) -> bool {
        self.errors = validate(value, spec).iter().map(ToString::to_string).collect();
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// Validate one value. `None` and JSON `null` both count as absent.
pub fn validate(value: Option<&Value>, spec: &FieldSpec) -> Vec<ValidationIssue> {
    let value = match value {
        None | Some(Value::Null) => {
            return if spec.required {
                vec![ValidationIssue::Required]
            } else {
                Vec::new()
            };
        }
        Some(v) => v,
    };

    // A blank string is as good as absent for a required field.
    if spec.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return vec![ValidationIssue::Required];
    }

    if matches!(value, Value::Array(_) | Value::Object(_)) {
        return vec![ValidationIssue::NotScalar {
            expected: spec.field_type,
        }];
    }

    match spec.field_type {
        FieldType::String => validate_text(value, spec),
        FieldType::Email => {
            let mut issues = Vec::new();
            if !value_as_text(value).is_some_and(|t| is_email(t.trim())) {
                issues.push(ValidationIssue::InvalidEmail);
            }
            issues.extend(validate_text(value, spec));
            issues
        }
        FieldType::Number => validate_number(value, spec),
        FieldType::Date => validate_date(value, spec),
        FieldType::Boolean => validate_boolean(value),
    }
}

fn validate_text(value: &Value, spec: &FieldSpec) -> Vec<ValidationIssue> {
    let Some(text) = value_as_text(value) else {
        return Vec::new();
    };
    let len = text.chars().count();
    let mut issues = Vec::new();
    for v in &spec.validators {
        match v {
            Validator::MinLength(min) if len < *min => {
                issues.push(ValidationIssue::TooShort { min: *min, actual: len })
            }
            Validator::MaxLength(max) if len > *max => {
                issues.push(ValidationIssue::TooLong { max: *max, actual: len })
            }
            Validator::Pattern(p) if !p.is_match(&text) => {
                issues.push(ValidationIssue::PatternMismatch {
                    pattern: p.as_str().to_string(),
                })
            }
            _ => {}
        }
    }
    issues
}

fn validate_number(value: &Value, spec: &FieldSpec) -> Vec<ValidationIssue> {
    let Some(n) = value_as_number(value) else {
        return vec![ValidationIssue::NotANumber];
    };
    let mut issues = Vec::new();
    for v in &spec.validators {
        match v {
            Validator::Integer if n.fract() != 0.0 => issues.push(ValidationIssue::NotAnInteger),
            Validator::MinValue(min) if n < *min => {
                issues.push(ValidationIssue::BelowMinimum { min: *min, value: n })
            }
            Validator::MaxValue(max) if n > *max => {
                issues.push(ValidationIssue::AboveMaximum { max: *max, value: n })
            }
            _ => {}
        }
    }
    issues
}

/// The `date_format` layout a field declares, if any.
pub fn declared_date_format(spec: &FieldSpec) -> Option<&str> {
    spec.validators.iter().find_map(|v| match v {
        Validator::DateFormat(f) => Some(f.as_str()),
        _ => None,
    })
}

fn validate_date(value: &Value, spec: &FieldSpec) -> Vec<ValidationIssue> {
    let format = declared_date_format(spec);
    let parsed = value.as_str().and_then(|s| parse_date(s, format));
    if parsed.is_some() {
        Vec::new()
    } else {
        vec![ValidationIssue::InvalidDate {
            format: format.map(str::to_string),
        }]
    }
}

fn validate_boolean(value: &Value) -> Vec<ValidationIssue> {
    if value_as_bool(value).is_some() {
        Vec::new()
    } else {
        vec![ValidationIssue::InvalidBoolean]
    }
}

/// Whether `value` passes a single validator, ignoring type checks.
pub fn satisfies(value: &Value, validator: &Validator) -> bool {
    match validator {
        Validator::MinLength(min) => value_as_text(value).is_some_and(|t| t.chars().count() >= *min),
        Validator::MaxLength(max) => value_as_text(value).is_some_and(|t| t.chars().count() <= *max),
        Validator::Pattern(p) => value_as_text(value).is_some_and(|t| p.is_match(&t)),
        Validator::MinValue(min) => value_as_number(value).is_some_and(|n| n >= *min),
        Validator::MaxValue(max) => value_as_number(value).is_some_and(|n| n <= *max),
        Validator::Integer => value_as_number(value).is_some_and(|n| n.fract() == 0.0),
        Validator::DateFormat(f) => value.as_str().is_some_and(|s| parse_date(s, Some(f)).is_some()),
    }
}

// ---------------------------------------------------------------------------
// Coercions (shared with transform + analyzer)
// ---------------------------------------------------------------------------

/// String rendering of a scalar. `None` for null, arrays and objects.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => parse_bool_token(s),
        _ => None,
    }
}

/// Numeric coercion. Accepts a single decimal comma when no dot is present.
///
/// A comma followed by exactly three digits (`1,234`) reads equally well as
/// a thousands separator, so it is rejected rather than guessed.
pub fn parse_number(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let normalized = match t.split_once(',') {
        Some(_) if t.contains('.') => t.to_string(),
        Some((int, frac)) => {
            if frac.contains(',') || (frac.len() == 3 && frac.bytes().all(|b| b.is_ascii_digit())) {
                return None;
            }
            format!("{int}.{frac}")
        }
        None => t.to_string(),
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_bool_token(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "si" | "sí" | "verdadero" => Some(true),
        "false" | "0" | "no" | "falso" => Some(false),
        _ => None,
    }
}

/// Parse with an explicit layout, or the default layouts + RFC 3339.
pub fn parse_date(text: &str, format: Option<&str>) -> Option<NaiveDate> {
    let t = text.trim();
    if let Some(f) = format {
        return NaiveDate::parse_from_str(t, f).ok();
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(t, f).ok())
        .or_else(|| DateTime::parse_from_rfc3339(t).ok().map(|dt| dt.date_naive()))
}

pub fn is_email(text: &str) -> bool {
    EMAIL_RE.is_match(text)
}
