use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::TemplateError;

/// A flat record: field name → untyped value.
pub type Record = serde_json::Map<String, Value>;

/// Extracted fields keyed by their (free-form) source name.
pub type SourceFields = BTreeMap<String, ExtractedField>;

// ---------------------------------------------------------------------------
// Field type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    Email,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" | "text" | "char" | "varchar" => Ok(Self::String),
            "number" | "int" | "integer" | "float" | "decimal" | "numeric" => Ok(Self::Number),
            "date" | "datetime" | "timestamp" => Ok(Self::Date),
            "boolean" | "bool" => Ok(Self::Boolean),
            "email" | "mail" | "correo" => Ok(Self::Email),
            other => Err(UnknownFieldType(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse()
            .map_err(|UnknownFieldType(t)| serde::de::Error::custom(format!("unknown field type '{t}'")))
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// A compiled regex that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    MinLength(usize),
    MaxLength(usize),
    Pattern(Pattern),
    MinValue(f64),
    MaxValue(f64),
    Integer,
    DateFormat(String),
}

/// Option names recognised as validators, in wire form.
pub const VALIDATOR_KINDS: &[&str] = &[
    "min_length",
    "max_length",
    "pattern",
    "min_value",
    "max_value",
    "is_integer",
    "date_format",
];

impl Validator {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MinLength(_) => "min_length",
            Self::MaxLength(_) => "max_length",
            Self::Pattern(_) => "pattern",
            Self::MinValue(_) => "min_value",
            Self::MaxValue(_) => "max_value",
            Self::Integer => "is_integer",
            Self::DateFormat(_) => "date_format",
        }
    }

    /// Parse one `option = value` pair. `Ok(None)` means the option is
    /// recognised but switched off (`is_integer = false`).
    pub fn from_option(field: &str, option: &str, value: &Value) -> Result<Option<Self>, TemplateError> {
        let invalid = || TemplateError::InvalidValidator {
            field: field.to_string(),
            option: option.to_string(),
        };
        let validator = match option {
            "min_length" => Self::MinLength(value.as_u64().ok_or_else(invalid)? as usize),
            "max_length" => Self::MaxLength(value.as_u64().ok_or_else(invalid)? as usize),
            "min_value" => Self::MinValue(value.as_f64().ok_or_else(invalid)?),
            "max_value" => Self::MaxValue(value.as_f64().ok_or_else(invalid)?),
            "is_integer" => {
                if !value.as_bool().ok_or_else(invalid)? {
                    return Ok(None);
                }
                Self::Integer
            }
            "date_format" => Self::DateFormat(value.as_str().ok_or_else(invalid)?.to_string()),
            "pattern" => {
                let source = value.as_str().ok_or_else(invalid)?;
                let pattern = Pattern::new(source).map_err(|e| TemplateError::InvalidPattern {
                    field: field.to_string(),
                    pattern: source.to_string(),
                    reason: e.to_string(),
                })?;
                Self::Pattern(pattern)
            }
            _ => return Err(invalid()),
        };
        Ok(Some(validator))
    }

    fn wire_value(&self) -> Value {
        match self {
            Self::MinLength(n) | Self::MaxLength(n) => Value::from(*n as u64),
            Self::MinValue(x) | Self::MaxValue(x) => Value::from(*x),
            Self::Pattern(p) => Value::from(p.as_str()),
            Self::Integer => Value::Bool(true),
            Self::DateFormat(f) => Value::from(f.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Template side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub validators: Vec<Validator>,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            validators: Vec::new(),
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validator_kinds(&self) -> Vec<&'static str> {
        self.validators.iter().map(Validator::kind).collect()
    }

    /// Build from wire form. Validator options are read from the
    /// `validators` table and from the top level of the field.
    pub fn from_raw(name: &str, raw: RawFieldSpec) -> Result<Self, TemplateError> {
        let field_type = raw.field_type.parse().map_err(|UnknownFieldType(value)| {
            TemplateError::UnknownType {
                field: name.to_string(),
                value,
            }
        })?;

        let mut validators = Vec::new();
        // Unrelated top-level keys are tolerated; unknown keys inside
        // `validators` are not.
        let flat = raw
            .extra
            .iter()
            .filter(|(option, _)| VALIDATOR_KINDS.contains(&option.as_str()));
        for (option, value) in raw.validators.iter().chain(flat) {
            if let Some(v) = Validator::from_option(name, option, value)? {
                validators.push(v);
            }
        }

        Ok(Self {
            field_type,
            required: raw.required,
            validators,
            description: raw.description,
        })
    }
}

/// Wire form of a field descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFieldSpec {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub validators: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl From<&FieldSpec> for RawFieldSpec {
    fn from(spec: &FieldSpec) -> Self {
        Self {
            field_type: spec.field_type.to_string(),
            required: spec.required,
            validators: spec
                .validators
                .iter()
                .map(|v| (v.kind().to_string(), v.wire_value()))
                .collect(),
            description: spec.description.clone(),
            extra: BTreeMap::new(),
        }
    }
}

impl Serialize for FieldSpec {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        RawFieldSpec::from(self).serialize(s)
    }
}

/// Target schema for one document kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTemplate")]
pub struct Template {
    pub nombre_archivo: String,
    pub tipo_documento: String,
    pub campos: IndexMap<String, FieldSpec>,
}

#[derive(Debug, Deserialize)]
pub struct RawTemplate {
    #[serde(default)]
    nombre_archivo: String,
    #[serde(default)]
    tipo_documento: String,
    #[serde(default)]
    campos: IndexMap<String, RawFieldSpec>,
}

impl TryFrom<RawTemplate> for Template {
    type Error = TemplateError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        let mut campos = IndexMap::with_capacity(raw.campos.len());
        for (name, spec) in raw.campos {
            let spec = FieldSpec::from_raw(&name, spec)?;
            campos.insert(name, spec);
        }
        Ok(Self {
            nombre_archivo: raw.nombre_archivo,
            tipo_documento: raw.tipo_documento,
            campos,
        })
    }
}

impl Template {
    pub fn new(nombre_archivo: impl Into<String>, tipo_documento: impl Into<String>) -> Self {
        Self {
            nombre_archivo: nombre_archivo.into(),
            tipo_documento: tipo_documento.into(),
            campos: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.campos.insert(name.into(), spec);
        self
    }

    pub fn from_toml(input: &str) -> Result<Self, TemplateError> {
        let raw: RawTemplate = toml::from_str(input)?;
        Self::try_from(raw)?.non_empty()
    }

    pub fn from_json(input: &str) -> Result<Self, TemplateError> {
        let raw: RawTemplate = serde_json::from_str(input)?;
        Self::try_from(raw)?.non_empty()
    }

    pub fn from_yaml(input: &str) -> Result<Self, TemplateError> {
        let raw: RawTemplate = serde_yaml::from_str(input)?;
        Self::try_from(raw)?.non_empty()
    }

    /// Whether `path` names a template file (rather than something to analyze).
    pub fn is_template_path(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("toml" | "json" | "yaml" | "yml")
        )
    }

    /// Load by extension. A missing `nombre_archivo` defaults to the file name.
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let read = || {
            std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let mut template = match ext.as_deref() {
            Some("toml") => Self::from_toml(&read()?)?,
            Some("json") => Self::from_json(&read()?)?,
            Some("yaml" | "yml") => Self::from_yaml(&read()?)?,
            _ => return Err(TemplateError::UnsupportedFormat(path.to_path_buf())),
        };
        if template.nombre_archivo.is_empty() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                template.nombre_archivo = name.to_string();
            }
        }
        Ok(template)
    }

    fn non_empty(self) -> Result<Self, TemplateError> {
        if self.campos.is_empty() {
            return Err(TemplateError::NoFields(self.nombre_archivo));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// A value pulled out of a document by an upstream extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    #[serde(default)]
    pub value: Value,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub field_type: Option<FieldType>,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    /// Validator kinds the extractor vouches for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<String>,
}

fn full_confidence() -> f64 {
    1.0
}

fn lenient_type<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FieldType>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|t| t.parse().ok()))
}

impl ExtractedField {
    pub fn new(value: impl Into<Value>, field_type: Option<FieldType>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            field_type,
            confidence,
            validators: Vec::new(),
        }
    }

    /// Declared type, falling back to a guess from the value.
    pub fn effective_type(&self) -> Option<FieldType> {
        self.field_type.or_else(|| infer_type(&self.value))
    }
}

/// Guess a field type from a raw value.
pub fn infer_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(_) => Some(FieldType::Number),
        Value::String(s) => Some(infer_type_from_text(s)),
        Value::Array(_) | Value::Object(_) => Some(FieldType::String),
    }
}

pub fn infer_type_from_text(text: &str) -> FieldType {
    let t = text.trim();
    if crate::validator::parse_date(t, None).is_some() {
        FieldType::Date
    } else if crate::validator::is_email(t) {
        FieldType::Email
    } else if crate::validator::parse_number(t).is_some() {
        FieldType::Number
    } else if crate::validator::parse_bool_token(t).is_some() {
        FieldType::Boolean
    } else {
        FieldType::String
    }
}

// ---------------------------------------------------------------------------
// Matching output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub template_field: String,
    pub pdf_field: String,
    /// Composite score in [0, 1].
    pub score: f64,
    /// `score * 100`, two decimals.
    pub confidence: f64,
    pub type_match: bool,
    pub value: Value,
    pub source_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchStats {
    pub total_template_fields: usize,
    pub total_source_fields: usize,
    pub matched_fields: usize,
    pub unmatched_fields: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutput {
    /// Keyed by template field name.
    pub matches: IndexMap<String, FieldMatch>,
    pub stats: MatchStats,
    pub unmatched_template_fields: Vec<String>,
}

// ---------------------------------------------------------------------------
// Connector output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledField {
    pub value: Value,
    /// 0-100.
    pub confidence: f64,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(rename = "total_campos")]
    pub total_fields: usize,
    #[serde(rename = "campos_validos")]
    pub valid_fields: usize,
    #[serde(rename = "campos_invalidos")]
    pub invalid_fields: usize,
    #[serde(rename = "confianza_promedio")]
    pub average_confidence: f64,
    #[serde(rename = "campos_faltantes")]
    pub missing_fields: Vec<String>,
    #[serde(rename = "campos_baja_confianza")]
    pub low_confidence_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedDocument {
    pub fields: IndexMap<String, FilledField>,
    pub report: ValidationReport,
}

// ---------------------------------------------------------------------------
// Reconciliation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    MaxNumber,
    LongestString,
    SourceDefault,
    FilledFromSource,
    FilledFromTarget,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxNumber => write!(f, "max_number"),
            Self::LongestString => write!(f, "longest_string"),
            Self::SourceDefault => write!(f, "source_default"),
            Self::FilledFromSource => write!(f, "filled_from_source"),
            Self::FilledFromTarget => write!(f, "filled_from_target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub source_field: String,
    pub target_field: String,
    pub source_value: Value,
    pub target_value: Value,
    pub resolved: Value,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileMeta {
    pub confidence: f64,
    pub timestamp: String,
    pub fields_reconciled: usize,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub reconciled_data: Record,
    pub metadata: ReconcileMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_type_aliases() {
        assert_eq!("Integer".parse::<FieldType>().unwrap(), FieldType::Number);
        assert_eq!("text".parse::<FieldType>().unwrap(), FieldType::String);
        assert_eq!("datetime".parse::<FieldType>().unwrap(), FieldType::Date);
        assert!("blob".parse::<FieldType>().is_err());
    }

    #[test]
    fn field_spec_reads_nested_and_flat_validators() {
        let raw: RawFieldSpec = serde_json::from_value(json!({
            "type": "number",
            "required": true,
            "min_value": 0,
            "validators": { "max_value": 100, "is_integer": true }
        }))
        .unwrap();
        let spec = FieldSpec::from_raw("edad", raw).unwrap();
        assert_eq!(spec.field_type, FieldType::Number);
        assert!(spec.required);
        let mut kinds = spec.validator_kinds();
        kinds.sort();
        assert_eq!(kinds, vec!["is_integer", "max_value", "min_value"]);
    }

    #[test]
    fn field_spec_rejects_bad_pattern() {
        let raw: RawFieldSpec =
            serde_json::from_value(json!({ "type": "string", "pattern": "([a-z" })).unwrap();
        let err = FieldSpec::from_raw("codigo", raw).unwrap_err();
        assert!(err.to_string().contains("codigo"));
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn field_spec_ignores_unrelated_keys() {
        let raw: RawFieldSpec =
            serde_json::from_value(json!({ "type": "string", "label": "Nombre" })).unwrap();
        let spec = FieldSpec::from_raw("nombre", raw).unwrap();
        assert!(spec.validators.is_empty());
    }

    #[test]
    fn template_unknown_type_names_field() {
        let err = serde_json::from_value::<Template>(json!({
            "nombre_archivo": "x",
            "tipo_documento": "y",
            "campos": { "peso": { "type": "kilos" } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("peso"));
    }

    #[test]
    fn extracted_field_lenient_type() {
        let f: ExtractedField =
            serde_json::from_value(json!({ "value": "12", "type": "weird", "confidence": 0.4 })).unwrap();
        assert_eq!(f.field_type, None);
        assert_eq!(f.effective_type(), Some(FieldType::Number));
    }

    #[test]
    fn extracted_field_defaults() {
        let f: ExtractedField = serde_json::from_value(json!({ "value": true })).unwrap();
        assert_eq!(f.confidence, 1.0);
        assert_eq!(f.effective_type(), Some(FieldType::Boolean));
    }

    #[test]
    fn infer_types_from_text() {
        assert_eq!(infer_type_from_text("1990-01-01"), FieldType::Date);
        assert_eq!(infer_type_from_text("ana@example.com"), FieldType::Email);
        assert_eq!(infer_type_from_text("42,5"), FieldType::Number);
        assert_eq!(infer_type_from_text("verdadero"), FieldType::Boolean);
        assert_eq!(infer_type_from_text("Juan"), FieldType::String);
    }

    #[test]
    fn field_spec_serializes_to_wire_form() {
        let spec = FieldSpec::new(FieldType::String)
            .required()
            .with_validator(Validator::MaxLength(10));
        let v = serde_json::to_value(&spec).unwrap();
        assert_eq!(v["type"], "string");
        assert_eq!(v["required"], true);
        assert_eq!(v["validators"]["max_length"], 10);
    }

    #[test]
    fn template_from_toml_keeps_declaration_order() {
        let t = Template::from_toml(
            r#"
nombre_archivo = "paciente.pdf"
tipo_documento = "historia_clinica"

[campos.nombre]
type = "string"
required = true

[campos.edad]
type = "integer"
min_value = 0

[campos.correo]
type = "email"
"#,
        )
        .unwrap();
        assert_eq!(t.campos.keys().collect::<Vec<_>>(), vec!["nombre", "edad", "correo"]);
        assert_eq!(t.campos["edad"].validators, vec![Validator::MinValue(0.0)]);
    }

    #[test]
    fn template_without_fields_is_rejected() {
        let err = Template::from_json(r#"{ "nombre_archivo": "vacio.pdf", "campos": {} }"#).unwrap_err();
        assert!(matches!(err, TemplateError::NoFields(ref n) if n == "vacio.pdf"));
    }

    #[test]
    fn template_from_yaml() {
        let t = Template::from_yaml("tipo_documento: receta\ncampos:\n  fecha:\n    type: date\n").unwrap();
        assert_eq!(t.campos["fecha"].field_type, FieldType::Date);
    }

    #[test]
    fn template_from_path_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receta.json");
        std::fs::write(&path, r#"{ "campos": { "dosis": { "type": "number" } } }"#).unwrap();
        let t = Template::from_path(&path).unwrap();
        assert_eq!(t.nombre_archivo, "receta.json");

        let other = dir.path().join("modelo.py");
        assert!(matches!(Template::from_path(&other), Err(TemplateError::UnsupportedFormat(_))));
        assert!(Template::is_template_path(Path::new("a.YML")));
        assert!(!Template::is_template_path(Path::new("a.py")));
    }
}
