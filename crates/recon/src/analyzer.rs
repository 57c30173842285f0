//! Derive a field schema from a source document by trying several
//! extraction strategies and keeping the most complete result.
//!
//! Strategies run independently over the same text. Each result is scored
//! on how much it says about each field (type 40%, validators 30%,
//! description 30%), scaled to 0-100 and weighted by how much the method
//! is trusted. A strategy that fails is logged and skipped.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AnalyzeError, TemplateError};
use crate::model::{infer_type, infer_type_from_text, FieldSpec, FieldType, Pattern, Template, Validator};

pub type AnalyzedFields = IndexMap<String, AnalyzedField>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Django,
    Ast,
    Json,
    Yaml,
    Regex,
    BasicText,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Django => "django",
            Self::Ast => "ast",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Regex => "regex",
            Self::BasicText => "basic_text",
        }
    }

    /// Assumed reliability of the method.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Django => 1.2,
            Self::Ast => 1.1,
            Self::Json | Self::Yaml => 1.0,
            Self::Regex => 0.9,
            Self::BasicText => 0.8,
        }
    }
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type StrategyFn = fn(&str) -> Result<AnalyzedFields, AnalyzeError>;

/// Every strategy, in tie-break order.
const STRATEGIES: &[(AnalysisMethod, StrategyFn)] = &[
    (AnalysisMethod::Django, analyze_django),
    (AnalysisMethod::Ast, analyze_class_body),
    (AnalysisMethod::Json, analyze_json),
    (AnalysisMethod::Yaml, analyze_yaml),
    (AnalysisMethod::Regex, analyze_regex),
    (AnalysisMethod::BasicText, analyze_basic_text),
];

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedField {
    pub field_type: Option<FieldType>,
    pub required: bool,
    pub validators: Vec<Validator>,
    pub description: Option<String>,
}

impl AnalyzedField {
    fn typed(field_type: Option<FieldType>) -> Self {
        Self {
            field_type,
            required: false,
            validators: Vec::new(),
            description: None,
        }
    }

    fn completeness(&self) -> f64 {
        let mut s = 0.0;
        if self.field_type.is_some() {
            s += 0.4;
        }
        if !self.validators.is_empty() {
            s += 0.3;
        }
        if self.description.as_deref().is_some_and(|d| !d.is_empty()) {
            s += 0.3;
        }
        s
    }
}

impl Serialize for AnalyzedField {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(rename = "type")]
            field_type: Option<FieldType>,
            required: bool,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            validators: Vec<&'static str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
        }
        Wire {
            field_type: self.field_type,
            required: self.required,
            validators: self.validators.iter().map(Validator::kind).collect(),
            description: self.description.as_deref(),
        }
        .serialize(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodScore {
    pub method: AnalysisMethod,
    pub score: f64,
    pub fields: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodFailure {
    pub method: AnalysisMethod,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMeta {
    pub method: AnalysisMethod,
    pub score: f64,
    /// Scores of the strategies that succeeded but lost.
    pub alternatives: Vec<MethodScore>,
    pub failures: Vec<MethodFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub fields: AnalyzedFields,
    pub metadata: AnalysisMeta,
}

impl Analysis {
    /// Turn the winning schema into a template. Untyped fields become strings.
    pub fn into_template(
        self,
        nombre_archivo: impl Into<String>,
        tipo_documento: impl Into<String>,
    ) -> Result<Template, TemplateError> {
        let nombre_archivo = nombre_archivo.into();
        if self.fields.is_empty() {
            return Err(TemplateError::NoFields(nombre_archivo));
        }
        let mut template = Template::new(nombre_archivo, tipo_documento);
        for (name, f) in self.fields {
            let spec = FieldSpec {
                field_type: f.field_type.unwrap_or(FieldType::String),
                required: f.required,
                validators: f.validators,
                description: f.description,
            };
            template.campos.insert(name, spec);
        }
        Ok(template)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn quality_score(fields: &AnalyzedFields, multiplier: f64) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    let mean = fields.values().map(AnalyzedField::completeness).sum::<f64>() / fields.len() as f64;
    (mean * 100.0 * multiplier * 100.0).round() / 100.0
}

pub fn analyze_file(path: &Path) -> Result<Analysis, AnalyzeError> {
    let text = std::fs::read_to_string(path).map_err(|source| AnalyzeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "analyzing");
    analyze_source(&text)
}

pub fn analyze_source(text: &str) -> Result<Analysis, AnalyzeError> {
    let mut successes: Vec<(AnalysisMethod, AnalyzedFields, f64)> = Vec::new();
    let mut failures: Vec<MethodFailure> = Vec::new();

    for (method, run) in STRATEGIES {
        match run(text).and_then(|f| {
            if f.is_empty() {
                Err(AnalyzeError::Empty(method.to_string()))
            } else {
                Ok(f)
            }
        }) {
            Ok(fields) => {
                let score = quality_score(&fields, method.multiplier());
                debug!(%method, score, fields = fields.len(), "strategy succeeded");
                successes.push((*method, fields, score));
            }
            Err(e) => {
                debug!(%method, error = %e, "strategy skipped");
                failures.push(MethodFailure {
                    method: *method,
                    reason: e.to_string(),
                });
            }
        }
    }

    // First strictly greater score wins, so table order breaks ties.
    let mut best: Option<usize> = None;
    for (i, (_, _, score)) in successes.iter().enumerate() {
        if best.map_or(true, |b| *score > successes[b].2) {
            best = Some(i);
        }
    }
    let Some(best) = best else {
        warn!("no analysis strategy succeeded");
        return Err(AnalyzeError::NoStrategySucceeded {
            failures: failures.iter().map(|f| f.reason.clone()).collect(),
        });
    };

    let (method, fields, score) = successes.swap_remove(best);
    let mut alternatives: Vec<MethodScore> = successes
        .into_iter()
        .map(|(method, fields, score)| MethodScore {
            method,
            score,
            fields: fields.len(),
        })
        .collect();
    alternatives.sort_by(|a, b| b.score.total_cmp(&a.score));

    info!(%method, score, fields = fields.len(), "analysis selected");
    Ok(Analysis {
        fields,
        metadata: AnalysisMeta {
            method,
            score,
            alternatives,
            failures,
        },
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

static KWARG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)\s*=\s*(?:_\(\s*)?(?:"([^"]*)"|'([^']*)'|([\w.\-]+))"#).expect("static regex")
});

/// `key=value` pairs of a Python call's argument list. Quotes are dropped.
fn call_kwargs(args: &str) -> HashMap<String, String> {
    KWARG_RE
        .captures_iter(args)
        .filter_map(|c| {
            let key = c.get(1)?.as_str().to_string();
            let value = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4))?.as_str().to_string();
            Some((key, value))
        })
        .collect()
}

fn snake_case(label: &str) -> String {
    let mut out = String::new();
    for c in label.trim().to_lowercase().chars() {
        let c = match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            c => c,
        };
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

fn numeric_validators(kwargs: &HashMap<String, String>) -> Vec<Validator> {
    let mut out = Vec::new();
    let num = |k: &str| kwargs.get(k).and_then(|v| v.parse::<f64>().ok());
    let len = |k: &str| kwargs.get(k).and_then(|v| v.parse::<usize>().ok());
    if let Some(n) = len("min_length") {
        out.push(Validator::MinLength(n));
    }
    if let Some(n) = len("max_length") {
        out.push(Validator::MaxLength(n));
    }
    if let Some(x) = num("ge").or_else(|| num("min_value")) {
        out.push(Validator::MinValue(x));
    }
    if let Some(x) = num("le").or_else(|| num("max_value")) {
        out.push(Validator::MaxValue(x));
    }
    if let Some(p) = kwargs.get("pattern").or_else(|| kwargs.get("regex")) {
        if let Ok(p) = Pattern::new(p) {
            out.push(Validator::Pattern(p));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// django
// ---------------------------------------------------------------------------

static DJANGO_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^class\s+\w+\s*\(\s*(?:models\.)?Model\s*\)\s*:").expect("static regex")
});
static DJANGO_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]+(\w+)\s*=\s*models\.(\w+)\((.*)\)\s*$").expect("static regex")
});
static DJANGO_BOUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(Min|Max)(Value|Length)Validator\(\s*(-?[\d.]+)\s*\)").expect("static regex")
});
static LEADING_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:_\(\s*)?["']([^"']+)["']"#).expect("static regex"));

fn django_type(class: &str) -> (Option<FieldType>, bool) {
    match class {
        "CharField" | "TextField" | "SlugField" | "URLField" | "UUIDField" => (Some(FieldType::String), false),
        "EmailField" => (Some(FieldType::Email), false),
        "IntegerField" | "BigIntegerField" | "SmallIntegerField" | "PositiveIntegerField"
        | "PositiveSmallIntegerField" => (Some(FieldType::Number), true),
        "FloatField" | "DecimalField" => (Some(FieldType::Number), false),
        "DateField" | "DateTimeField" => (Some(FieldType::Date), false),
        "BooleanField" | "NullBooleanField" => (Some(FieldType::Boolean), false),
        _ => (None, false),
    }
}

fn analyze_django(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    if !DJANGO_CLASS_RE.is_match(text) {
        return Err(AnalyzeError::Syntax {
            method: "django".into(),
            reason: "no models.Model class".into(),
        });
    }

    let mut fields = AnalyzedFields::new();
    for cap in DJANGO_FIELD_RE.captures_iter(text) {
        let name = cap[1].to_string();
        let (field_type, integer) = django_type(&cap[2]);
        let args = &cap[3];
        let kwargs = call_kwargs(args);

        let mut validators = numeric_validators(&kwargs);
        if integer {
            validators.push(Validator::Integer);
        }
        for b in DJANGO_BOUND_RE.captures_iter(args) {
            let Ok(x) = b[3].parse::<f64>() else { continue };
            validators.push(match (&b[1], &b[2]) {
                ("Min", "Value") => Validator::MinValue(x),
                ("Max", "Value") => Validator::MaxValue(x),
                ("Min", _) => Validator::MinLength(x as usize),
                _ => Validator::MaxLength(x as usize),
            });
        }

        let optional = kwargs.get("null").is_some_and(|v| v == "True")
            || kwargs.get("blank").is_some_and(|v| v == "True");
        let description = kwargs
            .get("verbose_name")
            .or_else(|| kwargs.get("help_text"))
            .cloned()
            .or_else(|| LEADING_STRING_RE.captures(args).map(|c| c[1].to_string()));

        fields.insert(
            name,
            AnalyzedField {
                field_type,
                required: !optional,
                validators,
                description,
            },
        );
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// ast (annotated class body)
// ---------------------------------------------------------------------------

static CLASS_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^class\s+\w+\s*(?:\([^)]*\))?\s*:\s*$").expect("static regex"));
static ANNOTATED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)\s*:\s*([^=#]+?)\s*(?:=\s*([^#]*?))?\s*(?:#\s*(.*?))?\s*$").expect("static regex")
});
static OPTIONAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Optional\[\s*(.+?)\s*\]|(.+?)\s*\|\s*None)$").expect("static regex"));

fn python_type(annotation: &str) -> (Option<FieldType>, bool, bool) {
    let (inner, optional) = match OPTIONAL_RE.captures(annotation) {
        Some(c) => (c.get(1).or_else(|| c.get(2)).map_or(annotation, |m| m.as_str()), true),
        None => (annotation, false),
    };
    let (ty, integer) = match inner.rsplit('.').next().unwrap_or(inner) {
        "str" => (Some(FieldType::String), false),
        "int" => (Some(FieldType::Number), true),
        "float" | "Decimal" => (Some(FieldType::Number), false),
        "date" | "datetime" => (Some(FieldType::Date), false),
        "bool" => (Some(FieldType::Boolean), false),
        "EmailStr" => (Some(FieldType::Email), false),
        _ => (None, false),
    };
    (ty, integer, optional)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn analyze_class_body(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    let syntax = |reason: &str| AnalyzeError::Syntax {
        method: "ast".into(),
        reason: reason.into(),
    };

    let lines: Vec<&str> = text.lines().collect();
    let mut fields = AnalyzedFields::new();
    let mut saw_class = false;
    let mut i = 0;

    while i < lines.len() {
        let header = lines[i];
        i += 1;
        if !CLASS_HEADER_RE.is_match(header.trim_start()) {
            continue;
        }
        saw_class = true;
        let class_indent = indent_of(header);

        let mut body_indent: Option<usize> = None;
        let mut in_docstring = false;
        let mut skip_deeper_than: Option<usize> = None;

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                i += 1;
                continue;
            }
            let indent = indent_of(line);
            if indent <= class_indent {
                break;
            }
            i += 1;

            let body = *body_indent.get_or_insert(indent);
            if let Some(limit) = skip_deeper_than {
                if indent > limit {
                    continue;
                }
                skip_deeper_than = None;
            }
            if indent > body {
                continue;
            }
            if indent < body {
                return Err(syntax("unindent does not match any outer indentation level"));
            }

            if in_docstring {
                if trimmed.contains("\"\"\"") {
                    in_docstring = false;
                }
                continue;
            }
            if trimmed.starts_with("\"\"\"") {
                in_docstring = !(trimmed.len() > 3 && trimmed[3..].contains("\"\"\""));
                continue;
            }
            if trimmed.starts_with("def ") || trimmed.starts_with("class ") || trimmed.starts_with('@') {
                skip_deeper_than = Some(indent);
                continue;
            }

            let Some(cap) = ANNOTATED_RE.captures(trimmed) else { continue };
            let name = cap[1].to_string();
            let (field_type, integer, optional) = python_type(cap[2].trim());
            let default = cap.get(3).map(|m| m.as_str().trim()).filter(|d| !d.is_empty());
            let comment = cap.get(4).map(|m| m.as_str().trim().to_string()).filter(|c| !c.is_empty());

            let mut validators = Vec::new();
            let mut description = comment;
            if let Some(d) = default.filter(|d| d.starts_with("Field(")) {
                let kwargs = call_kwargs(d);
                validators.extend(numeric_validators(&kwargs));
                if description.is_none() {
                    description = kwargs.get("description").cloned();
                }
            }
            if integer {
                validators.push(Validator::Integer);
            }
            // `Field(...)` with a leading `...` is still required.
            let has_default = default.is_some_and(|d| !d.starts_with("Field(...") && !d.starts_with("Field( ..."));

            fields.insert(
                name,
                AnalyzedField {
                    field_type,
                    required: !optional && !has_default,
                    validators,
                    description,
                },
            );
        }

        if body_indent.is_none() {
            return Err(syntax("expected an indented block after class definition"));
        }
    }

    if !saw_class {
        return Err(syntax("no class definition"));
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// json / yaml
// ---------------------------------------------------------------------------

static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\d _.\-]*$").expect("static regex"));

fn spec_from_value(name: &str, v: &Value) -> AnalyzedField {
    let field_type = v
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<FieldType>().ok());
    let mut validators = Vec::new();
    let mut options: Vec<(&String, &Value)> = Vec::new();
    if let Some(table) = v.get("validators").and_then(Value::as_object) {
        options.extend(table.iter());
    }
    if let Some(obj) = v.as_object() {
        options.extend(obj.iter());
    }
    for (option, value) in options {
        if !crate::model::VALIDATOR_KINDS.contains(&option.as_str()) {
            continue;
        }
        match Validator::from_option(name, option, value) {
            Ok(Some(val)) => validators.push(val),
            Ok(None) => {}
            Err(e) => debug!(field = %name, error = %e, "validator ignored"),
        }
    }
    AnalyzedField {
        field_type,
        required: v.get("required").and_then(Value::as_bool).unwrap_or(false),
        validators,
        description: v.get("description").and_then(Value::as_str).map(str::to_string),
    }
}

fn fields_from_document(method: AnalysisMethod, doc: &Value) -> Result<AnalyzedFields, AnalyzeError> {
    let syntax = |reason: &str| AnalyzeError::Syntax {
        method: method.to_string(),
        reason: reason.into(),
    };
    let obj = doc.as_object().ok_or_else(|| syntax("top level is not a mapping"))?;

    let schema = obj
        .get("campos")
        .and_then(Value::as_object)
        .or_else(|| {
            let all_typed = !obj.is_empty() && obj.values().all(|v| v.get("type").is_some());
            all_typed.then_some(obj)
        });

    if let Some(schema) = schema {
        return Ok(schema
            .iter()
            .map(|(name, v)| (name.clone(), spec_from_value(name, v)))
            .collect());
    }

    // Flat record: one field per key, typed from the value.
    if let Some(bad) = obj.keys().find(|k| !KEY_RE.is_match(k)) {
        return Err(syntax(&format!("'{bad}' is not a field name")));
    }
    Ok(obj
        .iter()
        .map(|(k, v)| (k.clone(), AnalyzedField::typed(infer_type(v))))
        .collect())
}

fn analyze_json(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| AnalyzeError::Syntax {
        method: "json".into(),
        reason: e.to_string(),
    })?;
    fields_from_document(AnalysisMethod::Json, &doc)
}

fn analyze_yaml(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    let doc: Value = serde_yaml::from_str(text).map_err(|e| AnalyzeError::Syntax {
        method: "yaml".into(),
        reason: e.to_string(),
    })?;
    fields_from_document(AnalysisMethod::Yaml, &doc)
}

// ---------------------------------------------------------------------------
// regex
// ---------------------------------------------------------------------------

static TYPE_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\w+)\s*[:=]\s*(\w+)\s*,?\s*$").expect("static regex"));

fn analyze_regex(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    let mut fields = AnalyzedFields::new();
    for cap in TYPE_PAIR_RE.captures_iter(text) {
        let (ty, integer, _) = python_type(&cap[2]);
        let ty = ty.or_else(|| cap[2].parse::<FieldType>().ok());
        let Some(ty) = ty else { continue };
        let mut field = AnalyzedField::typed(Some(ty));
        if integer {
            field.validators.push(Validator::Integer);
        }
        fields.insert(cap[1].to_string(), field);
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// basic_text
// ---------------------------------------------------------------------------

static CODE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:class|def|import|from)\s").expect("static regex"));
static LABEL_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\p{L}[\p{L}\d _\-/]*?)\s*:\s*(.*)$").expect("static regex"));

fn analyze_basic_text(text: &str) -> Result<AnalyzedFields, AnalyzeError> {
    if CODE_LINE_RE.is_match(text) {
        return Err(AnalyzeError::Syntax {
            method: "basic_text".into(),
            reason: "input looks like source code".into(),
        });
    }
    let mut fields = AnalyzedFields::new();
    for line in text.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(cap) = LABEL_LINE_RE.captures(line.trim_end()) else { continue };
        let label = cap[1].trim();
        let name = snake_case(label);
        if name.is_empty() {
            continue;
        }
        let value = cap[2].trim().trim_matches('_').trim();
        let field_type = (!value.is_empty()).then(|| infer_type_from_text(value));
        let mut field = AnalyzedField::typed(field_type);
        field.description = Some(label.to_string());
        fields.insert(name, field);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DJANGO_MODEL: &str = r#"
from django.db import models

class Paciente(models.Model):
    nombre = models.CharField(max_length=100, verbose_name="Nombre completo")
    edad = models.IntegerField(validators=[MinValueValidator(0), MaxValueValidator(120)])
    correo = models.EmailField(blank=True, help_text="Correo de contacto")
    fecha_nacimiento = models.DateField("Fecha de nacimiento")
"#;

    const DATACLASS: &str = r#"
@dataclass
class Paciente:
    """Datos del paciente."""
    nombre: str  # Nombre completo
    edad: int = 0
    correo: Optional[str] = None

    def saludo(self) -> str:
        return f"Hola {self.nombre}"
"#;

    #[test]
    fn django_source_selects_django() {
        let a = analyze_source(DJANGO_MODEL).unwrap();
        assert_eq!(a.metadata.method, AnalysisMethod::Django);
        assert_eq!(a.fields.len(), 4);

        let nombre = &a.fields["nombre"];
        assert_eq!(nombre.field_type, Some(FieldType::String));
        assert!(nombre.required);
        assert_eq!(nombre.validators, vec![Validator::MaxLength(100)]);
        assert_eq!(nombre.description.as_deref(), Some("Nombre completo"));

        let edad = &a.fields["edad"];
        assert!(edad.validators.contains(&Validator::Integer));
        assert!(edad.validators.contains(&Validator::MaxValue(120.0)));

        assert!(!a.fields["correo"].required);
        assert_eq!(a.fields["fecha_nacimiento"].description.as_deref(), Some("Fecha de nacimiento"));
    }

    #[test]
    fn django_failures_are_recorded() {
        let a = analyze_source(DJANGO_MODEL).unwrap();
        let failed: Vec<_> = a.metadata.failures.iter().map(|f| f.method).collect();
        assert!(failed.contains(&AnalysisMethod::Json));
        assert!(failed.contains(&AnalysisMethod::BasicText));
    }

    #[test]
    fn dataclass_selects_ast() {
        let a = analyze_source(DATACLASS).unwrap();
        assert_eq!(a.metadata.method, AnalysisMethod::Ast);
        assert_eq!(a.fields.keys().collect::<Vec<_>>(), vec!["nombre", "edad", "correo"]);
        assert!(a.fields["nombre"].required);
        assert_eq!(a.fields["nombre"].description.as_deref(), Some("Nombre completo"));
        assert!(!a.fields["edad"].required);
        assert!(!a.fields["correo"].required);
        assert_eq!(a.fields["correo"].field_type, Some(FieldType::String));
    }

    #[test]
    fn ast_rejects_class_without_body() {
        let err = analyze_class_body("class Vacia:\n\nx = 1\n").unwrap_err();
        assert!(err.to_string().contains("indented block"));
    }

    #[test]
    fn json_template_document() {
        let text = r#"{
            "nombre_archivo": "consulta.pdf",
            "tipo_documento": "consulta",
            "campos": {
                "motivo": { "type": "string", "required": true, "description": "Motivo", "validators": { "max_length": 500 } },
                "fecha": { "type": "date" }
            }
        }"#;
        let a = analyze_source(text).unwrap();
        assert_eq!(a.metadata.method, AnalysisMethod::Json);
        assert_eq!(a.fields["motivo"].validators, vec![Validator::MaxLength(500)]);
        assert!(a.fields["motivo"].required);
        // yaml parses the same text and ties; json comes first
        assert!(a.metadata.alternatives.iter().any(|s| s.method == AnalysisMethod::Yaml));
    }

    #[test]
    fn yaml_schema() {
        let text = "nombre:\n  type: string\n  description: Nombre\nedad:\n  type: integer\n";
        let a = analyze_source(text).unwrap();
        assert_eq!(a.metadata.method, AnalysisMethod::Yaml);
        assert_eq!(a.fields["edad"].field_type, Some(FieldType::Number));
    }

    #[test]
    fn plain_text_form() {
        let text = "Nombre del paciente: ____\nFecha de ingreso: 05/03/2024\nTeléfono: 5551234\n";
        let a = analyze_source(text).unwrap();
        assert_eq!(a.metadata.method, AnalysisMethod::BasicText);
        assert_eq!(a.fields.len(), 3);
        assert_eq!(a.fields["nombre_del_paciente"].field_type, None);
        assert_eq!(a.fields["fecha_de_ingreso"].field_type, Some(FieldType::Date));
        assert_eq!(a.fields["telefono"].description.as_deref(), Some("Teléfono"));
    }

    #[test]
    fn nothing_recognised_is_an_error() {
        let err = analyze_source("<<<>>>").unwrap_err();
        match err {
            AnalyzeError::NoStrategySucceeded { failures } => assert_eq!(failures.len(), STRATEGIES.len()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quality_score_weights() {
        let mut fields = AnalyzedFields::new();
        fields.insert("a".into(), AnalyzedField::typed(Some(FieldType::String)));
        assert_eq!(quality_score(&fields, 1.0), 40.0);
        assert_eq!(quality_score(&fields, 1.2), 48.0);
        assert_eq!(quality_score(&AnalyzedFields::new(), 1.0), 0.0);
    }

    #[test]
    fn analysis_into_template() {
        let a = analyze_source(DJANGO_MODEL).unwrap();
        let t = a.into_template("paciente.pdf", "historia_clinica").unwrap();
        assert_eq!(t.campos.len(), 4);
        assert_eq!(t.campos["correo"].field_type, FieldType::Email);
    }

    #[test]
    fn analyze_missing_file() {
        let err = analyze_file(Path::new("/nonexistent/modelo.py")).unwrap_err();
        assert!(matches!(err, AnalyzeError::Io { .. }));
    }

    #[test]
    fn snake_case_labels() {
        assert_eq!(snake_case("Fecha de Nacimiento"), "fecha_de_nacimiento");
        assert_eq!(snake_case("  N° Historia "), "n_historia");
    }
}
