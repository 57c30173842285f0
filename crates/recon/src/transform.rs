//! Coerce connected values into their declared types.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{ConnectedDocument, FieldSpec, FieldType, Record, Template};
use crate::validator::{declared_date_format, parse_date, value_as_bool, value_as_number, value_as_text};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformWarning {
    pub field: String,
    pub expected: FieldType,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformedRecord {
    pub record: Record,
    pub warnings: Vec<TransformWarning>,
}

/// Coerce one value to `spec`'s type. `None` when it cannot be represented.
///
/// Dates are written in the field's `date_format` when it declares one,
/// ISO `YYYY-MM-DD` otherwise.
pub fn coerce(value: &Value, spec: &FieldSpec) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match spec.field_type {
        FieldType::String => value_as_text(value).map(|t| Value::String(t.trim().to_string())),
        FieldType::Email => value_as_text(value).map(|t| Value::String(t.trim().to_lowercase())),
        FieldType::Boolean => value_as_bool(value).map(Value::Bool),
        FieldType::Number => {
            let n = value_as_number(value)?;
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                Some(Value::from(n as i64))
            } else {
                serde_json::Number::from_f64(n).map(Value::Number)
            }
        }
        FieldType::Date => {
            let text = value.as_str()?;
            let format = declared_date_format(spec);
            let date = format
                .and_then(|f| parse_date(text, Some(f)))
                .or_else(|| parse_date(text, None))?;
            Some(Value::String(date.format(format.unwrap_or("%Y-%m-%d")).to_string()))
        }
    }
}

/// Build the output record in template order. Values that refuse to coerce
/// are kept verbatim and reported.
pub fn transform(doc: &ConnectedDocument, template: &Template) -> TransformedRecord {
    let mut record = Record::new();
    let mut warnings = Vec::new();

    for (name, spec) in &template.campos {
        let raw = doc.fields.get(name).map(|f| &f.value).unwrap_or(&Value::Null);
        let value = match coerce(raw, spec) {
            Some(v) => v,
            None => {
                warn!(field = %name, expected = %spec.field_type, value = %raw, "value kept uncoerced");
                warnings.push(TransformWarning {
                    field: name.clone(),
                    expected: spec.field_type,
                    value: raw.clone(),
                });
                raw.clone()
            }
        };
        record.insert(name.clone(), value);
    }

    TransformedRecord { record, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::connector::connect_data;
    use crate::model::{ExtractedField, SourceFields, Validator};
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn coerce_each_type() {
        let spec = FieldSpec::new;
        assert_eq!(coerce(&json!("  Ana "), &spec(FieldType::String)), Some(json!("Ana")));
        assert_eq!(coerce(&json!(" Ana@Mail.COM"), &spec(FieldType::Email)), Some(json!("ana@mail.com")));
        assert_eq!(coerce(&json!("sí"), &spec(FieldType::Boolean)), Some(json!(true)));
        assert_eq!(coerce(&json!("42"), &spec(FieldType::Number)), Some(json!(42)));
        assert_eq!(coerce(&json!("72,5"), &spec(FieldType::Number)), Some(json!(72.5)));
        assert_eq!(coerce(&json!("05/03/2024"), &spec(FieldType::Date)), Some(json!("2024-03-05")));
        assert_eq!(coerce(&Value::Null, &spec(FieldType::Date)), Some(Value::Null));
        assert_eq!(coerce(&json!("mañana"), &spec(FieldType::Date)), None);
    }

    #[test]
    fn dates_follow_declared_format() {
        let slashed = FieldSpec::new(FieldType::Date).with_validator(Validator::DateFormat("%d/%m/%Y".into()));
        assert_eq!(coerce(&json!("05/03/2024"), &slashed), Some(json!("05/03/2024")));
        // ISO input is rewritten into the declared layout
        assert_eq!(coerce(&json!("2024-03-05"), &slashed), Some(json!("05/03/2024")));

        let dotted = FieldSpec::new(FieldType::Date).with_validator(Validator::DateFormat("%d.%m.%Y".into()));
        assert_eq!(coerce(&json!("05.03.2024"), &dotted), Some(json!("05.03.2024")));
    }

    #[test]
    fn formatted_date_still_validates_after_transform() {
        let template = Template::new("t", "d").with_field(
            "fecha",
            FieldSpec::new(FieldType::Date)
                .required()
                .with_validator(Validator::DateFormat("%d/%m/%Y".into())),
        );
        let source = SourceFields::from([(
            "fecha".to_string(),
            ExtractedField::new(json!("05/03/2024"), Some(FieldType::Date), 1.0),
        )]);
        let spec = &template.campos["fecha"];
        assert!(validate(Some(&json!("05/03/2024")), spec).is_empty());

        let doc = connect_data(&source, &template, &MatchConfig::default()).unwrap();
        let out = transform(&doc, &template);
        assert!(out.warnings.is_empty());
        assert_eq!(out.record["fecha"], json!("05/03/2024"));
        assert!(validate(out.record.get("fecha"), spec).is_empty());
    }

    #[test]
    fn transform_keeps_order_and_reports_failures() {
        let template = Template::new("t", "d")
            .with_field("nombre", FieldSpec::new(FieldType::String))
            .with_field("fecha", FieldSpec::new(FieldType::Date))
            .with_field("edad", FieldSpec::new(FieldType::Number));
        let source = SourceFields::from([
            ("name".to_string(), ExtractedField::new(json!(" Ana "), Some(FieldType::String), 0.9)),
            ("date".to_string(), ExtractedField::new(json!("pronto"), Some(FieldType::Date), 0.9)),
        ]);
        let doc = connect_data(&source, &template, &MatchConfig::default()).unwrap();
        let out = transform(&doc, &template);

        let keys: Vec<_> = out.record.keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(out.record["nombre"], json!("Ana"));
        assert_eq!(out.record["fecha"], json!("pronto"));
        assert!(out.record["edad"].is_null());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "fecha");
    }
}
