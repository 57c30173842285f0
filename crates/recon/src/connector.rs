//! Fill a template from extracted document fields.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::matcher::find_matches;
use crate::model::{ConnectedDocument, FilledField, SourceFields, Template, ValidationReport};

/// Produce one entry per template field, matched or not.
///
/// `validated` is true only when the matched source field's type agreed
/// with the template; a match alone is not enough. Unmatched fields come
/// back as `null` with zero confidence so the output key set always equals
/// the template's.
pub fn connect_data(
    source: &SourceFields,
    template: &Template,
    config: &MatchConfig,
) -> Result<ConnectedDocument, MatchError> {
    let output = find_matches(source, template, config)?;

    let mut fields = IndexMap::with_capacity(template.campos.len());
    for (name, spec) in &template.campos {
        let filled = match output.matches.get(name) {
            Some(m) => FilledField {
                value: m.value.clone(),
                confidence: m.confidence,
                field_type: spec.field_type,
                validated: m.type_match,
            },
            None => FilledField {
                value: Value::Null,
                confidence: 0.0,
                field_type: spec.field_type,
                validated: false,
            },
        };
        fields.insert(name.clone(), filled);
    }

    let report = build_report(&fields, config.low_confidence);
    info!(
        template = %template.nombre_archivo,
        total = report.total_fields,
        valid = report.valid_fields,
        missing = report.missing_fields.len(),
        "template connected"
    );

    Ok(ConnectedDocument { fields, report })
}

/// Aggregate statistics over a filled template.
pub fn build_report(fields: &IndexMap<String, FilledField>, low_confidence: f64) -> ValidationReport {
    let total_fields = fields.len();
    let valid_fields = fields.values().filter(|f| f.validated).count();
    let average_confidence = if total_fields == 0 {
        0.0
    } else {
        let sum: f64 = fields.values().map(|f| f.confidence).sum();
        (sum / total_fields as f64 * 100.0).round() / 100.0
    };
    let missing_fields = fields
        .iter()
        .filter(|(_, f)| f.value.is_null())
        .map(|(k, _)| k.clone())
        .collect();
    let low_confidence_fields = fields
        .iter()
        .filter(|(_, f)| f.confidence < low_confidence)
        .map(|(k, _)| k.clone())
        .collect();

    ValidationReport {
        total_fields,
        valid_fields,
        invalid_fields: total_fields - valid_fields,
        average_confidence,
        missing_fields,
        low_confidence_fields,
    }
}

impl ConnectedDocument {
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Field name → value, in template order.
    pub fn values(&self) -> crate::model::Record {
        self.fields
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractedField, FieldSpec, FieldType};
    use serde_json::json;

    fn template() -> Template {
        Template::new("paciente.pdf", "historia_clinica")
            .with_field("nombre", FieldSpec::new(FieldType::String).required())
            .with_field("fecha_nacimiento", FieldSpec::new(FieldType::Date))
            .with_field("telefono", FieldSpec::new(FieldType::String))
    }

    fn source() -> SourceFields {
        SourceFields::from([
            (
                "name".to_string(),
                ExtractedField::new(json!("John Doe"), Some(FieldType::String), 0.95),
            ),
            (
                "birth_date".to_string(),
                ExtractedField::new(json!(19900101), Some(FieldType::Number), 0.6),
            ),
        ])
    }

    #[test]
    fn every_template_field_present() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        let keys: Vec<_> = doc.fields.keys().cloned().collect();
        assert_eq!(keys, vec!["nombre", "fecha_nacimiento", "telefono"]);
    }

    #[test]
    fn unmatched_field_is_null_zero_unvalidated() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        let tel = &doc.fields["telefono"];
        assert!(tel.value.is_null());
        assert_eq!(tel.confidence, 0.0);
        assert!(!tel.validated);
        assert!(doc.report().missing_fields.contains(&"telefono".to_string()));
    }

    #[test]
    fn validated_requires_type_agreement() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        assert!(doc.fields["nombre"].validated);
        // matched on name alone (0.5), number vs date
        let fecha = &doc.fields["fecha_nacimiento"];
        assert_eq!(fecha.value, json!(19900101));
        assert!(!fecha.validated);
    }

    #[test]
    fn report_counts() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        let r = doc.report();
        assert_eq!(r.total_fields, 3);
        assert_eq!(r.valid_fields, 1);
        assert_eq!(r.invalid_fields, 2);
        assert_eq!(r.missing_fields, vec!["telefono"]);
        // 80 + 50 + 0
        assert_eq!(r.average_confidence, 43.33);
        assert_eq!(r.low_confidence_fields, vec!["fecha_nacimiento", "telefono"]);
    }

    #[test]
    fn report_serializes_with_spanish_keys() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        let v = serde_json::to_value(doc.report()).unwrap();
        assert_eq!(v["campos_faltantes"], json!(["telefono"]));
        assert!(v.get("campos_baja_confianza").is_some());
    }

    #[test]
    fn values_in_template_order() {
        let doc = connect_data(&source(), &template(), &MatchConfig::default()).unwrap();
        let values = doc.values();
        assert_eq!(values["nombre"], json!("John Doe"));
        assert!(values["telefono"].is_null());
    }
}
