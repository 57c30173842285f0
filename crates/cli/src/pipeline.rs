//! End-to-end document processing: template → match → transform →
//! reconcile → validate → export.
//!
//! Each stage either succeeds or stops the run with a `PipelineError`.
//! Validation failures are not errors; they are reported in the outcome.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use notefy_io::{ExportError, ExportFormat, ExportMeta};
use notefy_recon::analyzer::{analyze_file, AnalysisMethod};
use notefy_recon::cache::SmartOperationCache;
use notefy_recon::connector::connect_data;
use notefy_recon::model::{FilledField, ReconcileMeta, Record, SourceFields, Template, ValidationReport};
use notefy_recon::reconcile::reconcile_data;
use notefy_recon::transform::{transform, TransformWarning};
use notefy_recon::validator::{validate, ValidationIssue};
use notefy_recon::{AnalyzeError, ExtractedField, MatchConfig, MatchError, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("pattern analysis failed: {0}")]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Export(#[from] ExportError),

    /// Source file parsed as JSON but is not a field mapping.
    #[error("source {}: {source}", path.display())]
    SourceFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("export worker for {0} panicked")]
    ExportPanicked(ExportFormat),
}

/// One document to process.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub template: PathBuf,
    pub source: PathBuf,
    /// Record to reconcile the result against.
    pub reference: Option<PathBuf>,
    /// No export when `None`.
    pub output_dir: Option<PathBuf>,
    pub formats: Vec<ExportFormat>,
    /// Output file stem; defaults to the source file stem.
    pub stem: Option<String>,
}

impl ProcessRequest {
    pub fn new(template: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            source: source.into(),
            reference: None,
            output_dir: None,
            formats: ExportFormat::ALL.to_vec(),
            stem: None,
        }
    }

    fn output_stem(&self) -> String {
        self.stem.clone().unwrap_or_else(|| {
            self.source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "documento".to_string())
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub template: String,
    pub document_type: String,
    /// Set when the template came from pattern analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_method: Option<AnalysisMethod>,
    pub fields: IndexMap<String, FilledField>,
    pub report: ValidationReport,
    pub record: Record,
    pub transform_warnings: Vec<TransformWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileMeta>,
    /// Field → messages, only for fields that failed.
    pub validation_errors: IndexMap<String, Vec<String>>,
    pub missing_required: Vec<String>,
    pub exported: Vec<PathBuf>,
}

impl ProcessOutcome {
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// The shape printed in place of an outcome when a run fails.
    pub fn error_json(err: &dyn std::fmt::Display) -> Value {
        serde_json::json!({ "error": err.to_string() })
    }
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProcessOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn status_line(&self) -> String {
        match &self.error {
            None => format!("✓ {}", self.source.display()),
            Some(e) => format!("✗ {}: {e}", self.source.display()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

/// Validate every template field of `record`, keyed by field.
///
/// Returns (messages per failing field, required fields that were absent).
pub fn validate_record(record: &Record, template: &Template) -> (IndexMap<String, Vec<String>>, Vec<String>) {
    let mut errors = IndexMap::new();
    let mut missing = Vec::new();
    for (name, spec) in &template.campos {
        let issues = validate(record.get(name), spec);
        if issues.is_empty() {
            continue;
        }
        if issues.contains(&ValidationIssue::Required) {
            missing.push(name.clone());
        }
        errors.insert(name.clone(), issues.iter().map(ToString::to_string).collect());
    }
    (errors, missing)
}

/// Accept either `{name: {value, type, confidence}}` or a flat `{name: value}`.
pub fn source_fields_from_record(record: Record) -> Result<SourceFields, serde_json::Error> {
    let mut fields = SourceFields::new();
    for (name, v) in record {
        let field = match v {
            Value::Object(obj) if obj.contains_key("value") => serde_json::from_value(Value::Object(obj))?,
            other => ExtractedField::new(other, None, 1.0),
        };
        fields.insert(name, field);
    }
    Ok(fields)
}

#[derive(Debug, Clone)]
struct LoadedTemplate {
    template: Template,
    method: Option<AnalysisMethod>,
}

pub struct SystemIntegrator {
    config: MatchConfig,
    templates: SmartOperationCache<PathBuf, LoadedTemplate>,
}

impl SystemIntegrator {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config,
            templates: SmartOperationCache::default(),
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Load a template file, or derive one from any other file by pattern
    /// analysis. Cached per path.
    pub fn load_template(&self, path: &Path) -> Result<(Template, Option<AnalysisMethod>), PipelineError> {
        let loaded = self
            .templates
            .get_or_try_insert_with(path.to_path_buf(), || -> Result<_, PipelineError> {
                if Template::is_template_path(path) {
                    return Ok(LoadedTemplate {
                        template: Template::from_path(path)?,
                        method: None,
                    });
                }
                let analysis = analyze_file(path)?;
                let method = analysis.metadata.method;
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let file_name = path
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                info!(path = %path.display(), %method, "template derived by analysis");
                Ok(LoadedTemplate {
                    template: analysis.into_template(file_name, stem)?,
                    method: Some(method),
                })
            })?;
        Ok((loaded.template, loaded.method))
    }

    pub fn load_source(&self, path: &Path) -> Result<SourceFields, PipelineError> {
        let record = notefy_io::read_json(path)?;
        source_fields_from_record(record).map_err(|source| PipelineError::SourceFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn process_document(&self, request: &ProcessRequest) -> Result<ProcessOutcome, PipelineError> {
        info!(source = %request.source.display(), template = %request.template.display(), "processing");

        let (template, analysis_method) = self.load_template(&request.template)?;
        let source = self.load_source(&request.source)?;

        let doc = connect_data(&source, &template, &self.config)?;
        let transformed = transform(&doc, &template);

        let (record, reconciliation) = match &request.reference {
            Some(path) => {
                let reference = notefy_io::read_json(path)?;
                let merged = reconcile_data(&transformed.record, &reference, self.config.reconcile_similarity);
                info!(
                    fields = merged.metadata.fields_reconciled,
                    conflicts = merged.metadata.conflicts.len(),
                    "reconciled against reference"
                );
                (merged.reconciled_data, Some(merged.metadata))
            }
            None => (transformed.record, None),
        };

        let (validation_errors, missing_required) = validate_record(&record, &template);
        if !validation_errors.is_empty() {
            warn!(invalid = validation_errors.len(), "validation failures");
        }

        let exported = match &request.output_dir {
            Some(dir) => {
                let meta = ExportMeta {
                    template: template.nombre_archivo.clone(),
                    document_type: template.tipo_documento.clone(),
                };
                export_parallel(&record, dir, &request.output_stem(), &request.formats, &meta)?
            }
            None => Vec::new(),
        };

        Ok(ProcessOutcome {
            template: template.nombre_archivo,
            document_type: template.tipo_documento,
            analysis_method,
            fields: doc.fields,
            report: doc.report,
            record,
            transform_warnings: transformed.warnings,
            reconciliation,
            validation_errors,
            missing_required,
            exported,
        })
    }

    /// Process every request; a failure is recorded and the batch moves on.
    pub fn process_batch(&self, requests: &[ProcessRequest]) -> BatchReport {
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let item = match self.process_document(request) {
                Ok(outcome) => BatchItem {
                    source: request.source.clone(),
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => {
                    warn!(source = %request.source.display(), error = %e, "batch item failed");
                    BatchItem {
                        source: request.source.clone(),
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            items.push(item);
        }
        let succeeded = items.iter().filter(|i| i.succeeded()).count();
        BatchReport {
            total: items.len(),
            succeeded,
            failed: items.len() - succeeded,
            items,
        }
    }
}

/// One scoped thread per distinct format. Paths come back in request order,
/// repeated formats written once.
fn export_parallel(
    record: &Record,
    dir: &Path,
    stem: &str,
    formats: &[ExportFormat],
    meta: &ExportMeta,
) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::new();
    let formats: Vec<ExportFormat> = formats.iter().copied().filter(|f| seen.insert(*f)).collect();

    std::thread::scope(|s| -> Result<Vec<PathBuf>, PipelineError> {
        let handles: Vec<_> = formats
            .iter()
            .map(|&format| (format, s.spawn(move || notefy_io::export_one(record, dir, stem, format, meta))))
            .collect();

        let mut paths = Vec::with_capacity(handles.len());
        for (format, handle) in handles {
            let path = handle.join().map_err(|_| PipelineError::ExportPanicked(format))??;
            paths.push(path);
        }
        Ok(paths)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    const TEMPLATE: &str = r#"
nombre_archivo = "paciente.pdf"
tipo_documento = "historia_clinica"

[campos.nombre]
type = "string"
required = true

[campos.edad]
type = "number"
max_value = 120

[campos.telefono]
type = "string"
required = true
"#;

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let template = dir.join("paciente.toml");
        fs::write(&template, TEMPLATE).unwrap();
        let source = dir.join("fuente.json");
        fs::write(
            &source,
            json!({
                "name": { "value": "Ana", "type": "string", "confidence": 0.9 },
                "age": { "value": "34", "type": "number", "confidence": 0.8 },
            })
            .to_string(),
        )
        .unwrap();
        (template, source)
    }

    #[test]
    fn process_reports_missing_required() {
        let dir = tempdir().unwrap();
        let (template, source) = write_inputs(dir.path());
        let integrator = SystemIntegrator::new(MatchConfig::default());

        let outcome = integrator.process_document(&ProcessRequest::new(template, source)).unwrap();
        assert_eq!(outcome.record["nombre"], json!("Ana"));
        assert_eq!(outcome.record["edad"], json!(34));
        assert_eq!(outcome.missing_required, vec!["telefono"]);
        assert!(!outcome.is_valid());
        assert!(outcome.exported.is_empty());
    }

    #[test]
    fn reference_fills_gaps() {
        let dir = tempdir().unwrap();
        let (template, source) = write_inputs(dir.path());
        let reference = dir.path().join("ref.json");
        fs::write(&reference, r#"{ "telefono": "555 0134" }"#).unwrap();

        let mut request = ProcessRequest::new(template, source);
        request.reference = Some(reference);
        let outcome = SystemIntegrator::new(MatchConfig::default())
            .process_document(&request)
            .unwrap();

        assert_eq!(outcome.record["telefono"], json!("555 0134"));
        assert!(outcome.is_valid(), "{:?}", outcome.validation_errors);
        assert!(outcome.reconciliation.is_some());
    }

    #[test]
    fn exports_every_format() {
        let dir = tempdir().unwrap();
        let (template, source) = write_inputs(dir.path());
        let out = dir.path().join("salida");

        let mut request = ProcessRequest::new(template, source);
        request.output_dir = Some(out.clone());
        let outcome = SystemIntegrator::new(MatchConfig::default())
            .process_document(&request)
            .unwrap();

        assert_eq!(outcome.exported.len(), 4);
        assert_eq!(outcome.exported[0], out.join("fuente.json"));
        assert!(outcome.exported.iter().all(|p| p.exists()));
        assert_eq!(notefy_io::read_json(&outcome.exported[0]).unwrap(), outcome.record);
    }

    #[test]
    fn repeated_formats_are_written_once() {
        let dir = tempdir().unwrap();
        let (template, source) = write_inputs(dir.path());
        let out = dir.path().join("salida");

        let mut request = ProcessRequest::new(template, source);
        request.output_dir = Some(out.clone());
        request.formats = vec![ExportFormat::Json, ExportFormat::Csv, ExportFormat::Json];
        let outcome = SystemIntegrator::new(MatchConfig::default())
            .process_document(&request)
            .unwrap();

        assert_eq!(outcome.exported, vec![out.join("fuente.json"), out.join("fuente.csv")]);
        assert_eq!(notefy_io::read_json(&outcome.exported[0]).unwrap(), outcome.record);
    }

    #[test]
    fn template_loads_are_cached() {
        let dir = tempdir().unwrap();
        let (template, _) = write_inputs(dir.path());
        let integrator = SystemIntegrator::new(MatchConfig::default());

        let (first, _) = integrator.load_template(&template).unwrap();
        fs::remove_file(&template).unwrap();
        let (second, _) = integrator.load_template(&template).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn model_source_goes_through_analysis() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("modelo.py");
        fs::write(
            &model,
            "class Paciente(models.Model):\n    nombre = models.CharField(max_length=80)\n",
        )
        .unwrap();
        let (template, method) = SystemIntegrator::new(MatchConfig::default())
            .load_template(&model)
            .unwrap();
        assert_eq!(method, Some(AnalysisMethod::Django));
        assert_eq!(template.tipo_documento, "modelo");
        assert!(template.campos.contains_key("nombre"));
    }

    #[test]
    fn batch_continues_past_failures() {
        let dir = tempdir().unwrap();
        let (template, source) = write_inputs(dir.path());
        let requests = vec![
            ProcessRequest::new(&template, dir.path().join("no_existe.json")),
            ProcessRequest::new(&template, &source),
        ];
        let report = SystemIntegrator::new(MatchConfig::default()).process_batch(&requests);
        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert!(report.items[0].status_line().starts_with('✗'));
        assert!(report.items[1].status_line().starts_with('✓'));
    }

    #[test]
    fn flat_source_values_are_accepted() {
        let record = json!({ "name": "Ana", "age": { "value": 3, "confidence": 0.5 } })
            .as_object()
            .cloned()
            .unwrap();
        let fields = source_fields_from_record(record).unwrap();
        assert_eq!(fields["name"].confidence, 1.0);
        assert_eq!(fields["age"].confidence, 0.5);
    }

    #[test]
    fn error_json_shape() {
        let err = PipelineError::ExportPanicked(ExportFormat::Csv);
        assert_eq!(
            ProcessOutcome::error_json(&err),
            json!({ "error": "export worker for csv panicked" })
        );
    }
}
