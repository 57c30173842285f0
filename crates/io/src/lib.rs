// Record export and source loading

pub mod csv;
pub mod json;
pub mod yaml;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use notefy_recon::Record;

/// Generator name written into notify envelopes.
pub const GENERATOR: &str = "notefy";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("yaml error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("csv error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },

    #[error("{} does not hold a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error("unknown export format '{0}' (expected json, yaml, csv or notify)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Json,
    Yaml,
    Csv,
    /// JSON wrapped in a metadata envelope.
    Notify,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::Json, Self::Yaml, Self::Csv, Self::Notify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
            Self::Notify => "notify",
        }
    }

    /// File name suffix, including the leading dot.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Yaml => ".yaml",
            Self::Csv => ".csv",
            Self::Notify => ".notify.json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            "notify" => Ok(Self::Notify),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Context carried into the notify envelope.
#[derive(Debug, Clone, Default)]
pub struct ExportMeta {
    pub template: String,
    pub document_type: String,
}

pub fn output_path(dir: &Path, stem: &str, format: ExportFormat) -> PathBuf {
    dir.join(format!("{stem}{}", format.suffix()))
}

/// Write one format. Returns the path written.
pub fn export_one(
    record: &Record,
    dir: &Path,
    stem: &str,
    format: ExportFormat,
    meta: &ExportMeta,
) -> Result<PathBuf, ExportError> {
    let path = output_path(dir, stem, format);
    match format {
        ExportFormat::Json => json::export(record, &path)?,
        ExportFormat::Yaml => yaml::export(record, &path)?,
        ExportFormat::Csv => csv::export(record, &path)?,
        ExportFormat::Notify => json::export_notify(record, meta, &path)?,
    }
    Ok(path)
}

/// Write every requested format in order. Stops at the first failure.
pub fn export(
    record: &Record,
    dir: &Path,
    stem: &str,
    formats: &[ExportFormat],
    meta: &ExportMeta,
) -> Result<Vec<PathBuf>, ExportError> {
    formats
        .iter()
        .map(|f| export_one(record, dir, stem, *f, meta))
        .collect()
}

pub use json::read_json;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record() -> Record {
        json!({ "nombre": "Ana", "edad": 34 }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_all_formats_written() {
        let dir = tempdir().unwrap();
        let meta = ExportMeta::default();
        let paths = export(&record(), dir.path(), "paciente", &ExportFormat::ALL, &meta).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["paciente.json", "paciente.yaml", "paciente.csv", "paciente.notify.json"]
        );
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("YML".parse::<ExportFormat>().unwrap(), ExportFormat::Yaml);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(ref f)) if f == "xlsx"
        ));
    }

    #[test]
    fn test_missing_dir_is_write_error() {
        let meta = ExportMeta::default();
        let err = export_one(&record(), Path::new("/nonexistent/out"), "x", ExportFormat::Json, &meta)
            .unwrap_err();
        assert!(matches!(err, ExportError::Write { .. }));
    }
}
