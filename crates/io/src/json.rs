// JSON export, notify envelope, read-back

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use notefy_recon::Record;

use crate::{ExportError, ExportMeta, GENERATOR};

#[derive(Debug, Serialize)]
struct NotifyMetadata<'a> {
    generator: &'static str,
    version: &'static str,
    generated_at: String,
    template: &'a str,
    document_type: &'a str,
}

#[derive(Debug, Serialize)]
struct NotifyEnvelope<'a> {
    metadata: NotifyMetadata<'a>,
    content: &'a Record,
}

fn write_pretty<T: Serialize>(value: &T, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Export the record as a pretty-printed JSON object.
pub fn export(record: &Record, path: &Path) -> Result<(), ExportError> {
    write_pretty(record, path)
}

/// Export the record under `content`, with generator metadata alongside.
pub fn export_notify(record: &Record, meta: &ExportMeta, path: &Path) -> Result<(), ExportError> {
    let envelope = NotifyEnvelope {
        metadata: NotifyMetadata {
            generator: GENERATOR,
            version: env!("CARGO_PKG_VERSION"),
            generated_at: chrono::Utc::now().to_rfc3339(),
            template: &meta.template,
            document_type: &meta.document_type,
        },
        content: record,
    };
    write_pretty(&envelope, path)
}

/// Read a JSON object back. Non-UTF-8 files are decoded as Windows-1252.
pub fn read_json(path: &Path) -> Result<Record, ExportError> {
    let text = crate::csv::read_file_as_utf8(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExportError::NotAnObject(path.to_path_buf())),
    }
}
