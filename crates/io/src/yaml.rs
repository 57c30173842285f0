// YAML export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use notefy_recon::Record;

use crate::ExportError;

pub fn export(record: &Record, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, record).map_err(|source| ExportError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_yaml_export_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paciente.yaml");
        let record = json!({ "nombre": "Ana", "edad": 34, "alergias": ["polen"] })
            .as_object()
            .cloned()
            .unwrap();

        export(&record, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("nombre: Ana"));
        let back: Value = serde_yaml::from_str(&content).unwrap();
        assert_eq!(back, Value::Object(record));
    }

    #[test]
    fn test_yaml_reports_failed_write() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let record = json!({ "nombre": "Ana" }).as_object().cloned().unwrap();
        assert!(export(&record, full).is_err());
    }
}
