// CSV export (one header row, one data row) and text loading

use std::io::Read;
use std::path::Path;

use serde_json::Value;

use notefy_recon::Record;

use crate::ExportError;

/// Flatten nested values into `(column, cell)` pairs.
///
/// Objects join keys with `.`, arrays use the element index. Null becomes
/// an empty cell. An empty object or array still gets its own column.
pub fn flatten(record: &Record) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in record {
        flatten_into(key.clone(), value, &mut out);
    }
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten_into(format!("{prefix}.{k}"), v, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(format!("{prefix}.{i}"), v, out);
            }
        }
        Value::Object(_) | Value::Array(_) | Value::Null => out.push((prefix, String::new())),
        Value::String(s) => out.push((prefix, s.clone())),
        other => out.push((prefix, other.to_string())),
    }
}

pub fn export(record: &Record, path: &Path) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(csv_err)?;

    let cells = flatten(record);
    writer
        .write_record(cells.iter().map(|(k, _)| k.as_str()))
        .map_err(csv_err)?;
    writer
        .write_record(cells.iter().map(|(_, v)| v.as_str()))
        .map_err(csv_err)?;
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, ExportError> {
    let read_err = |source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_err)?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_flatten_nested() {
        let r = record(json!({
            "nombre": "Ana",
            "direccion": { "ciudad": "Lima", "cp": 15001 },
            "alergias": ["polen", "penicilina"],
            "telefono": null,
            "extra": {},
        }));
        let cells = flatten(&r);
        assert_eq!(
            cells,
            vec![
                ("nombre".to_string(), "Ana".to_string()),
                ("direccion.ciudad".to_string(), "Lima".to_string()),
                ("direccion.cp".to_string(), "15001".to_string()),
                ("alergias.0".to_string(), "polen".to_string()),
                ("alergias.1".to_string(), "penicilina".to_string()),
                ("telefono".to_string(), String::new()),
                ("extra".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_csv_export_two_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paciente.csv");
        let r = record(json!({ "nombre": "Quispe, Ana", "edad": 34, "activo": true }));

        export(&r, &path).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].iter().collect::<Vec<_>>(), vec!["nombre", "edad", "activo"]);
        assert_eq!(rows[1].iter().collect::<Vec<_>>(), vec!["Quispe, Ana", "34", "true"]);
    }

    #[test]
    fn test_read_utf8_passthrough() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("utf8.txt");
        fs::write(&path, "año").unwrap();
        assert_eq!(read_file_as_utf8(&path).unwrap(), "año");
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_file_as_utf8(Path::new("/nonexistent/x.json")).unwrap_err();
        assert!(matches!(err, ExportError::Read { .. }));
    }
}
