//! Field-name similarity.
//!
//! Names coming out of documents are a mix of English and Spanish, with
//! underscores, dashes and accents. Both sides are normalized into a
//! Spanish word list before comparing.

use std::collections::HashSet;

/// English token → Spanish token. Applied word by word after lowercasing.
const SYNONYMS: &[(&str, &str)] = &[
    ("first", "nombre"),
    ("name", "nombre"),
    ("given", "nombre"),
    ("last", "apellido"),
    ("surname", "apellido"),
    ("family", "apellido"),
    ("date", "fecha"),
    ("birth", "nacimiento"),
    ("dob", "nacimiento"),
    ("address", "direccion"),
    ("phone", "telefono"),
    ("mobile", "telefono"),
    ("email", "correo"),
    ("mail", "correo"),
    ("city", "ciudad"),
    ("age", "edad"),
    ("gender", "genero"),
    ("sex", "sexo"),
    ("id", "identificacion"),
    ("number", "numero"),
    ("patient", "paciente"),
    ("doctor", "medico"),
    ("physician", "medico"),
    ("diagnosis", "diagnostico"),
    ("document", "documento"),
    ("type", "tipo"),
    ("weight", "peso"),
    ("height", "altura"),
    ("blood", "sangre"),
    ("insurance", "seguro"),
];

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' => 'a',
        'é' | 'è' | 'ë' => 'e',
        'í' | 'ì' | 'ï' => 'i',
        'ó' | 'ò' | 'ö' => 'o',
        'ú' | 'ù' | 'ü' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

fn translate(word: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(en, _)| *en == word)
        .map(|(_, es)| *es)
        .unwrap_or(word)
}

/// Normalized word list for a field name.
pub fn name_words(name: &str) -> Vec<String> {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '_' | '-' | '.' => ' ',
            c => fold_accent(c),
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(|w| translate(w).to_string())
        .collect()
}

pub fn normalize_name(name: &str) -> String {
    name_words(name).join(" ")
}

/// 1.0 on normalized equality; else shared words over the larger word set.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let wa = name_words(a);
    let wb = name_words(b);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    if wa == wb {
        return 1.0;
    }
    let sa: HashSet<&str> = wa.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = wb.iter().map(String::as_str).collect();
    let shared = sa.intersection(&sb).count();
    if shared == 0 {
        return 0.0;
    }
    shared as f64 / sa.len().max(sb.len()) as f64
}

/// Character-level ratio in [0, 1] over lowercased names.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Jaccard overlap of two string sets. Zero when either side is empty.
pub fn set_overlap<'a>(a: impl IntoIterator<Item = &'a str>, b: impl IntoIterator<Item = &'a str>) -> f64 {
    let sa: HashSet<&str> = a.into_iter().collect();
    let sb: HashSet<&str> = b.into_iter().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let union = sa.union(&sb).count();
    sa.intersection(&sb).count() as f64 / union as f64
}
