//! Merge two raw records whose fields overlap under different names.
//!
//! Simpler than template matching: names are paired by character ratio
//! alone, and conflicts are settled by fixed rules (max number, longest
//! string, source wins). The resulting confidence is a coarse indicator,
//! not a probability.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::model::{Conflict, ReconcileMeta, Reconciliation, Record, Resolution};
use crate::similarity::sequence_ratio;

/// (source key, target key, ratio)
pub type FieldPair = (String, String, f64);

/// Pair each source key with its most similar unused target key.
///
/// Exact key matches are claimed first so they are never stolen by a
/// fuzzy neighbour.
pub fn common_fields(source: &Record, target: &Record, min_ratio: f64) -> Vec<FieldPair> {
    let mut used: HashSet<&str> = HashSet::new();
    let mut pairs = Vec::new();

    for key in source.keys() {
        if target.contains_key(key) {
            used.insert(key.as_str());
            pairs.push((key.clone(), key.clone(), 1.0));
        }
    }
    let exact: HashSet<String> = pairs.iter().map(|(s, _, _)| s.clone()).collect();

    for s_key in source.keys().filter(|k| !exact.contains(*k)) {
        let mut best: Option<(&str, f64)> = None;
        for t_key in target.keys() {
            if used.contains(t_key.as_str()) {
                continue;
            }
            let ratio = sequence_ratio(s_key, t_key);
            if ratio >= min_ratio && best.map_or(true, |(_, r)| ratio > r) {
                best = Some((t_key.as_str(), ratio));
            }
        }
        if let Some((t_key, ratio)) = best {
            debug!(source = %s_key, target = %t_key, ratio, "paired fields");
            used.insert(t_key);
            pairs.push((s_key.clone(), t_key.to_string(), ratio));
        }
    }
    pairs
}

/// Pick one value for a paired field. `None` means the values agree.
pub fn resolve_conflict(source: &Value, target: &Value) -> Option<(Value, Resolution)> {
    if source == target {
        return None;
    }
    let resolved = match (source, target) {
        (Value::Null, t) => (t.clone(), Resolution::FilledFromTarget),
        (s, Value::Null) => (s.clone(), Resolution::FilledFromSource),
        (Value::Number(a), Value::Number(b)) => {
            let (fa, fb) = (a.as_f64().unwrap_or(f64::MIN), b.as_f64().unwrap_or(f64::MIN));
            let winner = if fb > fa { target } else { source };
            (winner.clone(), Resolution::MaxNumber)
        }
        (Value::String(a), Value::String(b)) => {
            let winner = if b.chars().count() > a.chars().count() { target } else { source };
            (winner.clone(), Resolution::LongestString)
        }
        (s, _) => (s.clone(), Resolution::SourceDefault),
    };
    Some(resolved)
}

/// 0.5 base, +0.1 above 5 merged fields, +0.1 more above 10.
pub fn reconcile_confidence(fields_reconciled: usize) -> f64 {
    let mut confidence: f64 = 0.5;
    if fields_reconciled > 5 {
        confidence += 0.1;
    }
    if fields_reconciled > 10 {
        confidence += 0.1;
    }
    confidence.min(1.0)
}

/// Merge `source` into `target`.
///
/// The output holds every target field, with paired fields resolved, plus
/// source-only fields under their own names.
pub fn reconcile_data(source: &Record, target: &Record, min_ratio: f64) -> Reconciliation {
    let pairs = common_fields(source, target, min_ratio);
    let mut reconciled_data = target.clone();
    let mut conflicts = Vec::new();

    for (s_key, t_key, _) in &pairs {
        let s_val = &source[s_key.as_str()];
        let t_val = &target[t_key.as_str()];
        if let Some((resolved, resolution)) = resolve_conflict(s_val, t_val) {
            conflicts.push(Conflict {
                source_field: s_key.clone(),
                target_field: t_key.clone(),
                source_value: s_val.clone(),
                target_value: t_val.clone(),
                resolved: resolved.clone(),
                resolution,
            });
            reconciled_data.insert(t_key.clone(), resolved);
        }
    }

    let paired: HashSet<&str> = pairs.iter().map(|(s, _, _)| s.as_str()).collect();
    for (key, value) in source {
        if !paired.contains(key.as_str()) && !reconciled_data.contains_key(key) {
            reconciled_data.insert(key.clone(), value.clone());
        }
    }

    Reconciliation {
        reconciled_data,
        metadata: ReconcileMeta {
            confidence: reconcile_confidence(pairs.len()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            fields_reconciled: pairs.len(),
            conflicts,
        },
    }
}
