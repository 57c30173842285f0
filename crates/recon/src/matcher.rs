use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{ClaimPolicy, MatchConfig};
use crate::error::MatchError;
use crate::model::{ExtractedField, FieldMatch, FieldSpec, MatchOutput, MatchStats, SourceFields, Template};
use crate::similarity::{name_similarity, set_overlap};
use crate::validator::satisfies;

/// Score breakdown for one (template, source) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub name: f64,
    pub type_match: bool,
    pub content: f64,
    pub composite: f64,
}

/// Score one pair under the configured weights.
pub fn score_pair(
    template_name: &str,
    spec: &FieldSpec,
    source_name: &str,
    source: &ExtractedField,
    config: &MatchConfig,
) -> PairScore {
    let name = name_similarity(template_name, source_name);
    let type_match = source.effective_type() == Some(spec.field_type);
    let content = content_similarity(spec, source);
    let w = &config.weights;
    let composite = name * w.name + if type_match { w.type_match } else { 0.0 } + content * w.content;
    PairScore {
        name,
        type_match,
        content,
        composite: composite.clamp(0.0, 1.0),
    }
}

/// Overlap of declared validator kinds, or failing that, the share of the
/// template's validators the source value satisfies.
pub fn content_similarity(spec: &FieldSpec, source: &ExtractedField) -> f64 {
    if spec.validators.is_empty() {
        return 0.0;
    }
    if !source.validators.is_empty() {
        return set_overlap(
            spec.validator_kinds(),
            source.validators.iter().map(String::as_str),
        );
    }
    let passed = spec
        .validators
        .iter()
        .filter(|v| satisfies(&source.value, v))
        .count();
    passed as f64 / spec.validators.len() as f64
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn check_confidences(source: &SourceFields) -> Result<(), MatchError> {
    for (name, field) in source {
        if !(0.0..=1.0).contains(&field.confidence) {
            return Err(MatchError::ConfidenceOutOfRange {
                field: name.clone(),
                value: field.confidence,
            });
        }
    }
    Ok(())
}

/// Match extracted fields onto a template.
///
/// Each template field takes at most one source field, and only if the
/// composite score reaches `match_threshold`. Unmatched template fields
/// are listed, not treated as errors.
pub fn find_matches(
    source: &SourceFields,
    template: &Template,
    config: &MatchConfig,
) -> Result<MatchOutput, MatchError> {
    config.weights.check().map_err(MatchError::InvalidWeights)?;
    config.validate()?;
    if template.campos.is_empty() {
        return Err(MatchError::EmptyTemplate);
    }
    check_confidences(source)?;

    // All candidate pairs above threshold, per template field in template order.
    let mut candidates: Vec<(usize, &str, &str, PairScore)> = Vec::new();
    for (ti, (t_name, spec)) in template.campos.iter().enumerate() {
        for (s_name, field) in source {
            let score = score_pair(t_name, spec, s_name, field, config);
            debug!(
                template = %t_name,
                source = %s_name,
                name = score.name,
                type_match = score.type_match,
                content = score.content,
                composite = score.composite,
                "scored pair"
            );
            if score.composite >= config.match_threshold {
                candidates.push((ti, t_name.as_str(), s_name.as_str(), score));
            }
        }
    }

    let chosen: Vec<(usize, &str, &str, PairScore)> = match config.claim_policy {
        ClaimPolicy::Shared => best_per_template(&candidates),
        ClaimPolicy::Exclusive => assign_exclusive(candidates),
    };

    let mut by_template: IndexMap<String, FieldMatch> = IndexMap::new();
    let mut ordered = chosen;
    ordered.sort_by_key(|(ti, ..)| *ti);
    for (_, t_name, s_name, score) in ordered {
        let field = &source[s_name];
        by_template.insert(
            t_name.to_string(),
            FieldMatch {
                template_field: t_name.to_string(),
                pdf_field: s_name.to_string(),
                score: score.composite,
                confidence: round2(score.composite * 100.0),
                type_match: score.type_match,
                value: field.value.clone(),
                source_confidence: field.confidence,
            },
        );
    }

    let unmatched_template_fields: Vec<String> = template
        .campos
        .keys()
        .filter(|k| !by_template.contains_key(*k))
        .cloned()
        .collect();

    let average_confidence = if by_template.is_empty() {
        0.0
    } else {
        round2(by_template.values().map(|m| m.confidence).sum::<f64>() / by_template.len() as f64)
    };

    let stats = MatchStats {
        total_template_fields: template.campos.len(),
        total_source_fields: source.len(),
        matched_fields: by_template.len(),
        unmatched_fields: unmatched_template_fields.len(),
        average_confidence,
    };

    Ok(MatchOutput {
        matches: by_template,
        stats,
        unmatched_template_fields,
    })
}

/// Highest score per template field. Ties keep the earlier source field.
fn best_per_template<'a>(
    candidates: &[(usize, &'a str, &'a str, PairScore)],
) -> Vec<(usize, &'a str, &'a str, PairScore)> {
    let mut best: IndexMap<usize, (usize, &'a str, &'a str, PairScore)> = IndexMap::new();
    for c in candidates {
        match best.get(&c.0) {
            Some(current) if current.3.composite >= c.3.composite => {}
            _ => {
                best.insert(c.0, *c);
            }
        }
    }
    best.into_values().collect()
}

/// Greedy assignment by descending score; each side used at most once.
fn assign_exclusive<'a>(
    mut candidates: Vec<(usize, &'a str, &'a str, PairScore)>,
) -> Vec<(usize, &'a str, &'a str, PairScore)> {
    // Stable sort keeps template/source order among equal scores.
    candidates.sort_by(|a, b| b.3.composite.total_cmp(&a.3.composite));
    let mut templates_used: HashSet<usize> = HashSet::new();
    let mut sources_used: HashSet<&str> = HashSet::new();
    let mut chosen = Vec::new();
    for c in candidates {
        if templates_used.contains(&c.0) || sources_used.contains(c.2) {
            continue;
        }
        templates_used.insert(c.0);
        sources_used.insert(c.2);
        chosen.push(c);
    }
    chosen
}
