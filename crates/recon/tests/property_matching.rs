// Property-based tests for matching and reconciliation.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use serde_json::{json, Value};

use notefy_recon::config::{ClaimPolicy, MatchConfig};
use notefy_recon::connector::connect_data;
use notefy_recon::matcher::find_matches;
use notefy_recon::model::{ExtractedField, FieldSpec, FieldType, Record, SourceFields, Template};
use notefy_recon::reconcile::reconcile_data;
use notefy_recon::similarity::name_similarity;

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Field names mixing the vocabulary the synonym table knows with noise.
fn arb_name() -> impl Strategy<Value = String> {
    let word = prop_oneof![
        3 => prop::sample::select(vec![
            "name", "nombre", "date", "fecha", "birth", "nacimiento", "age", "edad",
            "email", "correo", "phone", "telefono", "city", "ciudad",
        ])
        .prop_map(str::to_string),
        1 => "[a-z]{1,6}",
    ];
    (prop::collection::vec(word, 1..4), prop::sample::select(vec!["_", "-", " ", "."]))
        .prop_map(|(words, sep)| words.join(sep))
}

fn arb_type() -> impl Strategy<Value = FieldType> {
    prop::sample::select(vec![
        FieldType::String,
        FieldType::Number,
        FieldType::Date,
        FieldType::Boolean,
        FieldType::Email,
    ])
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z ]{0,12}".prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn arb_template() -> impl Strategy<Value = Template> {
    prop::collection::vec((arb_name(), arb_type()), 1..6).prop_map(|fields| {
        fields.into_iter().fold(Template::new("t.pdf", "doc"), |t, (name, ty)| {
            t.with_field(name, FieldSpec::new(ty))
        })
    })
}

fn arb_source() -> impl Strategy<Value = SourceFields> {
    prop::collection::btree_map(
        arb_name(),
        (arb_value(), prop::option::of(arb_type()), 0.0..=1.0f64)
            .prop_map(|(v, t, c)| ExtractedField::new(v, t, c)),
        0..6,
    )
}

fn arb_record() -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[a-z_]{1,10}", arb_value(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn name_similarity_symmetric_and_bounded(a in arb_name(), b in arb_name()) {
        let ab = name_similarity(&a, &b);
        prop_assert_eq!(ab, name_similarity(&b, &a));
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert_eq!(name_similarity(&a, &a), 1.0);
    }

    #[test]
    fn accepted_matches_clear_threshold(template in arb_template(), source in arb_source()) {
        let out = find_matches(&source, &template, &MatchConfig::default()).unwrap();
        for (name, m) in &out.matches {
            prop_assert!(m.confidence >= 50.0, "{} matched at {}", name, m.confidence);
            prop_assert!(m.confidence <= 100.0);
            prop_assert!(template.campos.contains_key(name));
            prop_assert!(source.contains_key(&m.pdf_field));
        }
        prop_assert_eq!(out.stats.matched_fields + out.stats.unmatched_fields, template.campos.len());
    }

    #[test]
    fn exclusive_never_reuses_a_source(template in arb_template(), source in arb_source()) {
        let config = MatchConfig { claim_policy: ClaimPolicy::Exclusive, ..MatchConfig::default() };
        let out = find_matches(&source, &template, &config).unwrap();
        let mut used: Vec<&str> = out.matches.values().map(|m| m.pdf_field.as_str()).collect();
        let before = used.len();
        used.sort_unstable();
        used.dedup();
        prop_assert_eq!(used.len(), before);
    }

    #[test]
    fn connected_keys_equal_template_keys(template in arb_template(), source in arb_source()) {
        let doc = connect_data(&source, &template, &MatchConfig::default()).unwrap();
        let got: Vec<&String> = doc.fields.keys().collect();
        let want: Vec<&String> = template.campos.keys().collect();
        prop_assert_eq!(got, want);
        for f in doc.fields.values() {
            if f.value.is_null() && f.confidence == 0.0 {
                prop_assert!(!f.validated);
            }
        }
    }

    #[test]
    fn self_reconciliation_is_identity(record in arb_record()) {
        let out = reconcile_data(&record, &record, 0.85);
        prop_assert_eq!(&out.reconciled_data, &record);
        prop_assert!(out.metadata.conflicts.is_empty());
        prop_assert_eq!(out.metadata.fields_reconciled, record.len());
        prop_assert!(out.metadata.confidence >= 0.5 && out.metadata.confidence <= 0.7 + 1e-9);
    }

    #[test]
    fn reconciled_output_covers_target(source in arb_record(), target in arb_record()) {
        let out = reconcile_data(&source, &target, 0.85);
        for key in target.keys() {
            prop_assert!(out.reconciled_data.contains_key(key));
        }
        prop_assert!(out.reconciled_data.len() >= target.len());
    }
}

#[test]
fn null_against_value_is_filled() {
    let source: Record = json!({ "peso": null }).as_object().cloned().unwrap();
    let target: Record = json!({ "peso": 70 }).as_object().cloned().unwrap();
    let out = reconcile_data(&source, &target, 0.85);
    assert_eq!(out.reconciled_data["peso"], json!(70));
}
