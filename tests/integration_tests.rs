//! End-to-end scenarios run through the public `Engine` API, plus a
//! couple of namespace-level scenarios that don't need a full engine
//! run to exercise.

use std::collections::HashMap;

use indexmap::IndexMap;
use specgraph::namespace::{expand_fuzzy, ExpansionStep, FuzzySpec, FuzzySpecElement, Layer, Namespace};
use specgraph::{ConfigSchema, Engine, EngineError, Environment, Param, ProviderFn, ProviderModule, Value};

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn actions(names: Vec<Value>) -> Value {
    Value::List(names)
}

#[test]
fn require_one_check_accepts_a_single_set_value() {
    let schema = ConfigSchema::new();
    let module = ProviderModule::new("fruit").register(
        ProviderFn::new(
            "fruit",
            vec![Param::with_default("apple", Value::Null), Param::with_default("orange", Value::Null)],
            |args: &HashMap<String, Value>| Ok(Value::List(vec![args["apple"].clone(), args["orange"].clone()])),
        )
        .with_check(|args| {
            let set = |k: &str| args.get(k).map(|v| !v.is_null()).unwrap_or(false);
            if set("apple") || set("orange") {
                Ok(())
            } else {
                Err(EngineError::CheckError { name: "fruit".to_string(), message: "at least one of apple, orange must be set".to_string() })
            }
        }),
    );
    let engine = Engine::new(schema, vec![module], Environment::default());

    let document = map(vec![("apple", Value::Bool(true)), ("actions_", actions(vec![Value::string("fruit")]))]);
    let ns = engine.run(document).unwrap();
    let result = ns.get("fruit").unwrap().1.as_list().unwrap().to_vec();
    assert_eq!(result, vec![Value::Bool(true), Value::Null]);
}

#[test]
fn from_ref_shadows_onto_an_unresolved_document_key() {
    // `description` is `{from_: fit}`; `fit` is itself a plain document
    // value that has not been requested by anything else yet, so
    // resolving the indirection has to pull `fit` through the normal
    // document/handler path rather than assuming it is already in the
    // namespace.
    let schema = ConfigSchema::new();
    let engine = Engine::new(schema, vec![], Environment::default());

    let document = map(vec![
        ("fits", Value::List(vec![Value::string("NLO"), Value::string("NNLO")])),
        ("fit", map(vec![("description", Value::string("the selected fit"))])),
        ("description", map(vec![("from_", Value::string("fit"))])),
        ("actions_", actions(vec![Value::string("description")])),
    ]);

    let ns = engine.run(document).unwrap();
    assert_eq!(ns.get("description").unwrap().1.as_str(), Some("the selected fit"));
}

#[test]
fn element_of_handler_makes_a_collection_namespace_expandable() {
    let schema = ConfigSchema::new().element_of("pdfsets", "pdfset", |v| Ok(v.clone()));
    let engine = Engine::new(schema, vec![], Environment::default());

    let document = map(vec![
        ("pdfsets", Value::List(vec![Value::string("NNPDF40"), Value::string("CT18")])),
        ("actions_", actions(vec![Value::string("pdfsets")])),
    ]);
    let ns = engine.run(document).unwrap();
    assert!(matches!(ns.get("pdfsets").unwrap().1, Value::NsList { .. }));
}

#[test]
fn fuzzy_expansion_over_three_independent_axes_is_the_cartesian_product() {
    // pdfsets::theories::datasets over three length-2 NS-lists yields
    // exactly eight concrete specs, in a stable, reproducible order.
    let mut root = Layer::new();
    for key in ["pdfsets", "theories", "datasets"] {
        root.insert(key.to_string(), Value::NsList { key: key.to_string(), elems: vec![Value::string("a"), Value::string("b")] });
    }
    let ns = Namespace::new(root);

    let fuzzy = FuzzySpec::from(vec![
        FuzzySpecElement::Unindexed("pdfsets".to_string()),
        FuzzySpecElement::Unindexed("theories".to_string()),
        FuzzySpecElement::Unindexed("datasets".to_string()),
    ]);
    let steps = expand_fuzzy(&ns, &fuzzy).unwrap();
    assert_eq!(steps.len(), 8);

    let mut seen = std::collections::HashSet::new();
    for step in &steps {
        let ExpansionStep::Resolved(spec) = step else { panic!("all three axes are already bound, nothing should be missing") };
        assert!(seen.insert(spec.clone()), "duplicate concrete spec produced: {spec}");
    }
}

#[test]
fn input_not_found_surfaces_a_fuzzy_alternative() {
    let schema = ConfigSchema::new();
    let engine = Engine::new(schema, vec![], Environment::default());

    let document = map(vec![
        ("restaurant", Value::string("La Patata")),
        ("actions_", actions(vec![Value::string("restaurnt")])),
    ]);
    let err = engine.run(document).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("did you mean"));
    assert!(rendered.contains("restaurant"));
}

#[test]
fn cli_reports_a_missing_input_file_without_panicking() {
    let missing = std::path::Path::new("/nonexistent/definitely/not/here.yaml");
    let err = specgraph::document::load_path(missing).unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
}

#[test]
fn nsdict_element_of_preserves_insertion_order() {
    let schema = ConfigSchema::new().element_of("theories", "theory", |v| Ok(v.clone()));
    let engine = Engine::new(schema, vec![], Environment::default());

    let mut theories = IndexMap::new();
    theories.insert("NLO".to_string(), Value::int(1));
    theories.insert("NNLO".to_string(), Value::int(2));
    let document = map(vec![("theories", Value::Map(theories)), ("actions_", actions(vec![Value::string("theories")]))]);

    let ns = engine.run(document).unwrap();
    match &ns.get("theories").unwrap().1 {
        Value::NsDict { elems, .. } => {
            let keys: Vec<&str> = elems.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["NLO", "NNLO"]);
        }
        other => panic!("expected NsDict, got {other:?}"),
    }
}

#[test]
fn collect_provider_concatenates_a_field_across_every_pdfset() {
    let schema = ConfigSchema::new().element_of("pdfsets", "pdfset", |v| Ok(v.clone()));
    let module = ProviderModule::new("analysis").register(
        ProviderFn::new("joined_names", vec![Param::required("name")], |args| {
            let names = args["name"].as_list().unwrap_or(&[]);
            let joined = names.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(",");
            Ok(Value::string(joined))
        })
        .with_collect("name", FuzzySpec::from(vec![FuzzySpecElement::Unindexed("pdfsets".to_string())]), None),
    );
    let engine = Engine::new(schema, vec![module], Environment::default());

    let document = map(vec![
        (
            "pdfsets",
            Value::List(vec![map(vec![("name", Value::string("NNPDF40"))]), map(vec![("name", Value::string("CT18"))])]),
        ),
        ("actions_", actions(vec![Value::string("joined_names")])),
    ]);

    let ns = engine.run(document).unwrap();
    let joined = ns.get("joined_names").unwrap().1.as_str().unwrap().to_string();
    let mut names: Vec<&str> = joined.split(',').collect();
    names.sort();
    assert_eq!(names, vec!["CT18", "NNPDF40"]);
}

#[test]
fn collect_provider_falls_back_to_element_default_for_missing_fields() {
    let schema = ConfigSchema::new().element_of("pdfsets", "pdfset", |v| Ok(v.clone()));
    let module = ProviderModule::new("analysis").register(
        ProviderFn::new("names", vec![Param::required("name")], |args| Ok(args["name"].clone()))
            .with_collect("name", FuzzySpec::from(vec![FuzzySpecElement::Unindexed("pdfsets".to_string())]), Some(Value::string("unnamed"))),
    );
    let engine = Engine::new(schema, vec![module], Environment::default());

    let document = map(vec![
        ("pdfsets", Value::List(vec![map(vec![("name", Value::string("NNPDF40"))]), map(vec![("flavor", Value::string("singlet"))])])),
        ("actions_", actions(vec![Value::string("names")])),
    ]);

    let ns = engine.run(document).unwrap();
    let mut result: Vec<&str> = ns.get("names").unwrap().1.as_list().unwrap().iter().filter_map(Value::as_str).collect();
    result.sort();
    assert_eq!(result, vec!["NNPDF40", "unnamed"]);
}

#[test]
fn render_substitutes_template_tags_resolved_through_the_dag() {
    let schema = ConfigSchema::new();
    let module = ProviderModule::new("breakfast").register(ProviderFn::new("spam", vec![], |_| Ok(Value::string("spam"))));
    let engine = Engine::new(schema, vec![module], Environment::default());

    let document = map(vec![("actions_", actions(vec![]))]);
    let rendered = engine.render(document, "Menu: {@ spam @}").unwrap();
    assert_eq!(rendered, "Menu: spam");
}
