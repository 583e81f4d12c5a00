//! # specgraph
//!
//! A declarative report/computation engine: a hierarchical namespace
//! with lazy fuzzy-spec expansion, a configuration resolver that
//! recursively parses input values, and a resource builder/executor
//! that compiles requested actions into a DAG of provider calls and
//! runs it sequentially or in parallel.
//!
//! ## Example
//!
//! ```rust
//! use specgraph::{ConfigSchema, Engine, Environment, ProviderFn, ProviderModule, Value};
//!
//! let schema = ConfigSchema::new();
//! let providers = ProviderModule::new("example")
//!     .register(ProviderFn::new("spam", vec![], |_| Ok(Value::string("spam"))));
//!
//! let engine = Engine::new(schema, vec![providers], Environment::default());
//! let document = Value::Map(
//!     [("actions_".to_string(), Value::List(vec![Value::string("spam")]))]
//!         .into_iter()
//!         .collect(),
//! );
//! let ns = engine.run(document).unwrap();
//! assert_eq!(ns.get("spam").unwrap().1.as_str(), Some("spam"));
//! ```

pub mod builder;
pub mod config;
pub mod dag;
pub mod document;
pub mod environment;
pub mod error;
pub mod executor;
pub mod namespace;
pub mod provider;
pub mod template;
pub mod value;

pub use builder::{CallSpec, CallSpecId, RequirementOutcome, ResourceBuilder, WriteMode};
pub use config::{Config, ConfigSchema, FuzzyTarget};
pub use dag::{Dag, DependencyResolver, NodeId};
pub use environment::{Environment, Verbosity};
pub use error::{EngineError, Result};
pub use namespace::{ExpansionStep, FuzzySpec, FuzzySpecElement, Namespace, Spec, SpecElement};
pub use provider::{CollectSpec, Param, ProviderFn, ProviderModule};
pub use template::TemplateTag;
pub use value::{Number, Value};

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

/// The execution context threaded through the public API in place of
/// any module-level singleton (§9 "Global mutable state"): owns the
/// configuration schema and the provider modules for one run.
pub struct Engine {
    pub environment: Environment,
    schema: ConfigSchema,
    modules: Vec<ProviderModule>,
}

impl Engine {
    pub fn new(schema: ConfigSchema, modules: Vec<ProviderModule>, environment: Environment) -> Self {
        Self { environment, schema, modules }
    }

    /// Resolve every action in `document`'s `actions_` tree and run
    /// the resulting DAG, returning the namespace the run populated.
    pub fn run(&self, document: Value) -> Result<Namespace> {
        let actions = document.as_map().and_then(|m| m.get("actions_")).cloned().unwrap_or(Value::List(Vec::new()));
        let targets = config::parse_actions(&actions)?;
        self.run_targets(document, targets)
    }

    /// Scan `template` for `{@ ... @}` tags (§2 component 6), register
    /// each one as an additional target alongside `document`'s own
    /// `actions_`, run the resulting DAG, then substitute the rendered
    /// values back into the template text.
    pub fn render(&self, document: Value, template: &str) -> Result<String> {
        let tags = template::scan(template)?;

        let actions = document.as_map().and_then(|m| m.get("actions_")).cloned().unwrap_or(Value::List(Vec::new()));
        let mut targets = config::parse_actions(&actions)?;
        targets.extend(tags.iter().map(|t| t.target.clone()));

        let ns = self.run_targets(document, targets)?;

        let mut results = std::collections::HashMap::with_capacity(tags.len());
        for tag in &tags {
            if let Some((_, value)) = ns.get(&tag.target.name) {
                results.insert(tag.target.name.clone(), value.clone());
            }
        }
        template::render(template, &tags, &results)
    }

    fn run_targets(&self, document: Value, targets: Vec<FuzzyTarget>) -> Result<Namespace> {
        let config = Config::new(&self.schema, document);
        // The namespace starts empty: every key, including plain
        // document values, is pulled in on demand by the configuration
        // resolver so that parse_X/produce_X/element_of handlers run
        // (§4.3). Pre-seeding it from the document would let resolution
        // short-circuit the resolver entirely.
        let mut ns = Namespace::new(namespace::Layer::new());

        let builder = ResourceBuilder::new(config, &self.modules);
        let dag = builder.build(&mut ns, &targets)?;

        info!(nodes = dag.len(), targets = targets.len(), "graph built");

        if self.environment.parallel {
            let handle = tokio::runtime::Handle::try_current();
            let ns_arc = Arc::new(Mutex::new(ns));
            let env_arc = Arc::new(self.environment.clone());
            match handle {
                Ok(handle) => {
                    handle.block_on(executor::run_parallel(&dag, ns_arc.clone(), env_arc))?;
                }
                Err(_) => {
                    let rt = tokio::runtime::Runtime::new().map_err(|e| EngineError::Io { path: "<tokio runtime>".to_string(), source: e })?;
                    rt.block_on(executor::run_parallel(&dag, ns_arc.clone(), env_arc))?;
                }
            }
            let ns = Arc::try_unwrap(ns_arc).map_err(|_| EngineError::ConfigError("namespace still shared after run".to_string()))?.into_inner();
            Ok(ns)
        } else {
            executor::run_sequential(&dag, &mut ns, &self.environment)?;
            Ok(ns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakfast_modules() -> Vec<ProviderModule> {
        let module = ProviderModule::new("breakfast")
            .register(ProviderFn::new("spam", vec![], |_| Ok(Value::string("spam"))))
            .register(ProviderFn::new("ham", vec![], |_| Ok(Value::string("ham"))))
            .register(ProviderFn::new("eggs", vec![Param::required("spam")], |_| Ok(Value::string("eggs"))))
            .register(ProviderFn::new(
                "english_breakfast",
                vec![
                    Param::required("restaurant"),
                    Param::required("spam"),
                    Param::required("ham"),
                    Param::required("eggs"),
                    Param::with_default("time", Value::string("8AM")),
                ],
                |args| {
                    Ok(Value::string(format!(
                        "At {}. Preparing breakfast with: {},{},{} at {}.",
                        args["restaurant"].as_str().unwrap_or_default(),
                        args["spam"].as_str().unwrap_or_default(),
                        args["ham"].as_str().unwrap_or_default(),
                        args["eggs"].as_str().unwrap_or_default(),
                        args["time"].as_str().unwrap_or_default(),
                    )))
                },
            ));
        vec![module]
    }

    #[test]
    fn breakfast_scenario_resolves_targets() {
        let schema = ConfigSchema::new();
        let engine = Engine::new(schema, breakfast_modules(), Environment::default());

        let mut root = indexmap::IndexMap::new();
        root.insert("restaurant".to_string(), Value::string("La Patata"));
        root.insert(
            "actions_".to_string(),
            Value::List(vec![
                Value::Map(
                    [("english_breakfast".to_string(), Value::Map([("time".to_string(), Value::string("10AM"))].into_iter().collect()))]
                        .into_iter()
                        .collect(),
                ),
                Value::string("spam"),
                Value::string("restaurant"),
            ]),
        );

        let ns = engine.run(Value::Map(root)).unwrap();
        assert_eq!(
            ns.get("english_breakfast").unwrap().1.as_str(),
            Some("At La Patata. Preparing breakfast with: spam,ham,eggs at 10AM.")
        );
        assert_eq!(ns.get("spam").unwrap().1.as_str(), Some("spam"));
    }

    #[test]
    fn require_one_check_rejects_empty_input() {
        let schema = ConfigSchema::new();
        let module = ProviderModule::new("fruit").register(
            ProviderFn::new(
                "fruit",
                vec![Param::with_default("apple", Value::Null), Param::with_default("orange", Value::Null)],
                |args| Ok(Value::List(vec![args.get("apple").cloned().unwrap_or(Value::Null), args.get("orange").cloned().unwrap_or(Value::Null)])),
            )
            .with_check(|args| {
                let apple_set = args.get("apple").map(|v| !v.is_null()).unwrap_or(false);
                let orange_set = args.get("orange").map(|v| !v.is_null()).unwrap_or(false);
                if apple_set || orange_set {
                    Ok(())
                } else {
                    Err(error::EngineError::CheckError { name: "fruit".to_string(), message: "at least one of apple, orange must be set".to_string() })
                }
            }),
        );
        let engine = Engine::new(schema, vec![module], Environment::default());

        let mut root = indexmap::IndexMap::new();
        root.insert("actions_".to_string(), Value::List(vec![Value::string("fruit")]));
        let err = engine.run(Value::Map(root)).unwrap_err();
        assert!(matches!(err, EngineError::ResourceError { .. }));
    }

    #[test]
    fn render_runs_scanned_tags_and_substitutes_results() {
        let schema = ConfigSchema::new();
        let engine = Engine::new(schema, breakfast_modules(), Environment::default());

        let mut root = indexmap::IndexMap::new();
        root.insert("restaurant".to_string(), Value::string("La Patata"));
        root.insert("actions_".to_string(), Value::List(Vec::new()));

        let rendered = engine.render(Value::Map(root), "Order: {@ spam @} and {@ ham @}.").unwrap();
        assert_eq!(rendered, "Order: spam and ham.");
    }
}
