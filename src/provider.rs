//! Provider ABI: the Rust rendering of "any callable with
//! introspectable named parameters" (§4.4, §6).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dag::Dag;
use crate::environment::Environment;
use crate::error::Result;
use crate::namespace::{FuzzySpec, Namespace, Spec};
use crate::value::Value;

pub type ProviderFnPtr = dyn Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync;
pub type CheckFnPtr = dyn Fn(&HashMap<String, Value>) -> Result<()> + Send + Sync;
pub type PrepareFnPtr = dyn Fn(&Spec, &Namespace, &Environment) -> HashMap<String, Value> + Send + Sync;
pub type FinalActionFnPtr = dyn Fn(Value, &HashMap<String, Value>) -> Value + Send + Sync;

/// A declared provider parameter, with an optional default used when
/// no input, provider, or config handler supplies the argument.
#[derive(Clone)]
pub struct Param {
    pub name: &'static str,
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: &'static str) -> Self {
        Self { name, default: None }
    }

    pub fn with_default(name: &'static str, default: Value) -> Self {
        Self { name, default: Some(default) }
    }
}

/// `collect(name, fuzzyspec, element_default)`: a provider parameter
/// satisfied by gathering `name` across every spec a fuzzyspec
/// expands to, rather than from a single call (§4.4 "Collect providers").
#[derive(Clone)]
pub struct CollectSpec {
    pub element_key: &'static str,
    pub fuzzyspec: FuzzySpec,
    pub element_default: Option<Value>,
}

pub struct ProviderFn {
    pub name: &'static str,
    pub params: Vec<Param>,
    pub func: Arc<ProviderFnPtr>,
    pub checks: Vec<Arc<CheckFnPtr>>,
    pub prepare: Option<Arc<PrepareFnPtr>>,
    pub final_action: Option<Arc<FinalActionFnPtr>>,
    pub highlight: Option<&'static str>,
    pub collect: Option<CollectSpec>,
}

impl fmt::Debug for ProviderFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFn").field("name", &self.name).finish_non_exhaustive()
    }
}

impl ProviderFn {
    pub fn new(name: &'static str, params: Vec<Param>, func: impl Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self { name, params, func: Arc::new(func), checks: Vec::new(), prepare: None, final_action: None, highlight: None, collect: None }
    }

    pub fn with_check(mut self, check: impl Fn(&HashMap<String, Value>) -> Result<()> + Send + Sync + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn with_prepare(mut self, prepare: impl Fn(&Spec, &Namespace, &Environment) -> HashMap<String, Value> + Send + Sync + 'static) -> Self {
        self.prepare = Some(Arc::new(prepare));
        self
    }

    pub fn with_final_action(mut self, final_action: impl Fn(Value, &HashMap<String, Value>) -> Value + Send + Sync + 'static) -> Self {
        self.final_action = Some(Arc::new(final_action));
        self
    }

    pub fn with_highlight(mut self, label: &'static str) -> Self {
        self.highlight = Some(label);
        self
    }

    pub fn with_collect(mut self, element_key: &'static str, fuzzyspec: FuzzySpec, element_default: Option<Value>) -> Self {
        self.collect = Some(CollectSpec { element_key, fuzzyspec, element_default });
        self
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn run_checks(&self, args: &HashMap<String, Value>) -> Result<()> {
        for check in &self.checks {
            check(args)?;
        }
        Ok(())
    }
}

/// A named collection of [`ProviderFn`]s — the Rust stand-in for a
/// Python provider module that the engine would otherwise introspect.
#[derive(Default)]
pub struct ProviderModule {
    pub name: String,
    fns: HashMap<&'static str, Arc<ProviderFn>>,
}

impl ProviderModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fns: HashMap::new() }
    }

    pub fn register(mut self, f: ProviderFn) -> Self {
        self.fns.insert(f.name, Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderFn>> {
        self.fns.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fns.keys().copied()
    }
}

/// The context a provider's `prepare`/check callbacks may read from:
/// the graph built so far, alongside the namespace and environment.
pub type CallGraph = Dag<crate::builder::CallSpec>;
