//! Resource builder: walks provider signatures against the
//! configuration and namespace to populate a [`Dag`] of [`CallSpec`]s
//! (§4.4).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, FuzzyTarget};
use crate::dag::Dag;
use crate::error::{EngineError, RequiredBy, Result};
use crate::namespace::{self, ExpansionStep, FuzzySpec, Layer, Namespace, Spec};
use crate::provider::{CollectSpec, ProviderFn, ProviderModule};
use crate::value::Value;

pub type CallSpecId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    SetUnique,
    SetOrUpdate,
    Append,
}

/// One node of the execution graph: a single provider invocation with
/// its resolved namespace location and write mode.
#[derive(Clone)]
pub struct CallSpec {
    pub id: CallSpecId,
    pub name: String,
    /// The spec identifying the namespace layer this call reads its
    /// arguments from and writes its result into.
    pub nsspec: Spec,
    pub write_index: usize,
    /// Upper-bound layer this call's arguments may be read from (§4.5:
    /// "resolve its nsspec to a namespace stack"). Always the layer
    /// this call was built under, so a sibling call node's defaults
    /// layer — pushed later, at a higher index — is never visible here.
    pub read_index: usize,
    pub result_name: String,
    pub write_mode: WriteMode,
    pub provider: Arc<ProviderFn>,
    pub arg_names: Vec<&'static str>,
}

impl fmt::Debug for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("write_index", &self.write_index)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

impl PartialEq for CallSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallSpec {}

impl std::hash::Hash for CallSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Outcome of processing one requirement (§4.4, replacing the
/// source's two-yield coroutine with a two-pass algorithm).
#[derive(Debug, Clone)]
pub enum RequirementOutcome {
    /// Already resolvable via the namespace or configuration resolver.
    Found(usize),
    /// Satisfied by the provider's own declared default.
    UsesDefault,
    /// A new call node was created to produce this value.
    NodeCreated(usize, CallSpecId),
}

pub struct ResourceBuilder<'a> {
    config: Config<'a>,
    modules: &'a [ProviderModule],
    dag: Dag<CallSpec>,
    next_id: CallSpecId,
    by_id: HashMap<CallSpecId, CallSpec>,
    /// Dedupes provider invocations requested more than once under the
    /// same namespace scope, mirroring `add_or_update_node`'s role in
    /// the source: the same (provider, scope) pair is always the same
    /// call node, never rebuilt.
    created: HashMap<(String, usize), CallSpecId>,
}

impl<'a> ResourceBuilder<'a> {
    pub fn new(config: Config<'a>, modules: &'a [ProviderModule]) -> Self {
        Self { config, modules, dag: Dag::new(), next_id: 0, by_id: HashMap::new(), created: HashMap::new() }
    }

    fn find_provider(&self, name: &str) -> Option<Arc<ProviderFn>> {
        self.modules.iter().find_map(|m| m.get(name))
    }

    /// Build the DAG for every target in `targets`, expanding each
    /// target's fuzzy prefix against `ns` first.
    pub fn build(mut self, ns: &mut Namespace, targets: &[FuzzyTarget]) -> Result<Dag<CallSpec>> {
        for target in targets {
            self.process_fuzzy_target(ns, target, 0)?;
        }
        Ok(self.dag)
    }

    fn process_fuzzy_target(&mut self, ns: &mut Namespace, target: &FuzzyTarget, retries: u8) -> Result<()> {
        let steps = namespace::expand_fuzzy(ns, &target.prefix)?;
        for step in steps {
            match step {
                ExpansionStep::Resolved(prefix) => {
                    self.process_target(ns, target, &prefix)?;
                }
                ExpansionStep::Missing { name, .. } => {
                    if retries > 8 {
                        return Err(EngineError::ConfigError(format!(
                            "could not materialize '{name}' while expanding target '{}'",
                            target.name
                        )));
                    }
                    let rb = RequiredBy(vec![target.name.clone()]);
                    self.process_requirement(ns, &name, ns.max_index(), &rb)?;
                    return self.process_fuzzy_target(ns, target, retries + 1);
                }
            }
        }
        Ok(())
    }

    fn process_target(&mut self, ns: &mut Namespace, target: &FuzzyTarget, prefix: &Spec) -> Result<()> {
        let max_index = if prefix.is_empty() { ns.max_index() } else { ns.resolve(prefix)?.0 };
        let required_by = RequiredBy(vec![]);

        let has_plain_value = self.config.document().as_map().map(|m| m.contains_key(&target.name)).unwrap_or(false);
        if !target.extra_args.is_empty() && has_plain_value && self.find_provider(&target.name).is_none() {
            return Err(EngineError::ResourceNotUnderstood { name: target.name.clone(), required_by });
        }

        let mut effective_max = max_index;
        if !target.extra_args.is_empty() {
            let mut layer = Layer::new();
            for (k, v) in &target.extra_args {
                layer.insert(k.clone(), v.clone());
            }
            effective_max = ns.push(layer);
        }

        self.process_requirement(ns, &target.name, effective_max, &required_by)?;
        Ok(())
    }

    /// The heart of §4.4: resolve `name` via the configuration
    /// resolver, else via a provider (recursing into its parameters),
    /// else via a declared default, else fail.
    fn process_requirement(&mut self, ns: &mut Namespace, name: &str, max_index: usize, required_by: &RequiredBy) -> Result<RequirementOutcome> {
        // Keep the resolver's own not-found error: its alternatives are
        // ranked against the document's keys, which is more useful to a
        // user than the namespace (largely unpopulated at build time).
        let not_found = match self.config.resolve_key(name, ns, max_index, required_by) {
            Ok((idx, _)) => return Ok(RequirementOutcome::Found(idx)),
            Err(err @ EngineError::InputNotFound { .. }) => err,
            Err(other) => return Err(other),
        };

        if let Some(&id) = self.created.get(&(name.to_string(), max_index)) {
            let write_index = self.by_id[&id].write_index;
            return Ok(RequirementOutcome::NodeCreated(write_index, id));
        }

        if let Some(provider) = self.find_provider(name) {
            return self.create_call_node(ns, provider, max_index, required_by);
        }

        Err(not_found)
    }

    fn create_call_node(&mut self, ns: &mut Namespace, provider: Arc<ProviderFn>, max_index: usize, required_by: &RequiredBy) -> Result<RequirementOutcome> {
        let mut write_index = max_index;
        let mut arg_names = Vec::with_capacity(provider.params.len());
        let mut children = Vec::new();

        let mut defaulted = Vec::new();
        for param in &provider.params {
            let mut rb = required_by.clone();
            rb.0.push(provider.name.to_string());

            let is_collect_param = provider.collect.as_ref().is_some_and(|c| c.element_key == param.name);
            let outcome = if is_collect_param {
                let collect = provider.collect.as_ref().expect("checked above");
                self.process_collect(ns, &provider, collect, max_index, &rb)?
            } else {
                match self.process_requirement(ns, param.name, max_index, &rb) {
                    Ok(outcome) => outcome,
                    Err(EngineError::InputNotFound { .. }) if param.default.is_some() => RequirementOutcome::UsesDefault,
                    Err(other) => return Err(other),
                }
            };
            match outcome {
                RequirementOutcome::Found(idx) => write_index = write_index.min(idx),
                RequirementOutcome::UsesDefault => defaulted.push(param),
                RequirementOutcome::NodeCreated(idx, child_id) => {
                    write_index = write_index.min(idx);
                    children.push(self.by_id[&child_id].clone());
                }
            }
            arg_names.push(param.name);
        }

        // Only params that actually fell back get a binding here; a
        // param already found elsewhere keeps the layer it was found
        // at rather than being shadowed by its own declared default.
        let mut defaults_layer = Layer::new();
        for param in defaulted {
            defaults_layer.insert(param.name.to_string(), param.default.clone().expect("pushed only when default.is_some()"));
        }
        let layer_idx = ns.push(defaults_layer);
        let nsspec = Spec::from(vec![crate::namespace::SpecElement::Name(provider.name.to_string())]);

        let id = self.next_id;
        self.next_id += 1;
        let call = CallSpec {
            id,
            name: provider.name.to_string(),
            nsspec,
            write_index: write_index.min(layer_idx),
            read_index: layer_idx,
            result_name: provider.name.to_string(),
            write_mode: WriteMode::SetUnique,
            provider: provider.clone(),
            arg_names,
        };

        self.dag.add(call.clone(), &[], &[])?;
        for child in &children {
            self.dag.add_or_update(call.clone(), &[child.clone()], &[])?;
        }
        self.by_id.insert(id, call.clone());
        self.created.insert((provider.name.to_string(), max_index), id);

        // Checks only see values already resolvable from the namespace
        // at this point (document values, defaults); a dependency that
        // is itself still a pending call node has no value to check yet.
        let mut check_args: HashMap<String, Value> = HashMap::new();
        for param in &provider.params {
            if let Some((_, v)) = ns.get_bounded(param.name, layer_idx) {
                check_args.insert(param.name.to_string(), v.clone());
            }
        }
        provider.run_checks(&check_args).map_err(|e| match e {
            EngineError::CheckError { name, message } => EngineError::ResourceError {
                name,
                message,
                required_by: required_by.clone(),
            },
            other => other,
        })?;

        debug!(provider = provider.name, write_index, "created call node");
        Ok(RequirementOutcome::NodeCreated(write_index, id))
    }

    /// §4.4 "Collect providers": expand `collect.fuzzyspec` into a list
    /// of concrete specs, materializing any name the expansion is
    /// still missing along the way (mirrors [`Self::process_fuzzy_target`]'s
    /// retry loop); emit one small fetch `CallSpec` per spec that reads
    /// `collect.element_key` from that spec's scope and appends it to a
    /// shared accumulator, plus one aggregating `CallSpec` depending on
    /// every fetch that exposes the finished list under the parameter's
    /// own name.
    fn process_collect(&mut self, ns: &mut Namespace, provider: &Arc<ProviderFn>, collect: &CollectSpec, max_index: usize, required_by: &RequiredBy) -> Result<RequirementOutcome> {
        let dedupe_key = (format!("{}::collect::{}", provider.name, collect.element_key), max_index);
        if let Some(&id) = self.created.get(&dedupe_key) {
            let write_index = self.by_id[&id].write_index;
            return Ok(RequirementOutcome::NodeCreated(write_index, id));
        }

        let mut rb = required_by.clone();
        rb.0.push(format!("{}[collect {}]", provider.name, collect.element_key));
        let specs = self.resolve_fuzzy_specs(ns, &collect.fuzzyspec, &rb, 0)?;

        let collect_layer = ns.push(Layer::new());
        // Leaked once per collect call node: there is no interner in
        // scope and `CallSpec::arg_names`/`result_name` need a stable
        // key shared by every fetch plus the aggregate that reads it.
        let accum_key: &'static str = Box::leak(format!("{}::collect::{}::items", provider.name, collect.element_key).into_boxed_str());
        ns.write_at(accum_key, Value::List(Vec::new()), collect_layer);

        let mut fetch_calls = Vec::with_capacity(specs.len());
        for spec in &specs {
            // `element_key` names a sibling field on this spec's own
            // resolved element (a dataset's `xsec`, a pdfset's `name`),
            // not a document-wide key, so it is pulled via
            // `Namespace::resolve`'s nested-map descent rather than the
            // configuration resolver's flat document lookup.
            let mut elem_spec = spec.clone();
            elem_spec.push(crate::namespace::SpecElement::Name(collect.element_key.to_string()));
            let resolved = match ns.resolve(&elem_spec) {
                Ok((idx, value)) => (idx, value),
                Err(_) if collect.element_default.is_some() => {
                    let idx = ns.push(Layer::new());
                    (idx, collect.element_default.clone().expect("checked above"))
                }
                Err(other) => return Err(other),
            };
            let (fetch_layer, value) = resolved;

            // Re-bound under a dedicated key at build time: `gather_args`
            // can only do a plain bounded namespace lookup at execute
            // time, not re-run `Namespace::resolve` against `elem_spec`.
            let fetch_key: &'static str = Box::leak(format!("{}::collect_fetch::{spec}", provider.name).into_boxed_str());
            ns.write_at(fetch_key, value, fetch_layer);

            let fetch_provider = ProviderFn::new(fetch_key, vec![crate::provider::Param::required(fetch_key)], move |args| Ok(args.get(fetch_key).cloned().unwrap_or(Value::Null)));

            let fetch_id = self.next_id;
            self.next_id += 1;
            let fetch = CallSpec {
                id: fetch_id,
                name: format!("{}::collect_fetch[{spec}]", provider.name),
                nsspec: spec.clone(),
                write_index: collect_layer,
                read_index: fetch_layer.max(collect_layer),
                result_name: accum_key.to_string(),
                write_mode: WriteMode::Append,
                provider: Arc::new(fetch_provider),
                arg_names: vec![fetch_key],
            };
            self.dag.add(fetch.clone(), &[], &[])?;
            self.by_id.insert(fetch_id, fetch.clone());
            fetch_calls.push(fetch);
        }

        let agg_provider = ProviderFn::new(collect.element_key, vec![crate::provider::Param::required(accum_key)], move |args| {
            Ok(args.get(accum_key).cloned().unwrap_or(Value::List(Vec::new())))
        });
        let agg_id = self.next_id;
        self.next_id += 1;
        let write_index = max_index.min(collect_layer);
        let aggregate = CallSpec {
            id: agg_id,
            name: format!("{}::collect_aggregate", provider.name),
            nsspec: Spec::default(),
            write_index,
            read_index: collect_layer,
            result_name: collect.element_key.to_string(),
            write_mode: WriteMode::SetUnique,
            provider: Arc::new(agg_provider),
            arg_names: vec![accum_key],
        };
        self.dag.add(aggregate.clone(), &fetch_calls, &[])?;
        self.by_id.insert(agg_id, aggregate.clone());
        self.created.insert(dedupe_key, agg_id);

        debug!(provider = provider.name, collect = collect.element_key, elements = fetch_calls.len(), "created collect aggregate node");
        Ok(RequirementOutcome::NodeCreated(write_index, agg_id))
    }

    /// Expand `fuzzy` into every concrete spec it denotes, materializing
    /// any name the expansion reports missing and retrying — the same
    /// retry shape as [`Self::process_fuzzy_target`], but returning the
    /// resolved specs instead of immediately processing a target at each.
    fn resolve_fuzzy_specs(&mut self, ns: &mut Namespace, fuzzy: &FuzzySpec, required_by: &RequiredBy, retries: u8) -> Result<Vec<Spec>> {
        let steps = namespace::expand_fuzzy(ns, fuzzy)?;
        let mut out = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                ExpansionStep::Resolved(spec) => out.push(spec),
                ExpansionStep::Missing { name, .. } => {
                    if retries > 8 {
                        return Err(EngineError::ConfigError(format!("could not materialize '{name}' while expanding a collect fuzzyspec")));
                    }
                    self.process_requirement(ns, &name, ns.max_index(), required_by)?;
                    return self.resolve_fuzzy_specs(ns, fuzzy, required_by, retries + 1);
                }
            }
        }
        Ok(out)
    }
}
