//! Configuration resolver: maps input-document keys to registered
//! parse/produce handlers, type-checks values, and resolves
//! dependencies recursively (§4.3).

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{EngineError, RequiredBy, Result};
use crate::namespace::{FuzzySpec, FuzzySpecElement, Namespace, Spec, SpecElement};
use crate::value::Value;

pub type ParseFn = dyn Fn(&Value) -> Result<Value> + Send + Sync;
pub type ProduceFn = dyn Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync;

pub enum HandlerKind {
    Parse(Arc<ParseFn>),
    Produce(Arc<ProduceFn>),
}

pub struct Handler {
    pub key: String,
    pub deps: Vec<&'static str>,
    pub kind: HandlerKind,
}

/// Builder collecting `parse_X` / `produce_X` / `element_of(X)`
/// handlers the way the teacher's registration APIs collect named
/// callbacks, standing in for the reflective registration of the
/// source system (§9).
#[derive(Default)]
pub struct ConfigSchema {
    handlers: HashMap<String, Handler>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(
        mut self,
        key: &str,
        deps: &[&'static str],
        f: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(
            key.to_string(),
            Handler { key: key.to_string(), deps: deps.to_vec(), kind: HandlerKind::Parse(Arc::new(f)) },
        );
        self
    }

    pub fn produce(
        mut self,
        key: &str,
        deps: &[&'static str],
        f: impl Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(
            key.to_string(),
            Handler { key: key.to_string(), deps: deps.to_vec(), kind: HandlerKind::Produce(Arc::new(f)) },
        );
        self
    }

    /// Registers an auto-generated parse handler for `collection_key`
    /// that wraps every element of the input list (or named mapping)
    /// through `parse_elem`, tagging the result as an NS-List/NS-Dict
    /// carrying `element_key` so it becomes namespace-expandable.
    pub fn element_of(
        mut self,
        collection_key: &str,
        element_key: &str,
        parse_elem: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let element_key = element_key.to_string();
        let collection_key_owned = collection_key.to_string();
        let parse_elem = Arc::new(parse_elem);
        let synthetic = move |v: &Value| -> Result<Value> {
            match v {
                Value::List(items) => {
                    let mut elems = Vec::with_capacity(items.len());
                    for item in items {
                        elems.push(parse_elem(item)?);
                    }
                    Ok(Value::NsList { key: element_key.clone(), elems })
                }
                Value::Map(m) => {
                    let mut elems = IndexMap::with_capacity(m.len());
                    for (k, v) in m {
                        elems.insert(k.clone(), parse_elem(v)?);
                    }
                    Ok(Value::NsDict { key: element_key.clone(), elems })
                }
                other => Err(EngineError::BadInputType {
                    param: collection_key_owned.clone(),
                    value: other.to_string(),
                    expected: "list or mapping",
                }),
            }
        };
        self.handlers.insert(
            collection_key.to_string(),
            Handler { key: collection_key.to_string(), deps: vec![], kind: HandlerKind::Parse(Arc::new(synthetic)) },
        );
        self
    }

    pub fn handler(&self, key: &str) -> Option<&Handler> {
        self.handlers.get(key)
    }
}

/// A resolved configuration: a schema paired with the document it
/// resolves keys against.
pub struct Config<'a> {
    schema: &'a ConfigSchema,
    document: Value,
}

impl<'a> Config<'a> {
    pub fn new(schema: &'a ConfigSchema, document: Value) -> Self {
        Self { schema, document }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn document_keys(&self) -> Vec<String> {
        self.document.as_map().map(|m| m.keys().cloned().collect()).unwrap_or_default()
    }

    /// Resolve `key`'s value, writing it to the namespace at the
    /// minimal layer that contains every one of its dependencies
    /// (capped at `max_index`). See §4.3 steps 1-5.
    pub fn resolve_key(
        &self,
        key: &str,
        ns: &mut Namespace,
        max_index: usize,
        required_by: &RequiredBy,
    ) -> Result<(usize, Value)> {
        if let Some((idx, v)) = ns.get_bounded(key, max_index) {
            return Ok((idx, v.clone()));
        }

        if let Some(handler) = self.schema.handler(key) {
            if matches!(handler.kind, HandlerKind::Produce(_)) {
                return self.apply_handler(handler, key, Value::Null, ns, max_index, required_by);
            }
        }

        let raw = self
            .document
            .as_map()
            .and_then(|m| m.get(key))
            .ok_or_else(|| EngineError::input_not_found(key, required_by.clone(), &self.document_keys()))?
            .clone();

        if let Some(target) = raw.as_from_ref() {
            return self.resolve_from_ref(key, target, ns, max_index, required_by);
        }

        match self.schema.handler(key) {
            Some(handler) => self.apply_handler(handler, key, raw, ns, max_index, required_by),
            None if raw.is_namespace_expandable() => {
                ns.write_at(key, raw.clone(), max_index);
                Ok((max_index, raw))
            }
            None => {
                ns.write_at(key, raw.clone(), max_index);
                Ok((max_index, raw))
            }
        }
    }

    fn apply_handler(
        &self,
        handler: &Handler,
        key: &str,
        raw: Value,
        ns: &mut Namespace,
        max_index: usize,
        required_by: &RequiredBy,
    ) -> Result<(usize, Value)> {
        let mut write_index = max_index;
        let mut kwargs = HashMap::new();
        for dep in &handler.deps {
            let mut rb = required_by.clone();
            rb.0.push(key.to_string());
            let (idx, val) = self.resolve_key(dep, ns, max_index, &rb)?;
            write_index = write_index.min(idx);
            kwargs.insert((*dep).to_string(), val);
        }
        let value = match &handler.kind {
            HandlerKind::Parse(f) => f(&raw)?,
            HandlerKind::Produce(f) => f(&kwargs)?,
        };
        ns.write_at(key, value.clone(), write_index);
        Ok((write_index, value))
    }

    /// `{from_: target}` indirection: resolve `target` as a spec, then
    /// pull `key` out of its exposed view (§9 from_ semantics). A plain
    /// name is resolved through the same document/handler path as any
    /// other key (so `from_` can shadow onto a value not yet pulled
    /// into the namespace); a `a::b` path addresses a location already
    /// materialized by the resource builder and is read straight off
    /// the namespace.
    fn resolve_from_ref(
        &self,
        key: &str,
        target: &Value,
        ns: &mut Namespace,
        max_index: usize,
        required_by: &RequiredBy,
    ) -> Result<(usize, Value)> {
        let target_name = target.as_str().ok_or_else(|| EngineError::ConfigError(format!("from_ target for '{key}' must be a string")))?;
        let resolved = if target_name.contains("::") {
            let target_spec: Spec = target_name.split("::").map(|s| SpecElement::Name(s.to_string())).collect::<Vec<_>>().into();
            ns.resolve(&target_spec)?.1
        } else {
            let mut rb = required_by.clone();
            rb.0.push(key.to_string());
            self.resolve_key(target_name, ns, max_index, &rb)?.1
        };
        let inner = resolved.as_map().ok_or_else(|| EngineError::ConfigError(format!("from_ target '{target_name}' does not expose a mapping")))?;
        let raw = inner
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::input_not_found(key, required_by.clone(), &inner.keys().cloned().collect::<Vec<_>>()))?;
        match self.schema.handler(key) {
            Some(handler) => self.apply_handler(handler, key, raw, ns, max_index, required_by),
            None => {
                ns.write_at(key, raw.clone(), max_index);
                Ok((max_index, raw))
            }
        }
    }
}

/// One entry from the `actions_` tree: a provider name, the fuzzy
/// namespace prefix it runs under, and any literal extra arguments.
#[derive(Debug, Clone)]
pub struct FuzzyTarget {
    pub name: String,
    pub prefix: FuzzySpec,
    pub extra_args: Vec<(String, Value)>,
}

/// Flatten the `actions_` tree into a list of [`FuzzyTarget`]s (§4.3).
pub fn parse_actions(actions: &Value) -> Result<Vec<FuzzyTarget>> {
    let mut out = Vec::new();
    parse_actions_list(actions, &FuzzySpec::default(), &mut out)?;
    Ok(out)
}

fn parse_actions_list(node: &Value, prefix: &FuzzySpec, out: &mut Vec<FuzzyTarget>) -> Result<()> {
    let items = node.as_list().ok_or_else(|| EngineError::ConfigError("actions_ must be a list".to_string()))?;
    for item in items {
        parse_action_item(item, prefix, out)?;
    }
    Ok(())
}

fn parse_action_item(item: &Value, prefix: &FuzzySpec, out: &mut Vec<FuzzyTarget>) -> Result<()> {
    match item {
        Value::String(name) => {
            out.push(FuzzyTarget { name: name.clone(), prefix: prefix.clone(), extra_args: Vec::new() });
            Ok(())
        }
        Value::Map(m) if m.len() == 1 => {
            let (name, inner) = m.iter().next().expect("len == 1");
            match inner {
                Value::List(_) => {
                    let mut next = prefix.clone();
                    next.push(FuzzySpecElement::Unindexed(name.clone()));
                    parse_actions_list(inner, &next, out)
                }
                Value::Map(kwargs) => {
                    let extra_args = kwargs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    out.push(FuzzyTarget { name: name.clone(), prefix: prefix.clone(), extra_args });
                    Ok(())
                }
                _ => Err(EngineError::ConfigError(format!("invalid actions_ entry for '{name}'"))),
            }
        }
        _ => Err(EngineError::ConfigError("invalid actions_ entry".to_string())),
    }
}
