//! The hierarchical namespace: a stack of mapping layers with
//! innermost-first lookup, plus the `Spec`/`FuzzySpec` path types used
//! to address a value anywhere in the hierarchy.

mod spec;

pub use spec::{FuzzySpec, FuzzySpecElement, Spec, SpecElement};

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{EngineError, Result};
use crate::value::Value;

pub type Layer = IndexMap<String, Value>;

/// A stack of mapping layers. Layer `0` is the root; each subsequent
/// layer is pushed when the resolver or builder descends into a
/// nested scope (a config's inner mapping, a selected NS-List/NS-Dict
/// element). Lookups scan from the innermost (highest-index) layer
/// outward so nested bindings shadow outer ones.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    layers: Vec<Layer>,
    /// Engine-scoped memo of already-resolved spec prefixes to the
    /// layer index they produced, so that two identical specs share
    /// layer identity instead of pushing duplicate layers (§4.2).
    /// Deliberately a field on this `Namespace`, not a process-wide
    /// global — see the "Global mutable state" design note.
    spec_cache: HashMap<Spec, usize>,
}

impl Namespace {
    pub fn new(root: Layer) -> Self {
        Self { layers: vec![root], spec_cache: HashMap::new() }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn max_index(&self) -> usize {
        self.layers.len() - 1
    }

    /// Push a new innermost layer, returning its index.
    pub fn push(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn pop(&mut self) -> Option<Layer> {
        if self.layers.len() > 1 {
            self.layers.pop()
        } else {
            None
        }
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Innermost-first lookup, searching up to (and including) `max_index`.
    pub fn get_bounded(&self, name: &str, max_index: usize) -> Option<(usize, &Value)> {
        let top = max_index.min(self.layers.len().saturating_sub(1));
        for idx in (0..=top).rev() {
            if let Some(v) = self.layers[idx].get(name) {
                return Some((idx, v));
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<(usize, &Value)> {
        self.get_bounded(name, self.max_index())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The root layer's entries, in insertion order: the top-level
    /// results of a run, for callers that just want what was produced.
    pub fn root_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.layers[0].iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write `value` under `name` at layer `index`, creating the layer
    /// if the stack is not yet that deep (pushes empty layers up to it).
    pub fn write_at(&mut self, name: &str, value: Value, index: usize) {
        while self.layers.len() <= index {
            self.layers.push(Layer::new());
        }
        self.layers[index].insert(name.to_string(), value);
    }

    /// All keys visible at or below `max_index`, innermost first, for
    /// building "did you mean" candidate lists.
    pub fn visible_keys(&self, max_index: usize) -> Vec<String> {
        let top = max_index.min(self.layers.len().saturating_sub(1));
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for idx in (0..=top).rev() {
            for k in self.layers[idx].keys() {
                if seen.insert(k.clone()) {
                    out.push(k.clone());
                }
            }
        }
        out
    }

    /// Resolve a concrete `Spec` to a value, descending through nested
    /// NS-List/NS-Dict containers and pushing a cached layer per
    /// `(name, index)` element (§4.2). Returns the resolved value and
    /// the layer index at which it was ultimately found or materialized.
    pub fn resolve(&mut self, spec: &Spec) -> Result<(usize, Value)> {
        let mut elements = spec.elements().iter();
        let first = elements.next().ok_or_else(|| EngineError::NamespaceError {
            spec: spec.clone(),
            message: "empty spec".to_string(),
        })?;

        let mut prefix = Spec::default();
        let (mut layer_idx, mut current) = self.resolve_element(&prefix, first)?;
        prefix.push(first.clone());

        for elem in elements {
            if let Some(&cached) = self.spec_cache.get(&prefix) {
                layer_idx = cached;
                current = self
                    .layer(cached)
                    .and_then(|l| l.get(elem.name()))
                    .cloned()
                    .unwrap_or(current);
            } else {
                let (idx, value) = self.descend(layer_idx, &current, elem)?;
                layer_idx = idx;
                current = value;
                self.spec_cache.insert(prefix.clone(), layer_idx);
            }
            prefix.push(elem.clone());
        }
        Ok((layer_idx, current))
    }

    fn resolve_element(&self, prefix: &Spec, elem: &SpecElement) -> Result<(usize, Value)> {
        match elem {
            SpecElement::Name(name) => self
                .get(name)
                .map(|(idx, v)| (idx, v.clone()))
                .ok_or_else(|| EngineError::NamespaceError {
                    spec: prefix.clone(),
                    message: format!("'{name}' not found in namespace"),
                }),
            SpecElement::Indexed(name, index) => {
                let (idx, container) = self.get(name).ok_or_else(|| EngineError::NamespaceError {
                    spec: prefix.clone(),
                    message: format!("'{name}' not found in namespace"),
                })?;
                let item = select_index(container, *index).ok_or_else(|| EngineError::NamespaceError {
                    spec: prefix.clone(),
                    message: format!("'{name}' has no element at index {index}"),
                })?;
                Ok((idx, item))
            }
        }
    }

    fn descend(&mut self, _layer_idx: usize, current: &Value, elem: &SpecElement) -> Result<(usize, Value)> {
        let name = elem.name();
        let container = match current {
            Value::Map(m) => m.get(name).cloned(),
            other => Some(other.clone()),
        };
        let container = container.ok_or_else(|| EngineError::NamespaceError {
            spec: Spec::default(),
            message: format!("'{name}' not found while descending namespace"),
        })?;

        let item = match elem {
            SpecElement::Name(_) => container,
            SpecElement::Indexed(_, index) => select_index(&container, *index).ok_or_else(|| EngineError::NamespaceError {
                spec: Spec::default(),
                message: format!("'{name}' has no element at index {index}"),
            })?,
        };

        let mut layer = Layer::new();
        layer.insert(name.to_string(), item.clone());
        let idx = self.push(layer);
        Ok((idx, item))
    }
}

fn select_index(container: &Value, index: usize) -> Option<Value> {
    match container {
        Value::NsList { elems, .. } => elems.get(index).cloned(),
        Value::NsDict { elems, .. } => elems.get_index(index).map(|(_, v)| v.clone()),
        Value::List(items) => items.get(index).cloned(),
        _ => None,
    }
}

/// The outcome of one step of fuzzy-spec expansion: either a fully
/// concrete spec, or a missing name that the caller (the resource
/// builder) must materialize before expansion can resume.
#[derive(Debug, Clone)]
pub enum ExpansionStep {
    Resolved(Spec),
    Missing { name: String, partial: Spec },
}

/// Expand a `FuzzySpec` into every concrete `Spec` it denotes, forking
/// once per index whenever the current name resolves to a namespace
/// -expandable list/dict. Stops and reports the first missing name
/// encountered along any branch (§4.2).
pub fn expand_fuzzy(ns: &Namespace, fuzzy: &FuzzySpec) -> Result<Vec<ExpansionStep>> {
    let mut out = Vec::new();
    expand_rec(ns, fuzzy.elements(), Spec::default(), &mut out)?;
    Ok(out)
}

fn expand_rec(ns: &Namespace, remaining: &[FuzzySpecElement], built: Spec, out: &mut Vec<ExpansionStep>) -> Result<()> {
    let Some((head, tail)) = remaining.split_first() else {
        out.push(ExpansionStep::Resolved(built));
        return Ok(());
    };

    match head {
        FuzzySpecElement::Name(name) => {
            if !ns.contains(name) && built.elements().is_empty() {
                out.push(ExpansionStep::Missing { name: name.clone(), partial: built });
                return Ok(());
            }
            let mut next = built;
            next.push(SpecElement::Name(name.clone()));
            expand_rec(ns, tail, next, out)
        }
        FuzzySpecElement::Indexed(name, index) => {
            let mut next = built;
            next.push(SpecElement::Indexed(name.clone(), *index));
            expand_rec(ns, tail, next, out)
        }
        FuzzySpecElement::Unindexed(name) => {
            let len = match ns.get(name) {
                Some((_, Value::NsList { elems, .. })) => elems.len(),
                Some((_, Value::NsDict { elems, .. })) => elems.len(),
                Some((_, Value::List(items))) => items.len(),
                Some(_) => {
                    return Err(EngineError::NamespaceError {
                        spec: built,
                        message: format!("'{name}' is not a namespace-expandable list"),
                    })
                }
                None => {
                    out.push(ExpansionStep::Missing { name: name.clone(), partial: built });
                    return Ok(());
                }
            };
            for i in 0..len {
                let mut next = built.clone();
                next.push(SpecElement::Indexed(name.clone(), i));
                expand_rec(ns, tail, next, out)?;
            }
            Ok(())
        }
    }
}
