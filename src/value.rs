//! The recursive input-document universe, plus the engine-internal
//! variants that make it namespace-expandable (§9 design note).

use indexmap::IndexMap;
use std::fmt;

use crate::namespace::Spec;

/// A value in the input document, or a value flowing through the
/// namespace once the engine has resolved and stored it.
///
/// `NsList` / `NsDict` and `FromRef` never appear in a freshly loaded
/// document; they are produced by `element_of` handlers (§4.3) and by
/// the `{from_: TARGET}` indirection form respectively.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// A list of scalars carrying a single element-key name; expands
    /// into one single-key map per element (§3 NS-List).
    NsList { key: String, elems: Vec<Value> },
    /// A named mapping of scalars carrying a single element-key name;
    /// expands the same way, preserving insertion order (§3 NS-Dict).
    NsDict { key: String, elems: IndexMap<String, Value> },
    /// `{from_: target}` indirection (§6).
    FromRef(Spec),
}

/// A JSON/YAML number, distinguishing integers from floats the way
/// the wire formats do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(_) => write!(f, "<map>"),
            Value::NsList { .. } => write!(f, "<ns-list>"),
            Value::NsDict { .. } => write!(f, "<ns-dict>"),
            Value::FromRef(spec) => write!(f, "<from_ {spec:?}>"),
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(Number::Int(i)) => Some(*i as f64),
            Value::Number(Number::Float(x)) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(Number::Int(i)) => Some(*i),
            Value::Number(Number::Float(x)) if x.fract() == 0.0 => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is itself namespace-expandable: a map, a
    /// list of maps, or one of the NS-List/NS-Dict wrappers.
    pub fn is_namespace_expandable(&self) -> bool {
        match self {
            Value::Map(_) | Value::NsList { .. } | Value::NsDict { .. } => true,
            Value::List(items) => items.iter().all(|v| matches!(v, Value::Map(_))),
            _ => false,
        }
    }

    /// If this is the single-key form `{from_: spec}`, extract the
    /// target spec (§6, §9 from_ semantics).
    pub fn as_from_ref(&self) -> Option<&Value> {
        match self {
            Value::Map(m) if m.len() == 1 => m.get("from_"),
            _ => None,
        }
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn int(i: i64) -> Value {
        Value::Number(Number::Int(i))
    }

    pub fn float(x: f64) -> Value {
        Value::Number(Number::Float(x))
    }
}

impl From<&serde_yaml::Value> for Value {
    fn from(v: &serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(Number::Int(i))
                } else {
                    Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_yaml::Value::String(s) => Value::String(s.clone()),
            serde_yaml::Value::Sequence(seq) => Value::List(seq.iter().map(Value::from).collect()),
            serde_yaml::Value::Mapping(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    let key = match k {
                        serde_yaml::Value::String(s) => s.clone(),
                        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
                    };
                    out.insert(key, Value::from(v));
                }
                Value::Map(out)
            }
            serde_yaml::Value::Tagged(tagged) => Value::from(&tagged.value),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(Number::Int(i))
                } else {
                    Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), Value::from(v));
                }
                Value::Map(out)
            }
        }
    }
}
