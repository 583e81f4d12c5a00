//! Crate-wide error type.
//!
//! Every fallible operation in `specgraph` returns [`Result<T>`]. The
//! variants mirror the error kinds of the design: resolution failures
//! carry the "required by" chain so that a user sees why a value was
//! needed, not just that it was missing.

use std::fmt;

use crate::namespace::Spec;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A chain of names, innermost first, describing why a resource was
/// required. Rendered as `required by: a -> b -> c`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredBy(pub Vec<String>);

impl fmt::Display for RequiredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "target specification")
        } else {
            write!(f, "{}", self.0.join(" -> "))
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("bad input type for parameter '{param}': value {value} is not of the expected type ({expected})")]
    BadInputType {
        param: String,
        value: String,
        expected: &'static str,
    },

    #[error("could not resolve '{name}', required by: {required_by}{}", alternatives_suffix(.alternatives))]
    InputNotFound {
        name: String,
        required_by: RequiredBy,
        alternatives: Vec<String>,
    },

    #[error("malformed configuration: {0}")]
    ConfigError(String),

    #[error("could not process the resource '{name}', required by: {required_by}\n{message}")]
    ResourceError {
        name: String,
        message: String,
        required_by: RequiredBy,
    },

    #[error("resource '{name}' is already present in the input, but extra arguments were supplied for it (required by: {required_by})")]
    ResourceNotUnderstood {
        name: String,
        required_by: RequiredBy,
    },

    #[error("adding '{value}' would introduce a cycle: {}", path.join(" -> "))]
    CycleError { value: String, path: Vec<String> },

    #[error("check failed for '{name}': {message}")]
    CheckError { name: String, message: String },

    #[error("template error: {0}")]
    TemplateError(String),

    #[error("duplicate node value in DAG: {0}")]
    Duplicate(String),

    #[error("node not found in DAG: {0}")]
    NodeNotFound(String),

    #[error("namespace resolution failed for spec {spec:?}: {message}")]
    NamespaceError { spec: Spec, message: String },

    #[error("failed to read input document at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse input document as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse input document as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("execution was cancelled")]
    Cancelled,

    #[error("task join error: {0}")]
    Join(String),
}

fn alternatives_suffix(alternatives: &[String]) -> String {
    if alternatives.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", alternatives.join(", "))
    }
}

impl EngineError {
    pub fn input_not_found(name: impl Into<String>, required_by: RequiredBy, candidates: &[String]) -> Self {
        let name = name.into();
        let alternatives = fuzzy_alternatives(&name, candidates);
        EngineError::InputNotFound {
            name,
            required_by,
            alternatives,
        }
    }
}

/// Rank `candidates` by Jaro-Winkler similarity to `name`, keeping the
/// three closest matches above a usefulness threshold.
pub fn fuzzy_alternatives(name: &str, candidates: &[String]) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .filter(|c| c.as_str() != name)
        .map(|c| (strsim::jaro_winkler(name, c), c))
        .filter(|(score, _)| *score > 0.6)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(3).map(|(_, c)| c.clone()).collect()
}
