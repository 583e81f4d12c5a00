//! Loading an input document from disk into the engine's [`Value`]
//! universe (§6 "Input document").

use std::path::Path;

use crate::error::{EngineError, Result};
use crate::value::Value;

/// Read `path` and parse it as YAML or JSON (by extension, falling
/// back to YAML-then-JSON for anything else) into a [`Value`].
pub fn load_path(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io { path: path.display().to_string(), source })?;
    load_str(&text, path.extension().and_then(|e| e.to_str()))
}

pub fn load_str(text: &str, extension_hint: Option<&str>) -> Result<Value> {
    match extension_hint {
        Some("json") => {
            let parsed: serde_json::Value = serde_json::from_str(text)?;
            Ok(Value::from(&parsed))
        }
        Some("yaml") | Some("yml") | None => {
            let parsed: serde_yaml::Value = serde_yaml::from_str(text)?;
            Ok(Value::from(&parsed))
        }
        Some(_) => {
            if let Ok(parsed) = serde_yaml::from_str::<serde_yaml::Value>(text) {
                Ok(Value::from(&parsed))
            } else {
                let parsed: serde_json::Value = serde_json::from_str(text)?;
                Ok(Value::from(&parsed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_round_trips_nested_structure() {
        let text = "restaurant: La Patata\nactions_:\n  - spam\n  - english_breakfast:\n      time: \"10AM\"\n";
        let value = load_str(text, Some("yaml")).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("restaurant").unwrap().as_str(), Some("La Patata"));
        let actions = map.get("actions_").unwrap().as_list().unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn json_loads_equivalently() {
        let text = r#"{"restaurant": "La Patata", "actions_": ["spam"]}"#;
        let value = load_str(text, Some("json")).unwrap();
        assert_eq!(value.as_map().unwrap().get("restaurant").unwrap().as_str(), Some("La Patata"));
    }
}
