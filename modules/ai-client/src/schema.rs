use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::traits::JsonMode;

/// Types the model can be asked to return as strict structured output.
///
/// Strict mode only accepts closed, self-contained schemas: every object has
/// `additionalProperties: false`, lists every property as required (nullable
/// ones included), and nothing is left behind a `$ref`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> Value {
        let mut root = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        let definitions = match &mut root {
            Value::Object(map) => {
                map.remove("$schema");
                map.remove("definitions")
            }
            _ => None,
        }
        .unwrap_or(Value::Null);

        tighten(&mut root, &definitions);
        root
    }

    /// `JsonMode::Schema` carrying this type's strict schema.
    fn json_mode() -> JsonMode {
        JsonMode::Schema {
            name: <Self as JsonSchema>::schema_name(),
            schema: Self::strict_schema(),
        }
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn tighten(node: &mut Value, definitions: &Value) {
    match node {
        Value::Object(map) => {
            if let Some(target) = resolve(map, definitions) {
                *node = target;
                tighten(node, definitions);
                return;
            }
            if map.get("type").and_then(Value::as_str) == Some("object") {
                close_object(map);
            }
            for child in map.values_mut() {
                tighten(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                tighten(item, definitions);
            }
        }
        _ => {}
    }
}

/// The schema a `$ref` or a single-element `allOf` wrapper stands for.
fn resolve(map: &Map<String, Value>, definitions: &Value) -> Option<Value> {
    if let Some(path) = map.get("$ref").and_then(Value::as_str) {
        let name = path.strip_prefix("#/definitions/")?;
        return definitions.get(name).cloned();
    }
    match map.get("allOf") {
        Some(Value::Array(parts)) if parts.len() == 1 => parts.first().cloned(),
        _ => None,
    }
}

fn close_object(map: &mut Map<String, Value>) {
    map.insert("additionalProperties".to_string(), Value::Bool(false));
    let required: Option<Vec<Value>> = map
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().map(Value::String).collect());
    if let Some(required) = required {
        map.insert("required".to_string(), Value::Array(required));
    }
}
