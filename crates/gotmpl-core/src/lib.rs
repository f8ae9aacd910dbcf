#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Glue between `gotmpl_engine::Value` and `serde_json::Value`, plus a
//! convenience default function registry, so callers who already have JSON
//! data on hand don't need to hand-build an engine `Value` tree themselves.
//!
//! `gotmpl-engine` itself stays serde-free — its `Value` distinguishes
//! integer widths, characters, and callables that JSON has no room for — so
//! this crate is the only place that conversion lives.

pub use gotmpl_engine::{
    builtins, Arity, Error, FunctionRegistry, FunctionRegistryBuilder, Number, Template, Value,
};
pub use gotmpl_engine::builtins::default_functions;

use serde_json::Value as JsonValue;

/// Converts a `serde_json::Value` into the engine's own `Value`, recursively.
///
/// Numbers land as the narrowest signed/unsigned/float variant `serde_json`
/// itself reports (`as_i64`/`as_u64`/`as_f64`, in that preference order);
/// objects become an ordered map in `serde_json`'s own iteration order (JSON
/// key order if the `preserve_order` feature is enabled on `serde_json`, the
/// crate's BTreeMap order otherwise).
pub fn to_engine_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Absent,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Num(json_number(n)),
        JsonValue::String(s) => Value::str(s.clone()),
        JsonValue::Array(items) => Value::seq(items.iter().map(to_engine_value).collect()),
        JsonValue::Object(map) => Value::map(
            map.iter()
                .map(|(k, v)| (Value::str(k.clone()), to_engine_value(v)))
                .collect(),
        ),
    }
}

fn json_number(n: &serde_json::Number) -> Number {
    if let Some(i) = n.as_i64() {
        Number::I64(i)
    } else if let Some(u) = n.as_u64() {
        Number::U64(u)
    } else {
        Number::F64(n.as_f64().unwrap_or(0.0))
    }
}

/// Converts an engine `Value` back into a `serde_json::Value`, for callers
/// that want to inspect or re-serialize a rendered result's bound variables.
/// Records flatten to a JSON object of their fields (methods have no JSON
/// representation and are dropped); callables are not representable and
/// convert to `Null`.
pub fn from_engine_value(value: &Value) -> JsonValue {
    match value {
        Value::Absent => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Num(n) => json_value_from_number(*n),
        Value::Char(c) => JsonValue::String(c.to_rust_char().to_string()),
        Value::Str(s) => JsonValue::String(s.to_string()),
        Value::Seq(items) => JsonValue::Array(items.iter().map(from_engine_value).collect()),
        Value::Map(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs.iter() {
                map.insert(k.stringify(), from_engine_value(v));
            }
            JsonValue::Object(map)
        }
        Value::Record(record) => {
            let mut map = serde_json::Map::new();
            for (name, v) in record.fields() {
                map.insert(name.clone(), from_engine_value(v));
            }
            JsonValue::Object(map)
        }
        Value::Callable(_) => JsonValue::Null,
    }
}

fn json_value_from_number(n: Number) -> JsonValue {
    if let Some(i) = n.as_i128() {
        if let Ok(i) = i64::try_from(i) {
            return JsonValue::Number(i.into());
        }
        if let Ok(u) = u64::try_from(i) {
            return JsonValue::Number(u.into());
        }
    }
    serde_json::Number::from_f64(n.as_f64())
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Parses `source` with the default builtin function set and renders it
/// directly against JSON data, for callers who don't need the parsed
/// `Template` kept around.
pub fn render_json(name: &str, source: &str, data: &JsonValue) -> Result<String, Error> {
    let template = Template::parse_str(name, source)?;
    template.render(to_engine_value(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_round_trips_through_field_access() {
        let data = json!({"name": "Gopher", "age": 5});
        let rendered = render_json("greet", "{{.name}} is {{.age}}", &data).unwrap();
        assert_eq!(rendered, "Gopher is 5");
    }

    #[test]
    fn json_array_supports_range() {
        let data = json!({"items": ["a", "b", "c"]});
        let rendered = render_json("range", "{{range .items}}{{.}}{{end}}", &data).unwrap();
        assert_eq!(rendered, "abc");
    }

    #[test]
    fn default_functions_include_eq_and_len() {
        let registry = default_functions();
        assert!(registry.get("eq").is_some());
        assert!(registry.get("len").is_some());
    }

    #[test]
    fn null_converts_to_absent_and_back_to_null() {
        assert!(to_engine_value(&JsonValue::Null).is_absent());
        assert_eq!(from_engine_value(&Value::Absent), JsonValue::Null);
    }

    #[test]
    fn numbers_round_trip_through_the_engine_value() {
        let engine = to_engine_value(&json!(42));
        assert_eq!(from_engine_value(&engine), json!(42));
        let float = to_engine_value(&json!(2.5));
        assert_eq!(from_engine_value(&float), json!(2.5));
    }

    #[test]
    fn nested_object_converts_recursively() {
        let data = json!({"user": {"name": "Ada"}});
        let rendered = render_json("nested", "{{.user.name}}", &data).unwrap();
        assert_eq!(rendered, "Ada");
    }
}
