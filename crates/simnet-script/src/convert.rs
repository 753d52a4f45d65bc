//! Value conversions between Lua and JSON.

use mlua::{Lua, Result as LuaResult, Value};

/// Converts a Lua value to JSON.
///
/// Tables with a positive raw length become arrays; everything else
/// becomes an object keyed by string. Functions, userdata and threads
/// are not representable.
pub fn lua_to_json(value: &Value) -> Result<serde_json::Value, mlua::Error> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Integer(i) => Ok(serde_json::Value::Number((*i).into())),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| mlua::Error::RuntimeError("number not representable".into())),
        Value::String(s) => Ok(serde_json::Value::String(s.to_str()?.to_string())),
        Value::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut arr = Vec::with_capacity(len);
                for i in 1..=len {
                    let v: Value = table.raw_get(i)?;
                    arr.push(lua_to_json(&v)?);
                }
                Ok(serde_json::Value::Array(arr))
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.clone().pairs::<String, Value>() {
                    let (k, v) = pair?;
                    map.insert(k, lua_to_json(&v)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
        _ => Err(mlua::Error::RuntimeError(format!(
            "value of type {} is not representable",
            value.type_name()
        ))),
    }
}

/// Converts a JSON value to a Lua value in `lua`.
pub fn json_to_lua(json: &serde_json::Value, lua: &Lua) -> LuaResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else {
                Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(lua.create_string(s)?)),
        serde_json::Value::Array(arr) => {
            let table = lua.create_table_with_capacity(arr.len(), 0)?;
            for (i, v) in arr.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(v, lua)?)?;
            }
            Ok(Value::Table(table))
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (k, v) in map {
                table.raw_set(k.as_str(), json_to_lua(v, lua)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_roundtrip() {
        let lua = Lua::new();
        for json in [
            serde_json::json!(null),
            serde_json::json!(true),
            serde_json::json!(42),
            serde_json::json!(1.5),
            serde_json::json!("hello"),
        ] {
            let value = json_to_lua(&json, &lua).expect("to lua");
            let back = lua_to_json(&value).expect("to json");
            assert_eq!(back, json);
        }
    }

    #[test]
    fn arrays_become_sequences() {
        let lua = Lua::new();
        let json = serde_json::json!([1, "two", [3]]);
        let value = json_to_lua(&json, &lua).expect("to lua");
        let Value::Table(ref table) = value else {
            panic!("expected table");
        };
        assert_eq!(table.raw_len(), 3);
        assert_eq!(lua_to_json(&value).expect("to json"), json);
    }

    #[test]
    fn objects_roundtrip() {
        let lua = Lua::new();
        let json = serde_json::json!({"a": 1, "b": {"c": [true]}});
        let value = json_to_lua(&json, &lua).expect("to lua");
        assert_eq!(lua_to_json(&value).expect("to json"), json);
    }

    #[test]
    fn functions_are_rejected() {
        let lua = Lua::new();
        let f: Value = lua.load("return function() end").eval().expect("eval");
        assert!(lua_to_json(&f).is_err());
    }
}
