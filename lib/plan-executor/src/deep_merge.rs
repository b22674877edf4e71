use serde_json::Value;

/// Deeply merges `source` into `target` in place. Objects merge key-wise,
/// lists merge positionally, anything else is overwritten.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => deep_merge(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (Value::Array(target_items), Value::Array(source_items)) => {
            for (target_value, source_value) in target_items.iter_mut().zip(source_items) {
                deep_merge(target_value, source_value);
            }
        }
        (target, source) => *target = source,
    }
}

/// Walks `data` along a concrete response path of keys and list indices.
pub fn value_at_path_mut<'a>(data: &'a mut Value, path: &[Value]) -> Option<&'a mut Value> {
    let mut cursor = data;
    for segment in path {
        cursor = match segment {
            Value::String(key) => cursor.as_object_mut()?.get_mut(key)?,
            Value::Number(index) => cursor.as_array_mut()?.get_mut(index.as_u64()? as usize)?,
            _ => return None,
        };
    }
    Some(cursor)
}
