use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Heuristic: tagged solver results and terminal statistics carry the
/// payload one level down, so descend there first, then look for
/// well-known fields in order of priority, then fall back to the first
/// field of whatever object is left.
pub fn print_minimal(value: &Value) {
    // Unwrap the computation envelope if present
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let target = result_obj
        .get("status")
        .filter(|v| v.is_object())
        .or_else(|| {
            result_obj
                .get("optimization")
                .and_then(|o| o.get("status"))
                .filter(|v| v.is_object())
        })
        .or_else(|| result_obj.get("terminal").filter(|v| v.is_object()))
        .unwrap_or(result_obj);

    // Priority list of key output fields
    let priority_keys = [
        "sharpe_ratio",
        "risk",
        "expected_return",
        "weights",
        "mean",
        "num_optimal",
        "max_sharpe_index",
    ];

    if let Value::Object(map) = target {
        // Try priority keys first (skip null values)
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Not an object, just print directly
    println!("{}", format_minimal(target));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
