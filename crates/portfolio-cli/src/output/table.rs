use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
///
/// Frontier and sampling results carry their payload as an array of
/// objects; those are rendered as row tables below the scalar summary
/// instead of being squashed into one cell. Path matrices are reported
/// by shape only.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_object_tables(value);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    print_object_tables(result);

    // Print warnings if any
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    // Print methodology
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Scalars (and one level of nested objects) as Field/Value rows,
/// each array-of-objects field as its own table underneath.
fn print_object_tables(value: &Value) {
    let Value::Object(map) = value else {
        println!("{}", value);
        return;
    };

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut row_sections: Vec<(&str, &Vec<Value>)> = Vec::new();

    for (key, val) in map {
        match val {
            Value::Array(arr) if is_object_array(arr) => row_sections.push((key, arr)),
            Value::Array(arr) if is_matrix(arr) => {
                builder.push_record([key.as_str(), &matrix_shape(arr)]);
            }
            Value::Object(inner) => {
                for (inner_key, inner_val) in inner {
                    builder.push_record([
                        format!("{}.{}", key, inner_key).as_str(),
                        &format_value(inner_val),
                    ]);
                }
            }
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for (key, arr) in row_sections {
        println!("\n{}:", key);
        print_array_table(arr);
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    // Collect all keys from first object for headers
    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        map.get(h.as_str())
                            .map(|v| format_value(v))
                            .unwrap_or_default()
                    })
                    .collect();
                builder.push_record(row);
            }
        }

        let table = Table::from(builder);
        println!("{}", table);
    } else {
        // Simple array of values
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn is_object_array(arr: &[Value]) -> bool {
    !arr.is_empty() && arr.iter().all(|v| v.is_object())
}

fn is_matrix(arr: &[Value]) -> bool {
    !arr.is_empty() && arr.iter().all(|v| v.is_array())
}

fn matrix_shape(arr: &[Value]) -> String {
    let cols = arr
        .first()
        .and_then(|v| v.as_array())
        .map(|r| r.len())
        .unwrap_or(0);
    format!("{} x {} matrix", arr.len(), cols)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(|v| format_value(v)).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
