use serde_json::{Map, Value};
use std::io;

/// Write output as CSV to stdout.
///
/// Results whose payload is row-shaped (frontier points, sampled
/// portfolios, simulated paths) become one CSV row per element;
/// everything else falls back to two-column field,value form.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result_obj {
        Value::Object(map) => {
            if let Some(rows) = tabular_section(map) {
                write_array_csv(&mut wtr, rows);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        }
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        _ => {
            let _ = wtr.write_record([&format_csv_value(result_obj)]);
        }
    }

    let _ = wtr.flush();
}

/// The row-shaped payload of a result, when it has one.
fn tabular_section(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    for key in ["points", "portfolios", "paths"] {
        if let Some(Value::Array(arr)) = map.get(key) {
            if !arr.is_empty() {
                return Some(arr);
            }
        }
    }
    None
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    match arr.first() {
        // Array of objects: headers from the first element
        Some(Value::Object(first)) => {
            let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
            let _ = wtr.write_record(&headers);

            for item in arr {
                if let Value::Object(map) = item {
                    let row: Vec<String> = headers
                        .iter()
                        .map(|h| {
                            map.get(*h)
                                .map(|v| format_csv_value(v))
                                .unwrap_or_default()
                        })
                        .collect();
                    let _ = wtr.write_record(&row);
                }
            }
        }
        // Matrix: one CSV row per inner array (simulated paths)
        Some(Value::Array(_)) => {
            for item in arr {
                if let Value::Array(row) = item {
                    let record: Vec<String> = row.iter().map(format_csv_value).collect();
                    let _ = wtr.write_record(&record);
                }
            }
        }
        _ => {
            for item in arr {
                let _ = wtr.write_record([&format_csv_value(item)]);
            }
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
