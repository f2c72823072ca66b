pub mod analysis;
pub mod analytics;
pub mod market;
pub mod optimization;
pub mod sampling;
pub mod simulation;

use serde::Serialize;
use serde_json::Value;

use crate::input;

/// Resolve the common input chain: `--input` file, then piped stdin.
pub(crate) fn read_input_value(
    path: &Option<String>,
    context: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::read_file_value(path)
    } else if let Some(data) = input::read_stdin()? {
        Ok(data)
    } else {
        Err(format!("--input <file> or stdin required for {context}").into())
    }
}

/// Overlay a CLI flag onto the raw input object before deserialisation,
/// so flags win over file/stdin values.
pub(crate) fn set_field<T: Serialize>(
    raw: &mut Value,
    key: &str,
    flag: &Option<T>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(v) = flag {
        let obj = raw
            .as_object_mut()
            .ok_or("input must be a JSON object to combine with flags")?;
        obj.insert(key.to_string(), serde_json::to_value(v)?);
    }
    Ok(())
}
