pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("JSON serialization error: {}", e),
    }
}

/// The `result` object of an envelope, or the value itself for bare outputs.
pub(crate) fn result_of(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

/// Keys of `map` whose values are numeric arrays of the same length as
/// `weights` (or the first numeric array found), for per-asset layouts.
pub(crate) fn per_asset_columns(map: &serde_json::Map<String, Value>) -> Vec<&str> {
    let anchor = ["weights", "risk_pct", "risk_contribution_shares"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_array).map(|a| a.len()));
    let Some(len) = anchor else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| {
            v.as_array()
                .map_or(false, |a| a.len() == len && a.iter().all(Value::is_number))
        })
        .map(|(k, _)| k.as_str())
        .collect()
}

pub(crate) fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
