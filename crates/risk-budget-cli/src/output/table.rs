use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_scalar, per_asset_columns, result_of};

/// Format output as tables: scalar fields, then a per-asset table when the
/// result carries weight-aligned vectors, then rebalance events if present.
pub fn print_table(value: &Value) {
    let result = result_of(value);
    match result {
        Value::Object(map) => {
            print_fields(map);
            print_per_asset(map);
            if let Some(Value::Array(events)) = map.get("rebalance_events") {
                print_events(events);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", result),
    }

    if let Some(envelope) = value.as_object() {
        print_envelope_notes(envelope);
    }
}

fn print_fields(map: &Map<String, Value>) {
    let vector_cols = per_asset_columns(map);
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if vector_cols.contains(&key.as_str()) || key == "rebalance_events" {
            continue;
        }
        match val {
            // Nested metric blocks are flattened one level
            Value::Object(inner) if inner.values().all(|v| !v.is_object() && !v.is_array()) => {
                for (inner_key, inner_val) in inner {
                    builder.push_record([format!("{}.{}", key, inner_key), format_value(inner_val)]);
                }
            }
            _ => builder.push_record([key.clone(), format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));
}

fn print_per_asset(map: &Map<String, Value>) {
    let cols = per_asset_columns(map);
    if cols.is_empty() {
        return;
    }
    let labels: Option<Vec<String>> = map.get("tickers").and_then(Value::as_array).map(|t| {
        t.iter().map(format_scalar).collect()
    });
    let rows = map
        .get(cols[0])
        .and_then(Value::as_array)
        .map_or(0, |a| a.len());

    let mut builder = Builder::default();
    let mut header = vec!["Asset".to_string()];
    header.extend(cols.iter().map(|c| c.to_string()));
    builder.push_record(header);
    for i in 0..rows {
        let label = labels
            .as_ref()
            .and_then(|l| l.get(i).cloned())
            .unwrap_or_else(|| i.to_string());
        let mut row = vec![label];
        for col in &cols {
            row.push(map[*col].get(i).map(format_value).unwrap_or_default());
        }
        builder.push_record(row);
    }
    println!("\n{}", Table::from(builder));
}

fn print_events(events: &[Value]) {
    if events.is_empty() {
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Date", "Status", "Volume", "Cost", "Value", "Rolling Vol"]);
    for event in events {
        let field = |k: &str| event.get(k).map(format_value).unwrap_or_default();
        builder.push_record([
            field("date"),
            field("status"),
            field("trading_volume"),
            field("transaction_cost"),
            field("portfolio_value"),
            field("rolling_volatility"),
        ]);
    }
    println!("\nRebalances:\n{}", Table::from(builder));
}

fn print_envelope_notes(envelope: &Map<String, Value>) {
    let warnings: Vec<&str> = envelope
        .get("warnings")
        .and_then(Value::as_array)
        .map(|w| w.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !warnings.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Warning"]);
        for w in warnings {
            builder.push_record([w]);
        }
        println!("\n{}", Table::from(builder));
    }

    if let Some(method) = envelope.get("methodology").and_then(Value::as_str) {
        println!("\nMethodology: {}", method);
    }
}

/// Arrays of objects become one row per element, keyed by the first
/// element's fields; arrays of scalars print one per line.
fn print_array_table(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    };

    let columns: Vec<&String> = first.keys().collect();
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.as_str()));
    for map in arr.iter().filter_map(Value::as_object) {
        builder.push_record(
            columns
                .iter()
                .map(|c| map.get(c.as_str()).map(format_value).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Array(arr) if arr.len() > 12 => format!("[{} values]", arr.len()),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        _ => format_scalar(value),
    }
}
