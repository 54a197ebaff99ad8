use serde_json::{Map, Value};
use std::io;

use super::{format_scalar, per_asset_columns, result_of};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// Backtests are written as a daily path (date, value, return); results with
/// per-asset vectors as one row per asset; matrices row by row; anything
/// else as field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match result_of(value) {
        Value::Object(map) if map.contains_key("dates") && map.contains_key("values") => {
            write_path(&mut wtr, map);
        }
        Value::Object(map) if !per_asset_columns(map).is_empty() => {
            write_per_asset(&mut wtr, map);
        }
        Value::Object(map) if map.contains_key("covariance_matrix") => {
            write_matrix(&mut wtr, &map["covariance_matrix"]);
        }
        Value::Object(map) => {
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in map {
                let _ = wtr.write_record([key.as_str(), &format_scalar(val)]);
            }
        }
        Value::Array(arr) => {
            for item in arr {
                let _ = wtr.write_record([&format_scalar(item)]);
            }
        }
        other => {
            let _ = wtr.write_record([&format_scalar(other)]);
        }
    }

    let _ = wtr.flush();
}

fn write_path(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let empty = Vec::new();
    let dates = map.get("dates").and_then(Value::as_array).unwrap_or(&empty);
    let values = map.get("values").and_then(Value::as_array).unwrap_or(&empty);
    let returns = map.get("returns").and_then(Value::as_array).unwrap_or(&empty);

    let _ = wtr.write_record(["date", "value", "return"]);
    for (i, (date, value)) in dates.iter().zip(values.iter()).enumerate() {
        // Day 0 has no return
        let ret = i
            .checked_sub(1)
            .and_then(|j| returns.get(j))
            .map(format_scalar)
            .unwrap_or_default();
        let _ = wtr.write_record([format_scalar(date), format_scalar(value), ret]);
    }
}

fn write_per_asset(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let cols = per_asset_columns(map);
    let rows = map
        .get(cols[0])
        .and_then(Value::as_array)
        .map_or(0, |a| a.len());

    let mut header = vec!["asset"];
    header.extend(cols.iter().copied());
    let _ = wtr.write_record(&header);
    for i in 0..rows {
        let mut row = vec![i.to_string()];
        for col in &cols {
            row.push(map[*col].get(i).map(format_scalar).unwrap_or_default());
        }
        let _ = wtr.write_record(&row);
    }
}

fn write_matrix(wtr: &mut StdoutWriter<'_>, matrix: &Value) {
    if let Value::Array(rows) = matrix {
        for row in rows {
            if let Value::Array(cells) = row {
                let record: Vec<String> = cells.iter().map(format_scalar).collect();
                let _ = wtr.write_record(&record);
            }
        }
    }
}
