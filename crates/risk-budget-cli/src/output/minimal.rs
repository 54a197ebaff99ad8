use serde_json::Value;

use super::{format_scalar, result_of};

/// JSON pointers to the headline number of each command, in priority order.
const HEADLINE_POINTERS: [&str; 9] = [
    "/metrics/total_return",
    "/expected_shortfall",
    "/weights",
    "/stressed/weights",
    "/max_drawdown",
    "/loss",
    "/portfolio_volatility",
    "/covariance_matrix",
    "/returns",
];

/// Print just the key answer of the output, falling back to the first field.
pub fn print_minimal(value: &Value) {
    let result_obj = result_of(value);

    for pointer in HEADLINE_POINTERS {
        if let Some(val) = result_obj.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Array(items) if items.iter().all(Value::is_number) => items
            .iter()
            .map(format_scalar)
            .collect::<Vec<_>>()
            .join(","),
        _ => format_scalar(value),
    }
}
