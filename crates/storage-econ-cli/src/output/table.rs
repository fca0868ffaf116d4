use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Render output as text tables.
///
/// The analysis envelope gets its assessment summary flattened into a
/// field/value table followed by warnings and methodology; statement
/// output ("results" array) becomes one row per year.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result);
                print_footer(map);
            } else if let Some(Value::Array(rows)) = map.get("results") {
                if let Some(Value::Object(financing)) = map.get("financing") {
                    print_fields(financing);
                    println!();
                }
                print_rows(rows);
            } else {
                print_fields(map);
            }
        }
        Value::Array(rows) => print_rows(rows),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Value) {
    let Some(map) = result.as_object() else {
        println!("{}", result);
        return;
    };

    if let Some(Value::Object(summary)) = map.get("assessment_summary") {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        push_flattened(&mut builder, "", summary);
        println!("{}", Table::from(builder));
    } else {
        print_fields(map);
    }
}

/// Nested objects flatten to dotted field names; arrays render inline.
fn push_flattened(builder: &mut Builder, prefix: &str, map: &Map<String, Value>) {
    for (key, val) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match val {
            Value::Object(inner) => push_flattened(builder, &name, inner),
            other => builder.push_record([name.as_str(), &display(other)]),
        }
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &display(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(rows: &[Value]) {
    if rows.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = rows.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for row in rows {
            if let Value::Object(map) = row {
                let record: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(display).unwrap_or_default())
                    .collect();
                builder.push_record(record);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for row in rows {
            println!("{}", display(row));
        }
    }
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for warning in warnings {
                if let Value::String(text) = warning {
                    println!("  - {}", text);
                }
            }
        }
    }
    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
