use serde_json::Value;
use std::io;

/// Write output as CSV to stdout. Arrays of records become one row
/// per record; everything else falls back to field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(rows)) = map.get("results") {
                write_rows(&mut writer, rows);
            } else if let Some(Value::Object(result)) = map.get("result") {
                let _ = writer.write_record(["field", "value"]);
                for (key, val) in result {
                    let _ = writer.write_record([key.as_str(), &scalar(val)]);
                }
            } else {
                let _ = writer.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = writer.write_record([key.as_str(), &scalar(val)]);
                }
            }
        }
        Value::Array(rows) => write_rows(&mut writer, rows),
        _ => {
            let _ = writer.write_record([&scalar(value)]);
        }
    }

    let _ = writer.flush();
}

fn write_rows(writer: &mut csv::Writer<io::StdoutLock<'_>>, rows: &[Value]) {
    if rows.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = rows.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = writer.write_record(&headers);

        for row in rows {
            if let Value::Object(map) = row {
                let record: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(scalar).unwrap_or_default())
                    .collect();
                let _ = writer.write_record(&record);
            }
        }
    } else {
        for row in rows {
            let _ = writer.write_record([&scalar(row)]);
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
