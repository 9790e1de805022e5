//! JSON output for the CLI
//!
//! One JSON object per command on stdout:
//! `{"status":"ok","data":...}` or `{"status":"error","code":...,"message":...}`.

use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};

use super::errors::CliResult;

pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&json!({
        "status": "ok",
        "data": data
    }))
}

pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// JSON rendering of a stored value: always base64, plus the text when the
/// bytes are valid UTF-8.
pub fn value_json(value: &[u8]) -> Value {
    let mut out = Map::new();
    out.insert("length".into(), json!(value.len()));
    out.insert("base64".into(), json!(STANDARD.encode(value)));
    if let Ok(text) = std::str::from_utf8(value) {
        out.insert("text".into(), json!(text));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_json_text() {
        let v = value_json(b"hi");
        assert_eq!(v["length"], 2);
        assert_eq!(v["base64"], "aGk=");
        assert_eq!(v["text"], "hi");
    }

    #[test]
    fn test_value_json_binary() {
        let v = value_json(&[0xff, 0x00]);
        assert_eq!(v["base64"], "/wA=");
        assert!(v.get("text").is_none());
    }
}
