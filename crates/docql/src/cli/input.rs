//! Reading expressions, documents and settings named on the command line

use anyhow::{Context, Result, bail};
use docql_expr::EngineConfig;
use docql_value::Value;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Inline text, `@path` for a file's contents, or `-` for stdin
pub fn read_text(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}")),
        None => Ok(arg.to_string()),
    }
}

/// A JSON document given inline, as `@path` or on stdin
pub fn read_document(arg: &str) -> Result<Value> {
    let text = read_text(arg)?;
    let json: serde_json::Value =
        serde_json::from_str(&text).context("Document is not valid JSON")?;
    Ok(Value::from(json))
}

/// Engine settings from a JSON file, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = EngineConfig::from_json(&text)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    log::debug!("loaded {config:?} from {}", path.display());
    Ok(config)
}

/// `name=value` for a named parameter; a leading `$` on the name is ignored
pub fn parse_named_arg(arg: &str) -> Result<(String, Value)> {
    let Some((name, raw)) = arg.split_once('=') else {
        bail!("Expected name=value, got '{arg}'");
    };
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        bail!("Parameter name is empty in '{arg}'");
    }
    Ok((name.to_string(), parse_arg_value(raw)))
}

/// JSON when it parses as JSON, otherwise the raw text as a string
pub fn parse_arg_value(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::string(raw))
}
