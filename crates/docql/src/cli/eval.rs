//! `docql eval`: evaluate an expression against a document

use super::{input, output};
use anyhow::{Context, Result};
use docql_expr::{EngineConfig, ExecutionContext};
use docql_value::{Scope, Value};

pub struct EvalConfig {
    /// Expression text, `@file` or `-`
    pub expression: String,
    /// Document JSON, `@file` or `-`
    pub document: Option<String>,
    /// Bind the document under this name instead of as the base value
    pub alias: Option<String>,
    /// `name=value` pairs for `$name`
    pub named_args: Vec<String>,
    /// Values for `$1`, `$2`, ...
    pub positional_args: Vec<String>,
    pub engine: EngineConfig,
    pub format: output::OutputFormat,
}

pub fn run(config: EvalConfig) -> Result<()> {
    let value = evaluate(&config)?;
    println!("{}", output::format_value(&value, config.format)?);
    Ok(())
}

pub fn evaluate(config: &EvalConfig) -> Result<Value> {
    let source = input::read_text(&config.expression)?;
    let expr = docql_parser::parse_expression(&source).context("Failed to parse expression")?;

    let document = config
        .document
        .as_deref()
        .map(input::read_document)
        .transpose()?;
    let base = match (document, &config.alias) {
        (Some(doc), Some(alias)) => Some(Value::object([(alias.as_str(), doc)])),
        (doc, _) => doc,
    };

    let mut builder = ExecutionContext::builder().with_config(config.engine.clone());
    for arg in &config.named_args {
        let (name, value) = input::parse_named_arg(arg)?;
        builder = builder.with_named_arg(name, value);
    }
    for arg in &config.positional_args {
        builder = builder.with_positional_arg(input::parse_arg_value(arg));
    }
    let ctx = builder.build();

    log::debug!("evaluating {expr}");
    let scope = base.as_ref().map_or(Scope::empty(), Scope::new);
    let value = expr
        .evaluate(&scope, &ctx)
        .with_context(|| format!("Failed to evaluate {expr}"))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(expression: &str) -> EvalConfig {
        EvalConfig {
            expression: expression.to_string(),
            document: None,
            alias: None,
            named_args: Vec::new(),
            positional_args: Vec::new(),
            engine: EngineConfig::default(),
            format: output::OutputFormat::Text,
        }
    }

    #[test]
    fn test_document_as_base() {
        let cfg = EvalConfig {
            document: Some(r#"{"a": {"b": 2}}"#.to_string()),
            ..config("a.b * 10")
        };
        assert_eq!(evaluate(&cfg).unwrap(), Value::int(20));
    }

    #[test]
    fn test_document_under_alias() {
        let cfg = EvalConfig {
            document: Some(r#"{"a": 1}"#.to_string()),
            alias: Some("d".to_string()),
            ..config("[d.a, a]")
        };
        assert_eq!(
            evaluate(&cfg).unwrap(),
            Value::array([Value::int(1), Value::Null])
        );
    }

    #[test]
    fn test_parameters() {
        let cfg = EvalConfig {
            named_args: vec!["lim=3".to_string()],
            positional_args: vec!["\"x\"".to_string()],
            ..config("[$lim + 1, $1, $nope]")
        };
        assert_eq!(
            evaluate(&cfg).unwrap(),
            Value::array([Value::int(4), Value::string("x"), Value::Null])
        );
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = evaluate(&config("a +")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse expression"));
    }
}
