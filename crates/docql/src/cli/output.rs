//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use docql_diagnostics::{DocqlError, SourceLocation};
use docql_value::Value;
use std::io::IsTerminal;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Canonical text
    #[default]
    Text,
    /// Compact JSON
    Json,
    /// Indented JSON
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Set up color output based on user preference
pub fn setup_colors(choice: ColorChoice) {
    let enabled = match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal(),
    };
    colored::control::set_override(enabled);
}

/// Format an error for display, with a source excerpt for parse errors
pub fn format_error(error: &anyhow::Error) -> String {
    let mut out = format!("{} {error:#}", "Error:".red().bold());
    let Some(docql) = error.chain().find_map(|e| e.downcast_ref::<DocqlError>()) else {
        return out;
    };
    if let DocqlError::Parse {
        expression,
        location: Some(location),
        ..
    } = docql
    {
        out.push('\n');
        out.push_str(&format_excerpt(expression, location));
    }
    if let Some(help) = docql.to_diagnostic().help {
        out.push_str(&format!("\n{} {help}", "help:".cyan().bold()));
    }
    out
}

/// The offending line of `source` with a caret under the error
pub fn format_excerpt(source: &str, location: &SourceLocation) -> String {
    let line = source.lines().nth(location.line.saturating_sub(1)).unwrap_or("");
    let gutter = location.line.to_string();
    let pad = " ".repeat(gutter.len());
    let indent = " ".repeat(location.column.saturating_sub(1));
    let marker = "^".repeat(location.length.max(1));
    format!(
        "{pad} {bar}\n{num} {bar} {line}\n{pad} {bar} {indent}{marker}",
        bar = "|".blue().bold(),
        num = gutter.blue().bold(),
        marker = marker.red().bold(),
    )
}

pub fn format_success(message: &str) -> String {
    format!("{} {}", "ok:".green().bold(), message)
}

pub fn format_failure(message: &str) -> String {
    format!("{} {}", "no:".red().bold(), message)
}

/// Render an evaluation result
pub fn format_value(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(value.to_string()),
        OutputFormat::Json => format_json(&value.to_json(), false),
        OutputFormat::Pretty => format_json(&value.to_json(), true),
    }
}

pub fn format_json(value: &serde_json::Value, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).context("Failed to serialize JSON")
    } else {
        serde_json::to_string(value).context("Failed to serialize JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_diagnostics::{DQL0001, DQL0011, Span};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_excerpt_points_at_column() {
        colored::control::set_override(false);
        let loc = SourceLocation::from_span(Span::new(4, 5), "a + )");
        assert_eq!(format_excerpt("a + )", &loc), "  |\n1 | a + )\n  |     ^");
    }

    #[test]
    fn test_error_includes_excerpt() {
        colored::control::set_override(false);
        let err = DocqlError::parse_at(DQL0001, "Unexpected ')'", "a + )", Span::new(4, 5));
        let text = format_error(&anyhow::Error::new(err).context("Failed to parse expression"));
        assert!(text.starts_with("Error: Failed to parse expression"));
        assert!(text.ends_with("    ^"));
    }

    #[test]
    fn test_error_includes_help() {
        colored::control::set_override(false);
        let err = DocqlError::parse_at(DQL0011, "Expected IN or WITHIN", "any v satisfies", Span::new(6, 15));
        let text = format_error(&anyhow::Error::new(err));
        assert!(text.ends_with("help: Bindings take the form `var IN expr` or `name : var WITHIN expr`"));
    }

    #[test]
    fn test_value_formats() {
        let v = Value::from(serde_json::json!({"b": [1, null], "a": "x"}));
        assert_eq!(format_value(&v, OutputFormat::Text).unwrap(), r#"{"a":"x","b":[1,null]}"#);
        assert_eq!(format_value(&v, OutputFormat::Json).unwrap(), r#"{"b":[1,null],"a":"x"}"#);
        assert_eq!(format_value(&Value::Missing, OutputFormat::Text).unwrap(), "missing");
    }
}
