//! `docql cover`: check whether index keys cover an expression

use super::{input, output};
use anyhow::{Context, Result};
use docql_expr::{CoveredOptions, CoveredResult, Expression, filter_covers};
use serde_json::json;

pub struct CoverConfig {
    pub expression: String,
    pub keyspace: String,
    /// Index keys; each argument may hold a comma-separated list
    pub keys: Vec<String>,
    /// Treat `ALL`/`DISTINCT` keys as array index keys
    pub array: bool,
    pub format: output::OutputFormat,
}

pub struct CoverReport {
    pub expression: Expression,
    pub keys: Vec<Expression>,
    pub result: CoveredResult,
}

pub fn check(config: &CoverConfig) -> Result<CoverReport> {
    let source = input::read_text(&config.expression)?;
    let expression =
        docql_parser::parse_expression(&source).context("Failed to parse expression")?;

    let mut keys = Vec::new();
    for arg in &config.keys {
        let text = input::read_text(arg)?;
        let parsed = docql_parser::parse_expressions(&text)
            .with_context(|| format!("Failed to parse index key: {arg}"))?;
        keys.extend(parsed);
    }

    let mut options = CoveredOptions::TRICKLE;
    if config.array {
        options = options | CoveredOptions::ARRAY_KEY;
    }
    let result = expression.covered_by(&config.keyspace, &keys, options);
    log::info!("{expression} against {} keys: {result}", keys.len());
    Ok(CoverReport {
        expression,
        keys,
        result,
    })
}

pub fn run(config: CoverConfig) -> Result<()> {
    let report = check(&config)?;
    let filters = filter_covers(&report.expression);
    match config.format {
        output::OutputFormat::Text => {
            let line = format!("{} ({})", report.expression, report.result);
            if report.result.is_covered() {
                println!("{}", output::format_success(&line));
            } else {
                println!("{}", output::format_failure(&line));
            }
            for (cover, value) in &filters {
                println!("  filter {cover} = {value}");
            }
        }
        format => {
            let keys: Vec<String> = report.keys.iter().map(ToString::to_string).collect();
            let filters: serde_json::Map<String, serde_json::Value> = filters
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            let doc = json!({
                "expression": report.expression.to_string(),
                "keyspace": config.keyspace,
                "keys": keys,
                "result": report.result.to_string(),
                "covered": report.result.is_covered(),
                "filter_covers": filters,
            });
            println!(
                "{}",
                output::format_json(&doc, format == output::OutputFormat::Pretty)?
            );
        }
    }
    Ok(())
}
