//! `docql fmt`, `docql nnf` and `docql fold`: print rewritten trees
//!
//! Folding works on filter predicates, so a known NULL or MISSING prints as
//! `false`.

use super::{input, output};
use anyhow::{Context, Result};
use docql_expr::Expression;
use docql_expr::transform::{normalize, remove_constants};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Canonical text only
    Format,
    /// Negation normal form
    Nnf,
    /// Constant folding
    Fold,
}

pub fn rewrite(kind: Rewrite, expression: &str) -> Result<Expression> {
    let source = input::read_text(expression)?;
    let expr = docql_parser::parse_expression(&source).context("Failed to parse expression")?;
    let rewritten = match kind {
        Rewrite::Format => expr,
        Rewrite::Nnf => normalize(expr).context("Failed to normalize")?,
        Rewrite::Fold => remove_constants(expr).context("Failed to fold constants")?,
    };
    Ok(rewritten)
}

pub fn run(kind: Rewrite, expression: &str, format: output::OutputFormat) -> Result<()> {
    let expr = rewrite(kind, expression)?;
    match format {
        output::OutputFormat::Text => println!("{expr}"),
        format => {
            let doc = json!({
                "expression": expr,
                "static": expr.is_static(),
                "value": expr.value().map(|v| v.to_json()),
            });
            println!(
                "{}",
                output::format_json(&doc, format == output::OutputFormat::Pretty)?
            );
        }
    }
    Ok(())
}
