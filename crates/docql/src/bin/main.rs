//! docql command-line interface

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use docql::cli::output::{ColorChoice, OutputFormat};
use docql::cli::rewrite::Rewrite;
use docql::cli::{cover, eval, input, output, rewrite};
use log::LevelFilter;
use std::path::PathBuf;

/// Document query expression tools
#[derive(Parser)]
#[command(name = "docql")]
#[command(author, version, about = "Parse, evaluate and analyze document query expressions", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Engine settings (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an expression and print its canonical text
    Fmt {
        /// Expression, @file or - for stdin
        expression: String,
    },

    /// Evaluate an expression against a document
    Eval {
        /// Expression, @file or - for stdin
        expression: String,

        /// Document JSON, @file or - for stdin
        #[arg(short, long)]
        doc: Option<String>,

        /// Bind the document under this name instead of as the base value
        #[arg(short, long)]
        alias: Option<String>,

        /// Named parameter (name=value)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Positional parameter, in order ($1, $2, ...)
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Check whether index keys cover an expression
    Cover {
        /// Expression, @file or - for stdin
        expression: String,

        /// Keyspace alias the expression reads from
        #[arg(short, long)]
        keyspace: String,

        /// Index key expression (repeatable, or comma-separated)
        #[arg(short = 'K', long = "key", required = true)]
        keys: Vec<String>,

        /// Let ALL/DISTINCT array keys answer quantifiers
        #[arg(long)]
        array: bool,
    },

    /// Print the negation normal form of a predicate
    Nnf {
        /// Expression, @file or - for stdin
        expression: String,
    },

    /// Fold statically known parts of a predicate
    Fold {
        /// Expression, @file or - for stdin
        expression: String,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Fmt { expression } => rewrite::run(Rewrite::Format, &expression, cli.format),
        Commands::Nnf { expression } => rewrite::run(Rewrite::Nnf, &expression, cli.format),
        Commands::Fold { expression } => rewrite::run(Rewrite::Fold, &expression, cli.format),
        Commands::Eval {
            expression,
            doc,
            alias,
            params,
            args,
        } => {
            let config = eval::EvalConfig {
                expression,
                document: doc,
                alias,
                named_args: params,
                positional_args: args,
                engine: input::load_config(cli.config.as_deref())?,
                format: cli.format,
            };
            eval::run(config)
        }
        Commands::Cover {
            expression,
            keyspace,
            keys,
            array,
        } => {
            let config = cover::CoverConfig {
                expression,
                keyspace,
                keys,
                array,
                format: cli.format,
            };
            cover::run(config)
        }
    }
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(cli.color);
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}
