// src/cli/mod.rs

use crate::{
    CancellationToken,
    constants::{DEFAULT_TREE_NAME, INLINE_VALUE_SEPARATOR, LONG_NAME_PREFIX, SHORT_NAME_PREFIX},
    core::{
        config::{self, CommandOptions, KeyComparison, TokenizerOptions},
        graph_display::{self, DisplayOptions},
        invocation::Services,
        service::CommandService,
        trees::TreeAccessor,
    },
};
use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::PathBuf;

pub mod demo;

/// cmdroute: routes a command line through a command tree and runs the matching handler.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Read options from this TOML file instead of the user configuration directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the command tree instead of executing a command.
    #[arg(long)]
    pub tree: bool,

    /// Limit the depth of the printed tree.
    #[arg(long, value_name = "LEVELS", requires = "tree")]
    pub depth: Option<usize>,

    /// Match command keys and option names case-sensitively.
    #[arg(long)]
    pub case_sensitive: bool,

    /// The command line to route, e.g. `math add 1 2`.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Loads options, builds the service and either prints the tree or executes `cli.args`.
pub async fn run_cli(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut options = match &cli.config {
        Some(path) => config::load_options(path)?,
        None => config::load_default_options()?,
    };
    if cli.case_sensitive {
        options.tree_search.key_comparison = KeyComparison::CaseSensitive;
    }

    let service = build_service(&options)?;

    if cli.tree || cli.args.is_empty() {
        let tree = service.trees().get(DEFAULT_TREE_NAME)?;
        let display = DisplayOptions {
            max_depth: cli.depth,
            ..DisplayOptions::default()
        };
        if !cli.tree {
            println!("{}", "No command given. Available commands:".yellow());
        }
        print!("{}", graph_display::render_tree(&tree, None, &display));
        return Ok(());
    }

    let command_line = join_args(&cli.args, &options.tokenizer);
    log::info!("Executing: {}", command_line);

    let result = service
        .execute(&command_line, &Services::new(), None, Some(&cancellation_token))
        .await?;
    log::debug!("Invoked '{}'", result.command.path);

    if let Some(text) = result.output.text() {
        println!("{}", text);
    } else if !result.output.is_empty() {
        println!("{}", "(command returned a non-text value)".dimmed());
    }
    Ok(())
}

/// Registers the demo tree and applies `options` to a new service.
pub fn build_service(options: &CommandOptions) -> Result<CommandService> {
    let mut trees = TreeAccessor::new(options.tree_accessor.clone());
    trees.register(DEFAULT_TREE_NAME, demo::build_tree);
    trees.preload()?;
    Ok(CommandService::new(trees, demo::parsers(), demo::conditions()).with_options(options))
}

/// Rebuilds a single command string from shell arguments, quoting the ones the tokenizer
/// would otherwise split, drop or read as a short name (`-2`). For `--name=value` only the
/// value half is quoted.
pub fn join_args(args: &[String], options: &TokenizerOptions) -> String {
    args.iter()
        .map(|arg| {
            if arg.starts_with(LONG_NAME_PREFIX)
                && let Some((name, value)) = arg.split_once(INLINE_VALUE_SEPARATOR)
            {
                format!("{}{}{}", name, INLINE_VALUE_SEPARATOR, quote_arg(value, options))
            } else {
                quote_arg(arg, options)
            }
        })
        .collect::<Vec<_>>()
        .join(&options.delimiter.to_string())
}

fn quote_arg(arg: &str, options: &TokenizerOptions) -> String {
    let quote = options.quote_character;
    if !arg.is_empty()
        && !arg.contains(options.delimiter)
        && !arg.contains(quote)
        && !is_negative_number(arg)
    {
        return arg.to_string();
    }
    let escaped = arg.replace(quote, &format!("\\{}", quote));
    format!("{}{}{}", quote, escaped, quote)
}

/// `-2`, `-0.5`: a single dash followed by a digit.
fn is_negative_number(arg: &str) -> bool {
    let mut chars = arg.chars();
    chars.next() == Some(SHORT_NAME_PREFIX) && chars.next().is_some_and(|c| c.is_ascii_digit())
}

// MARK: --- UNIT TESTS ---
