// src/cli/demo.rs

//! The command tree served by the `cmdroute` binary.

use crate::core::{
    conditions::{ConditionError, ConditionRegistry},
    invocation::{CommandHandler, CommandOutput, GroupType, HandlerResult, Invocation},
    parsers::ParserRegistry,
    tree::{CommandSpec, CommandTree, GroupSpec, TreeBuilder, TreeError},
};
use crate::models::{CommandShape, OptionName, ParameterShape};
use std::sync::Arc;

/// Marks a numeric parameter that must not be zero.
#[derive(Debug, Clone, Copy)]
pub struct NonZero;

fn reply(text: String) -> HandlerResult {
    Ok(CommandOutput::from(text))
}

async fn greet(invocation: Invocation) -> HandlerResult {
    let arguments = &invocation.arguments;
    let name = arguments.require::<String>(0)?;
    let times = *arguments.require::<u8>(1)?;
    let shout = *arguments.require::<bool>(2)?;

    let greeting = format!("Hello, {}!", name);
    let greeting = if shout { greeting.to_uppercase() } else { greeting };
    reply(vec![greeting; usize::from(times)].join("\n"))
}

async fn add(invocation: Invocation) -> HandlerResult {
    let a = invocation.arguments.require::<f64>(0)?;
    let b = invocation.arguments.require::<f64>(1)?;
    reply((a + b).to_string())
}

async fn sum(invocation: Invocation) -> HandlerResult {
    let values = invocation.arguments.require::<Vec<i64>>(0)?;
    let verbose = *invocation.arguments.require::<bool>(1)?;
    let total: i64 = values.iter().sum();
    if verbose {
        let terms: Vec<String> = values.iter().map(ToString::to_string).collect();
        reply(format!("{} = {}", terms.join(" + "), total))
    } else {
        reply(total.to_string())
    }
}

async fn divide(invocation: Invocation) -> HandlerResult {
    let a = invocation.arguments.require::<f64>(0)?;
    let b = invocation.arguments.require::<f64>(1)?;
    reply((a / b).to_string())
}

async fn echo(invocation: Invocation) -> HandlerResult {
    reply(invocation.arguments.require::<String>(0)?.clone())
}

/// Builds the demo tree: `greet`, `echo` and the `math` group.
pub fn build_tree() -> Result<CommandTree, TreeError> {
    let general = Arc::new(GroupType::stateless("GeneralCommands"));
    let math = Arc::new(GroupType::stateless("MathCommands"));

    let mut builder = TreeBuilder::new();
    let root = builder.root();

    builder.add_command(
        root,
        CommandSpec::new(
            "greet",
            Arc::clone(&general),
            CommandShape::new(
                vec![
                    ParameterShape::positional::<String>("name").description("Who to greet"),
                    ParameterShape::named::<u8>(OptionName::Both {
                        short: 't',
                        long: "times".into(),
                    })
                    .with_default(1u8)
                    .description("How many times to repeat the greeting"),
                    ParameterShape::switch(OptionName::Long("shout".into()), false),
                ],
                "Greets someone",
            )?,
            CommandHandler::stateless(greet),
        )
        .alias("hello"),
    )?;

    builder.add_command(
        root,
        CommandSpec::new(
            "echo",
            Arc::clone(&general),
            CommandShape::new(
                vec![ParameterShape::positional_greedy::<String>("text")],
                "Repeats its input",
            )?,
            CommandHandler::stateless(echo),
        ),
    )?;

    let math_group = builder.add_group(
        root,
        GroupSpec::named("math", Arc::clone(&math))
            .alias("m")
            .description("Arithmetic"),
    )?;
    builder.add_command(
        math_group,
        CommandSpec::new(
            "add",
            Arc::clone(&math),
            CommandShape::new(
                vec![
                    ParameterShape::positional::<f64>("a"),
                    ParameterShape::positional::<f64>("b"),
                ],
                "Adds two numbers",
            )?,
            CommandHandler::stateless(add),
        ),
    )?;
    builder.add_command(
        math_group,
        CommandSpec::new(
            "sum",
            Arc::clone(&math),
            CommandShape::new(
                vec![
                    ParameterShape::positional_collection::<i64>("values", Some(1), None),
                    ParameterShape::switch(OptionName::Both {
                        short: 'v',
                        long: "verbose".into(),
                    }, false),
                ],
                "Adds any number of integers",
            )?,
            CommandHandler::stateless(sum),
        ),
    )?;
    builder.add_command(
        math_group,
        CommandSpec::new(
            "divide",
            Arc::clone(&math),
            CommandShape::new(
                vec![
                    ParameterShape::positional::<f64>("a"),
                    ParameterShape::positional::<f64>("b").with_condition(NonZero),
                ],
                "Divides a by b",
            )?,
            CommandHandler::stateless(divide),
        )
        .alias("div"),
    )?;

    builder.build()
}

/// Parsers for every parameter type used by the demo tree.
pub fn parsers() -> ParserRegistry {
    ParserRegistry::with_defaults()
}

/// Conditions backing the demo tree's attributes.
pub fn conditions() -> ConditionRegistry {
    let mut conditions = ConditionRegistry::new();
    conditions.register_parameter_fn::<NonZero, f64, _>(|_, value| match value {
        Some(value) if *value == 0.0 => Err(ConditionError::new("must not be zero")),
        _ => Ok(()),
    });
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::DEFAULT_TREE_NAME,
        core::{
            invocation::Services,
            service::{CommandService, ExecutionError},
            trees::TreeAccessor,
        },
    };

    fn service() -> CommandService {
        let mut trees = TreeAccessor::default();
        trees.register(DEFAULT_TREE_NAME, build_tree);
        CommandService::new(trees, parsers(), conditions())
    }

    async fn run(command: &str) -> Result<String, ExecutionError> {
        let result = service()
            .execute(command, &Services::new(), None, None)
            .await?;
        Ok(result.output.text().unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_greet() {
        assert_eq!(run("greet world").await.unwrap(), "Hello, world!");
        assert_eq!(
            run("hello world --shout -t 2").await.unwrap(),
            "HELLO, WORLD!\nHELLO, WORLD!"
        );
        assert_eq!(run(r#"greet "big world""#).await.unwrap(), "Hello, big world!");
    }

    #[tokio::test]
    async fn test_math() {
        assert_eq!(run("math add 1.5 2").await.unwrap(), "3.5");
        assert_eq!(run("m sum 1 2 3").await.unwrap(), "6");
        assert_eq!(run("math sum -v 1 2 3").await.unwrap(), "1 + 2 + 3 = 6");
        assert_eq!(run("math div 9 3").await.unwrap(), "3");
    }

    #[tokio::test]
    async fn test_divide_by_zero_is_rejected() {
        assert!(matches!(
            run("math divide 1 0").await,
            Err(ExecutionError::ConditionNotSatisfied { reason, .. }) if reason == "b: must not be zero"
        ));
    }

    #[tokio::test]
    async fn test_echo_and_errors() {
        assert_eq!(run("echo a  b c").await.unwrap(), "a b c");
        assert!(matches!(
            run("math add one 2").await,
            Err(ExecutionError::ParsingFailed { parameter, .. }) if parameter == "a"
        ));
        assert!(matches!(run("math").await, Err(ExecutionError::NotFound { .. })));
    }
}
