// src/core/service/tests.rs

use super::*;
use crate::{
    core::{
        conditions::{ConditionError, ConditionRegistry},
        invocation::{CommandGroup, CommandHandler, GroupType, HandlerResult},
        parsers::ParserRegistry,
        tree::{CommandSpec, GroupSpec, TreeBuilder},
    },
    models::{CommandShape, OptionName},
};
use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// --- FIXTURE ---

#[derive(Debug)]
struct RequireRole(&'static str);

#[derive(Debug)]
struct Range {
    min: i32,
    max: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Color(String);

struct Disposals(AtomicUsize);

struct DisposingGroup {
    disposals: Arc<Disposals>,
}

impl CommandGroup for DisposingGroup {
    fn dispose(&self) -> BoxFuture<'_, ()> {
        async move {
            self.disposals.0.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }
}

struct Nodes {
    admin: NodeId,
}

fn long(name: &str) -> OptionName {
    OptionName::Long(name.to_string())
}

fn text(value: impl Into<String>) -> HandlerResult {
    Ok(CommandOutput::from(value.into()))
}

fn reply(output: &'static str) -> CommandHandler {
    CommandHandler::stateless(move |_| async move { text(output) })
}

fn echo_string() -> CommandHandler {
    CommandHandler::stateless(|invocation| async move {
        text(invocation.arguments.require::<String>(0)?.clone())
    })
}

fn build_tree() -> Result<(CommandTree, Nodes), TreeError> {
    let test_group = Arc::new(GroupType::stateless("TestCommandGroup"));
    let ambiguous_group = Arc::new(GroupType::stateless("AmbiguousCommandGroup"));
    let admin_group =
        Arc::new(GroupType::stateless("AdminCommandGroup").with_condition(RequireRole("admin")));
    let hidden_group =
        Arc::new(GroupType::stateless("HiddenCommandGroup").with_condition(RequireRole("admin")));
    let nested_group = Arc::new(
        GroupType::stateless("NestedCommandGroup").nested_in(Arc::clone(&admin_group)),
    );
    let disposing_group = Arc::new(GroupType::new("DisposingCommandGroup", |services: &Services| {
        Ok(DisposingGroup {
            disposals: services.require::<Disposals>()?,
        })
    }));
    let broken_group = Arc::new(GroupType::new("BrokenCommandGroup", |_: &Services| {
        Err::<DisposingGroup, _>(anyhow!("no database"))
    }));

    let command = |key: &str, group: &Arc<GroupType>, parameters, handler| {
        CommandShape::new(parameters, "")
            .map(|shape| CommandSpec::new(key, Arc::clone(group), shape, handler))
    };

    let mut builder = TreeBuilder::new();
    let root = builder.root();
    let test = builder.add_group(root, GroupSpec::named("test", Arc::clone(&test_group)))?;

    builder.add_command(
        test,
        command(
            "single-positional",
            &test_group,
            vec![ParameterShape::positional::<String>("value")],
            echo_string(),
        )?,
    )?;
    // Sibling overloads that differ only in the parsed type.
    builder.add_command(
        test,
        command("pick", &test_group, vec![ParameterShape::positional::<i32>("value")], reply("int"))?,
    )?;
    builder.add_command(
        test,
        command("pick", &test_group, vec![ParameterShape::positional::<u8>("value")], reply("byte"))?,
    )?;
    builder.add_command(test, command("overload", &test_group, vec![], reply("overload-1"))?)?;
    builder.add_command(
        test,
        command(
            "overload",
            &test_group,
            vec![ParameterShape::positional::<String>("value")],
            reply("overload-2"),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "overload",
            &test_group,
            vec![
                ParameterShape::named::<String>(long("value-2")),
                ParameterShape::positional::<String>("value1"),
            ],
            CommandHandler::stateless(|invocation| async move {
                let value_2 = invocation.arguments.require::<String>(0)?;
                let value_1 = invocation.arguments.require::<String>(1)?;
                text(format!("overload-3 {} {}", value_2, value_1))
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "switch",
            &test_group,
            vec![ParameterShape::switch(
                OptionName::Both {
                    short: 'f',
                    long: "force".into(),
                },
                false,
            )],
            CommandHandler::stateless(|invocation| async move {
                text(invocation.arguments.require::<bool>(0)?.to_string())
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "nullable",
            &test_group,
            vec![ParameterShape::positional::<Color>("color").nullable()],
            CommandHandler::stateless(|invocation| async move {
                match invocation.arguments.get::<Color>(0) {
                    Some(color) => text(color.0.clone()),
                    None if invocation.arguments.is_null(0) => text("null"),
                    None => Err(anyhow!("argument missing")),
                }
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "sum",
            &test_group,
            vec![ParameterShape::positional_collection::<i32>("values", Some(1), Some(3))],
            CommandHandler::stateless(|invocation| async move {
                let values = invocation.arguments.require::<Vec<i32>>(0)?;
                text(values.iter().sum::<i32>().to_string())
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "tags",
            &test_group,
            vec![ParameterShape::named_collection::<String>(long("tag"), None, None)],
            CommandHandler::stateless(|invocation| async move {
                let tags = invocation.arguments.require::<Vec<String>>(0)?;
                text(format!("{} tag(s)", tags.len()))
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "say",
            &test_group,
            vec![ParameterShape::positional_greedy::<String>("text")],
            echo_string(),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "defaults",
            &test_group,
            vec![
                ParameterShape::positional::<i32>("count").with_default(7),
                ParameterShape::positional::<String>("label").optional(),
            ],
            CommandHandler::stateless(|invocation| async move {
                let count = invocation.arguments.require::<i32>(0)?;
                let label = invocation.arguments.is_null(1);
                text(format!("{} {}", count, label))
            }),
        )?,
    )?;
    builder.add_command(
        test,
        command(
            "ranged",
            &test_group,
            vec![ParameterShape::positional::<i32>("value").with_condition(Range { min: 1, max: 10 })],
            reply("in range"),
        )?,
    )?;
    builder.add_command(
        test,
        command("guarded", &test_group, vec![], reply("guarded"))?
            .with_condition(RequireRole("owner")),
    )?;

    // Partial declaration of `test` by a second group type.
    let test_again = builder.add_group(root, GroupSpec::named("test", Arc::clone(&ambiguous_group)))?;
    for _ in 0..2 {
        builder.add_command(
            test_again,
            command(
                "command",
                &ambiguous_group,
                vec![ParameterShape::positional::<i32>("value")],
                reply("ambiguous"),
            )?,
        )?;
    }

    let admin = builder.add_group(root, GroupSpec::named("admin", Arc::clone(&admin_group)))?;
    builder.add_command(admin, command("ping", &admin_group, vec![], reply("pong"))?)?;
    let nested = builder.add_group(admin, GroupSpec::named("nested", Arc::clone(&nested_group)))?;
    builder.add_command(nested, command("ping", &nested_group, vec![], reply("nested pong"))?)?;

    let hidden = builder.add_group(root, GroupSpec::unnamed(Arc::clone(&hidden_group)))?;
    builder.add_command(hidden, command("secret", &hidden_group, vec![], reply("secret"))?)?;

    // `deep` is both a command with a greedy parameter and a group.
    builder.add_command(
        root,
        command(
            "deep",
            &test_group,
            vec![ParameterShape::positional_greedy::<String>("text")],
            reply("shallow"),
        )?,
    )?;
    let deep = builder.add_group(root, GroupSpec::named("deep", Arc::clone(&test_group)))?;
    builder.add_command(deep, command("inner", &test_group, vec![], reply("deep"))?)?;
    builder.add_command(
        deep,
        command(
            "number",
            &test_group,
            vec![ParameterShape::positional::<i32>("n")],
            reply("deep number"),
        )?,
    )?;

    let disposing = builder.add_group(root, GroupSpec::named("disposing", Arc::clone(&disposing_group)))?;
    builder.add_command(disposing, command("ok", &disposing_group, vec![], reply("ok"))?)?;
    builder.add_command(
        disposing,
        command(
            "fail",
            &disposing_group,
            vec![],
            CommandHandler::stateless(|_| async { Err(anyhow!("deliberate failure")) }),
        )?,
    )?;
    builder.add_command(
        disposing,
        command(
            "panic",
            &disposing_group,
            vec![],
            CommandHandler::stateless(|_| async {
                if true {
                    panic!("boom");
                }
                text("unreachable")
            }),
        )?,
    )?;
    builder.add_command(
        disposing,
        command(
            "count",
            &disposing_group,
            vec![],
            CommandHandler::new(|group: Arc<DisposingGroup>, _| async move {
                text(group.disposals.0.load(Ordering::SeqCst).to_string())
            }),
        )?,
    )?;
    builder.add_command(root, command("broken", &broken_group, vec![], reply("unreachable"))?)?;

    Ok((builder.build()?, Nodes { admin }))
}

fn service(granted_role: &'static str) -> (CommandService, Nodes) {
    let (tree, nodes) = build_tree().unwrap();
    let mut trees = TreeAccessor::default();
    trees.register_tree(DEFAULT_TREE_NAME, tree);

    let mut conditions = ConditionRegistry::new();
    conditions
        .register_fn::<RequireRole, _>(move |role| {
            if role.0 == granted_role {
                Ok(())
            } else {
                Err(ConditionError::new(format!("Role '{}' is required.", role.0)))
            }
        })
        .register_parameter_fn::<Range, i32, _>(|range, value| match value {
            Some(value) if !(range.min..=range.max).contains(value) => Err(ConditionError::new(
                format!("{} is not between {} and {}.", value, range.min, range.max),
            )),
            _ => Ok(()),
        });

    (
        CommandService::new(trees, ParserRegistry::with_defaults(), conditions),
        nodes,
    )
}

async fn run(service: &CommandService, command: &str) -> Result<InvocationResult, ExecutionError> {
    service.execute(command, &Services::new(), None, None).await
}

async fn output(service: &CommandService, command: &str) -> String {
    match run(service, command).await {
        Ok(result) => result.output.text().unwrap_or_default().to_string(),
        Err(error) => panic!("'{}' failed: {}", command, error),
    }
}

// --- MATCHING ---

#[tokio::test]
async fn test_single_positional() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test single-positional booga").await, "booga");
}

#[tokio::test]
async fn test_overloads() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test overload").await, "overload-1");
    assert_eq!(output(&service, "test overload booga").await, "overload-2");
    assert_eq!(
        output(&service, "test overload --value-2 booga wooga").await,
        "overload-3 booga wooga"
    );
}

#[tokio::test]
async fn test_deeper_command_wins() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "deep inner").await, "deep");
    assert_eq!(output(&service, "deep something else").await, "shallow");
}

#[tokio::test]
async fn test_shallower_command_runs_when_the_deeper_one_cannot_be_prepared() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "deep number 3").await, "deep number");
    // `abc` is not an i32, so the greedy `deep <text...>` takes the input instead.
    assert_eq!(output(&service, "deep number abc").await, "shallow");
}

#[tokio::test]
async fn test_sibling_overload_falls_through_on_parse_failure() {
    let (service, _) = service("admin");
    // 300 does not fit in a u8; only the i32 overload prepares.
    assert_eq!(output(&service, "test pick 300").await, "int");
}

#[tokio::test]
async fn test_all_overloads_failing_is_an_aggregate() {
    let (service, _) = service("admin");
    match run(&service, "test pick abc").await {
        Err(ExecutionError::Aggregate(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|error| matches!(
                error,
                ExecutionError::ParsingFailed { parameter, value, .. }
                    if parameter == "value" && value == "abc"
            )));
        }
        other => panic!("expected an aggregate error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_equally_specific_successes_are_ambiguous() {
    let (service, _) = service("admin");
    // 5 parses as both i32 and u8.
    assert!(matches!(
        run(&service, "test pick 5").await,
        Err(ExecutionError::Ambiguous { candidates }) if candidates.len() == 2
    ));
}

#[tokio::test]
async fn test_equally_specific_commands_are_ambiguous() {
    let (service, _) = service("admin");
    match run(&service, "test command 0").await {
        Err(ExecutionError::Ambiguous { candidates }) => {
            assert_eq!(candidates.len(), 2);
            assert!(candidates.iter().all(|candidate| candidate.path == "test command"));
        }
        other => panic!("expected an ambiguity, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found() {
    let (service, _) = service("admin");
    assert!(matches!(
        run(&service, "test nothing").await,
        Err(ExecutionError::NotFound { path }) if path == "test nothing"
    ));
    // Missing a required parameter leaves no candidate.
    assert!(matches!(
        run(&service, "test single-positional").await,
        Err(ExecutionError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_unknown_tree() {
    let (service, _) = service("admin");
    let options = ExecutionOptions {
        tree_name: "missing".to_string(),
        ..ExecutionOptions::default()
    };
    let result = service
        .execute("test overload", &Services::new(), Some(&options), None)
        .await;
    assert!(matches!(
        result,
        Err(ExecutionError::Tree(TreeError::UnknownTree(_)))
    ));
}

// --- MATERIALIZATION ---

#[tokio::test]
async fn test_switch_negates_default() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test switch").await, "false");
    assert_eq!(output(&service, "test switch --force").await, "true");
    assert_eq!(output(&service, "test switch -f").await, "true");
}

#[tokio::test]
async fn test_null_literal_skips_parsing() {
    let (service, _) = service("admin");
    // No parser is registered for `Color`, so anything but `null` fails to parse.
    assert_eq!(output(&service, "test nullable null").await, "null");
    assert!(matches!(
        run(&service, "test nullable red").await,
        Err(ExecutionError::ParsingFailed { parameter, value, .. })
            if parameter == "color" && value == "red"
    ));
}

#[tokio::test]
async fn test_collections() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test sum 1").await, "1");
    assert_eq!(output(&service, "test sum 1 2 3").await, "6");
    assert!(matches!(
        run(&service, "test sum 1 2 3 4").await,
        Err(ExecutionError::NotFound { .. })
    ));
    assert!(matches!(
        run(&service, "test sum 1 two").await,
        Err(ExecutionError::ParsingFailed { value, .. }) if value == "two"
    ));

    assert_eq!(output(&service, "test tags").await, "0 tag(s)");
    assert_eq!(output(&service, "test tags --tag a b").await, "2 tag(s)");
}

#[tokio::test]
async fn test_greedy_joins_tokens() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test say hello   big world").await, "hello big world");
}

#[tokio::test]
async fn test_defaults_and_optional_parameters() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test defaults").await, "7 true");
    assert_eq!(output(&service, "test defaults 3 label").await, "3 false");
}

#[tokio::test]
async fn test_required_parameter_missing() {
    let (service, _) = service("admin");
    let parameter = ParameterShape::positional::<String>("value");
    let token = CancellationToken::default();
    let result = service
        .materialize(&parameter, None, "test single-positional", &token)
        .await;
    assert!(matches!(
        result,
        Err(ExecutionError::ParameterMissing { parameter, command })
            if parameter == "value" && command == "test single-positional"
    ));
}

// --- CONDITIONS ---

#[tokio::test]
async fn test_group_condition_reports_the_group_node() {
    let (granted, _) = service("admin");
    assert_eq!(output(&granted, "admin ping").await, "pong");

    let (denied, nodes) = service("guest");
    match run(&denied, "admin ping").await {
        Err(ExecutionError::ConditionNotSatisfied { node, reason }) => {
            assert_eq!(node, Some(nodes.admin));
            assert_eq!(reason, "Role 'admin' is required.");
        }
        other => panic!("expected a failed condition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_enclosing_group_conditions_apply() {
    let (denied, nodes) = service("guest");
    assert!(matches!(
        run(&denied, "admin nested ping").await,
        Err(ExecutionError::ConditionNotSatisfied { node, .. }) if node == Some(nodes.admin)
    ));
    let (granted, _) = service("admin");
    assert_eq!(output(&granted, "admin nested ping").await, "nested pong");
}

#[tokio::test]
async fn test_unnamed_group_condition_has_no_node() {
    let (denied, _) = service("guest");
    assert!(matches!(
        run(&denied, "secret").await,
        Err(ExecutionError::ConditionNotSatisfied { node: None, .. })
    ));
}

#[tokio::test]
async fn test_command_condition() {
    let (admin, _) = service("admin");
    assert!(matches!(
        run(&admin, "test guarded").await,
        Err(ExecutionError::ConditionNotSatisfied { node: Some(_), .. })
    ));
    let (owner, _) = service("owner");
    assert_eq!(output(&owner, "test guarded").await, "guarded");
}

#[tokio::test]
async fn test_parameter_condition_sees_the_value() {
    let (service, _) = service("admin");
    assert_eq!(output(&service, "test ranged 5").await, "in range");
    match run(&service, "test ranged 11").await {
        Err(ExecutionError::ConditionNotSatisfied { reason, .. }) => {
            assert_eq!(reason, "value: 11 is not between 1 and 10.");
        }
        other => panic!("expected a failed condition, got {:?}", other),
    }
}

// --- INVOCATION ---

#[tokio::test]
async fn test_failed_and_faulted_are_distinct_and_group_is_always_disposed() {
    let (service, _) = service("admin");
    let disposals = Arc::new(Disposals(AtomicUsize::new(0)));
    let services = Services::new().with_arc(Arc::clone(&disposals));

    let ok = service.execute("disposing ok", &services, None, None).await;
    assert_eq!(ok.unwrap().output.text(), Some("ok"));

    let failed = service.execute("disposing fail", &services, None, None).await;
    assert!(matches!(failed, Err(ExecutionError::Failed(error)) if error.to_string() == "deliberate failure"));

    let faulted = service.execute("disposing panic", &services, None, None).await;
    assert!(matches!(faulted, Err(ExecutionError::Faulted { reason }) if reason == "boom"));

    assert_eq!(disposals.0.load(Ordering::SeqCst), 3);

    // The handler sees the very instance that is disposed afterwards.
    let count = service.execute("disposing count", &services, None, None).await;
    assert_eq!(count.unwrap().output.text(), Some("3"));
    assert_eq!(disposals.0.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_group_construction_failure_is_a_fault() {
    let (service, _) = service("admin");
    assert!(matches!(
        run(&service, "broken").await,
        Err(ExecutionError::Faulted { reason }) if reason.contains("no database")
    ));
}

#[tokio::test]
async fn test_cancellation() {
    let (service, _) = service("admin");
    let token: CancellationToken = Arc::new(AtomicBool::new(true));
    let result = service
        .execute("test overload", &Services::new(), None, Some(&token))
        .await;
    assert!(matches!(result, Err(ExecutionError::Cancelled)));

    let prepared = service.prepare("test overload", None, None).await.unwrap();
    let result = service.execute_prepared(prepared, &Services::new(), &token).await;
    assert!(matches!(result, Err(ExecutionError::Cancelled)));
}

#[tokio::test]
async fn test_prepare_then_execute() {
    let (service, _) = service("admin");
    let prepared = service
        .prepare("test single-positional wooga", None, None)
        .await
        .unwrap();
    assert_eq!(prepared.command.path, "test single-positional");
    assert_eq!(prepared.arguments.get::<String>(0).map(String::as_str), Some("wooga"));

    let token = CancellationToken::default();
    let result = service
        .execute_prepared(prepared, &Services::new(), &token)
        .await
        .unwrap();
    assert_eq!(result.output.text(), Some("wooga"));
}

#[tokio::test]
async fn test_execute_named() {
    let (service, _) = service("admin");
    let parameters = vec![
        ("value-2".to_string(), vec!["booga".to_string()]),
        ("value1".to_string(), vec!["wooga".to_string()]),
    ];
    let result = service
        .execute_named(&["test", "overload"], &parameters, &Services::new(), None, None)
        .await
        .unwrap();
    assert_eq!(result.output.text(), Some("overload-3 booga wooga"));

    let switch = vec![("f".to_string(), Vec::new())];
    let result = service
        .execute_named(&["test", "switch"], &switch, &Services::new(), None, None)
        .await
        .unwrap();
    assert_eq!(result.output.text(), Some("true"));
}

#[tokio::test]
async fn test_case_sensitive_options() {
    let (service, _) = service("admin");
    let options = ExecutionOptions {
        search: TreeSearchOptions {
            key_comparison: crate::core::config::KeyComparison::CaseSensitive,
        },
        ..ExecutionOptions::default()
    };
    let result = service
        .execute("TEST overload", &Services::new(), Some(&options), None)
        .await;
    assert!(matches!(result, Err(ExecutionError::NotFound { .. })));
    assert_eq!(output(&service, "TEST OVERLOAD").await, "overload-1");
}
