// src/core/service.rs

//! # Command Service
//!
//! The execution pipeline. A raw command string (or a path plus pre-split parameters) is
//! searched in a named tree; every candidate that survives the search is prepared
//! concurrently:
//!
//! 1. conditions of the declaring group type and every enclosing group type,
//! 2. conditions attached to the command,
//! 3. materialization of each parameter (default, switch negation, `null`, parsing),
//! 4. parameter conditions, which see the materialized value.
//!
//! Of the candidates that prepare successfully only the deepest in the tree are kept
//! (see [`most_specific`]); exactly one must remain, several are an ambiguity. The
//! prepared command is then invoked: its group is constructed, the handler is awaited and
//! the group is disposed whatever the outcome. A handler returning `Err` has *failed*; a
//! handler that panics, or a group that cannot be constructed, has *faulted*.
use crate::{
    CancellationToken,
    constants::{DEFAULT_TREE_NAME, GREEDY_JOIN_SEPARATOR, NULL_LITERAL},
    core::{
        commons::check_for_cancellation,
        conditions::ConditionRegistry,
        config::{CommandOptions, TokenizerOptions, TreeSearchOptions},
        invocation::{Arguments, CommandOutput, Invocation, Services},
        parsers::ParserRegistry,
        search::{SearchError, TreeSearch, most_specific},
        tokenizer::Tokenizer,
        tree::{CommandNode, CommandTree, NodeId, TreeError},
        trees::TreeAccessor,
    },
    dev_utils::StageTimer,
    models::{BoundCommandNode, ParameterKind, ParameterShape, Value},
};
use futures::{FutureExt, future::join_all};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Every way an execution can end without a result.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command matches '{path}'.")]
    NotFound { path: String },
    #[error("The command is ambiguous between: {}", describe_candidates(.candidates))]
    Ambiguous { candidates: Vec<BoundCommandNode> },
    #[error("Required parameter '{parameter}' of '{command}' is missing.")]
    ParameterMissing { parameter: String, command: String },
    #[error("Failed to parse '{value}' for parameter '{parameter}': {reason}")]
    ParsingFailed {
        parameter: String,
        value: String,
        reason: String,
    },
    /// `node` is the group or command the failed condition is attached to; `None` when the
    /// condition belongs to an unnamed group.
    #[error("Condition not satisfied: {reason}")]
    ConditionNotSatisfied { node: Option<NodeId>, reason: String },
    #[error("Command failed: {0:#}")]
    Failed(anyhow::Error),
    #[error("Command faulted: {reason}")]
    Faulted { reason: String },
    #[error("The command was cancelled.")]
    Cancelled,
    #[error("{}", describe_errors(.0))]
    Aggregate(Vec<ExecutionError>),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

fn describe_candidates(candidates: &[BoundCommandNode]) -> String {
    candidates
        .iter()
        .map(|candidate| format!("'{}' ({})", candidate.path, candidate.node))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_errors(errors: &[ExecutionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-call options. The service's own options apply when none are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub tree_name: String,
    pub tokenizer: TokenizerOptions,
    pub search: TreeSearchOptions,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            tree_name: DEFAULT_TREE_NAME.to_string(),
            tokenizer: TokenizerOptions::default(),
            search: TreeSearchOptions::default(),
        }
    }
}

/// A command that passed every check and is ready to be invoked.
#[derive(Debug)]
pub struct PreparedCommand {
    pub command: BoundCommandNode,
    pub arguments: Arguments,
    pub tree: Arc<CommandTree>,
}

/// A successful invocation.
#[derive(Debug)]
pub struct InvocationResult {
    pub command: BoundCommandNode,
    pub output: CommandOutput,
}

/// Searches, prepares and invokes commands.
#[derive(Debug, Clone)]
pub struct CommandService {
    trees: Arc<TreeAccessor>,
    parsers: Arc<ParserRegistry>,
    conditions: Arc<ConditionRegistry>,
    options: ExecutionOptions,
}

impl CommandService {
    pub fn new(trees: TreeAccessor, parsers: ParserRegistry, conditions: ConditionRegistry) -> Self {
        Self {
            trees: Arc::new(trees),
            parsers: Arc::new(parsers),
            conditions: Arc::new(conditions),
            options: ExecutionOptions::default(),
        }
    }

    /// Applies loaded configuration to the service's default execution options.
    pub fn with_options(mut self, options: &CommandOptions) -> Self {
        self.options.tokenizer = options.tokenizer;
        self.options.search = options.tree_search;
        self
    }

    pub fn with_tree_name(mut self, tree_name: impl Into<String>) -> Self {
        self.options.tree_name = tree_name.into();
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn trees(&self) -> &TreeAccessor {
        &self.trees
    }

    // --- PUBLIC PIPELINE ---

    /// Searches, prepares and invokes a raw command string.
    pub async fn execute(
        &self,
        command: &str,
        services: &Services,
        options: Option<&ExecutionOptions>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<InvocationResult, ExecutionError> {
        let cancellation = cancellation.cloned().unwrap_or_default();
        let prepared = self.prepare(command, options, Some(&cancellation)).await?;
        self.execute_prepared(prepared, services, &cancellation).await
    }

    /// Like [`Self::execute`], for a path and pre-split `name -> values` parameters.
    pub async fn execute_named(
        &self,
        path: &[&str],
        parameters: &[(String, Vec<String>)],
        services: &Services,
        options: Option<&ExecutionOptions>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<InvocationResult, ExecutionError> {
        let cancellation = cancellation.cloned().unwrap_or_default();
        let prepared = self
            .prepare_named(path, parameters, options, Some(&cancellation))
            .await?;
        self.execute_prepared(prepared, services, &cancellation).await
    }

    /// Runs search, conditions and materialization without invoking anything.
    pub async fn prepare(
        &self,
        command: &str,
        options: Option<&ExecutionOptions>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<PreparedCommand, ExecutionError> {
        let options = options.unwrap_or(&self.options);
        let cancellation = cancellation.cloned().unwrap_or_default();
        let _timer = StageTimer::new("prepare", command);
        log::debug!("Preparing '{}' in tree '{}'.", command, options.tree_name);
        check_for_cancellation(&cancellation)?;

        let tree = self.trees.get(&options.tree_name)?;
        let candidates = TreeSearch::new(&tree, options.search)
            .search(Tokenizer::new(command, options.tokenizer))?;
        self.prepare_candidates(tree, candidates, command, &cancellation)
            .await
    }

    pub async fn prepare_named(
        &self,
        path: &[&str],
        parameters: &[(String, Vec<String>)],
        options: Option<&ExecutionOptions>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<PreparedCommand, ExecutionError> {
        let options = options.unwrap_or(&self.options);
        let cancellation = cancellation.cloned().unwrap_or_default();
        let subject = path.join(" ");
        let _timer = StageTimer::new("prepare", subject.as_str());
        log::debug!(
            "Preparing '{}' with {} named parameter(s) in tree '{}'.",
            subject,
            parameters.len(),
            options.tree_name
        );
        check_for_cancellation(&cancellation)?;

        let tree = self.trees.get(&options.tree_name)?;
        let candidates = TreeSearch::new(&tree, options.search).search_named(path, parameters)?;
        self.prepare_candidates(tree, candidates, &subject, &cancellation)
            .await
    }

    /// Invokes a prepared command and disposes its group.
    pub async fn execute_prepared(
        &self,
        prepared: PreparedCommand,
        services: &Services,
        cancellation: &CancellationToken,
    ) -> Result<InvocationResult, ExecutionError> {
        let PreparedCommand {
            command: bound,
            arguments,
            tree,
        } = prepared;
        let _timer = StageTimer::new("invoke", bound.path.as_str());
        check_for_cancellation(cancellation)?;

        let command = tree.command(bound.node).ok_or_else(|| ExecutionError::NotFound {
            path: bound.path.clone(),
        })?;

        let group = command.group_type.instantiate(services).map_err(|error| {
            log::debug!("Group '{}' could not be constructed.", command.group_type.name());
            ExecutionError::Faulted {
                reason: format!(
                    "Failed to construct group '{}': {:#}",
                    command.group_type.name(),
                    error
                ),
            }
        })?;

        let invocation = Invocation {
            arguments,
            services: services.clone(),
            cancellation: Arc::clone(cancellation),
        };
        let instance = group.instance();
        log::debug!("Invoking '{}' ({}).", bound.path, bound.node);
        // The handler closure runs inside the guarded future, so panics while creating
        // the future are caught as well.
        let outcome = AssertUnwindSafe(async { command.handler.invoke(instance, invocation).await })
            .catch_unwind()
            .await;
        group.dispose().await;

        match outcome {
            Ok(Ok(output)) => Ok(InvocationResult {
                command: bound,
                output,
            }),
            Ok(Err(error)) => {
                log::debug!("Command '{}' failed: {:#}", bound.path, error);
                Err(ExecutionError::Failed(error))
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                log::debug!("Command '{}' faulted: {}", bound.path, reason);
                Err(ExecutionError::Faulted { reason })
            }
        }
    }

    // --- PREPARATION ---

    async fn prepare_candidates(
        &self,
        tree: Arc<CommandTree>,
        candidates: Vec<BoundCommandNode>,
        subject: &str,
        cancellation: &CancellationToken,
    ) -> Result<PreparedCommand, ExecutionError> {
        if candidates.is_empty() {
            return Err(ExecutionError::NotFound {
                path: subject.to_string(),
            });
        }
        log::debug!("Preparing {} candidate(s) for '{}'.", candidates.len(), subject);

        let results = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.prepare_candidate(&tree, candidate, cancellation)),
        )
        .await;

        let mut prepared = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(candidate) => prepared.push(candidate),
                Err(error) => errors.push(error),
            }
        }

        // Specificity only ranks candidates that could be prepared; a deeper command that
        // does not apply leaves the shallower ones in play.
        let mut prepared = most_specific(&tree, prepared, |candidate: &(BoundCommandNode, Arguments)| {
            candidate.0.node
        });
        if prepared.len() > 1 {
            return Err(ExecutionError::Ambiguous {
                candidates: prepared.into_iter().map(|(command, _)| command).collect(),
            });
        }
        if let Some((command, arguments)) = prepared.pop() {
            return Ok(PreparedCommand {
                command,
                arguments,
                tree,
            });
        }

        if errors
            .iter()
            .any(|error| matches!(error, ExecutionError::Cancelled))
        {
            return Err(ExecutionError::Cancelled);
        }
        match errors.pop() {
            Some(error) if errors.is_empty() => Err(error),
            Some(error) => {
                errors.push(error);
                Err(ExecutionError::Aggregate(errors))
            }
            None => Err(ExecutionError::NotFound {
                path: subject.to_string(),
            }),
        }
    }

    async fn prepare_candidate(
        &self,
        tree: &CommandTree,
        candidate: BoundCommandNode,
        cancellation: &CancellationToken,
    ) -> Result<(BoundCommandNode, Arguments), ExecutionError> {
        let command = tree.command(candidate.node).ok_or_else(|| ExecutionError::NotFound {
            path: candidate.path.clone(),
        })?;

        check_for_cancellation(cancellation)?;
        self.check_group_conditions(tree, candidate.node, command, cancellation)
            .await?;

        check_for_cancellation(cancellation)?;
        for attribute in &command.conditions {
            self.conditions
                .check(attribute, cancellation)
                .await
                .map_err(|error| ExecutionError::ConditionNotSatisfied {
                    node: Some(candidate.node),
                    reason: error.reason,
                })?;
        }

        check_for_cancellation(cancellation)?;
        let parameters = command.shape.parameters();
        let mut values = Vec::with_capacity(parameters.len());
        for (index, parameter) in parameters.iter().enumerate() {
            let value = self
                .materialize(parameter, candidate.tokens_for(index), &candidate.path, cancellation)
                .await?;
            values.push(value);
        }

        check_for_cancellation(cancellation)?;
        for (parameter, value) in parameters.iter().zip(&values) {
            let value_type = if parameter.kind.is_collection() {
                parameter.parameter_type.collection_id()
            } else {
                parameter.parameter_type.id()
            };
            for attribute in &parameter.conditions {
                self.conditions
                    .check_parameter(attribute, value_type, value.as_deref(), cancellation)
                    .await
                    .map_err(|error| ExecutionError::ConditionNotSatisfied {
                        node: Some(candidate.node),
                        reason: format!("{}: {}", parameter.hint_name, error.reason),
                    })?;
            }
        }

        // Handlers receive their arguments in declaration order.
        let mut ordered: Vec<Option<Value>> = std::iter::repeat_with(|| None)
            .take(parameters.len())
            .collect();
        for (parameter, value) in parameters.iter().zip(values) {
            if let Some(slot) = ordered.get_mut(parameter.ordinal) {
                *slot = value;
            }
        }

        log::trace!("Candidate '{}' ({}) is prepared.", candidate.path, candidate.node);
        Ok((candidate, Arguments::new(ordered)))
    }

    /// Runs the conditions of the command's group type and of every group type enclosing
    /// it, innermost first.
    async fn check_group_conditions(
        &self,
        tree: &CommandTree,
        node: NodeId,
        command: &CommandNode,
        cancellation: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        for group_type in command.group_type.lineage() {
            if group_type.conditions().is_empty() {
                continue;
            }
            let declaring = tree.declaring_node(node, &group_type);
            for attribute in group_type.conditions() {
                self.conditions
                    .check(attribute, cancellation)
                    .await
                    .map_err(|error| ExecutionError::ConditionNotSatisfied {
                        node: declaring,
                        reason: error.reason,
                    })?;
            }
        }
        Ok(())
    }

    /// Produces the value of one parameter from its bound tokens. `None` is a null value.
    async fn materialize(
        &self,
        parameter: &ParameterShape,
        tokens: Option<&[String]>,
        command: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Value>, ExecutionError> {
        let Some(tokens) = tokens else {
            if let Some(default) = &parameter.default_value {
                return Ok(Some(default.produce()));
            }
            if !parameter.is_omissible() {
                return Err(ExecutionError::ParameterMissing {
                    parameter: parameter.hint_name.clone(),
                    command: command.to_string(),
                });
            }
            if parameter.kind.is_collection() {
                return Ok(Some(parameter.parameter_type.collect(Vec::new())));
            }
            return Ok(None);
        };

        match &parameter.kind {
            ParameterKind::Switch { default, .. } => Ok(Some(Box::new(!*default) as Value)),
            kind if kind.is_collection() => {
                let mut elements = Vec::with_capacity(tokens.len());
                for token in tokens {
                    elements.push(self.parse(parameter, token, cancellation).await?);
                }
                Ok(Some(parameter.parameter_type.collect(elements)))
            }
            kind if kind.is_greedy() => {
                let joined = tokens.join(GREEDY_JOIN_SEPARATOR);
                self.parse_nullable(parameter, &joined, cancellation).await
            }
            _ => {
                let token = tokens.first().ok_or_else(|| ExecutionError::ParameterMissing {
                    parameter: parameter.hint_name.clone(),
                    command: command.to_string(),
                })?;
                self.parse_nullable(parameter, token, cancellation).await
            }
        }
    }

    async fn parse_nullable(
        &self,
        parameter: &ParameterShape,
        token: &str,
        cancellation: &CancellationToken,
    ) -> Result<Option<Value>, ExecutionError> {
        if parameter.nullable && token == NULL_LITERAL {
            return Ok(None);
        }
        self.parse(parameter, token, cancellation).await.map(Some)
    }

    async fn parse(
        &self,
        parameter: &ParameterShape,
        token: &str,
        cancellation: &CancellationToken,
    ) -> Result<Value, ExecutionError> {
        self.parsers
            .parse(&parameter.parameter_type, token, cancellation)
            .await
            .map_err(|failure| ExecutionError::ParsingFailed {
                parameter: parameter.hint_name.clone(),
                value: token.to_string(),
                reason: failure.to_string(),
            })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
