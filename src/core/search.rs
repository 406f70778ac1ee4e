// src/core/search.rs

//! # Tree Search
//!
//! Walks a [`CommandTree`] along the leading value tokens of the input (or an explicit
//! path) and binds the remaining tokens to the parameter shapes of every command reached.
//!
//! The search explores every branch that could apply: unnamed groups are spliced into
//! their parent, so a command and a group may both match the same key. Each branch works on
//! its own clone of the tokenizer. Every shape-compatible candidate is returned, in tree
//! order. Ranking by specificity (the number of named nodes between the root and the
//! command, see [`most_specific`]) is left to the caller, which first rules out the
//! candidates that cannot be prepared.
use crate::{
    core::{
        config::TreeSearchOptions,
        parameters::NamedMatch,
        tokenizer::Tokenizer,
        tree::{CommandTree, Node, NodeId},
    },
    models::{BoundCommandNode, BoundParameter, CommandShape},
};
use thiserror::Error;

/// Errors raised while walking the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Key '{key}' matches more than one sibling group.")]
    DuplicateGroup { key: String },
}

/// A read-only search over one tree. Cheap to create; holds no state between calls.
#[derive(Debug, Clone, Copy)]
pub struct TreeSearch<'t> {
    tree: &'t CommandTree,
    options: TreeSearchOptions,
}

impl<'t> TreeSearch<'t> {
    /// A search over `tree` using `options`.
    pub fn new(tree: &'t CommandTree, options: TreeSearchOptions) -> Self {
        Self { tree, options }
    }

    /// Finds every command the token stream can invoke.
    pub fn search(&self, tokens: Tokenizer<'_>) -> Result<Vec<BoundCommandNode>, SearchError> {
        let mut candidates = Vec::new();
        self.search_tokens(self.tree.root(), tokens, &mut candidates)?;
        log::debug!("Token search produced {} candidate(s).", candidates.len());
        Ok(candidates)
    }

    /// Finds every command at `path` that accepts the pre-split parameters.
    pub fn search_named(
        &self,
        path: &[&str],
        parameters: &[(String, Vec<String>)],
    ) -> Result<Vec<BoundCommandNode>, SearchError> {
        let mut candidates = Vec::new();
        self.search_path(self.tree.root(), path, parameters, &mut candidates)?;
        log::debug!(
            "Named search for '{}' produced {} candidate(s).",
            path.join(" "),
            candidates.len()
        );
        Ok(candidates)
    }

    /// Every node, group or command, whose path is exactly `path`. The empty path is the
    /// root.
    pub fn find_nodes(&self, path: &[&str]) -> Result<Vec<NodeId>, SearchError> {
        let mut current = vec![self.tree.root()];
        for component in path {
            let mut next = Vec::new();
            for parent in current {
                next.extend(self.matching_children(parent, component)?);
            }
            current = next;
        }
        Ok(current)
    }

    fn key_matches(&self, node: &Node, text: &str) -> bool {
        let comparison = self.options.key_comparison;
        node.key().is_some_and(|key| comparison.equals(key, text))
            || node
                .aliases()
                .iter()
                .any(|alias| comparison.equals(alias, text))
    }

    /// Effective children of `parent` addressed by `text`. At most one of them may be a
    /// group.
    fn matching_children(&self, parent: NodeId, text: &str) -> Result<Vec<NodeId>, SearchError> {
        let matches: Vec<NodeId> = self
            .tree
            .effective_children(parent)
            .into_iter()
            .filter(|&child| self.key_matches(self.tree.node(child), text))
            .collect();
        let groups = matches
            .iter()
            .filter(|&&child| self.tree.node(child).is_group())
            .count();
        if groups > 1 {
            return Err(SearchError::DuplicateGroup {
                key: text.to_string(),
            });
        }
        Ok(matches)
    }

    fn search_tokens(
        &self,
        parent: NodeId,
        tokens: Tokenizer<'_>,
        candidates: &mut Vec<BoundCommandNode>,
    ) -> Result<(), SearchError> {
        let mut rest = tokens;
        let Some(token) = rest.next() else {
            return Ok(());
        };
        if !token.is_value() {
            return Ok(());
        }

        for child in self.matching_children(parent, &token.text)? {
            match self.tree.node(child) {
                Node::Group(_) => self.search_tokens(child, rest.clone(), candidates)?,
                Node::Command(command) => {
                    if let Some(parameters) = self.bind_tokens(&command.shape, rest.clone()) {
                        log::trace!("Command {} matched the input.", child);
                        candidates.push(self.bound(child, parameters));
                    }
                }
            }
        }
        Ok(())
    }

    fn search_path(
        &self,
        parent: NodeId,
        path: &[&str],
        parameters: &[(String, Vec<String>)],
        candidates: &mut Vec<BoundCommandNode>,
    ) -> Result<(), SearchError> {
        let Some((component, rest)) = path.split_first() else {
            return Ok(());
        };

        for child in self.matching_children(parent, component)? {
            match self.tree.node(child) {
                Node::Group(_) => self.search_path(child, rest, parameters, candidates)?,
                Node::Command(command) if rest.is_empty() => {
                    if let Some(bound) = self.bind_named(&command.shape, parameters) {
                        candidates.push(self.bound(child, bound));
                    }
                }
                Node::Command(_) => {}
            }
        }
        Ok(())
    }

    fn bound(&self, node: NodeId, parameters: Vec<BoundParameter>) -> BoundCommandNode {
        BoundCommandNode {
            node,
            path: self.tree.qualified_name(node),
            parameters,
        }
    }

    /// Binds every remaining token to a shape. Named shapes may appear in any order;
    /// positional shapes bind strictly in declaration order. Fails if a token is left over
    /// or a shape that cannot be omitted stays unbound.
    fn bind_tokens(
        &self,
        shape: &CommandShape,
        mut tokens: Tokenizer<'_>,
    ) -> Option<Vec<BoundParameter>> {
        let parameters = shape.parameters();
        let mut slots: Vec<Option<Vec<String>>> = vec![None; parameters.len()];

        while !tokens.is_exhausted() {
            let next_positional = parameters
                .iter()
                .zip(&slots)
                .position(|(parameter, slot)| parameter.kind.is_positional() && slot.is_none());

            let mut matched = false;
            for (index, (parameter, slot)) in parameters.iter().zip(slots.iter_mut()).enumerate() {
                if slot.is_some()
                    || (parameter.kind.is_positional() && next_positional != Some(index))
                {
                    continue;
                }
                if let Some(values) = parameter.matches_tokens(&mut tokens, &self.options) {
                    *slot = Some(values);
                    matched = true;
                    break;
                }
            }
            if !matched {
                log::trace!("Token {:?} has no parameter to bind to.", tokens.peek());
                return None;
            }
        }

        Self::finish_binding(shape, slots)
    }

    /// Binds pre-split parameters. An unknown name or a repeated one rejects the command.
    fn bind_named(
        &self,
        shape: &CommandShape,
        parameters: &[(String, Vec<String>)],
    ) -> Option<Vec<BoundParameter>> {
        let shapes = shape.parameters();
        let mut slots: Vec<Option<Vec<String>>> = vec![None; shapes.len()];

        for (name, values) in parameters {
            let mut matched = false;
            for (parameter, slot) in shapes.iter().zip(slots.iter_mut()) {
                match parameter.matches_named(name, values, &self.options) {
                    NamedMatch::Mismatch => continue,
                    NamedMatch::Fatal(reason) => {
                        log::trace!("Rejecting candidate: {}", reason);
                        return None;
                    }
                    NamedMatch::Matched(_) if slot.is_some() => return None,
                    NamedMatch::Matched(values) => {
                        *slot = Some(values);
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                return None;
            }
        }

        Self::finish_binding(shape, slots)
    }

    fn finish_binding(
        shape: &CommandShape,
        slots: Vec<Option<Vec<String>>>,
    ) -> Option<Vec<BoundParameter>> {
        let mut bound = Vec::new();
        for (index, (parameter, slot)) in shape.parameters().iter().zip(slots).enumerate() {
            match slot {
                Some(tokens) => bound.push(BoundParameter {
                    shape_index: index,
                    tokens,
                }),
                None if parameter.is_omissible() => {}
                None => return None,
            }
        }
        Some(bound)
    }
}

/// Keeps the items whose node is deepest in the tree.
pub fn most_specific<T>(
    tree: &CommandTree,
    items: Vec<T>,
    node_of: impl Fn(&T) -> NodeId,
) -> Vec<T> {
    let Some(deepest) = items.iter().map(|item| tree.depth(node_of(item))).max() else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| tree.depth(node_of(item)) == deepest)
        .collect()
}

// MARK: --- UNIT TESTS ---
