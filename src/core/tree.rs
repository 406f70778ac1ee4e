// src/core/tree.rs

//! # Command Tree
//!
//! An immutable tree of group and command nodes stored in a flat arena. Parent and child
//! links are [`NodeId`] indices into that arena, so nodes never reference each other
//! directly. A tree is assembled with a [`TreeBuilder`] and frozen by
//! [`TreeBuilder::build`]; after that it is only ever read, and can be shared freely
//! between concurrent searches.
use crate::{
    constants::ROOT_NODE_KEY,
    core::invocation::{CommandHandler, GroupType},
    models::{CommandShape, ConditionAttribute, ShapeError},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::{any::Any, collections::HashSet, fmt, sync::Arc};
use thiserror::Error;

lazy_static! {
    static ref NODE_KEY_RE: Regex =
        Regex::new(r#"^[^\s\-"][^\s"]*$"#).expect("node key pattern is valid");
}

/// Errors raised while assembling or looking up trees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("'{0}' is not a valid command or group key.")]
    InvalidKey(String),
    #[error("Node {0} is not a group and cannot hold children.")]
    NotAGroup(NodeId),
    #[error("Group '{key}' is declared more than once under '{parent}'.")]
    DuplicateGroup { key: String, parent: String },
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("No command tree is registered under the name '{0}'.")]
    UnknownTree(String),
    #[error("Failed to build command tree '{name}': {reason}")]
    BuildFailed { name: String, reason: String },
}

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// --- NODES ---

/// An internal node. A group without a key is transparent: its children behave as if
/// they were children of its parent.
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// `None` for an unnamed group.
    pub key: Option<String>,
    /// Alternative keys.
    pub aliases: Vec<String>,
    /// Free text shown in the tree display.
    pub description: String,
    /// Child nodes in declaration order.
    pub children: Vec<NodeId>,
    /// `None` only for the root.
    pub parent: Option<NodeId>,
    /// Every group type that declared this group; partial declarations merge by key.
    pub group_types: Vec<Arc<GroupType>>,
}

impl GroupNode {
    /// `true` for a transparent group.
    pub fn is_unnamed(&self) -> bool {
        self.key.is_none()
    }
}

/// A leaf node: one invocable handler and the shape of its parameters.
#[derive(Debug, Clone)]
pub struct CommandNode {
    /// Key matched against input.
    pub key: String,
    /// Alternative keys.
    pub aliases: Vec<String>,
    /// Free text shown in the tree display.
    pub description: String,
    /// Parameters the handler takes.
    pub shape: CommandShape,
    /// Awaited when the command is invoked.
    pub handler: CommandHandler,
    /// The group type that declared the command.
    pub group_type: Arc<GroupType>,
    /// Conditions attached directly to the command.
    pub conditions: Vec<ConditionAttribute>,
    /// The group that contains the command.
    pub parent: NodeId,
}

/// A node of the tree arena.
#[derive(Debug, Clone)]
pub enum Node {
    Group(GroupNode),
    Command(CommandNode),
}

impl Node {
    /// The key of a command or named group.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Group(group) => group.key.as_deref(),
            Self::Command(command) => Some(&command.key),
        }
    }

    /// Alternative keys.
    pub fn aliases(&self) -> &[String] {
        match self {
            Self::Group(group) => &group.aliases,
            Self::Command(command) => &command.aliases,
        }
    }

    /// The node's description.
    pub fn description(&self) -> &str {
        match self {
            Self::Group(group) => &group.description,
            Self::Command(command) => &command.description,
        }
    }

    /// `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Group(group) => group.parent,
            Self::Command(command) => Some(command.parent),
        }
    }

    /// `true` for a group node.
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

// --- TREE ---

/// A built, read-only command tree. The root is always a group at index 0.
#[derive(Debug)]
pub struct CommandTree {
    nodes: Vec<Node>,
}

impl CommandTree {
    /// The root group.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the root has no children.
    pub fn is_empty(&self) -> bool {
        self.children(self.root()).is_empty()
    }

    /// # Panics
    /// If `id` was issued by another tree and is out of range.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(id.0)
            .expect("node ids are issued by the tree they index")
    }

    /// The group at `id`, if `id` is a group.
    pub fn group(&self, id: NodeId) -> Option<&GroupNode> {
        match self.nodes.get(id.0)? {
            Node::Group(group) => Some(group),
            Node::Command(_) => None,
        }
    }

    /// The command at `id`, if `id` is a command.
    pub fn command(&self, id: NodeId) -> Option<&CommandNode> {
        match self.nodes.get(id.0)? {
            Node::Command(command) => Some(command),
            Node::Group(_) => None,
        }
    }

    /// Direct children of a group; empty for commands.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.group(id)
            .map(|group| group.children.as_slice())
            .unwrap_or_default()
    }

    /// Children of a group with every unnamed group spliced in place, recursively.
    pub fn effective_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        for &child in self.children(id) {
            match self.node(child) {
                Node::Group(group) if group.is_unnamed() => {
                    children.extend(self.effective_children(child));
                }
                _ => children.push(child),
            }
        }
        children
    }

    /// Parent of `id`; `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent()
    }

    /// Ancestors of a node, nearest first, ending with the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// Specificity of a node: the number of named nodes from the root down to it.
    pub fn depth(&self, id: NodeId) -> usize {
        self.path(id).len()
    }

    /// Keys of the named nodes from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut path: Vec<&str> = std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|node| self.node(node).key())
            .collect();
        path.reverse();
        path
    }

    /// The space-separated path of a node, or the root marker for the root.
    pub fn qualified_name(&self, id: NodeId) -> String {
        let path = self.path(id);
        if path.is_empty() {
            ROOT_NODE_KEY.to_string()
        } else {
            path.join(" ")
        }
    }

    /// Every command in tree order.
    pub fn commands(&self) -> impl Iterator<Item = (NodeId, &CommandNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Node::Command(command) => Some((NodeId(index), command)),
                Node::Group(_) => None,
            })
    }

    /// The group node declared by `group_type` that encloses `command`.
    ///
    /// Returns `None` when the declaring group is unnamed, or when the group type does not
    /// declare any enclosing node.
    pub fn declaring_node(&self, command: NodeId, group_type: &Arc<GroupType>) -> Option<NodeId> {
        let declaring = self.ancestors(command).find(|&ancestor| {
            self.group(ancestor).is_some_and(|group| {
                group
                    .group_types
                    .iter()
                    .any(|declared| Arc::ptr_eq(declared, group_type))
            })
        })?;
        match self.group(declaring) {
            Some(group) if !group.is_unnamed() => Some(declaring),
            _ => None,
        }
    }

    /// Rejects named groups whose keys collide once unnamed groups are spliced.
    fn validate(&self) -> Result<(), TreeError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let Node::Group(group) = node else {
                continue;
            };
            if group.is_unnamed() && group.parent.is_some() {
                // Its children are checked as part of the nearest named ancestor.
                continue;
            }
            let mut seen = HashSet::new();
            for child in self.effective_children(NodeId(index)) {
                if let Some(child_group) = self.group(child)
                    && let Some(key) = &child_group.key
                    && !seen.insert(key.as_str())
                {
                    return Err(TreeError::DuplicateGroup {
                        key: key.clone(),
                        parent: self.qualified_name(NodeId(index)),
                    });
                }
            }
        }
        Ok(())
    }
}

// --- BUILDER ---

/// Declaration of a group to add to a [`TreeBuilder`].
#[derive(Debug, Clone)]
pub struct GroupSpec {
    key: Option<String>,
    aliases: Vec<String>,
    description: String,
    group_type: Arc<GroupType>,
}

impl GroupSpec {
    /// A group matched by `key`.
    pub fn named(key: impl Into<String>, group_type: Arc<GroupType>) -> Self {
        Self {
            key: Some(key.into()),
            aliases: Vec::new(),
            description: String::new(),
            group_type,
        }
    }

    /// A transparent group whose children join its parent.
    pub fn unnamed(group_type: Arc<GroupType>) -> Self {
        Self {
            key: None,
            aliases: Vec::new(),
            description: String::new(),
            group_type,
        }
    }

    /// Adds an alternative key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the description shown in the tree display.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Declaration of a command to add to a [`TreeBuilder`].
#[derive(Debug, Clone)]
pub struct CommandSpec {
    key: String,
    aliases: Vec<String>,
    description: Option<String>,
    shape: CommandShape,
    handler: CommandHandler,
    group_type: Arc<GroupType>,
    conditions: Vec<ConditionAttribute>,
}

impl CommandSpec {
    /// A command matched by `key`, handled by `handler`.
    pub fn new(
        key: impl Into<String>,
        group_type: Arc<GroupType>,
        shape: CommandShape,
        handler: CommandHandler,
    ) -> Self {
        Self {
            key: key.into(),
            aliases: Vec::new(),
            description: None,
            shape,
            handler,
            group_type,
            conditions: Vec::new(),
        }
    }

    /// Adds an alternative key.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Overrides the shape's description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches a condition checked before the handler runs.
    pub fn with_condition<A: Any + Send + Sync>(mut self, attribute: A) -> Self {
        self.conditions.push(ConditionAttribute::new(attribute));
        self
    }
}

/// Assembles a [`CommandTree`].
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// A builder holding only the root group.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Group(GroupNode {
                key: None,
                aliases: Vec::new(),
                description: String::new(),
                children: Vec::new(),
                parent: None,
                group_types: Vec::new(),
            })],
        }
    }

    /// The root group, to which top-level groups and commands are added.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn group_mut(&mut self, id: NodeId) -> Result<&mut GroupNode, TreeError> {
        match self.nodes.get_mut(id.0) {
            Some(Node::Group(group)) => Ok(group),
            _ => Err(TreeError::NotAGroup(id)),
        }
    }

    fn validate_keys<'k>(keys: impl IntoIterator<Item = &'k String>) -> Result<(), TreeError> {
        for key in keys {
            if !NODE_KEY_RE.is_match(key) {
                return Err(TreeError::InvalidKey(key.clone()));
            }
        }
        Ok(())
    }

    /// Adds a group under `parent`. A named group whose key already exists under the same
    /// parent is merged into the existing node instead.
    pub fn add_group(&mut self, parent: NodeId, spec: GroupSpec) -> Result<NodeId, TreeError> {
        Self::validate_keys(spec.key.iter().chain(&spec.aliases))?;

        let existing = match &spec.key {
            Some(key) => {
                let children = self.group_mut(parent)?.children.clone();
                children.into_iter().find(|child| {
                    matches!(
                        self.nodes.get(child.0),
                        Some(Node::Group(group)) if group.key.as_ref() == Some(key)
                    )
                })
            }
            None => None,
        };

        if let Some(id) = existing {
            log::trace!("Merging group declaration '{}' into {}", spec.group_type.name(), id);
            let group = self.group_mut(id)?;
            if !group
                .group_types
                .iter()
                .any(|declared| Arc::ptr_eq(declared, &spec.group_type))
            {
                group.group_types.push(spec.group_type);
            }
            for alias in spec.aliases {
                if !group.aliases.contains(&alias) {
                    group.aliases.push(alias);
                }
            }
            if group.description.is_empty() {
                group.description = spec.description;
            }
            return Ok(id);
        }

        let id = NodeId(self.nodes.len());
        self.group_mut(parent)?.children.push(id);
        self.nodes.push(Node::Group(GroupNode {
            key: spec.key,
            aliases: spec.aliases,
            description: spec.description,
            children: Vec::new(),
            parent: Some(parent),
            group_types: vec![spec.group_type],
        }));
        Ok(id)
    }

    /// Adds a command under `parent`. Several commands may share a key (overloads).
    pub fn add_command(&mut self, parent: NodeId, spec: CommandSpec) -> Result<NodeId, TreeError> {
        Self::validate_keys(std::iter::once(&spec.key).chain(&spec.aliases))?;

        let id = NodeId(self.nodes.len());
        self.group_mut(parent)?.children.push(id);
        let description = spec
            .description
            .unwrap_or_else(|| spec.shape.description().to_string());
        self.nodes.push(Node::Command(CommandNode {
            key: spec.key,
            aliases: spec.aliases,
            description,
            shape: spec.shape,
            handler: spec.handler,
            group_type: spec.group_type,
            conditions: spec.conditions,
            parent,
        }));
        Ok(id)
    }

    /// Validates the declarations and produces the tree.
    pub fn build(self) -> Result<CommandTree, TreeError> {
        let tree = CommandTree { nodes: self.nodes };
        tree.validate()?;
        log::debug!(
            "Built command tree with {} nodes ({} commands).",
            tree.len(),
            tree.commands().count()
        );
        Ok(tree)
    }
}

// MARK: --- UNIT TESTS ---
