// src/core/graph_display.rs

use crate::{
    core::tree::{CommandTree, Node, NodeId},
    models::{CommandShape, ParameterKind, ParameterShape},
};

/// What [`render_tree`] includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Append parameter shapes to command lines.
    pub show_parameters: bool,
    /// List aliases next to keys.
    pub show_aliases: bool,
    /// Levels below the start node to render; `None` renders everything.
    pub max_depth: Option<usize>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_parameters: true,
            show_aliases: true,
            max_depth: None,
        }
    }
}

/// Renders an ASCII tree of the commands below `start` (the root by default). Unnamed
/// groups are spliced into their parent, the way the search sees them.
pub fn render_tree(tree: &CommandTree, start: Option<NodeId>, options: &DisplayOptions) -> String {
    let start = start.unwrap_or_else(|| tree.root());
    let mut output = String::new();
    output.push_str(&tree.qualified_name(start));
    if let Some(command) = tree.command(start)
        && options.show_parameters
    {
        output.push_str(&signature(&command.shape));
    }
    output.push('\n');

    let children = tree.effective_children(start);
    if children.is_empty() && tree.group(start).is_some() {
        output.push_str("(no commands)\n");
    }
    render_children(tree, &children, "", 1, options, &mut output);
    output
}

/// Recursive function to render the descendants of a node.
fn render_children(
    tree: &CommandTree,
    children: &[NodeId],
    prefix: &str,
    level: usize,
    options: &DisplayOptions,
    output: &mut String,
) {
    if options.max_depth.is_some_and(|max| level > max) {
        return;
    }
    for (i, &child) in children.iter().enumerate() {
        let is_last = i + 1 == children.len();
        let connector = if is_last { "└─" } else { "├─" };
        let node = tree.node(child);

        output.push_str(prefix);
        output.push_str(connector);
        output.push_str(&describe(node, options));
        output.push('\n');

        if let Node::Group(_) = node {
            let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
            let grandchildren = tree.effective_children(child);
            render_children(tree, &grandchildren, &child_prefix, level + 1, options, output);
        }
    }
}

fn describe(node: &Node, options: &DisplayOptions) -> String {
    let mut line = node.key().unwrap_or_default().to_string();
    if let Node::Command(command) = node
        && options.show_parameters
    {
        line.push_str(&signature(&command.shape));
    }
    if options.show_aliases && !node.aliases().is_empty() {
        line.push_str(&format!(" ({})", node.aliases().join(", ")));
    }
    if !node.description().is_empty() {
        line.push_str(&format!(" - {}", node.description()));
    }
    line
}

/// A one-line usage signature: `<required>`, `[optional]`, `name...` for collections.
pub fn signature(shape: &CommandShape) -> String {
    shape
        .parameters()
        .iter()
        .map(|parameter| format!(" {}", parameter_usage(parameter)))
        .collect()
}

fn parameter_usage(parameter: &ParameterShape) -> String {
    let hint = &parameter.hint_name;
    let usage = match &parameter.kind {
        ParameterKind::Positional => format!("<{}>", hint),
        ParameterKind::PositionalCollection { .. } | ParameterKind::PositionalGreedy => {
            format!("<{}...>", hint)
        }
        ParameterKind::Named { name } => format!("{} <{}>", name, hint),
        ParameterKind::NamedCollection { name, .. } | ParameterKind::NamedGreedy { name } => {
            format!("{} <{}...>", name, hint)
        }
        ParameterKind::Switch { name, .. } => name.to_string(),
    };
    if parameter.is_omissible() {
        format!("[{}]", usage)
    } else {
        usage
    }
}
