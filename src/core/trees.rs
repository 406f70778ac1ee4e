// src/core/trees.rs

//! # Named Trees
//!
//! Several independent trees can live side by side, each under its own name. A tree is
//! produced by a registered factory the first time it is requested and then shared by
//! every later caller. Concurrent first requests build it exactly once.
use crate::core::{
    config::TreeAccessorOptions,
    tree::{CommandTree, TreeError},
};
use once_cell::sync::OnceCell;
use std::{collections::HashMap, fmt, sync::Arc};

type TreeFactory = Arc<dyn Fn() -> Result<CommandTree, TreeError> + Send + Sync>;

struct TreeEntry {
    /// `None` for trees registered already built.
    factory: Option<TreeFactory>,
    tree: OnceCell<Arc<CommandTree>>,
}

/// Lazily builds and caches named command trees.
///
/// Registration needs `&mut self`, so the set of names is fixed once the accessor is
/// shared; lookups only ever race on the per-tree cell.
pub struct TreeAccessor {
    trees: HashMap<String, TreeEntry>,
    options: TreeAccessorOptions,
}

impl TreeAccessor {
    /// An empty accessor; trees are built on first use unless preloaded.
    pub fn new(options: TreeAccessorOptions) -> Self {
        Self {
            trees: HashMap::new(),
            options,
        }
    }

    /// Registers the factory that builds the tree called `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<CommandTree, TreeError> + Send + Sync + 'static,
    {
        self.trees.insert(
            name.into(),
            TreeEntry {
                factory: Some(Arc::new(factory)),
                tree: OnceCell::new(),
            },
        );
        self
    }

    /// Registers an already built tree.
    pub fn register_tree(&mut self, name: impl Into<String>, tree: CommandTree) -> &mut Self {
        self.trees.insert(
            name.into(),
            TreeEntry {
                factory: None,
                tree: OnceCell::with_value(Arc::new(tree)),
            },
        );
        self
    }

    /// Names of every registered tree.
    pub fn tree_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `true` once the named tree has been built.
    pub fn is_built(&self, name: &str) -> bool {
        self.trees
            .get(name)
            .is_some_and(|entry| entry.tree.get().is_some())
    }

    /// Returns the tree called `name`, building it on first use.
    ///
    /// Concurrent first requests block on one build. A failed build is not cached: the
    /// next request retries the factory.
    pub fn get(&self, name: &str) -> Result<Arc<CommandTree>, TreeError> {
        let entry = self
            .trees
            .get(name)
            .ok_or_else(|| TreeError::UnknownTree(name.to_string()))?;

        entry
            .tree
            .get_or_try_init(|| {
                log::debug!("Building command tree '{}'.", name);
                let factory = entry.factory.as_ref().ok_or_else(|| TreeError::BuildFailed {
                    name: name.to_string(),
                    reason: "no factory is registered".to_string(),
                })?;
                factory().map(Arc::new).map_err(|error| TreeError::BuildFailed {
                    name: name.to_string(),
                    reason: error.to_string(),
                })
            })
            .map(Arc::clone)
    }

    /// Builds the configured trees ahead of time. Does nothing unless preloading is enabled.
    pub fn preload(&self) -> Result<(), TreeError> {
        if !self.options.preload_trees {
            return Ok(());
        }
        let names: Vec<&str> = if self.options.tree_names.is_empty() {
            self.tree_names()
        } else {
            self.options.tree_names.iter().map(String::as_str).collect()
        };
        for name in names {
            log::debug!("Preloading command tree '{}'.", name);
            self.get(name)?;
        }
        Ok(())
    }
}

impl Default for TreeAccessor {
    fn default() -> Self {
        Self::new(TreeAccessorOptions::default())
    }
}

impl fmt::Debug for TreeAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeAccessor")
            .field("trees", &self.tree_names())
            .field("options", &self.options)
            .finish()
    }
}

// MARK: --- UNIT TESTS ---
