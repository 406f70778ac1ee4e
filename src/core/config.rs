// src/core/config.rs

//! # Configuration
//!
//! Recognized options of the tokenizer, the tree search and the named-tree accessor. Options
//! can be built in code or loaded from a TOML file:
//!
//! ```toml
//! [tokenizer]
//! delimiter = " "
//! quote_character = "\""
//! ignore_empty_values = true
//!
//! [tree_search]
//! key_comparison = "case-insensitive"
//!
//! [tree_accessor]
//! preload_trees = true
//! tree_names = ["__default", "admin"]
//! ```
use crate::constants::{CONFIG_DIR, CONFIG_FILENAME, DEFAULT_DELIMITER, DEFAULT_QUOTE_CHARACTER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Options controlling how a raw string is split into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenizerOptions {
    /// Separates tokens outside quotes.
    pub delimiter: char,
    /// Opens and closes a quoted segment.
    pub quote_character: char,
    /// Drops empty unquoted segments produced by consecutive delimiters.
    pub ignore_empty_values: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quote_character: DEFAULT_QUOTE_CHARACTER,
            ignore_empty_values: true,
        }
    }
}

/// How node keys and option names are compared against input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyComparison {
    CaseSensitive,
    #[default]
    CaseInsensitive,
}

impl KeyComparison {
    /// Compares two keys under this mode.
    pub fn equals(self, a: &str, b: &str) -> bool {
        match self {
            Self::CaseSensitive => a == b,
            Self::CaseInsensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase)),
        }
    }

    /// Compares two characters under this mode.
    pub fn equals_char(self, a: char, b: char) -> bool {
        match self {
            Self::CaseSensitive => a == b,
            Self::CaseInsensitive => a.to_lowercase().eq(b.to_lowercase()),
        }
    }
}

/// Options of the tree search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeSearchOptions {
    /// How command keys and option names are matched.
    pub key_comparison: KeyComparison,
}

/// Options of the named-tree accessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeAccessorOptions {
    /// Build trees eagerly when [`crate::core::trees::TreeAccessor::preload`] is called.
    pub preload_trees: bool,
    /// Trees to preload. Empty means every registered tree.
    pub tree_names: Vec<String>,
}

/// The complete configuration surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandOptions {
    /// Splitting raw input into tokens.
    pub tokenizer: TokenizerOptions,
    /// Matching tokens against the tree.
    pub tree_search: TreeSearchOptions,
    /// Building and caching trees.
    pub tree_accessor: TreeAccessorOptions,
}

/// Loads options from a TOML file.
pub fn load_options(path: &Path) -> Result<CommandOptions> {
    log::debug!("Loading options from '{}'", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;
    let options: CommandOptions = toml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file '{}'", path.display()))?;
    log::debug!("Loaded options: {:?}", options);
    Ok(options)
}

/// Loads `<config_dir>/cmdroute/config.toml`, or the defaults when it does not exist.
pub fn load_default_options() -> Result<CommandOptions> {
    let Some(config_dir) = dirs::config_dir() else {
        log::debug!("No user configuration directory; using default options.");
        return Ok(CommandOptions::default());
    };
    let path = config_dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
    if !path.exists() {
        log::debug!(
            "Configuration file '{}' not found; using default options.",
            path.display()
        );
        return Ok(CommandOptions::default());
    }
    load_options(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = CommandOptions::default();
        assert_eq!(options.tokenizer.delimiter, ' ');
        assert_eq!(options.tokenizer.quote_character, '"');
        assert!(options.tokenizer.ignore_empty_values);
        assert_eq!(
            options.tree_search.key_comparison,
            KeyComparison::CaseInsensitive
        );
        assert!(!options.tree_accessor.preload_trees);
        assert!(options.tree_accessor.tree_names.is_empty());
    }

    #[test]
    fn test_load_options_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
            [tokenizer]
            delimiter = ","
            quote_character = "'"

            [tree_search]
            key_comparison = "case-sensitive"

            [tree_accessor]
            preload_trees = true
            tree_names = ["admin"]
            "#,
        )
        .unwrap();
        file.flush().unwrap();

        let options = load_options(file.path()).unwrap();
        assert_eq!(options.tokenizer.delimiter, ',');
        assert_eq!(options.tokenizer.quote_character, '\'');
        // Unspecified keys keep their defaults.
        assert!(options.tokenizer.ignore_empty_values);
        assert_eq!(
            options.tree_search.key_comparison,
            KeyComparison::CaseSensitive
        );
        assert!(options.tree_accessor.preload_trees);
        assert_eq!(options.tree_accessor.tree_names, vec!["admin".to_string()]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let toml_str = r#"
            [tokenizer]
            delimeter = ","
        "#;
        let result: Result<CommandOptions, _> = toml::from_str(toml_str);
        assert!(result.is_err(), "Should fail due to unknown field 'delimeter'");
        let error_msg = result.unwrap_err().to_string();
        assert!(
            error_msg.contains("unknown field `delimeter`"),
            "Error message was: {}",
            error_msg
        );
    }

    #[test]
    fn test_load_options_missing_file() {
        let result = load_options(Path::new("non_existent_cmdroute_config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_key_comparison() {
        assert!(KeyComparison::CaseInsensitive.equals("Overload", "overload"));
        assert!(!KeyComparison::CaseSensitive.equals("Overload", "overload"));
        assert!(KeyComparison::CaseSensitive.equals("overload", "overload"));
        assert!(KeyComparison::CaseInsensitive.equals_char('V', 'v'));
        assert!(!KeyComparison::CaseSensitive.equals_char('V', 'v'));
    }
}
