// src/constants.rs

/// The default character separating tokens in a raw command string.
pub const DEFAULT_DELIMITER: char = ' ';

/// The default character opening and closing a quoted span.
pub const DEFAULT_QUOTE_CHARACTER: char = '"';

/// Escapes a quote character inside a token (`\"`).
pub const ESCAPE_CHARACTER: char = '\\';

/// Prefix of a long option name (`--name`).
pub const LONG_NAME_PREFIX: &str = "--";

/// Prefix of a short option name (`-n`).
pub const SHORT_NAME_PREFIX: char = '-';

/// Separates an inline value from a long option name (`--name=value`).
pub const INLINE_VALUE_SEPARATOR: char = '=';

/// The literal token that materializes as null for nullable parameters.
pub const NULL_LITERAL: &str = "null";

/// Greedy parameters join their tokens with this separator before parsing.
pub const GREEDY_JOIN_SEPARATOR: &str = " ";

/// The name under which a tree is registered when no name is given.
pub const DEFAULT_TREE_NAME: &str = "__default";

/// Display key of a tree's root group.
pub const ROOT_NODE_KEY: &str = "<root>";

/// The name of the directory holding cmdroute configuration (inside the user config dir).
pub const CONFIG_DIR: &str = "cmdroute";

/// The name of the configuration file (inside [`CONFIG_DIR`]).
pub const CONFIG_FILENAME: &str = "config.toml";
