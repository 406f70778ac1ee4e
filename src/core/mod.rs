// src/core/mod.rs

/// Helpers shared by the core modules.
pub mod commons;
pub mod conditions;
pub mod config;
/// Text rendering of a command tree.
pub mod graph_display;
pub mod invocation;
/// Binding tokens to parameter shapes.
pub mod parameters;
pub mod parsers;
pub mod search;
pub mod service;
/// Splits a raw command string into tokens.
pub mod tokenizer;
pub mod tree;
pub mod trees;
