// src/lib.rs

//! # cmdroute
//!
//! A routing and dispatch engine for text commands. A [`core::tree::CommandTree`] holds
//! named groups and commands; [`core::service::CommandService`] tokenizes raw input (or
//! takes pre-split name/value pairs), finds the most specific matching command, parses and
//! checks its parameters, and awaits the handler.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A cooperative cancellation flag threaded through every asynchronous stage of an invocation.
pub type CancellationToken = Arc<AtomicBool>;

/// Command-line front end over the demo tree.
pub mod cli;
/// Token prefixes and other fixed strings.
pub mod constants;
/// Tree, search, parsing and dispatch.
pub mod core;
/// Data types shared by every stage: tokens, shapes and search results.
pub mod models;

mod dev_utils;
