// src/bin/cmdroute.rs

use clap::Parser;
use cmdroute::{
    cli::{self, Cli},
    core::service::ExecutionError,
};
use colored::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The entry point of the `cmdroute` binary.
/// Sets up logging and Ctrl+C handling, then routes the arguments and
/// performs centralized error handling.
#[tokio::main]
async fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    let ctrl_c_token = Arc::clone(&cancellation_token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::debug!("Ctrl+C received, cancelling.");
            ctrl_c_token.store(true, Ordering::Relaxed);
        }
    });

    if let Err(e) = cli::run_cli(Cli::parse(), cancellation_token).await {
        // --- Centralized Error Handling ---
        if let Some(ExecutionError::Cancelled) = e.downcast_ref::<ExecutionError>() {
            std::process::exit(130);
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
