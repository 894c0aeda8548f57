//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use sandbox_bridge::TransportKind;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub transport: TransportKind,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let transport = if args.iter().any(|a| a == "--worker") {
            TransportKind::Worker
        } else if args.iter().any(|a| a == "--frame") {
            TransportKind::Frame
        } else {
            TransportKind::InProcess
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            transport,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "sandbox_bridge=trace"
    } else {
        "sandbox_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
