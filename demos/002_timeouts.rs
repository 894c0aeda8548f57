//! Timeouts and disposal demonstration.
//!
//! Demonstrates:
//! - Synchronous interrupts on the in-process backend
//! - Watchdog timeouts on remote backends
//! - Aborting pending executions with dispose
//! - Loading the bootstrap from a file
//!
//! Usage:
//!   cargo run --example 002_timeouts
//!   cargo run --example 002_timeouts -- --worker
//!   cargo run --example 002_timeouts -- --frame --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, bail};
use common::Args;
use sandbox_bridge::{Error, ExecuteOptions, Sandbox, StaticBootstrap};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== 002: Timeouts ({}) ===\n", args.transport);

    // ========================================================================
    // Setup
    // ========================================================================

    let dir = tempfile::tempdir().context("creating temp dir")?;
    let path = dir.path().join("bootcode.js");
    std::fs::write(&path, StaticBootstrap::basic_runner().code())
        .context("writing bootstrap")?;

    println!("[Setup] Creating sandbox from {}...", path.display());
    let sandbox = Sandbox::builder()
        .transport(args.transport)
        .bootstrap_file(&path)
        .timeout(Duration::from_millis(200))
        .grace(Duration::from_millis(100))
        .build()
        .await
        .context("building sandbox")?;
    println!("        ✓ Sandbox ready\n");

    // ========================================================================
    // Runaway script
    // ========================================================================

    println!("[1] while (true) {{}}");
    match sandbox.execute("while (true) {}", ExecuteOptions::new()).await {
        Err(e @ Error::SyncExecutionTimeout { .. }) => println!("    interrupted: {e}"),
        Err(e @ Error::AsyncExecutionTimeout { .. }) => println!("    watchdog: {e}"),
        other => bail!("expected a timeout, got {other:?}"),
    }
    println!("    ✓ Passed\n");

    if args.transport != sandbox_bridge::TransportKind::InProcess {
        // The remote realm is still spinning; start over with a fresh one.
        sandbox.dispose();
        println!("[Skip] Remote realm stays busy after a watchdog timeout\n");
        return Ok(());
    }

    // ========================================================================
    // Dispose mid-flight
    // ========================================================================

    println!("[2] dispose with a pending execution");
    let pending = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            sandbox
                .execute(
                    "return new Promise(function () {});",
                    ExecuteOptions::new().with_timeout(Duration::from_secs(60)),
                )
                .await
        })
    };
    while sandbox.pending_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sandbox.dispose();

    match pending.await.context("joining execution")? {
        Err(e @ Error::ExecutionAborted { .. }) => println!("    aborted: {e}"),
        other => bail!("expected an abort, got {other:?}"),
    }
    println!("    ✓ Passed\n");

    println!("=== Done ===");
    Ok(())
}
