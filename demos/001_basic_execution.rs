//! Basic execution demonstration.
//!
//! Demonstrates:
//! - Creating a sandbox with the basic runner
//! - Returning values and mutating the context
//! - Awaiting promises inside the sandbox
//! - Console forwarding
//!
//! Usage:
//!   cargo run --example 001_basic_execution
//!   cargo run --example 001_basic_execution -- --worker
//!   cargo run --example 001_basic_execution -- --frame --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use sandbox_bridge::{ExecuteOptions, Object, Result, Sandbox, Value};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Basic Execution ({}) ===\n", args.transport);

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Creating sandbox...");
    let sandbox = Sandbox::builder()
        .transport(args.transport)
        .basic_runner()
        .debug(args.debug)
        .build()
        .await?;
    println!("        ✓ Sandbox ready\n");

    sandbox.bridge().on("console", |args| {
        let level = args.get(1).and_then(Value::as_string).unwrap_or_default();
        let rest: Vec<String> = args.iter().skip(2).map(Value::to_display_string).collect();
        println!("    [console.{level}] {}", rest.join(" "));
    });

    // ========================================================================
    // Return a value
    // ========================================================================

    println!("[1] return 2 + 2");
    let result = sandbox.execute("return 2 + 2;", ExecuteOptions::new()).await?;
    assert_eq!(result.get("returned"), Some(Value::from(4)));
    println!("    ✓ Passed\n");

    // ========================================================================
    // Mutate the context
    // ========================================================================

    println!("[2] context.visits += 1");
    let context: Object = [("visits", 1)].into_iter().collect();
    let result = sandbox
        .execute(
            "context.visits += 1;",
            ExecuteOptions::new().with_context(context),
        )
        .await?;
    let visits = result.get("context").and_then(|c| c.get("visits"));
    assert_eq!(visits, Some(Value::from(2)));
    println!("    ✓ Passed\n");

    // ========================================================================
    // Await a promise
    // ========================================================================

    println!("[3] setTimeout inside a promise");
    let result = sandbox
        .execute(
            "return new Promise(function (resolve) { setTimeout(function () { resolve('done'); }, 20); });",
            ExecuteOptions::new(),
        )
        .await?;
    assert_eq!(result.get("returned"), Some(Value::from("done")));
    println!("    ✓ Passed\n");

    // ========================================================================
    // Console
    // ========================================================================

    println!("[4] console.log forwarding");
    sandbox
        .execute("console.log('hello from the sandbox', 42);", ExecuteOptions::new())
        .await?;
    println!("    ✓ Passed\n");

    // ========================================================================
    // Ping
    // ========================================================================

    let latency = sandbox.ping().await?;
    println!("[5] ping: {latency:?}\n");

    sandbox.dispose();
    println!("=== Done ===");
    Ok(())
}
