//! Trigger one workflow and follow its progress.
//!
//! Demonstrates:
//! - Building a manager from `ADW_WS_HOST` / `ADW_WS_PORT` /
//!   `ADW_WS_PROTOCOL`, falling back to localhost
//! - Subscribing to connection and workflow events
//! - Triggering a workflow and awaiting the correlated response
//!
//! Usage:
//!   cargo run --example trigger_workflow
//!   cargo run --example trigger_workflow -- --debug
//!   cargo run --example trigger_workflow -- --issue 42

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use adw_trigger_client::{
    ConnectionEvent, ConnectionManager, ConnectionOptions, Result, StatusUpdate, TriggerWorkflow,
    listener,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const WORKFLOW: &str = "adw_plan_build";
const FOLLOW_FOR: Duration = Duration::from_secs(30);

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    issue: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            issue: args
                .iter()
                .position(|a| a == "--issue")
                .and_then(|i| args.get(i + 1).cloned()),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "adw_trigger_client=debug"
    } else {
        "adw_trigger_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Trigger Workflow ===\n");

    let options = match ConnectionOptions::from_env() {
        Ok(options) => options,
        Err(_) => ConnectionOptions::new("localhost", 8002),
    };
    let manager = ConnectionManager::builder().options(options).build()?;
    println!("[Setup] Server: {}", manager.socket_url());

    manager.on(
        "disconnect",
        listener(|e: &ConnectionEvent| println!("        ! {e:?}")),
    );
    manager.on(
        "status_update",
        listener(|e: &ConnectionEvent| {
            if let Some(update) = e.data_as::<StatusUpdate>() {
                println!("        → {} {}", update.adw_id, update.status);
            }
        }),
    );

    // ========================================================================
    // Connect
    // ========================================================================

    match manager.check_health().await {
        Ok(report) => println!("[Health] {report:?}"),
        Err(e) => println!("[Health] unavailable: {e}"),
    }

    manager.connect().await?;
    println!("[Connect] ✓ {}\n", manager.state());

    // ========================================================================
    // Trigger
    // ========================================================================

    let mut request = TriggerWorkflow::new(WORKFLOW).with_trigger_reason("demo");
    if let Some(issue) = args.issue {
        request = request.with_issue_number(issue);
    }

    let response = manager.trigger_workflow(request).await?;
    println!(
        "[Trigger] ✓ {} ({})",
        response.adw_id.as_deref().unwrap_or("-"),
        response.workflow_name.as_deref().unwrap_or(WORKFLOW)
    );

    println!("[Follow] Listening for {}s...", FOLLOW_FOR.as_secs());
    tokio::time::sleep(FOLLOW_FOR).await;

    let metrics = manager.metrics();
    println!(
        "\n[Stats] sent={} received={} latency={:?}",
        metrics.messages_sent, metrics.messages_received, metrics.last_latency
    );

    manager.disconnect().await;
    println!("[Done] {}", manager.state());
    Ok(())
}
