//! Join Room Example
//!
//! Walks through a full session lifecycle against the in-memory collaborators:
//! initialize, observe lifecycle events, simulate a network drop, tear down.
//!
//! Run with: cargo run --example join_room -- [room] [endpoint]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use rtc_orchestrator_core::config::{ConnectionConfig, OrchestratorConfig};
use rtc_orchestrator_core::connection::ConnectionInfo;
use rtc_orchestrator_core::events::{EventSubscription, LifecycleEventHandler};
use rtc_orchestrator_core::mock::{CallJournal, ConnectBehavior, MockResourceProvider, MockSessionProvider, MockSignalingLibrary};
use rtc_orchestrator_core::orchestrator::OrchestratorBuilder;
use rtc_orchestrator_core::recovery::RetryConfig;
use rtc_orchestrator_core::OrchestratorError;

struct ConsoleStatus;

#[async_trait]
impl LifecycleEventHandler for ConsoleStatus {
    async fn on_established(&self, connection: ConnectionInfo) {
        println!("🟢 connected ({})", connection.url);
    }

    async fn on_disconnected(&self, connection: ConnectionInfo, reason: String) {
        println!("🔴 disconnected from {}: {}", connection.id, reason);
    }

    async fn on_failed(&self, error: OrchestratorError) {
        println!("❌ connection failed [{}]: {}", error.category(), error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("rtc_orchestrator_core=info")
        .init();

    let mut args = std::env::args().skip(1);
    let room = args.next().unwrap_or_else(|| "room1".to_string());
    let endpoint = args.next().unwrap_or_else(|| "wss://signal.example.com/ws".to_string());

    println!("📞 Join Room Example");
    println!("====================\n");

    let journal = CallJournal::new();
    let library = Arc::new(MockSignalingLibrary::new(journal.clone()));
    // First handshake stalls so the retry policy has something to do
    library.queue_connect_behavior(ConnectBehavior::Hang);

    let config = OrchestratorConfig::new()
        .with_connect_timeout(Duration::from_millis(500))
        .with_connect_retry(RetryConfig::fixed(3, Duration::from_millis(100)));

    let mut orchestrator = OrchestratorBuilder::new()
        .signaling_library(library.clone())
        .resource_provider(Arc::new(MockResourceProvider::new(journal.clone())))
        .session_provider(Arc::new(MockSessionProvider::new(journal.clone())))
        .config(config)
        .build()
        .context("failed to build orchestrator")?;
    orchestrator.subscribe(EventSubscription::all_events(Arc::new(ConsoleStatus)));

    let report = orchestrator
        .initialize(ConnectionConfig::new(endpoint, "demo-token"), room.as_str())
        .await
        .with_context(|| format!("failed to join {}", room))?;

    println!("\n✅ joined '{}'", report.session_id);
    match &report.resources {
        Some(resources) => println!("   local media: {:?}", resources.kinds),
        None => println!("   local media unavailable: {:?}", report.resource_error),
    }
    for step in &report.steps {
        println!("   {:<22} {:?} in {:?}", step.step, step.outcome, step.elapsed);
    }

    println!("\n🌩  simulating a network drop");
    library.drop_connections("network unreachable");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let teardown = orchestrator.teardown().await;
    println!("\n🧹 teardown (clean: {})", teardown.is_clean());
    for step in &teardown.steps {
        println!("   {:<22} {:?}", step.step, step.outcome);
    }

    let stats = orchestrator.stats();
    println!("\n📊 {} attempt(s), {} established, state {}", stats.attempts, stats.established, stats.state);
    println!("📜 collaborator calls: {:?}", journal.calls());

    Ok(())
}
