//! Development backend for the live hooks
//!
//! This binary serves an in-memory copy of the managed backend, seeded with
//! the mock dataset, so that the `watch` binary can run without a real
//! project. Mock time follows real time, and Bob posts into #general every
//! few seconds so there are live changes to watch.
//!
//! Usage: cargo run -p dev-server

use anyhow::Result;
use jiff::Timestamp;
use payloads::Resource;
use realtime::Backend;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::MemoryBackend;
use test_helpers::mock::DevDataset;
use tokio::time::interval;
use tracing::info;

const DEFAULT_PORT: u16 = 54321;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize logging
    let subscriber = realtime::telemetry::get_subscriber("info".into());
    realtime::telemetry::init_subscriber(subscriber)?;

    info!("🚀 Starting development backend");

    let port = match std::env::var("DEV_SERVER_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => DEFAULT_PORT,
    };
    let app = test_helpers::spawn_app_on_port(port).await;
    app.time_source.set(Timestamp::now());

    info!("📊 Setting up development test data...");
    let dataset = DevDataset::create(&app.backend)?;
    for identity in [&dataset.alice, &dataset.bob, &dataset.charlie] {
        app.sessions.sign_in(&identity.id.to_string(), identity.clone());
    }

    start_time_sync_task(&app);
    start_chatter_task(app.backend.clone(), &dataset);

    info!("🎯 Development backend ready!");
    info!("   API: {}", app.address());
    info!(
        "   Watch: BACKEND_URL={} BACKEND_API_KEY={} \
         BACKEND_ACCESS_TOKEN={} cargo run --bin watch",
        app.address(),
        test_helpers::TEST_API_KEY,
        dataset.alice.id
    );
    info!("");
    dataset.print_summary();
    info!("");
    info!("👋 Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down development backend");
    Ok(())
}

/// Keeps the mocked time source in step with real time.
fn start_time_sync_task(app: &test_helpers::TestApp) {
    let time_source = app.time_source.clone();

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            time_source.set(Timestamp::now());
        }
    });
}

/// Bob posts into #general periodically.
fn start_chatter_task(backend: Arc<MemoryBackend>, dataset: &DevDataset) {
    let channel_id = dataset.general_channel;
    let bob = dataset.bob.id;

    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(15));
        let mut sent = 0u32;
        loop {
            interval.tick().await;
            sent += 1;
            let row = json!({
                "channel_id": channel_id,
                "user_id": bob,
                "content": format!("Status update #{sent}"),
            });
            match backend.insert(Resource::ChannelMessages, row).await {
                Ok(()) => tracing::debug!("💬 Bob sent message #{sent}"),
                Err(e) => realtime::telemetry::log_error(e),
            }
        }
    });
}
