use anyhow::Context;
use jiff::tz::TimeZone;
use payloads::RestClient;
use std::fmt::Debug;
use std::sync::Arc;

use realtime::hooks::{use_dashboard, use_posts};
use realtime::telemetry::{get_subscriber, init_subscriber};
use realtime::time::TimeSource;
use realtime::{Config, RestBackend, Session, ViewStateReader};

/// Live view of the dashboard and the feed
///
/// Mounts the dashboard hooks and the posts feed against a backend and logs
/// every state change until interrupted.
///
/// Environment variables can be set directly or loaded from a .env file.
///
/// Required environment variables:
/// - BACKEND_URL: Base address of the backend
/// - BACKEND_API_KEY: Public API key of the project
///
/// Optional environment variables:
/// - BACKEND_ACCESS_TOKEN: Session token of a signed-in user
/// - SYNC_POLICY: auto (default), refetch or patch
/// - LOADING_POLICY: initial (default) or every
/// - LOG_FILTER: Default tracing filter when RUST_LOG is unset (info)
///
/// Example against the dev server, which prints the user ids it accepts as
/// access tokens:
/// BACKEND_URL=http://127.0.0.1:54321 BACKEND_API_KEY=test-anon-key \
/// BACKEND_ACCESS_TOKEN=<user id> cargo run --bin watch
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_subscriber(get_subscriber(config.log_filter.clone()))?;

    let mut client =
        RestClient::new(&config.backend_url, config.api_key.clone());
    if let Some(token) = &config.access_token {
        client = client.with_access_token(token.clone());
    }
    let backend = Arc::new(RestBackend::new(client));

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new(jiff::Timestamp::now());

    let session = Session::resolve(backend.as_ref()).await;
    match session.identity() {
        Some(identity) => tracing::info!(user = %identity.id, "Signed in"),
        None => tracing::warn!("No signed-in user, personal views stay empty"),
    }

    let today = time_source
        .start_of_day(&TimeZone::system())
        .context("Failed to compute the start of today")?;
    let options = config.sync_options();
    let dashboard = use_dashboard(
        backend.clone(),
        session.identity().cloned(),
        today,
        options,
    );
    let posts = use_posts(backend, session.identity().cloned(), options);

    let watchers = [
        tokio::spawn(log_changes("teams", dashboard.teams.reader())),
        tokio::spawn(log_changes("activities", dashboard.activities.reader())),
        tokio::spawn(log_changes("messages", dashboard.messages.reader())),
        tokio::spawn(log_changes("posts", posts.reader())),
    ];

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");

    tokio::join!(dashboard.unmount(), posts.unmount());
    for watcher in watchers {
        watcher.abort();
    }
    Ok(())
}

async fn log_changes<T: Clone + Debug + Send + Sync + 'static>(
    name: &'static str,
    mut reader: ViewStateReader<T>,
) {
    let state = reader.current();
    tracing::info!(name, loading = state.loading, "{:?}", state.data);
    while let Some(state) = reader.changed().await {
        tracing::info!(
            name,
            loading = state.loading,
            refreshing = state.refreshing,
            "{:?}",
            state.data
        );
    }
}
