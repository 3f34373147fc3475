pub mod memory;
pub mod mock;
pub mod server;

use payloads::{Identity, RestClient, UserId};
use realtime::RestBackend;
use realtime::telemetry;
use realtime::time::TimeSource;
use secrecy::SecretString;
use std::sync::Arc;
use tracing_log::LogTracer;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

pub use memory::{BackendStats, MemoryBackend, ReadGate};
pub use server::Sessions;

/// Project key the stub server expects in the `apikey` header.
pub const TEST_API_KEY: &str = "test-anon-key";

pub struct TestApp {
    #[allow(unused)]
    pub port: u16,
    pub backend: Arc<MemoryBackend>,
    pub sessions: Arc<Sessions>,
    pub time_source: TimeSource,
}

impl TestApp {
    pub fn address(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// A client without a user session.
    pub fn client(&self) -> RestClient {
        RestClient::new(self.address(), SecretString::from(TEST_API_KEY))
    }

    /// A client signed in as `identity`. The session token is the user id.
    pub fn client_for(&self, identity: &Identity) -> RestClient {
        let token = identity.id.to_string();
        self.sessions.sign_in(&token, identity.clone());
        self.client().with_access_token(SecretString::from(token))
    }

    /// The production backend pointed at this stub.
    pub fn rest_backend(&self, identity: Option<&Identity>) -> RestBackend {
        match identity {
            Some(identity) => RestBackend::new(self.client_for(identity)),
            None => RestBackend::new(self.client()),
        }
    }
}

/// A clock frozen at midday, so "today" is unambiguous in tests.
pub fn test_time_source() -> TimeSource {
    #[cfg(feature = "mock-time")]
    let time_source = TimeSource::new("2025-01-01T12:00:00Z".parse().unwrap());

    #[cfg(not(feature = "mock-time"))]
    let time_source = TimeSource::new();

    time_source
}

/// A standalone in-memory backend for tests that need no HTTP.
pub fn memory_backend() -> Arc<MemoryBackend> {
    init_logging();
    Arc::new(MemoryBackend::new(test_time_source()))
}

fn init_logging() {
    let subscriber = telemetry::get_subscriber("error".into());
    let _ = LogTracer::init();
    let _ = subscriber.try_init();
}

pub async fn spawn_app_on_port(port: u16) -> TestApp {
    init_logging();

    let time_source = test_time_source();
    let backend = Arc::new(MemoryBackend::new(time_source.clone()));
    let sessions = Arc::new(Sessions::default());

    let (server, port) =
        server::build(backend.clone(), sessions.clone(), port).unwrap();
    tokio::spawn(server);

    TestApp {
        port,
        backend,
        sessions,
        time_source,
    }
}

/// Use OS-assigned port for parallel testing.
pub async fn spawn_app() -> TestApp {
    spawn_app_on_port(0).await
}

fn identity(id: u128, email: &str) -> Identity {
    Identity {
        id: UserId(Uuid::from_u128(id)),
        email: Some(email.to_string()),
    }
}

pub fn alice() -> Identity {
    identity(0xa11ce, "alice@example.com")
}

pub fn bob() -> Identity {
    identity(0xb0b, "bob@example.com")
}

pub fn charlie() -> Identity {
    identity(0xc4a411e, "charlie@example.com")
}
