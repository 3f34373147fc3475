//! HTTP stub of the managed backend over a [`MemoryBackend`].
//!
//! Speaks the same dialect as [`payloads::RestClient`]: table reads, counts
//! and inserts under `/rest/v1`, the identity under `/auth/v1/user` and
//! server-sent change events under `/realtime/v1`.

use actix_web::dev::Server;
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, ResponseError,
    body::BoxBody, get, head, post, web,
};
use payloads::{ClientError, EventFilter, Identity, Query, Resource};
use realtime::backend::{Backend, SubscriptionId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::memory::MemoryBackend;

/// Access tokens handed out to test users.
#[derive(Default)]
pub struct Sessions {
    tokens: Mutex<HashMap<String, Identity>>,
}

impl Sessions {
    pub fn sign_in(&self, token: &str, identity: Identity) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string(), identity);
    }

    pub fn sign_out(&self, token: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    fn identity(&self, token: &str) -> Option<Identity> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }
}

/// Build the stub server, but not await it.
///
/// Returns the port the server has bound to.
pub fn build(
    backend: Arc<MemoryBackend>,
    sessions: Arc<Sessions>,
    port: u16,
) -> std::io::Result<(Server, u16)> {
    let backend = web::Data::from(backend);
    let sessions = web::Data::from(sessions);

    // OS assigns the port if binding to 0
    let listener = TcpListener::bind(format!("127.0.0.1:{port}"))?;
    let port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        App::new()
            .service(select_rows)
            .service(count_rows)
            .service(insert_row)
            .service(current_user)
            .service(change_events)
            .app_data(backend.clone())
            .app_data(sessions.clone())
    })
    .listen(listener)?
    .run();
    Ok((server, port))
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("Authentication failed")]
    AuthError(#[source] anyhow::Error),
    #[error("Bad request")]
    BadRequest(#[source] anyhow::Error),
    #[error(transparent)]
    Backend(#[from] ClientError),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::AuthError(e) => {
                HttpResponse::Unauthorized().body(format!("{self}: {e}"))
            }
            Self::BadRequest(e) => {
                HttpResponse::BadRequest().body(format!("{self}: {e}"))
            }
            Self::Backend(ClientError::APIError(status, message)) => {
                // the client and the server link different `http` versions
                let status = StatusCode::from_u16(status.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                HttpResponse::build(status).body(message.clone())
            }
            Self::Backend(e) => {
                HttpResponse::InternalServerError().body(e.to_string())
            }
        }
    }
}

fn require_api_key(request: &HttpRequest) -> Result<(), APIError> {
    if request.headers().contains_key("apikey") {
        Ok(())
    } else {
        Err(APIError::AuthError(anyhow::anyhow!("Missing apikey header")))
    }
}

fn bearer_token(request: &HttpRequest) -> Option<&str> {
    request
        .headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn parse_query(
    resource: &str,
    params: &[(String, String)],
) -> Result<Query, APIError> {
    let resource: Resource = resource
        .parse()
        .map_err(|e| APIError::BadRequest(anyhow::Error::from(e)))?;
    Query::from_params(resource, params)
        .map_err(|e| APIError::BadRequest(anyhow::anyhow!(e)))
}

#[tracing::instrument(skip(request, params, backend))]
#[get("/rest/v1/{resource}")]
async fn select_rows(
    request: HttpRequest,
    resource: web::Path<String>,
    params: web::Query<Vec<(String, String)>>,
    backend: web::Data<MemoryBackend>,
) -> Result<HttpResponse, APIError> {
    require_api_key(&request)?;
    let query = parse_query(&resource, &params)?;
    let rows = backend.select(&query).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[tracing::instrument(skip(request, params, backend))]
#[head("/rest/v1/{resource}")]
async fn count_rows(
    request: HttpRequest,
    resource: web::Path<String>,
    params: web::Query<Vec<(String, String)>>,
    backend: web::Data<MemoryBackend>,
) -> Result<HttpResponse, APIError> {
    require_api_key(&request)?;
    let query = parse_query(&resource, &params)?;
    let count = backend.count(&query).await?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Range", format!("*/{count}")))
        .finish())
}

#[tracing::instrument(skip(request, row, backend))]
#[post("/rest/v1/{resource}")]
async fn insert_row(
    request: HttpRequest,
    resource: web::Path<String>,
    row: web::Json<Value>,
    backend: web::Data<MemoryBackend>,
) -> Result<HttpResponse, APIError> {
    require_api_key(&request)?;
    let resource: Resource = resource
        .parse()
        .map_err(|e| APIError::BadRequest(anyhow::Error::from(e)))?;
    backend.insert(resource, row.into_inner()).await?;
    Ok(HttpResponse::Created().finish())
}

#[get("/auth/v1/user")]
async fn current_user(
    request: HttpRequest,
    sessions: web::Data<Sessions>,
) -> Result<HttpResponse, APIError> {
    let identity = bearer_token(&request)
        .and_then(|token| sessions.identity(token))
        .ok_or_else(|| {
            APIError::AuthError(anyhow::anyhow!("No user for this token"))
        })?;
    Ok(HttpResponse::Ok().json(identity))
}

#[derive(Debug, Deserialize)]
struct ChannelParams {
    event: String,
}

/// Unsubscribes once the client goes away and actix drops the stream.
struct ChannelGuard {
    backend: Arc<MemoryBackend>,
    id: SubscriptionId,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.backend.unsubscribe(self.id);
    }
}

#[tracing::instrument(skip(request, params, backend))]
#[get("/realtime/v1/{resource}")]
async fn change_events(
    request: HttpRequest,
    resource: web::Path<String>,
    params: web::Query<ChannelParams>,
    backend: web::Data<MemoryBackend>,
) -> Result<HttpResponse, APIError> {
    require_api_key(&request)?;
    let resource: Resource = resource
        .parse()
        .map_err(|e| APIError::BadRequest(anyhow::Error::from(e)))?;
    let events: EventFilter = params
        .event
        .parse()
        .map_err(|e: String| APIError::BadRequest(anyhow::anyhow!(e)))?;

    let feed = backend.subscribe(resource, events).await?;
    let guard = ChannelGuard {
        backend: backend.into_inner(),
        id: feed.id,
    };
    let frames = ReceiverStream::new(feed.events).map(move |event| {
        let _open = &guard;
        serde_json::to_string(&event)
            .map(|data| Bytes::from(format!("data: {data}\n\n")))
            .map_err(actix_web::error::ErrorInternalServerError)
    });
    // flushes the headers before the first event
    let connected = tokio_stream::once(Ok::<_, actix_web::Error>(
        Bytes::from_static(b": connected\n\n"),
    ));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(connected.chain(frames)))
}
