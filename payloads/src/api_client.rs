use crate::{ChangeEvent, EventFilter, Identity, Query, Resource};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Method, StatusCode, header::HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

/// A client for the managed backend's REST, auth and realtime endpoints.
pub struct RestClient {
    pub address: String,
    /// Project key sent with every request.
    pub api_key: SecretString,
    /// User session token. Requests fall back to the project key without it.
    pub access_token: Option<SecretString>,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions
impl RestClient {
    pub fn new(address: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            address: address.into(),
            api_key,
            access_token: None,
            inner_client: reqwest::Client::new(),
        }
    }

    pub fn with_access_token(mut self, access_token: SecretString) -> Self {
        self.access_token = Some(access_token);
        self
    }

    fn format_url(&self, path: &str) -> String {
        format!("{}/{path}", self.address.trim_end_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_ref().unwrap_or(&self.api_key);
        self.inner_client
            .request(method, self.format_url(path))
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(bearer.expose_secret())
    }

    fn table_path(resource: Resource) -> String {
        format!("rest/v1/{resource}")
    }
}

/// Methods on the backend API
impl RestClient {
    /// Read the rows matching the query.
    #[tracing::instrument(
        skip(self, query),
        fields(resource = %query.resource)
    )]
    pub async fn select(
        &self,
        query: &Query,
    ) -> Result<Vec<Value>, ClientError> {
        let response = self
            .request(Method::GET, &Self::table_path(query.resource))
            .query(&query.to_params())
            .send()
            .await?;
        ok_body(response).await
    }

    /// Count the rows matching the query without transferring them.
    #[tracing::instrument(
        skip(self, query),
        fields(resource = %query.resource)
    )]
    pub async fn count(&self, query: &Query) -> Result<u64, ClientError> {
        let response = self
            .request(Method::HEAD, &Self::table_path(query.resource))
            .query(&query.to_params())
            .header("Prefer", "count=exact")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::APIError(
                response.status(),
                response.text().await?,
            ));
        }
        parse_content_range(response.headers())
    }

    /// Insert a single row.
    #[tracing::instrument(skip(self, row))]
    pub async fn insert(
        &self,
        resource: Resource,
        row: &impl Serialize,
    ) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, &Self::table_path(resource))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        ok_empty(response).await
    }

    /// Fetch the currently authenticated identity, if any.
    pub async fn current_user(&self) -> Result<Option<Identity>, ClientError> {
        let response = self.request(Method::GET, "auth/v1/user").send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            _ => ok_body(response).await.map(Some),
        }
    }

    /// Open a push channel delivering change events for one resource.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(
        &self,
        resource: Resource,
        filter: EventFilter,
    ) -> Result<ChangeStream, ClientError> {
        let response = self
            .request(Method::GET, &format!("realtime/v1/{resource}"))
            .query(&[("event", filter.to_string())])
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::APIError(
                response.status(),
                response.text().await?,
            ));
        }
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(ChangeStream {
            chunks,
            buffer: Vec::new(),
        })
    }
}

/// Server-sent change events from a realtime endpoint.
pub struct ChangeStream {
    chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buffer: Vec<u8>,
}

impl ChangeStream {
    /// Wait for the next change event. Returns `None` once the server closes
    /// the stream.
    pub async fn next_event(
        &mut self,
    ) -> Option<Result<ChangeEvent, ClientError>> {
        loop {
            while let Some(frame) = take_frame(&mut self.buffer) {
                // frames without data are keep-alive comments
                if let Some(data) = frame_data(&frame) {
                    return Some(
                        serde_json::from_str(&data).map_err(ClientError::from),
                    );
                }
            }
            match self.chunks.next().await? {
                Ok(chunk) => self
                    .buffer
                    .extend(chunk.into_iter().filter(|byte| *byte != b'\r')),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Split one blank-line terminated frame off the front of the buffer.
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|window| window == b"\n\n")?;
    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&frame[..end]).into_owned())
}

/// Join the `data:` lines of a frame.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn parse_content_range(headers: &HeaderMap) -> Result<u64, ClientError> {
    headers
        .get("Content-Range")
        .and_then(|value| value.to_str().ok())
        .and_then(|range| range.rsplit_once('/'))
        .and_then(|(_, total)| total.parse().ok())
        .ok_or(ClientError::MissingCount)
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing response text.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
    /// A row or payload did not have the expected shape.
    #[error("Unexpected response shape")]
    Decode(#[from] serde_json::Error),
    #[error("Response did not include a row count")]
    MissingCount,
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
