//! RPC seam between the upload agent and the history server

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, percent_encode};
use reqwest::{Client, Response, header};
use tracing::{debug, instrument};

use crate::error::ClientError;

/// Operations the client needs from the history server
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Allocate a new session id
    async fn create_session(&self) -> Result<u64, ClientError>;

    /// Record one command under `session`; the bytes are sent unaltered
    async fn append(&self, session: u64, command: &[u8]) -> Result<(), ClientError>;

    /// Fetch the raw `<command>\0` stream, newest first
    ///
    /// A `session` of 0 means all sessions.
    async fn last(&self, count: u64, session: u64) -> Result<Bytes, ClientError>;
}

/// `HistoryService` over the server's HTTP API
#[derive(Debug, Clone)]
pub struct HttpHistoryService {
    client: Client,
    base_url: String,
}

impl HttpHistoryService {
    /// Create a service rooted at `base_url`
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

/// Form body for `/log`, percent-encoding the command byte for byte
fn encode_log_form(session: u64, command: &[u8]) -> String {
    format!("command={}&session={}", percent_encode(command, NON_ALPHANUMERIC), session)
}

fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status(status))
    }
}

#[async_trait]
impl HistoryService for HttpHistoryService {
    #[instrument(skip(self), fields(server = %self.base_url))]
    async fn create_session(&self) -> Result<u64, ClientError> {
        let response = check_status(self.client.get(self.url("/session")).send().await?)?;
        let body = response.text().await?;
        let id = body
            .trim()
            .parse()
            .map_err(|_| ClientError::InvalidSession(body.clone()))?;
        debug!(session = id, "Obtained session");
        Ok(id)
    }

    #[instrument(skip(self, command), fields(server = %self.base_url))]
    async fn append(&self, session: u64, command: &[u8]) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/log"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_log_form(session, command))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    #[instrument(skip(self), fields(server = %self.base_url))]
    async fn last(&self, count: u64, session: u64) -> Result<Bytes, ClientError> {
        let response = self
            .client
            .get(self.url("/last"))
            .query(&[("count", count), ("session", session)])
            .send()
            .await?;
        Ok(check_status(response)?.bytes().await?)
    }
}
