use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::domain::{FailureKind, FetchOutcome, FetchRequest, ProteomeId};
use crate::error::ProteomeError;

pub const DEFAULT_BASE_URL: &str = "https://rest.uniprot.org/uniprotkb";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single proteome lookup did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Status(u16),
    Transport(String),
    Unexpected(String),
}

/// Remote lookup of one proteome's sequences in FASTA form.
#[async_trait]
pub trait ProteomeSource: Send + Sync {
    async fn fetch_fasta(&self, id: &ProteomeId) -> Result<Vec<u8>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    /// `None` leaves the transport default (no overall deadline).
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

#[derive(Clone)]
pub struct UniprotProteomeClient {
    client: Client,
    base_url: String,
}

impl UniprotProteomeClient {
    pub fn new() -> Result<Self, ProteomeError> {
        Self::with_options(HttpOptions::default())
    }

    pub fn with_options(options: HttpOptions) -> Result<Self, ProteomeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("proteome-dl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ProteomeError::HttpClient(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = options.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ProteomeError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stream_url(&self, id: &ProteomeId) -> String {
        stream_url(&self.base_url, id)
    }
}

pub fn stream_url(base_url: &str, id: &ProteomeId) -> String {
    format!(
        "{}/stream?format=fasta&query=proteome:{}",
        base_url.trim_end_matches('/'),
        id.as_str()
    )
}

#[async_trait]
impl ProteomeSource for UniprotProteomeClient {
    async fn fetch_fasta(&self, id: &ProteomeId) -> Result<Vec<u8>, SourceError> {
        let url = self.stream_url(id);
        debug!(%url, "uniprot.request");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(SourceError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| SourceError::Transport(error_chain(&err)))?;
        Ok(body.to_vec())
    }
}

/// Runs one lookup and folds every way it can go wrong into a
/// [`FetchOutcome::Failure`]. Never returns an error to the caller.
pub async fn fetch_proteome<S>(source: &S, request: &FetchRequest) -> FetchOutcome
where
    S: ProteomeSource + ?Sized,
{
    match source.fetch_fasta(&request.identifier).await {
        Ok(payload) => {
            debug!(
                id = %request.identifier,
                bytes = payload.len(),
                "proteome downloaded"
            );
            FetchOutcome::Success {
                identifier: request.identifier.clone(),
                label: request.label.clone(),
                payload,
            }
        }
        Err(err) => failure_outcome(request, err),
    }
}

pub(crate) fn failure_outcome(request: &FetchRequest, err: SourceError) -> FetchOutcome {
    let (kind, reason) = match err {
        SourceError::Status(status) => (
            FailureKind::RemoteStatus(status),
            format!(
                "Error downloading proteome for '{}' (Status code: {status})",
                request.label
            ),
        ),
        SourceError::Transport(detail) => (
            FailureKind::Transport,
            format!("Network-related error occurred: {detail}"),
        ),
        SourceError::Unexpected(detail) => (
            FailureKind::Unexpected,
            format!("Unexpected error occurred: {detail}"),
        ),
    };
    warn!(id = %request.identifier, label = %request.label, "{reason}");
    FetchOutcome::failure(request, kind, reason)
}

fn classify_reqwest_error(err: reqwest::Error) -> SourceError {
    if err.is_builder() {
        SourceError::Unexpected(error_chain(&err))
    } else {
        SourceError::Transport(error_chain(&err))
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
