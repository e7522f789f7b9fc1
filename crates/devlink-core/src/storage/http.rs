//! HTTP backend for the BaaS storage REST API.
//!
//! Uploads are `POST {endpoint}/storage/v1/object/{bucket}/{path}` with the
//! body streamed in `chunk_size` pieces and `x-upsert` controlling
//! overwrite. Listings are `POST {endpoint}/storage/v1/object/list/{bucket}`,
//! downloads are `GET` on the object URL and removals are
//! `DELETE {endpoint}/storage/v1/object/{bucket}` with the keys in the body.
//!
//! The configured timeout bounds connecting and every listing or removal
//! request. Transfers are only cut off once no bytes have moved for that long,
//! so a large upload on a slow link is never killed while it makes progress.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{ObjectStore, ProgressSink, RawObject};
use crate::config::Config;
use crate::error::{Error, Result};

/// Object store talking to a storage REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    api_key: Option<String>,
    chunk_size: usize,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Deserialize)]
struct RemovedObject {
    name: String,
}

impl HttpObjectStore {
    /// Create a store for `endpoint`/`bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            timeout,
        })
    }

    /// Create a store from the `[storage]` and `[upload]` sections.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.storage.endpoint.clone(),
            config.storage.bucket.clone(),
            config.storage.api_key.clone(),
            config.storage.request_timeout,
        )?
        .with_chunk_size(config.upload.chunk_size))
    }

    /// Set the size of the pieces request bodies are streamed in.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.endpoint,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/object/list/{}", self.endpoint, self.bucket)
    }

    fn bucket_url(&self) -> String {
        format!("{}/storage/v1/object/{}", self.endpoint, self.bucket)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header(AUTHORIZATION, format!("Bearer {key}"))
                .header("apikey", key),
            None => request,
        }
    }

    fn map_send_error(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            self.timed_out()
        } else {
            Error::Transport(err.to_string())
        }
    }

    fn timed_out(&self) -> Error {
        Error::Timeout(self.timeout.as_secs())
    }
}

/// Turn a non-success response into [`Error::Rejected`].
async fn rejected(response: Response) -> Error {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    Error::Rejected {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message
        },
    }
}

impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        path: &str,
        payload: Bytes,
        overwrite: bool,
        progress: ProgressSink,
    ) -> Result<()> {
        let total = payload.len();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let upsert = if overwrite { "true" } else { "false" };

        tracing::debug!("POST {} ({} bytes, upsert={})", path, total, overwrite);

        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let body = body_stream(payload, self.chunk_size, ProgressSink::new(sent_tx));
        let send = self
            .authorize(self.client.post(self.object_url(path)))
            .header("x-upsert", HeaderValue::from_static(upsert))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body))
            .send();
        tokio::pin!(send);

        // Every chunk pulled by the transport restarts the idle timer.
        let mut reporting = true;
        let sent = loop {
            tokio::select! {
                biased;
                sent = &mut send => break sent,
                report = sent_rx.recv(), if reporting => match report {
                    Some(bytes_sent) => progress.report(bytes_sent),
                    None => reporting = false,
                },
                () = tokio::time::sleep(self.timeout) => {
                    tracing::debug!("upload of {} stalled for {:?}", path, self.timeout);
                    return Err(self.timed_out());
                }
            }
        };
        while let Ok(bytes_sent) = sent_rx.try_recv() {
            progress.report(bytes_sent);
        }

        let response = sent.map_err(|e| self.map_send_error(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if !overwrite && status == StatusCode::CONFLICT {
            return Err(Error::Conflict(path.to_string()));
        }
        Err(rejected(response).await)
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> Result<Vec<RawObject>> {
        let request = ListRequest {
            prefix,
            limit,
            offset: 0,
            sort_by: SortBy {
                column: "name",
                order: "asc",
            },
        };

        let response = self
            .authorize(self.client.post(self.list_url()))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body = response.bytes().await.map_err(|e| self.map_send_error(&e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        tracing::debug!("GET {}", path);

        let response = tokio::time::timeout(
            self.timeout,
            self.authorize(self.client.get(self.object_url(path))).send(),
        )
        .await
        .map_err(|_| self.timed_out())?
        .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            // Some deployments answer a missing key with 400 and a `not_found` body.
            return Err(match rejected(response).await {
                Error::Rejected { message, .. }
                    if status == StatusCode::NOT_FOUND || message.contains("not_found") =>
                {
                    Error::NotFound(path.to_string())
                }
                other => other,
            });
        }

        let mut data = BytesMut::new();
        let mut chunks = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.timeout, chunks.next())
                .await
                .map_err(|_| self.timed_out())?;
            let Some(chunk) = next else { break };
            data.extend_from_slice(&chunk.map_err(|e| self.map_send_error(&e))?);
        }
        Ok(data.freeze())
    }

    async fn remove_objects(&self, paths: &[String]) -> Result<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("DELETE {} object(s)", paths.len());

        let response = self
            .authorize(self.client.delete(self.bucket_url()))
            .timeout(self.timeout)
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body = response.bytes().await.map_err(|e| self.map_send_error(&e))?;
        let removed: Vec<RemovedObject> = serde_json::from_slice(&body)?;
        Ok(removed.into_iter().map(|object| object.name).collect())
    }

    fn public_url(&self, path: &str) -> Option<String> {
        Some(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint,
            self.bucket,
            path.trim_start_matches('/')
        ))
    }
}

/// Split `payload` into `chunk_size` pieces, reporting the running total as
/// each piece is pulled by the transport.
fn body_stream(
    payload: Bytes,
    chunk_size: usize,
    progress: ProgressSink,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let total = payload.len();
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..total)
        .step_by(chunk_size)
        .map(|offset| payload.slice(offset..(offset + chunk_size).min(total)))
        .collect();

    let mut sent: u64 = 0;
    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent);
        Ok(chunk)
    }))
}
